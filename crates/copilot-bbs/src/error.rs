//! Error types for the BBS gateway.

use thiserror::Error;

/// Result type alias for BBS operations.
pub type BbsResult<T> = Result<T, BbsError>;

/// Errors that can occur while talking to the BBS.
#[derive(Debug, Error)]
pub enum BbsError {
    #[error("invalid bbs address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("loading bbs tls material: {0}")]
    Tls(String),

    #[error("connecting to bbs: {0}")]
    Connect(std::io::Error),

    #[error("tls handshake with bbs: {0}")]
    Handshake(std::io::Error),

    #[error("bbs request: {0}")]
    Http(#[from] hyper::Error),

    #[error("building bbs request: {0}")]
    Request(#[from] http::Error),

    #[error("bbs responded with status {0}")]
    Status(http::StatusCode),

    #[error("decoding bbs response: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The BBS answered but reported an error in the response envelope.
    #[error("{message}")]
    Remote { kind: i32, message: String },
}
