//! copilot-bbs: read-only gateway to the Diego BBS.
//!
//! The BBS is the scheduler's state service. Copilot asks it for the
//! current placement of every long-running process instance ("actual LRP")
//! on each `Routes()` call and never caches the answer.
//!
//! # Components
//!
//! - **`models`**: protobuf wire types for the BBS endpoints used here
//! - **`client`**: the `BbsClient` trait and its mTLS HTTP implementation
//! - **`tls`**: client-side rustls configuration from PEM files
//! - **`error`**: `BbsError`

pub mod client;
pub mod error;
pub mod models;
pub mod tls;

pub use client::{BbsClient, BbsClientConfig, SecureClient};
pub use error::{BbsError, BbsResult};
pub use models::{
    ActualLrp, ActualLrpFilter, ActualLrpGroup, ActualLrpKey, ActualLrpNetInfo, ActualLrpState,
    CellPresence, PortMapping,
};
