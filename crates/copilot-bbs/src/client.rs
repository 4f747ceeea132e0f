//! BBS client: the scheduler gateway.
//!
//! The BBS speaks HTTP/1.1 with protobuf bodies over mutual TLS. Every
//! endpoint is a `POST` of an encoded request message that answers with an
//! encoded response message carrying an optional error envelope.
//!
//! `SecureClient` keeps a small stack of idle connections and reuses them
//! across calls. It never retries: a failed call is reported as-is.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HOST};
use http::{Method, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use prost::Message;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{BbsError, BbsResult};
use crate::models::*;
use crate::tls;

pub const ACTUAL_LRP_GROUPS_PATH: &str = "/v1/actual_lrp_groups/list";
pub const CELLS_PATH: &str = "/v1/cells/list.r1";

const PROTOBUF: &str = "application/x-protobuf";

/// Idle connections kept when the configuration leaves the limit at zero.
const DEFAULT_MAX_IDLE_CONNS: usize = 2;

/// Read-only access to live instance placement.
#[async_trait]
pub trait BbsClient: Send + Sync {
    /// List actual LRP groups matching `filter`.
    async fn actual_lrp_groups(&self, filter: ActualLrpFilter) -> BbsResult<Vec<ActualLrpGroup>>;

    /// List the cells currently registered with the BBS.
    async fn cells(&self) -> BbsResult<Vec<CellPresence>>;
}

/// Connection settings for [`SecureClient`].
#[derive(Debug, Clone)]
pub struct BbsClientConfig {
    /// `https://host:port` of the BBS.
    pub address: String,
    pub server_ca_cert_path: PathBuf,
    pub client_cert_path: PathBuf,
    pub client_key_path: PathBuf,
    /// TLS session cache size; 0 disables resumption.
    pub client_session_cache_size: usize,
    /// Idle connections kept for reuse; 0 selects the default of 2.
    pub max_idle_conns_per_host: usize,
}

type Sender = SendRequest<Full<Bytes>>;

/// mTLS BBS client.
pub struct SecureClient {
    address: String,
    authority: String,
    host: String,
    port: u16,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    idle: Mutex<Vec<Sender>>,
    max_idle: usize,
}

impl SecureClient {
    /// Load TLS material from disk and build a client.
    pub fn new(config: &BbsClientConfig) -> BbsResult<Self> {
        let tls = tls::client_config(
            &config.server_ca_cert_path,
            &config.client_cert_path,
            &config.client_key_path,
            config.client_session_cache_size,
        )?;
        Self::with_tls_config(&config.address, tls, config.max_idle_conns_per_host)
    }

    /// Build a client from an already assembled rustls config.
    pub fn with_tls_config(address: &str, tls: ClientConfig, max_idle: usize) -> BbsResult<Self> {
        let invalid = |reason: String| BbsError::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let uri: Uri = address.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
        if uri.scheme_str() != Some("https") {
            return Err(invalid("scheme must be https".to_string()));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();
        let host = uri
            .host()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(443);
        let server_name =
            ServerName::try_from(host.clone()).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            address: address.to_string(),
            authority,
            host,
            port,
            server_name,
            connector: TlsConnector::from(Arc::new(tls)),
            idle: Mutex::new(Vec::new()),
            max_idle: if max_idle == 0 { DEFAULT_MAX_IDLE_CONNS } else { max_idle },
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> BbsResult<Sender> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(BbsError::Connect)?;
        let tls = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(BbsError::Handshake)?;

        let (sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "bbs connection closed");
            }
        });

        debug!(address = %self.address, "connected to bbs");
        Ok(sender)
    }

    /// Take an idle connection that is still usable, or dial a new one.
    async fn checkout(&self) -> BbsResult<Sender> {
        loop {
            let idle = self.idle.lock().await.pop();
            let Some(mut sender) = idle else { break };
            if sender.ready().await.is_ok() {
                return Ok(sender);
            }
        }
        self.connect().await
    }

    async fn release(&self, sender: Sender) {
        if sender.is_closed() {
            return;
        }
        let mut idle = self.idle.lock().await;
        if idle.len() < self.max_idle {
            idle.push(sender);
        }
    }

    async fn post<Req, Resp>(&self, path: &str, message: &Req) -> BbsResult<Resp>
    where
        Req: Message + Sync,
        Resp: Message + Default,
    {
        let body = Full::new(Bytes::from(message.encode_to_vec()));
        let request = http::Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(HOST, self.authority.as_str())
            .header(CONTENT_TYPE, PROTOBUF)
            .header(ACCEPT, PROTOBUF)
            .body(body)?;

        let mut sender = self.checkout().await?;
        let response = sender.send_request(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        self.release(sender).await;

        if !status.is_success() {
            return Err(BbsError::Status(status));
        }
        Ok(Resp::decode(bytes)?)
    }
}

#[async_trait]
impl BbsClient for SecureClient {
    async fn actual_lrp_groups(&self, filter: ActualLrpFilter) -> BbsResult<Vec<ActualLrpGroup>> {
        let request = ActualLrpGroupsRequest::from(filter);
        let response: ActualLrpGroupsResponse = self.post(ACTUAL_LRP_GROUPS_PATH, &request).await?;
        if let Some(err) = response.error {
            return Err(err.into());
        }
        debug!(groups = response.actual_lrp_groups.len(), "listed actual lrp groups");
        Ok(response.actual_lrp_groups)
    }

    async fn cells(&self) -> BbsResult<Vec<CellPresence>> {
        let response: CellsResponse = self.post(CELLS_PATH, &CellsRequest::default()).await?;
        if let Some(err) = response.error {
            return Err(err.into());
        }
        Ok(response.cells)
    }
}
