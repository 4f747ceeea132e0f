//! Server-side mTLS for the two gRPC listeners.
//!
//! Both listeners present the same server certificate but trust different
//! client CA bundles. Connections are TLS 1.2 only, limited to two ECDHE-RSA
//! AES-GCM suites, and must present a client certificate.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::crypto::ring::cipher_suite;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;

use crate::config::Config;

/// Which caller population a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    Pilot,
    CloudController,
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pilot => f.write_str("pilot"),
            Self::CloudController => f.write_str("cloud controller"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("parsing {listener}-facing server cert/key: {reason}")]
    ServerCert { listener: Listener, reason: String },

    #[error("loading client CAs for {listener}-facing server: {source}")]
    ReadClientCa {
        listener: Listener,
        source: std::io::Error,
    },

    #[error("parsing client CAs for {listener}-facing server: invalid pem block")]
    ParseClientCa { listener: Listener },

    #[error("building {listener}-facing tls config: {reason}")]
    Build { listener: Listener, reason: String },
}

impl Config {
    pub fn server_tls_for_pilot(&self) -> Result<Arc<ServerConfig>, TlsError> {
        server_config(
            Listener::Pilot,
            &self.server_cert_path,
            &self.server_key_path,
            &self.pilot_client_ca_path,
        )
    }

    pub fn server_tls_for_cloud_controller(&self) -> Result<Arc<ServerConfig>, TlsError> {
        server_config(
            Listener::CloudController,
            &self.server_cert_path,
            &self.server_key_path,
            &self.cloud_controller_client_ca_path,
        )
    }
}

fn provider() -> Arc<CryptoProvider> {
    let mut provider = rustls::crypto::ring::default_provider();
    provider.cipher_suites = vec![
        cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    ];
    Arc::new(provider)
}

/// Build the rustls server config for one listener.
pub fn server_config(
    listener: Listener,
    cert_path: &Path,
    key_path: &Path,
    client_ca_path: &Path,
) -> Result<Arc<ServerConfig>, TlsError> {
    let server_cert = |reason: String| TlsError::ServerCert { listener, reason };
    let cert_chain = read_certs(cert_path).map_err(server_cert)?;
    let key = read_key(key_path).map_err(server_cert)?;

    let ca_file = File::open(client_ca_path)
        .map_err(|source| TlsError::ReadClientCa { listener, source })?;
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(ca_file)) {
        let cert = cert.map_err(|_| TlsError::ParseClientCa { listener })?;
        roots
            .add(cert)
            .map_err(|_| TlsError::ParseClientCa { listener })?;
    }
    if roots.is_empty() {
        return Err(TlsError::ParseClientCa { listener });
    }

    let build = |reason: String| TlsError::Build { listener, reason };
    let provider = provider();
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| build(e.to_string()))?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12])
        .map_err(|e| build(e.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key)
        .map_err(|e| server_cert(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec()];

    Ok(Arc::new(config))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, String> {
    let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("{}: {e}", path.display()))?;
    if certs.is_empty() {
        return Err(format!("{}: no certificates found", path.display()));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>, String> {
    let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| format!("{}: {e}", path.display()))?
        .ok_or_else(|| format!("{}: no private key found", path.display()))
}
