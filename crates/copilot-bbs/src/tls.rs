//! Client-side mTLS configuration for the BBS connection.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::Resumption;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::error::{BbsError, BbsResult};

/// Read every certificate in a PEM file.
pub fn load_certs(path: &Path) -> BbsResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| BbsError::Tls(format!("{}: {e}", path.display())))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BbsError::Tls(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(BbsError::Tls(format!("{}: no certificates found", path.display())));
    }
    Ok(certs)
}

/// Read the first private key in a PEM file.
pub fn load_private_key(path: &Path) -> BbsResult<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| BbsError::Tls(format!("{}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| BbsError::Tls(format!("{}: {e}", path.display())))?
        .ok_or_else(|| BbsError::Tls(format!("{}: no private key found", path.display())))
}

/// Build the rustls client config for the BBS.
///
/// A `session_cache_size` of zero disables TLS session resumption.
pub fn client_config(
    server_ca_cert_path: &Path,
    client_cert_path: &Path,
    client_key_path: &Path,
    session_cache_size: usize,
) -> BbsResult<ClientConfig> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(server_ca_cert_path)? {
        roots
            .add(cert)
            .map_err(|e| BbsError::Tls(format!("{}: {e}", server_ca_cert_path.display())))?;
    }

    let cert_chain = load_certs(client_cert_path)?;
    let key = load_private_key(client_key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| BbsError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_client_auth_cert(cert_chain, key)
        .map_err(|e| BbsError::Tls(format!("client cert/key: {e}")))?;

    config.resumption = if session_cache_size == 0 {
        Resumption::disabled()
    } else {
        Resumption::in_memory_sessions(session_cache_size)
    };

    Ok(config)
}
