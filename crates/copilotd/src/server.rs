//! gRPC listeners over mutual TLS.
//!
//! Each listener owns a TCP socket and an accept loop that completes the TLS
//! handshake per connection before handing the stream to tonic. A failed or
//! stalled handshake only drops that connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::server::Router;
use tracing::{debug, info, warn};

use crate::tls::Listener;

const PENDING_CONNECTIONS: usize = 64;

/// A peer that has not finished the TLS handshake by then is dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed `accept`, e.g. when the process is out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accept TCP connections and yield those that finish the TLS handshake
/// within `handshake_timeout`.
///
/// The loop stops once the returned stream is dropped.
fn tls_incoming(
    listener: Listener,
    tcp: TcpListener,
    tls: Arc<ServerConfig>,
    handshake_timeout: Duration,
) -> ReceiverStream<Result<TlsStream<TcpStream>, std::io::Error>> {
    let (tx, rx) = mpsc::channel(PENDING_CONNECTIONS);
    let acceptor = TlsAcceptor::from(tls);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = tcp.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(%listener, error = %e, "accept failed");
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                            continue;
                        }
                    };
                    let acceptor = acceptor.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                            Ok(Ok(stream)) => {
                                let _ = tx.send(Ok(stream)).await;
                            }
                            Ok(Err(e)) => debug!(%listener, %peer, error = %e, "tls handshake failed"),
                            Err(_) => debug!(%listener, %peer, "tls handshake timed out"),
                        }
                    });
                }
                _ = tx.closed() => break,
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Serve `router` on `tcp` until `shutdown` flips to true.
pub async fn serve_tls(
    listener: Listener,
    tcp: TcpListener,
    tls: Arc<ServerConfig>,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = tcp.local_addr()?;
    info!(%listener, %addr, "gRPC listener starting");

    router
        .serve_with_incoming_shutdown(tls_incoming(listener, tcp, tls, HANDSHAKE_TIMEOUT), async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!(%listener, "gRPC listener stopped");
    Ok(())
}
