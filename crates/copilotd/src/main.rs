//! copilotd: the Copilot daemon.
//!
//! Bridges Cloud Foundry routing state to Istio Pilot:
//! - Cloud Controller-facing gRPC listener (routes, mappings, associations)
//! - Pilot-facing gRPC listener (hostname → backends, joined against the BBS)
//!
//! # Usage
//!
//! ```text
//! copilotd --config /var/vcap/jobs/copilot/config/copilot.json
//! ```

mod config;
mod server;
mod tls;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use copilot_bbs::{BbsClient, SecureClient};
use copilot_grpc::{CloudControllerService, IstioService};
use copilot_state::Repositories;

use crate::config::Config;
use crate::tls::Listener;

/// Startup gives up on the BBS after this long.
const BBS_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "copilotd", about = "Copilot daemon")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,copilotd=debug,copilot=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    run(&cli.config).await
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    info!(path = %config_path.display(), bbs_enabled = config.bbs_enabled(), "config loaded");

    let bbs: Option<Arc<dyn BbsClient>> = match &config.bbs {
        Some(bbs_config) => Some(Arc::new(SecureClient::new(&bbs_config.client_config())?)),
        None => None,
    };
    serve(config, bbs, shutdown_signal()).await
}

/// Run both listeners until `signal` resolves or either listener exits.
///
/// `bbs` is only used when the config has BBS access enabled.
async fn serve(
    config: Config,
    bbs: Option<Arc<dyn BbsClient>>,
    signal: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let pilot_tls = config.server_tls_for_pilot()?;
    let cloud_controller_tls = config.server_tls_for_cloud_controller()?;

    // ── BBS ────────────────────────────────────────────────────────

    let bbs = match (&config.bbs, bbs) {
        (Some(bbs_config), Some(client)) => {
            probe_bbs(&bbs_config.address, client.as_ref()).await?;
            info!(address = %bbs_config.address, "bbs reachable");
            Some(client)
        }
        _ => {
            info!("bbs communication disabled");
            None
        }
    };

    // ── Services ───────────────────────────────────────────────────

    let repos = Repositories::in_memory();
    let istio = match bbs {
        Some(bbs) => IstioService::new(repos.clone(), bbs),
        None => IstioService::disabled(repos.clone()),
    };
    let cloud_controller = CloudControllerService::new(repos);

    let pilot_tcp = TcpListener::bind(&config.listen_address_for_pilot)
        .await
        .with_context(|| format!("binding {}", config.listen_address_for_pilot))?;
    let cloud_controller_tcp = TcpListener::bind(&config.listen_address_for_cloud_controller)
        .await
        .with_context(|| format!("binding {}", config.listen_address_for_cloud_controller))?;

    // ── Listeners ──────────────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pilot_task = tokio::spawn(server::serve_tls(
        Listener::Pilot,
        pilot_tcp,
        pilot_tls,
        copilot_grpc::reflection::router()?.add_service(istio.into_service()),
        shutdown_rx.clone(),
    ));
    let cloud_controller_task = tokio::spawn(server::serve_tls(
        Listener::CloudController,
        cloud_controller_tcp,
        cloud_controller_tls,
        copilot_grpc::reflection::router()?.add_service(cloud_controller.into_service()),
        shutdown_rx,
    ));

    let result = supervise(pilot_task, cloud_controller_task, shutdown_tx, signal).await;
    info!("copilotd stopped");
    result
}

/// Fail unless the BBS answers a cell listing within [`BBS_PROBE_TIMEOUT`].
async fn probe_bbs(address: &str, bbs: &dyn BbsClient) -> anyhow::Result<()> {
    match tokio::time::timeout(BBS_PROBE_TIMEOUT, bbs.cells()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!("unable to reach BBS at address {address:?}: {e}")),
        Err(_) => Err(anyhow::anyhow!(
            "unable to reach BBS at address {address:?}: no answer within {BBS_PROBE_TIMEOUT:?}"
        )),
    }
}

/// The first listener to exit, or `signal`, stops both.
async fn supervise(
    mut pilot_task: JoinHandle<anyhow::Result<()>>,
    mut cloud_controller_task: JoinHandle<anyhow::Result<()>>,
    shutdown_tx: watch::Sender<bool>,
    signal: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let first = tokio::select! {
        res = &mut pilot_task => Some((Listener::Pilot, res)),
        res = &mut cloud_controller_task => Some((Listener::CloudController, res)),
        _ = signal => {
            info!("shutdown signal received");
            None
        }
    };
    let _ = shutdown_tx.send(true);

    let (result, remaining) = match first {
        None => (
            Ok(()),
            vec![
                (Listener::Pilot, pilot_task),
                (Listener::CloudController, cloud_controller_task),
            ],
        ),
        Some((listener, res)) => {
            error!(%listener, "gRPC listener exited");
            let result = match flatten(res) {
                Ok(()) => Err(anyhow::anyhow!("{listener} listener exited unexpectedly")),
                Err(e) => Err(e.context(format!("{listener} listener"))),
            };
            let other = match listener {
                Listener::Pilot => (Listener::CloudController, cloud_controller_task),
                Listener::CloudController => (Listener::Pilot, pilot_task),
            };
            (result, vec![other])
        }
    };

    for (listener, handle) in remaining {
        if let Err(e) = flatten(handle.await) {
            error!(%listener, error = %e, "gRPC listener failed during shutdown");
        }
    }

    result
}

fn flatten(res: Result<anyhow::Result<()>, tokio::task::JoinError>) -> anyhow::Result<()> {
    res.map_err(anyhow::Error::from)?
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use copilot_bbs::{ActualLrpFilter, ActualLrpGroup, BbsError, BbsResult, CellPresence};

    use crate::config::BbsConfig;

    const BBS_ADDRESS: &str = "bbs.service.cf.internal:8889";

    enum Cells {
        Fail,
        Hang,
    }

    struct FakeBbs(Cells);

    #[async_trait::async_trait]
    impl BbsClient for FakeBbs {
        async fn actual_lrp_groups(&self, _filter: ActualLrpFilter) -> BbsResult<Vec<ActualLrpGroup>> {
            Ok(vec![])
        }

        async fn cells(&self) -> BbsResult<Vec<CellPresence>> {
            match self.0 {
                Cells::Fail => Err(BbsError::Remote { kind: 0, message: "connection refused".into() }),
                Cells::Hang => std::future::pending().await,
            }
        }
    }

    /// Config whose TLS files live in `_dir`; both listeners bind ephemeral ports.
    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
    }

    fn fixture(bbs_enabled: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();

        let ca_key = rcgen::KeyPair::generate().unwrap();
        let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();
        let server_key = rcgen::KeyPair::generate().unwrap();
        let server = rcgen::CertificateParams::new(vec!["copilot.service.cf.internal".to_string()])
            .unwrap()
            .signed_by(&server_key, &ca, &ca_key)
            .unwrap();

        let ca_path = dir.path().join("ca.crt");
        let cert_path = dir.path().join("server.crt");
        let key_path = dir.path().join("server.key");
        std::fs::write(&ca_path, ca.pem()).unwrap();
        std::fs::write(&cert_path, server.pem()).unwrap();
        std::fs::write(&key_path, server_key.serialize_pem()).unwrap();

        let bbs = bbs_enabled.then(|| BbsConfig {
            server_ca_cert_path: ca_path.clone(),
            client_cert_path: cert_path.clone(),
            client_key_path: key_path.clone(),
            address: BBS_ADDRESS.to_string(),
            ..Default::default()
        });
        let config = Config {
            listen_address_for_pilot: "127.0.0.1:0".to_string(),
            listen_address_for_cloud_controller: "127.0.0.1:0".to_string(),
            pilot_client_ca_path: ca_path.clone(),
            cloud_controller_client_ca_path: ca_path,
            server_cert_path: cert_path,
            server_key_path: key_path,
            bbs,
        };

        Fixture { _dir: dir, config }
    }

    #[tokio::test]
    async fn unreachable_bbs_stops_startup() {
        let fx = fixture(true);

        let err = serve(
            fx.config.clone(),
            Some(Arc::new(FakeBbs(Cells::Fail))),
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            format!("unable to reach BBS at address {BBS_ADDRESS:?}: connection refused")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_bbs_times_out_at_startup() {
        let err = probe_bbs(BBS_ADDRESS, &FakeBbs(Cells::Hang)).await.unwrap_err();

        assert!(
            err.to_string()
                .starts_with(&format!("unable to reach BBS at address {BBS_ADDRESS:?}")),
            "{err}"
        );
    }

    #[tokio::test]
    async fn disabled_bbs_serves_until_signal() {
        let fx = fixture(false);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let daemon = tokio::spawn(serve(fx.config.clone(), None, async {
            let _ = stop_rx.await;
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!daemon.is_finished());

        stop_tx.send(()).unwrap();
        daemon.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn first_listener_to_exit_stops_the_other() {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let pilot = tokio::spawn(async { Err::<(), _>(anyhow::anyhow!("address in use")) });
        let cloud_controller = tokio::spawn(async move {
            shutdown_rx.wait_for(|stop| *stop).await?;
            Ok::<(), anyhow::Error>(())
        });

        let err = supervise(pilot, cloud_controller, shutdown_tx, std::future::pending())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "pilot listener");
        assert_eq!(err.root_cause().to_string(), "address in use");
    }

    #[tokio::test]
    async fn signal_stops_both_listeners_cleanly() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = |mut rx: watch::Receiver<bool>| {
            tokio::spawn(async move {
                rx.wait_for(|stop| *stop).await?;
                Ok::<(), anyhow::Error>(())
            })
        };
        let pilot = listener(shutdown_rx.clone());
        let cloud_controller = listener(shutdown_rx);

        supervise(pilot, cloud_controller, shutdown_tx, async {}).await.unwrap();
    }
}
