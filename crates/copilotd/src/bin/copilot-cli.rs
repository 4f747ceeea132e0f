//! copilot-cli: operator client for a running copilotd.
//!
//! Talks to either listener over mutual TLS and prints responses as JSON.
//!
//! ```text
//! copilot-cli --address 127.0.0.1:9001 --server-ca ca.crt \
//!     --client-cert cc.crt --client-key cc.key \
//!     cloud-controller upsert-route --guid route-a --host a.example.com
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};
use tracing::debug;

use copilot_grpc::proto;
use copilot_grpc::proto::cloud_controller_copilot_client::CloudControllerCopilotClient;
use copilot_grpc::proto::istio_copilot_client::IstioCopilotClient;

#[derive(Parser)]
#[command(name = "copilot-cli", about = "Copilot operator client", version)]
struct Cli {
    /// ip:port of the copilot listener.
    #[arg(long, default_value = "127.0.0.1:9000")]
    address: String,

    /// CA certificate that signed the copilot server certificate.
    #[arg(long)]
    server_ca: PathBuf,

    /// Client certificate presented to copilot.
    #[arg(long)]
    client_cert: PathBuf,

    /// Key for the client certificate.
    #[arg(long)]
    client_key: PathBuf,

    /// Name to verify the server certificate against (defaults to the host in --address).
    #[arg(long)]
    server_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calls on the Pilot-facing listener.
    Istio {
        #[command(subcommand)]
        action: IstioAction,
    },
    /// Calls on the Cloud Controller-facing listener.
    CloudController {
        #[command(subcommand)]
        action: CloudControllerAction,
    },
}

#[derive(Subcommand)]
enum IstioAction {
    Health,
    /// Print the hostname → backends map.
    Routes,
}

#[derive(Subcommand)]
enum CloudControllerAction {
    Health,
    UpsertRoute {
        #[arg(long)]
        guid: String,
        #[arg(long)]
        host: String,
    },
    DeleteRoute {
        #[arg(long)]
        guid: String,
    },
    MapRoute {
        #[arg(long)]
        route_guid: String,
        #[arg(long)]
        process_guid: String,
    },
    UnmapRoute {
        #[arg(long)]
        route_guid: String,
        #[arg(long)]
        process_guid: String,
    },
    /// Associate a CAPI process with one or more Diego processes.
    UpsertAssociation {
        #[arg(long)]
        process_guid: String,
        #[arg(long = "diego-process-guid", required = true)]
        diego_process_guids: Vec<String>,
    },
    DeleteAssociation {
        #[arg(long)]
        process_guid: String,
    },
    ListRoutes,
    ListRouteMappings,
    ListAssociations,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,copilot=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let channel = connect(&cli).await?;

    match cli.command {
        Commands::Istio { action } => istio(IstioCopilotClient::new(channel), action).await,
        Commands::CloudController { action } => {
            cloud_controller(CloudControllerCopilotClient::new(channel), action).await
        }
    }
}

fn read(path: &Path, what: &str) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {what} {}", path.display()))
}

async fn connect(cli: &Cli) -> anyhow::Result<Channel> {
    let mut tls = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(read(&cli.server_ca, "server CA")?))
        .identity(Identity::from_pem(
            read(&cli.client_cert, "client cert")?,
            read(&cli.client_key, "client key")?,
        ));
    if let Some(name) = &cli.server_name {
        tls = tls.domain_name(name.clone());
    }

    let url = format!("https://{}", cli.address);
    debug!(%url, "connecting to copilot");
    Channel::from_shared(url.clone())
        .with_context(|| format!("invalid address {}", cli.address))?
        .tls_config(tls)
        .context("configuring tls")?
        .connect()
        .await
        .with_context(|| format!("connecting to {url}"))
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn istio(mut client: IstioCopilotClient<Channel>, action: IstioAction) -> anyhow::Result<()> {
    match action {
        IstioAction::Health => {
            let resp = client.health(proto::HealthRequest {}).await.context("istio health")?;
            print(resp.get_ref())
        }
        IstioAction::Routes => {
            let resp = client.routes(proto::RoutesRequest {}).await.context("istio routes")?;
            print(resp.get_ref())
        }
    }
}

async fn cloud_controller(
    mut client: CloudControllerCopilotClient<Channel>,
    action: CloudControllerAction,
) -> anyhow::Result<()> {
    match action {
        CloudControllerAction::Health => {
            let resp = client.health(proto::HealthRequest {}).await.context("health")?;
            print(resp.get_ref())
        }
        CloudControllerAction::UpsertRoute { guid, host } => {
            client
                .upsert_route(proto::UpsertRouteRequest {
                    route: Some(proto::Route { guid, host }),
                })
                .await
                .context("upsert-route")?;
            Ok(())
        }
        CloudControllerAction::DeleteRoute { guid } => {
            client
                .delete_route(proto::DeleteRouteRequest { guid })
                .await
                .context("delete-route")?;
            Ok(())
        }
        CloudControllerAction::MapRoute { route_guid, process_guid } => {
            client
                .map_route(proto::MapRouteRequest {
                    route_mapping: Some(proto::RouteMapping {
                        route_guid,
                        capi_process_guid: process_guid,
                    }),
                })
                .await
                .context("map-route")?;
            Ok(())
        }
        CloudControllerAction::UnmapRoute { route_guid, process_guid } => {
            client
                .unmap_route(proto::UnmapRouteRequest {
                    route_mapping: Some(proto::RouteMapping {
                        route_guid,
                        capi_process_guid: process_guid,
                    }),
                })
                .await
                .context("unmap-route")?;
            Ok(())
        }
        CloudControllerAction::UpsertAssociation { process_guid, diego_process_guids } => {
            client
                .upsert_capi_diego_process_association(proto::UpsertCapiDiegoProcessAssociationRequest {
                    capi_diego_process_association: Some(proto::CapiDiegoProcessAssociation {
                        capi_process_guid: process_guid,
                        diego_process_guids,
                    }),
                })
                .await
                .context("upsert-association")?;
            Ok(())
        }
        CloudControllerAction::DeleteAssociation { process_guid } => {
            client
                .delete_capi_diego_process_association(proto::DeleteCapiDiegoProcessAssociationRequest {
                    capi_process_guid: process_guid,
                })
                .await
                .context("delete-association")?;
            Ok(())
        }
        CloudControllerAction::ListRoutes => {
            let resp = client
                .list_cf_routes(proto::ListCfRoutesRequest {})
                .await
                .context("list-routes")?;
            print(resp.get_ref())
        }
        CloudControllerAction::ListRouteMappings => {
            let resp = client
                .list_cf_route_mappings(proto::ListCfRouteMappingsRequest {})
                .await
                .context("list-route-mappings")?;
            print(resp.get_ref())
        }
        CloudControllerAction::ListAssociations => {
            let resp = client
                .list_capi_diego_process_associations(proto::ListCapiDiegoProcessAssociationsRequest {})
                .await
                .context("list-associations")?;
            print(resp.get_ref())
        }
    }
}
