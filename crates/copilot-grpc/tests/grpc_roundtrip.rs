//! Both services mounted on a loopback listener and driven through the
//! generated clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};

use copilot_bbs::{
    ActualLrp, ActualLrpFilter, ActualLrpGroup, ActualLrpKey, ActualLrpNetInfo, BbsClient,
    BbsResult, CellPresence, PortMapping,
};
use copilot_grpc::proto;
use copilot_grpc::proto::cloud_controller_copilot_client::CloudControllerCopilotClient;
use copilot_grpc::proto::istio_copilot_client::IstioCopilotClient;
use copilot_grpc::{CloudControllerService, IstioService};
use copilot_state::Repositories;

struct StaticBbs(Vec<ActualLrpGroup>);

#[async_trait::async_trait]
impl BbsClient for StaticBbs {
    async fn actual_lrp_groups(&self, _filter: ActualLrpFilter) -> BbsResult<Vec<ActualLrpGroup>> {
        Ok(self.0.clone())
    }

    async fn cells(&self) -> BbsResult<Vec<CellPresence>> {
        Ok(vec![])
    }
}

struct SlowBbs(Duration);

#[async_trait::async_trait]
impl BbsClient for SlowBbs {
    async fn actual_lrp_groups(&self, _filter: ActualLrpFilter) -> BbsResult<Vec<ActualLrpGroup>> {
        tokio::time::sleep(self.0).await;
        Ok(vec![])
    }

    async fn cells(&self) -> BbsResult<Vec<CellPresence>> {
        Ok(vec![])
    }
}

fn running(guid: &str, address: &str, host_port: u32) -> ActualLrpGroup {
    ActualLrpGroup {
        instance: Some(ActualLrp {
            actual_lrp_key: Some(ActualLrpKey {
                process_guid: guid.to_string(),
                index: 0,
                domain: "cf-apps".to_string(),
            }),
            actual_lrp_net_info: Some(ActualLrpNetInfo {
                address: address.to_string(),
                ports: vec![PortMapping { container_port: 8080, host_port }],
                ..Default::default()
            }),
            state: "RUNNING".to_string(),
            ..Default::default()
        }),
        evacuating: None,
    }
}

async fn serve(istio: IstioService, cc: CloudControllerService) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        Server::builder()
            .add_service(istio.into_service())
            .add_service(cc.into_service())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    (addr, tx)
}

async fn channel(addr: SocketAddr) -> Channel {
    Channel::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap()
}

#[tokio::test]
async fn routes_reflect_cloud_controller_writes() {
    let repos = Repositories::in_memory();
    let bbs = Arc::new(StaticBbs(vec![
        running("d-a", "10.10.1.5", 61005),
        running("d-b", "10.10.1.6", 61006),
    ]));
    let (addr, shutdown) = serve(
        IstioService::new(repos.clone(), bbs),
        CloudControllerService::new(repos),
    )
    .await;

    let channel = channel(addr).await;
    let mut cc = CloudControllerCopilotClient::new(channel.clone());
    let mut istio = IstioCopilotClient::new(channel);

    cc.upsert_route(proto::UpsertRouteRequest {
        route: Some(proto::Route { guid: "r-a".into(), host: "some-url".into() }),
    })
    .await
    .unwrap();
    for (capi, diego) in [("p-a", "d-a"), ("p-b", "d-b")] {
        cc.map_route(proto::MapRouteRequest {
            route_mapping: Some(proto::RouteMapping {
                route_guid: "r-a".into(),
                capi_process_guid: capi.into(),
            }),
        })
        .await
        .unwrap();
        cc.upsert_capi_diego_process_association(proto::UpsertCapiDiegoProcessAssociationRequest {
            capi_diego_process_association: Some(proto::CapiDiegoProcessAssociation {
                capi_process_guid: capi.into(),
                diego_process_guids: vec![diego.into()],
            }),
        })
        .await
        .unwrap();
    }

    let backends = istio
        .routes(proto::RoutesRequest {})
        .await
        .unwrap()
        .into_inner()
        .backends;
    let mut got: Vec<(String, u32)> = backends["some-url"]
        .backends
        .iter()
        .map(|b| (b.address.clone(), b.port))
        .collect();
    got.sort();
    assert_eq!(
        got,
        vec![("10.10.1.5".to_string(), 61005), ("10.10.1.6".to_string(), 61006)]
    );

    cc.delete_route(proto::DeleteRouteRequest { guid: "r-a".into() })
        .await
        .unwrap();
    let backends = istio
        .routes(proto::RoutesRequest {})
        .await
        .unwrap()
        .into_inner()
        .backends;
    assert!(backends.is_empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn validation_errors_cross_the_wire() {
    let repos = Repositories::in_memory();
    let (addr, shutdown) = serve(
        IstioService::disabled(repos.clone()),
        CloudControllerService::new(repos),
    )
    .await;

    let channel = channel(addr).await;
    let mut cc = CloudControllerCopilotClient::new(channel.clone());
    let mut istio = IstioCopilotClient::new(channel);

    let status = cc
        .upsert_route(proto::UpsertRouteRequest { route: None })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
    assert_eq!(status.message(), "route is required");

    let status = istio.routes(proto::RoutesRequest {}).await.unwrap_err();
    assert_eq!(status.message(), copilot_grpc::BBS_DISABLED);

    assert!(istio.health(proto::HealthRequest {}).await.unwrap().into_inner().healthy);
    assert!(cc.health(proto::HealthRequest {}).await.unwrap().into_inner().healthy);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn caller_deadline_reaches_client_as_deadline_exceeded() {
    let repos = Repositories::in_memory();
    let (addr, shutdown) = serve(
        IstioService::new(repos.clone(), Arc::new(SlowBbs(Duration::from_secs(5)))),
        CloudControllerService::new(repos),
    )
    .await;
    let mut istio = IstioCopilotClient::new(channel(addr).await);

    let mut request = tonic::Request::new(proto::RoutesRequest {});
    request.set_timeout(Duration::from_millis(200));
    let status = istio.routes(request).await.unwrap_err();

    assert_eq!(status.code(), tonic::Code::DeadlineExceeded, "{status:?}");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn route_mapping_listing_agrees_with_storage() {
    let repos = Repositories::in_memory();
    let (addr, shutdown) = serve(
        IstioService::disabled(repos.clone()),
        CloudControllerService::new(repos.clone()),
    )
    .await;
    let mut cc = CloudControllerCopilotClient::new(channel(addr).await);

    for (route_guid, capi_process_guid) in [("a-b", "c"), ("a", "b-c")] {
        cc.map_route(proto::MapRouteRequest {
            route_mapping: Some(proto::RouteMapping {
                route_guid: route_guid.into(),
                capi_process_guid: capi_process_guid.into(),
            }),
        })
        .await
        .unwrap();
    }
    let listed = cc
        .list_cf_route_mappings(proto::ListCfRouteMappingsRequest {})
        .await
        .unwrap()
        .into_inner()
        .route_mappings;

    assert_eq!(listed.len(), repos.route_mappings.list().len());
    assert_eq!(listed["a-b-c"].route_guid, "a");

    let _ = shutdown.send(());
}
