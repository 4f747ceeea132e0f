//! Cloud Controller gRPC server: write side.
//!
//! Implements `api.CloudControllerCopilot`. The Cloud Controller pushes routes,
//! route mappings and process associations here; every write is validated
//! in full before any repository is touched.

use tonic::{Request, Response, Status};
use tracing::info;

use copilot_state::Repositories;

use crate::proto;
use crate::proto::cloud_controller_copilot_server::{
    CloudControllerCopilot, CloudControllerCopilotServer,
};
use crate::validation;

/// gRPC implementation of the Cloud Controller service.
pub struct CloudControllerService {
    repos: Repositories,
}

impl CloudControllerService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> CloudControllerCopilotServer<Self> {
        CloudControllerCopilotServer::new(self)
    }
}

#[tonic::async_trait]
impl CloudControllerCopilot for CloudControllerService {
    async fn health(
        &self,
        _request: Request<proto::HealthRequest>,
    ) -> Result<Response<proto::HealthResponse>, Status> {
        info!("cloud controller health check");
        Ok(Response::new(proto::HealthResponse { healthy: true }))
    }

    async fn upsert_route(
        &self,
        request: Request<proto::UpsertRouteRequest>,
    ) -> Result<Response<proto::UpsertRouteResponse>, Status> {
        let route = validation::upsert_route(request.get_ref())?;
        info!(route_guid = %route.guid, host = %route.host, "upserting route");
        self.repos.routes.upsert(route);
        Ok(Response::new(proto::UpsertRouteResponse {}))
    }

    async fn delete_route(
        &self,
        request: Request<proto::DeleteRouteRequest>,
    ) -> Result<Response<proto::DeleteRouteResponse>, Status> {
        let guid = validation::delete_route(request.get_ref())?;
        info!(route_guid = %guid, "deleting route");
        self.repos.routes.delete(guid);
        Ok(Response::new(proto::DeleteRouteResponse {}))
    }

    async fn map_route(
        &self,
        request: Request<proto::MapRouteRequest>,
    ) -> Result<Response<proto::MapRouteResponse>, Status> {
        let mapping = validation::map_route(request.get_ref())?;
        info!(
            route_guid = %mapping.route_guid,
            capi_process_guid = %mapping.capi_process_guid,
            "mapping route"
        );
        self.repos.route_mappings.map(mapping);
        Ok(Response::new(proto::MapRouteResponse {}))
    }

    async fn unmap_route(
        &self,
        request: Request<proto::UnmapRouteRequest>,
    ) -> Result<Response<proto::UnmapRouteResponse>, Status> {
        let mapping = validation::unmap_route(request.get_ref())?;
        info!(
            route_guid = %mapping.route_guid,
            capi_process_guid = %mapping.capi_process_guid,
            "unmapping route"
        );
        self.repos.route_mappings.unmap(&mapping);
        Ok(Response::new(proto::UnmapRouteResponse {}))
    }

    async fn upsert_capi_diego_process_association(
        &self,
        request: Request<proto::UpsertCapiDiegoProcessAssociationRequest>,
    ) -> Result<Response<proto::UpsertCapiDiegoProcessAssociationResponse>, Status> {
        let association = validation::upsert_process_association(request.get_ref())?;
        info!(
            capi_process_guid = %association.capi_process_guid,
            diego_process_guids = ?association.diego_process_guids,
            "upserting capi/diego process association"
        );
        self.repos.process_associations.upsert(association);
        Ok(Response::new(proto::UpsertCapiDiegoProcessAssociationResponse {}))
    }

    async fn delete_capi_diego_process_association(
        &self,
        request: Request<proto::DeleteCapiDiegoProcessAssociationRequest>,
    ) -> Result<Response<proto::DeleteCapiDiegoProcessAssociationResponse>, Status> {
        let capi_process_guid = validation::delete_process_association(request.get_ref())?;
        info!(%capi_process_guid, "deleting capi/diego process association");
        self.repos.process_associations.delete(capi_process_guid);
        Ok(Response::new(proto::DeleteCapiDiegoProcessAssociationResponse {}))
    }

    async fn list_cf_routes(
        &self,
        _request: Request<proto::ListCfRoutesRequest>,
    ) -> Result<Response<proto::ListCfRoutesResponse>, Status> {
        let routes = self
            .repos
            .routes
            .list()
            .into_iter()
            .map(|r| (r.guid, r.host))
            .collect();
        info!("listing cf routes");
        Ok(Response::new(proto::ListCfRoutesResponse { routes }))
    }

    async fn list_cf_route_mappings(
        &self,
        _request: Request<proto::ListCfRouteMappingsRequest>,
    ) -> Result<Response<proto::ListCfRouteMappingsResponse>, Status> {
        let route_mappings = self
            .repos
            .route_mappings
            .list()
            .into_iter()
            .map(|(key, m)| {
                let mapping = proto::RouteMapping {
                    route_guid: m.route_guid,
                    capi_process_guid: m.capi_process_guid,
                };
                (key, mapping)
            })
            .collect();
        info!("listing cf route mappings");
        Ok(Response::new(proto::ListCfRouteMappingsResponse { route_mappings }))
    }

    async fn list_capi_diego_process_associations(
        &self,
        _request: Request<proto::ListCapiDiegoProcessAssociationsRequest>,
    ) -> Result<Response<proto::ListCapiDiegoProcessAssociationsResponse>, Status> {
        let capi_diego_process_associations = self
            .repos
            .process_associations
            .list()
            .into_iter()
            .map(|a| {
                let guids = proto::DiegoProcessGuids {
                    diego_process_guids: a.diego_process_guids,
                };
                (a.capi_process_guid, guids)
            })
            .collect();
        info!("listing capi/diego process associations");
        Ok(Response::new(proto::ListCapiDiegoProcessAssociationsResponse {
            capi_diego_process_associations,
        }))
    }
}
