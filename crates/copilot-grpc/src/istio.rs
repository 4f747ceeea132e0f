//! Istio gRPC server: read side.
//!
//! Implements `api.IstioCopilot`. Pilot polls `Routes` for the current
//! hostname → backends view, which is recomputed from the BBS and the
//! repositories on every call.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{info, warn};

use copilot_bbs::{ActualLrpFilter, BbsClient};
use copilot_state::Repositories;

use crate::proto;
use crate::proto::istio_copilot_server::{IstioCopilot, IstioCopilotServer};
use crate::{BBS_DISABLED, deadline, join};

/// gRPC implementation of the Istio service.
pub struct IstioService {
    repos: Repositories,
    bbs: Option<Arc<dyn BbsClient>>,
}

impl IstioService {
    pub fn new(repos: Repositories, bbs: Arc<dyn BbsClient>) -> Self {
        Self { repos, bbs: Some(bbs) }
    }

    /// A service whose `Routes` always fails because BBS access is turned off.
    pub fn disabled(repos: Repositories) -> Self {
        Self { repos, bbs: None }
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> IstioCopilotServer<Self> {
        IstioCopilotServer::new(self)
    }
}

#[tonic::async_trait]
impl IstioCopilot for IstioService {
    async fn health(
        &self,
        _request: Request<proto::HealthRequest>,
    ) -> Result<Response<proto::HealthResponse>, Status> {
        info!("istio health check");
        Ok(Response::new(proto::HealthResponse { healthy: true }))
    }

    async fn routes(
        &self,
        request: Request<proto::RoutesRequest>,
    ) -> Result<Response<proto::RoutesResponse>, Status> {
        let bbs = self
            .bbs
            .as_ref()
            .ok_or_else(|| Status::unavailable(BBS_DISABLED))?;

        let lookup = bbs.actual_lrp_groups(ActualLrpFilter::default());
        let groups = match deadline::handler_budget(request.metadata()) {
            Some(timeout) => tokio::time::timeout(timeout, lookup).await.map_err(|_| {
                warn!(?timeout, "bbs lookup exceeded caller deadline");
                Status::deadline_exceeded("deadline exceeded while listing actual LRPs")
            })?,
            None => lookup.await,
        }
        .map_err(|e| {
            warn!(error = %e, "listing actual LRP groups from bbs failed");
            Status::unavailable(e.to_string())
        })?;

        let by_process = join::backends_by_process(&groups);
        let backends = join::backends_by_hostname(&self.repos, &by_process);

        info!(
            actual_lrp_groups = groups.len(),
            hostnames = backends.len(),
            "computed routes"
        );
        Ok(Response::new(proto::RoutesResponse { backends }))
    }
}
