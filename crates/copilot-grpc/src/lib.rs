//! Copilot gRPC services.
//!
//! Two services share one set of repositories:
//!
//! - [`CloudControllerService`] receives routing intent from the Cloud
//!   Controller and writes it to the repositories.
//! - [`IstioService`] answers Pilot with the hostname → backends map, joining
//!   the repositories against live instance placement from the BBS.

pub mod capi;
pub mod deadline;
pub mod istio;
pub mod join;
pub mod proto;
pub mod reflection;
pub mod validation;

pub use capi::CloudControllerService;
pub use istio::IstioService;
pub use validation::ValidationError;

/// Error message returned by `Routes` when BBS access is turned off.
pub const BBS_DISABLED: &str = "communication with bbs is disabled";
