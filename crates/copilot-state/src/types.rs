//! Domain types for Copilot's routing state.
//!
//! These are the records the Cloud Controller pushes. Live instance
//! placement is not stored here; it comes from the BBS on every read.

use serde::{Deserialize, Serialize};

/// Container port every application is expected to listen on.
pub const CF_APP_PORT: u32 = 8080;

/// Unique identifier of a route.
pub type RouteGuid = String;

/// Process identifier at the Cloud Controller (CAPI) layer.
pub type CapiProcessGuid = String;

/// Process identifier at the Diego scheduler layer.
pub type DiegoProcessGuid = String;

/// Hostname a route answers for.
pub type Hostname = String;

// ── Route ─────────────────────────────────────────────────────────

/// A route: a GUID and the hostname it serves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub guid: RouteGuid,
    pub host: Hostname,
}

impl Route {
    pub fn new(guid: impl Into<RouteGuid>, host: impl Into<Hostname>) -> Self {
        Self {
            guid: guid.into(),
            host: host.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.host
    }
}

// ── Route mapping ─────────────────────────────────────────────────

/// Associates a route with a CAPI process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RouteMapping {
    pub route_guid: RouteGuid,
    pub capi_process_guid: CapiProcessGuid,
}

impl RouteMapping {
    pub fn new(route_guid: impl Into<RouteGuid>, capi_process_guid: impl Into<CapiProcessGuid>) -> Self {
        Self {
            route_guid: route_guid.into(),
            capi_process_guid: capi_process_guid.into(),
        }
    }

    /// Key a mapping is stored and listed under: `{route_guid}-{capi_process_guid}`.
    pub fn table_key(&self) -> String {
        format!("{}-{}", self.route_guid, self.capi_process_guid)
    }
}

// ── Process association ───────────────────────────────────────────

/// The Diego processes currently realizing a CAPI process.
///
/// A CAPI process can map to several Diego processes at once, e.g. while a
/// rolling deploy has both the old and new incarnation running. Order is kept
/// as given and duplicates are not removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessAssociation {
    pub capi_process_guid: CapiProcessGuid,
    pub diego_process_guids: Vec<DiegoProcessGuid>,
}

impl ProcessAssociation {
    pub fn new<I, S>(capi_process_guid: impl Into<CapiProcessGuid>, diego_process_guids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DiegoProcessGuid>,
    {
        Self {
            capi_process_guid: capi_process_guid.into(),
            diego_process_guids: diego_process_guids.into_iter().map(Into::into).collect(),
        }
    }
}
