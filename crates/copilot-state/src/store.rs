//! Repositories: lock-guarded in-memory stores for Copilot's routing state.
//!
//! Each repository is a trait so the services can be handed any backing
//! implementation; the in-memory ones below are the only implementations
//! shipped. Every operation takes the repository's own lock for the
//! duration of a single map access and releases it before returning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::types::*;

// ── Traits ────────────────────────────────────────────────────────

/// Route GUID → route.
pub trait RoutesRepository: Send + Sync {
    /// Insert a route, replacing any route with the same GUID.
    fn upsert(&self, route: Route);

    /// Remove a route. Absent GUIDs are ignored.
    fn delete(&self, guid: &str);

    fn get(&self, guid: &str) -> Option<Route>;

    /// Snapshot of all routes.
    fn list(&self) -> Vec<Route>;
}

/// Set of route → CAPI process mappings.
pub trait RouteMappingsRepository: Send + Sync {
    /// Record a mapping. Mapping the same pair twice stores it once.
    fn map(&self, mapping: RouteMapping);

    /// Remove the mapping stored under this mapping's key. Absent mappings
    /// are ignored.
    fn unmap(&self, mapping: &RouteMapping);

    fn get(&self, route_guid: &str, capi_process_guid: &str) -> Option<RouteMapping>;

    /// Snapshot of all mappings with the key each is stored under.
    fn list(&self) -> Vec<(String, RouteMapping)>;
}

/// CAPI process GUID → Diego process GUIDs.
pub trait ProcessAssociationsRepository: Send + Sync {
    /// Insert an association, replacing the whole entry for that CAPI process.
    fn upsert(&self, association: ProcessAssociation);

    /// Remove an association. Absent GUIDs are ignored.
    fn delete(&self, capi_process_guid: &str);

    fn get(&self, capi_process_guid: &str) -> Option<ProcessAssociation>;

    /// Snapshot of all associations.
    fn list(&self) -> Vec<ProcessAssociation>;
}

// ── Routes ────────────────────────────────────────────────────────

/// In-memory [`RoutesRepository`].
#[derive(Default)]
pub struct InMemoryRoutes {
    repo: Mutex<HashMap<RouteGuid, Route>>,
}

impl InMemoryRoutes {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoutesRepository for InMemoryRoutes {
    fn upsert(&self, route: Route) {
        let mut repo = self.repo.lock().expect("routes lock");
        debug!(guid = %route.guid, host = %route.host, "route stored");
        repo.insert(route.guid.clone(), route);
    }

    fn delete(&self, guid: &str) {
        let mut repo = self.repo.lock().expect("routes lock");
        let existed = repo.remove(guid).is_some();
        debug!(%guid, existed, "route deleted");
    }

    fn get(&self, guid: &str) -> Option<Route> {
        let repo = self.repo.lock().expect("routes lock");
        repo.get(guid).cloned()
    }

    fn list(&self) -> Vec<Route> {
        let repo = self.repo.lock().expect("routes lock");
        repo.values().cloned().collect()
    }
}

// ── Route mappings ────────────────────────────────────────────────

/// In-memory [`RouteMappingsRepository`].
///
/// Keyed by [`RouteMapping::table_key`], the same key the listing RPC
/// reports. Two pairs whose keys coincide share one entry and the later
/// write wins.
#[derive(Default)]
pub struct InMemoryRouteMappings {
    repo: Mutex<HashMap<String, RouteMapping>>,
}

impl InMemoryRouteMappings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RouteMappingsRepository for InMemoryRouteMappings {
    fn map(&self, mapping: RouteMapping) {
        let key = mapping.table_key();
        let mut repo = self.repo.lock().expect("route mappings lock");
        debug!(%key, "route mapping stored");
        repo.insert(key, mapping);
    }

    fn unmap(&self, mapping: &RouteMapping) {
        let key = mapping.table_key();
        let mut repo = self.repo.lock().expect("route mappings lock");
        let existed = repo.remove(&key).is_some();
        debug!(%key, existed, "route mapping removed");
    }

    fn get(&self, route_guid: &str, capi_process_guid: &str) -> Option<RouteMapping> {
        let key = RouteMapping::new(route_guid, capi_process_guid).table_key();
        let repo = self.repo.lock().expect("route mappings lock");
        repo.get(&key).cloned()
    }

    fn list(&self) -> Vec<(String, RouteMapping)> {
        let repo = self.repo.lock().expect("route mappings lock");
        repo.iter().map(|(k, m)| (k.clone(), m.clone())).collect()
    }
}

// ── Process associations ──────────────────────────────────────────

/// In-memory [`ProcessAssociationsRepository`].
#[derive(Default)]
pub struct InMemoryProcessAssociations {
    repo: Mutex<HashMap<CapiProcessGuid, ProcessAssociation>>,
}

impl InMemoryProcessAssociations {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessAssociationsRepository for InMemoryProcessAssociations {
    fn upsert(&self, association: ProcessAssociation) {
        let mut repo = self.repo.lock().expect("process associations lock");
        debug!(
            capi_process_guid = %association.capi_process_guid,
            diego_processes = association.diego_process_guids.len(),
            "process association stored"
        );
        repo.insert(association.capi_process_guid.clone(), association);
    }

    fn delete(&self, capi_process_guid: &str) {
        let mut repo = self.repo.lock().expect("process associations lock");
        let existed = repo.remove(capi_process_guid).is_some();
        debug!(%capi_process_guid, existed, "process association deleted");
    }

    fn get(&self, capi_process_guid: &str) -> Option<ProcessAssociation> {
        let repo = self.repo.lock().expect("process associations lock");
        repo.get(capi_process_guid).cloned()
    }

    fn list(&self) -> Vec<ProcessAssociation> {
        let repo = self.repo.lock().expect("process associations lock");
        repo.values().cloned().collect()
    }
}

// ── Bundle ────────────────────────────────────────────────────────

/// Shared handles to the three repositories.
///
/// Built once at startup and cloned into each service.
#[derive(Clone)]
pub struct Repositories {
    pub routes: Arc<dyn RoutesRepository>,
    pub route_mappings: Arc<dyn RouteMappingsRepository>,
    pub process_associations: Arc<dyn ProcessAssociationsRepository>,
}

impl Repositories {
    pub fn new(
        routes: Arc<dyn RoutesRepository>,
        route_mappings: Arc<dyn RouteMappingsRepository>,
        process_associations: Arc<dyn ProcessAssociationsRepository>,
    ) -> Self {
        Self {
            routes,
            route_mappings,
            process_associations,
        }
    }

    /// Empty in-memory repositories.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryRoutes::new()),
            Arc::new(InMemoryRouteMappings::new()),
            Arc::new(InMemoryProcessAssociations::new()),
        )
    }
}

impl Default for Repositories {
    fn default() -> Self {
        Self::in_memory()
    }
}
