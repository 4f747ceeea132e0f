//! copilot-state: in-memory routing state for Copilot.
//!
//! Holds the routing intent pushed by the Cloud Controller: routes,
//! route-to-process mappings, and CAPI-to-Diego process associations.
//!
//! # Architecture
//!
//! Each kind of record lives in its own repository behind a trait
//! (`RoutesRepository`, `RouteMappingsRepository`,
//! `ProcessAssociationsRepository`). The in-memory implementations guard a
//! `HashMap` with a single `Mutex`; no repository ever takes another's lock.
//! `List` operations copy under the lock, so callers never see a map that is
//! mutated after the call returns.
//!
//! `Repositories` bundles one handle of each and is `Clone + Send + Sync`,
//! so both gRPC services share the same state.
//!
//! Nothing here persists: a fresh process starts empty and the Cloud
//! Controller re-pushes its view.

pub mod store;
pub mod types;

pub use store::{
    InMemoryProcessAssociations, InMemoryRouteMappings, InMemoryRoutes,
    ProcessAssociationsRepository, Repositories, RouteMappingsRepository, RoutesRepository,
};
pub use types::*;
