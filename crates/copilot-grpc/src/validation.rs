//! Request validation for the Cloud Controller service.
//!
//! Each function turns a wire request into the domain value the repository
//! stores, or explains which required field is missing. Nothing here touches
//! a repository, so a rejected request can never partially apply.

use thiserror::Error;
use tonic::Status;

use copilot_state::{ProcessAssociation, Route, RouteMapping};

use crate::proto;

/// A write request is missing a required field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("route is required")]
    MissingRoute,

    #[error("route Guid and Host are required")]
    MissingRouteFields,

    #[error("route Guid is required")]
    MissingRouteGuid,

    #[error("RouteMapping is required")]
    MissingRouteMapping,

    #[error("RouteGuid and CapiProcessGuid are required")]
    MissingRouteMappingFields,

    #[error("CapiDiegoProcessAssociation is required")]
    MissingAssociation,

    #[error("CapiProcessGuid and DiegoProcessGuids are required")]
    MissingAssociationFields,

    #[error("CapiProcessGuid is required")]
    MissingCapiProcessGuid,
}

impl From<ValidationError> for Status {
    fn from(err: ValidationError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn upsert_route(req: &proto::UpsertRouteRequest) -> ValidationResult<Route> {
    let route = req.route.as_ref().ok_or(ValidationError::MissingRoute)?;
    if route.guid.is_empty() || route.host.is_empty() {
        return Err(ValidationError::MissingRouteFields);
    }
    Ok(Route::new(&route.guid, &route.host))
}

pub fn delete_route(req: &proto::DeleteRouteRequest) -> ValidationResult<&str> {
    if req.guid.is_empty() {
        return Err(ValidationError::MissingRouteGuid);
    }
    Ok(&req.guid)
}

fn route_mapping(mapping: Option<&proto::RouteMapping>) -> ValidationResult<RouteMapping> {
    let mapping = mapping.ok_or(ValidationError::MissingRouteMapping)?;
    if mapping.route_guid.is_empty() || mapping.capi_process_guid.is_empty() {
        return Err(ValidationError::MissingRouteMappingFields);
    }
    Ok(RouteMapping::new(&mapping.route_guid, &mapping.capi_process_guid))
}

pub fn map_route(req: &proto::MapRouteRequest) -> ValidationResult<RouteMapping> {
    route_mapping(req.route_mapping.as_ref())
}

pub fn unmap_route(req: &proto::UnmapRouteRequest) -> ValidationResult<RouteMapping> {
    route_mapping(req.route_mapping.as_ref())
}

pub fn upsert_process_association(
    req: &proto::UpsertCapiDiegoProcessAssociationRequest,
) -> ValidationResult<ProcessAssociation> {
    let assoc = req
        .capi_diego_process_association
        .as_ref()
        .ok_or(ValidationError::MissingAssociation)?;
    if assoc.capi_process_guid.is_empty() || assoc.diego_process_guids.is_empty() {
        return Err(ValidationError::MissingAssociationFields);
    }
    Ok(ProcessAssociation::new(
        &assoc.capi_process_guid,
        assoc.diego_process_guids.iter().map(String::as_str),
    ))
}

pub fn delete_process_association(
    req: &proto::DeleteCapiDiegoProcessAssociationRequest,
) -> ValidationResult<&str> {
    if req.capi_process_guid.is_empty() {
        return Err(ValidationError::MissingCapiProcessGuid);
    }
    Ok(&req.capi_process_guid)
}
