//! Wire types and generated service stubs for the `api` gRPC package.
//!
//! Two services share this package:
//!
//! - `api.CloudControllerCopilot`: routing intent pushed by the Cloud
//!   Controller, plus listing RPCs for operators.
//! - `api.IstioCopilot`: the hostname → backends view polled by Pilot.

tonic::include_proto!("api");

/// Encoded descriptors for `api.proto`, served by gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("api_descriptor");
