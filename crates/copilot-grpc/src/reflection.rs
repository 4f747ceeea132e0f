//! gRPC server reflection for the `api` package.

use tonic::transport::Server;
use tonic::transport::server::Router;

use crate::proto::FILE_DESCRIPTOR_SET;

/// A server router with the v1 and v1alpha reflection services mounted.
///
/// Both listeners start from this router so tools like grpcurl can
/// discover the services without a local copy of the schema.
pub fn router() -> Result<Router, tonic_reflection::server::Error> {
    let v1 = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;
    let v1alpha = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1alpha()?;

    Ok(Server::builder().add_service(v1).add_service(v1alpha))
}
