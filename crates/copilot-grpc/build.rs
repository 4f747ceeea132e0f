//! Compiles `proto/api.proto` into prost messages and tonic stubs.
//!
//! The schema is parsed with protox, so no `protoc` is needed at build time.
//! The encoded descriptor set is written next to the generated code for the
//! reflection service.

use std::path::PathBuf;

use prost::Message;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/api.proto");

    let descriptors = protox::compile(["proto/api.proto"], ["proto"])?;
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("api_descriptor.bin");
    std::fs::write(&descriptor_path, descriptors.encode_to_vec())?;

    tonic_build::configure()
        .file_descriptor_set_path(&descriptor_path)
        .skip_protoc_run()
        .type_attribute(".api", "#[derive(serde::Serialize)]")
        .type_attribute(".api.Backend", "#[derive(Eq, Hash)]")
        .compile_protos(&["proto/api.proto"], &["proto"])?;

    Ok(())
}
