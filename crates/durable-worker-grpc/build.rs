//! Compiles `proto/durable_worker/v1/orchestrator_service.proto` into
//! `$OUT_DIR/durable_worker.v1.rs`, included via `include!` in `src/proto.rs`.
//!
//! Requires the `protoc` compiler on the system (`brew install protobuf` /
//! `apt install protobuf-compiler`).

fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::path::PathBuf;

    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?);
    let local_proto = manifest_dir.join("proto");
    let workspace_proto = manifest_dir
        .parent()
        .and_then(|crates_dir| crates_dir.parent())
        .map(|workspace_root| workspace_root.join("proto"))
        .unwrap_or_default();

    let proto_root = if local_proto.join("durable_worker/v1").exists() {
        local_proto
    } else if workspace_proto.join("durable_worker/v1").exists() {
        workspace_proto
    } else {
        panic!(
            "Proto directory not found. Checked {local_proto:?} and {workspace_proto:?}. \
Expected proto files at proto/durable_worker/v1/"
        );
    };

    let proto_file = proto_root.join("durable_worker/v1/orchestrator_service.proto");
    if !proto_file.exists() {
        panic!("Proto file not found: {proto_file:?}");
    }

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .build_transport(true)
        .file_descriptor_set_path(PathBuf::from(std::env::var("OUT_DIR")?).join("durable_worker_descriptor.bin"))
        .emit_rerun_if_changed(true)
        .compile_protos(&[&proto_file], std::slice::from_ref(&proto_root))?;

    println!("cargo:rerun-if-changed={}", proto_root.display());
    println!("cargo:rerun-if-changed={}", proto_file.display());

    Ok(())
}
