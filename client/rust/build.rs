fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use main proto directory (../../proto relative to client/rust)
    // This ensures client uses the same protos as the server
    let proto_root = "../../proto";

    println!("cargo:rerun-if-changed={}", proto_root);

    let protos: Vec<String> = vec![
        format!("{}/playback/playback.proto", proto_root),
        format!("{}/gateway/gateway.proto", proto_root),
    ];

    // Server stubs back the test doubles.
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&protos, &[proto_root])?;

    Ok(())
}
