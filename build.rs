fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only rerun if proto files change
    println!("cargo:rerun-if-changed=proto/gateway/gateway.proto");
    println!("cargo:rerun-if-changed=proto/playback/playback.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["proto/gateway/gateway.proto", "proto/playback/playback.proto"],
            &["proto"],
        )?;
    Ok(())
}
