fn main() {
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/transcode_ingress.proto"], &["proto"])
        .unwrap_or_else(|e| panic!("failed to compile transcode_ingress.proto: {e}"));

    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/video_update.proto"], &["proto"])
        .unwrap_or_else(|e| panic!("failed to compile video_update.proto: {e}"));

    println!("cargo:rerun-if-changed=proto/transcode_ingress.proto");
    println!("cargo:rerun-if-changed=proto/video_update.proto");
}
