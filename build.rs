fn main() {
    println!("cargo:rerun-if-changed=proto/cast_channel.proto");
    prost_build::compile_protos(&["proto/cast_channel.proto"], &["proto/"])
        .expect("failed to compile cast_channel.proto");
}
