use prost::Message;
use std::env::var;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=proto/greeter.proto");

    // Compiled in-process so building the fixture never needs a system `protoc`.
    let file_descriptor_set = protox::compile(["proto/greeter.proto"], ["proto"])?;

    let out_dir = var("OUT_DIR")?;
    let descriptors_path = format!("{out_dir}/descriptors.bin");
    std::fs::write(descriptors_path, file_descriptor_set.encode_to_vec())?;

    tonic_prost_build::configure()
        .build_client(false)
        .compile_fds(file_descriptor_set)?;

    Ok(())
}
