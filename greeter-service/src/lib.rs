//! # Greeter Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide a gRPC server implementation,
//! its proto source and its descriptor set for integration testing `grpcweb-core`.
//! It is not intended for production use.

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/helloworld.rs"));
}

pub use pb::greeter_server::{Greeter, GreeterServer};

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");

/// Absolute path of the `.proto` source the server is generated from.
pub const GREETER_PROTO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/proto/greeter.proto");
