//! # grpcweb-core
//!
//! `grpcweb-core` is the library behind the `grpcweb` CLI. It calls unary methods of any
//! gRPC-Web server given nothing but the `.proto` file describing it: no generated code, no
//! server reflection.
//!
//! ## Key Components
//!
//! * **[`resolver::DescriptorResolver`]:** Compiles a `.proto` file (through a pluggable
//!   [`resolver::DescriptorCompiler`]) into a queryable [`schema::ProtoSchema`].
//! * **[`cache::ParserCache`]:** Resolves each proto path once per process, concurrent
//!   callers share the in-flight resolution.
//! * **[`codec`]:** JSON to Protobuf bytes and back, driven by `prost_reflect` descriptors.
//! * **[`grpc_web`]:** Frame codec and the HTTP client performing the call.
//! * **[`sampler::Sampler`]:** The whole pipeline in one call, packaged as a load-test
//!   sample.
//!
//! ## Example
//!
//! ```no_run
//! use grpcweb_core::cache::ParserCache;
//! use grpcweb_core::config::ClientConfig;
//! use grpcweb_core::resolver::{DescriptorResolver, ProtoxCompiler};
//! use grpcweb_core::sampler::{SampleRequest, Sampler};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(ParserCache::new(DescriptorResolver::new(ProtoxCompiler)));
//! let sampler = Sampler::new(ClientConfig::new("http://localhost:8080"), cache)?;
//!
//! let result = sampler
//!     .sample(&SampleRequest {
//!         proto_path: "protos/greeter.proto".into(),
//!         service: "Greeter".to_string(),
//!         method: "SayHello".to_string(),
//!         body: r#"{"name": "Ada"}"#.to_string(),
//!     })
//!     .await;
//!
//! println!("{} {}", result.response_code, result.response_data);
//! # Ok(())
//! # }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect` and `reqwest` so consumers can build
//! messages and inspect errors with matching versions.
pub mod cache;
pub mod codec;
pub mod config;
pub mod grpc_web;
pub mod resolver;
pub mod sampler;
pub mod schema;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use reqwest;
