//! # gRPC-Web Transport
//!
//! The wire side of the crate: frame codec ([`frame`]), request/response types, and the
//! unary HTTP client ([`client::GrpcWebClient`]).
pub mod client;
pub mod frame;
mod types;

pub use types::*;
