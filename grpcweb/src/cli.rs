//! # CLI
//!
//! This module defines the command-line interface of `grpcweb` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring headers are `key:value`);
use clap::{Args, Parser, Subcommand, ValueEnum};
use grpcweb_core::resolver::{DescriptorResolver, ProtocCompiler, ProtoxCompiler};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grpcweb", version, about = "Dynamic gRPC-Web CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Perform a unary gRPC-Web call
    ///
    /// The request body is encoded with the message types of the given proto file.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// grpcweb call Greeter/SayHello --url http://localhost:8080 --proto greeter.proto --body '{"name": "Ada"}'
    /// ```
    Call(CallArgs),

    /// List the services or methods declared in a proto file
    List {
        #[command(subcommand)]
        sub: ListCommands,
    },
}

#[derive(Args)]
pub struct CallArgs {
    /// Endpoint (Service/Method or package.Service/Method)
    #[arg(value_parser = parse_endpoint)]
    pub endpoint: (String, String),

    /// The server URL (e.g. http://localhost:8080)
    #[arg(long, env = "GRPCWEB_URL")]
    pub url: String,

    #[command(flatten)]
    pub schema: SchemaArgs,

    /// JSON body of the request
    #[arg(long, value_parser = parse_body, default_value = "{}")]
    pub body: String,

    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Extra headers as a raw block of `Name: Value` lines
    #[arg(long)]
    pub header_block: Option<String>,

    /// Use the base64 `application/grpc-web-text` wire format
    #[arg(long)]
    pub text: bool,

    /// Call timeout in seconds
    #[arg(long, env = "GRPCWEB_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Args)]
pub struct SchemaArgs {
    /// Path to the .proto file describing the service
    #[arg(long)]
    pub proto: PathBuf,

    /// How the proto file is compiled into descriptors
    #[arg(long, value_enum, default_value_t = CompilerKind::Protoc)]
    pub compiler: CompilerKind,
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// List all services declared in the proto file
    Services {
        #[command(flatten)]
        schema: SchemaArgs,
    },
    /// List the methods of a service
    Methods {
        /// Service name (e.g. Greeter or helloworld.Greeter)
        service: String,
        #[command(flatten)]
        schema: SchemaArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CompilerKind {
    /// The `protoc` binary, taken from `$PROTOC` or the `PATH`
    Protoc,
    /// Built-in pure Rust compiler
    Protox,
}

impl CompilerKind {
    pub fn resolver(self) -> DescriptorResolver {
        match self {
            CompilerKind::Protoc => DescriptorResolver::new(ProtocCompiler::from_env()),
            CompilerKind::Protox => DescriptorResolver::new(ProtoxCompiler),
        }
    }
}

fn parse_endpoint(value: &str) -> Result<(String, String), String> {
    let (service, method) = value.split_once('/').ok_or_else(|| {
        format!("Invalid endpoint format: '{value}'. Expected 'Service/Method'")
    })?;

    if service.trim().is_empty() || method.trim().is_empty() {
        return Err("Service and Method names cannot be empty".to_string());
    }

    Ok((service.to_string(), method.to_string()))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

fn parse_body(value: &str) -> Result<String, String> {
    serde_json::from_str::<serde_json::Value>(value)
        .map(|_| value.to_string())
        .map_err(|e| format!("Invalid JSON: {e}"))
}
