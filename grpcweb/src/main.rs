//! # grpcweb CLI Entry Point
//!
//! The main executable for the grpcweb tool. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Installs the log subscriber and parses arguments using [`cli::Cli`].
//! 2. **Resolution**: Resolves the `.proto` file with the selected compiler via `grpcweb_core`.
//! 3. **Execution**: Runs one sample through a `Sampler`, or queries the schema.
//! 4. **Presentation**: Formats and prints the resulting data or error to standard output/error.
//!
//! Logs go to stderr and are controlled with `RUST_LOG` (default `warn`).

mod cli;
mod formatter;

use anyhow::Context;
use clap::Parser;
use cli::{CallArgs, Cli, Commands, ListCommands, SchemaArgs};
use formatter::{FormattedString, MethodList, ServiceList};
use grpcweb_core::cache::ParserCache;
use grpcweb_core::config::ClientConfig;
use grpcweb_core::sampler::{SampleRequest, Sampler};
use grpcweb_core::schema::ProtoSchema;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let outcome = match args.command {
        Commands::Call(call) => run_call(call).await,
        Commands::List { sub } => match sub {
            ListCommands::Services { schema } => list_services(schema).await,
            ListCommands::Methods { service, schema } => list_methods(service, schema).await,
        },
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("{}", FormattedString::from(err));
            process::exit(1);
        }
    }
}

async fn run_call(args: CallArgs) -> anyhow::Result<bool> {
    let (service, method) = args.endpoint;

    let mut config = ClientConfig::new(args.url)
        .with_timeout_secs(args.timeout)
        .with_text_framing(args.text);
    config.headers = args.headers;
    if let Some(block) = &args.header_block {
        config = config.with_header_block(block);
    }

    tracing::debug!(
        proto = %args.schema.proto.display(),
        compiler = ?args.schema.compiler,
        headers = config.headers.len(),
        "starting call"
    );

    let cache = Arc::new(ParserCache::new(args.schema.compiler.resolver()));
    let sampler = Sampler::new(config, cache).context("Invalid client configuration")?;

    let result = sampler
        .sample(&SampleRequest {
            proto_path: args.schema.proto,
            service,
            method,
            body: args.body,
        })
        .await;

    let successful = result.successful;
    println!("{}", FormattedString::from(result));
    Ok(successful)
}

async fn discover(args: &SchemaArgs) -> anyhow::Result<ProtoSchema> {
    args.compiler
        .resolver()
        .discover(&args.proto)
        .await
        .with_context(|| format!("Failed to read '{}'", args.proto.display()))
}

async fn list_services(args: SchemaArgs) -> anyhow::Result<bool> {
    let schema = discover(&args).await?;

    println!(
        "{}",
        FormattedString::from(ServiceList {
            services: schema.list_services(),
            degraded: schema.is_degraded(),
        })
    );
    Ok(true)
}

async fn list_methods(service: String, args: SchemaArgs) -> anyhow::Result<bool> {
    let schema = discover(&args).await?;

    let methods = schema.list_methods(&service);
    let found = schema.service(&service).is_some();

    println!(
        "{}",
        FormattedString::from(MethodList {
            service,
            methods,
            degraded: schema.is_degraded(),
        })
    );
    Ok(found)
}
