//! odata-mcp-bridge entry point: parse CLI/env config, resolve credentials,
//! load `$metadata`, generate the tool surface, and serve MCP over stdio.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use rmcp::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use odata_mcp_bridge::config::{Args, RuntimeConfig};
use odata_mcp_bridge::credentials;
use odata_mcp_bridge::dispatcher::ServiceContext;
use odata_mcp_bridge::http_client::{ODataClient, ReqwestClient};
use odata_mcp_bridge::mcp::McpServer;
use odata_mcp_bridge::metadata;
use odata_mcp_bridge::tools;

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    // stdout is the JSON-RPC transport; every log line goes to stderr.
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match RuntimeConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    let credentials = match credentials::from_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    let metadata_client = match ReqwestClient::new(credentials.as_ref(), config.metadata_timeout) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to build HTTP client: {e}");
            return ExitCode::from(1);
        }
    };

    tracing::info!(service_root = %config.service_root, "loading $metadata");
    let schema = match metadata::load(&metadata_client as &dyn ODataClient, &config.service_root).await {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("failed to load $metadata: {e}");
            return ExitCode::from(2);
        }
    };

    let config = Arc::new(config);
    let generated_tools = tools::generate_tools(&schema, &config);
    tracing::info!(
        tool_count = generated_tools.len(),
        entity_sets = schema.entity_sets.len(),
        "tool surface generated"
    );

    let ctx = match ServiceContext::new(Arc::new(schema), config, credentials.as_ref(), generated_tools) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            eprintln!("failed to initialize service context: {e}");
            return ExitCode::from(1);
        }
    };

    let server = McpServer::new(ctx);
    let service = match server.serve(rmcp::transport::stdio()).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "failed to start MCP server");
            return ExitCode::from(1);
        }
    };

    tracing::info!("MCP server started, waiting for connections");
    if let Err(e) = service.waiting().await {
        tracing::error!(error = %e, "MCP server error");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}
