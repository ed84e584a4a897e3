mod server;

use rmcp::ServiceExt;
use tracing::error;
use tracing_subscriber::EnvFilter;

use server::C4ForgeServer;

/// Logs go to stderr; stdout carries the MCP protocol.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let service = C4ForgeServer::new()
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}
