use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dify_gateway::{config::GatewayConfig, server};

#[derive(Debug, Parser)]
#[command(
    name = "dify-gateway",
    version,
    about = "OpenAI-compatible API gateway for Dify conversational workflows"
)]
struct Cli {
    #[command(flatten)]
    config: GatewayConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    server::serve(cli.config.normalized()).await
}
