//! Mock chain server binary.

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use custody_mock_chain::{serve, MockChainServer};

#[derive(Parser)]
#[command(name = "custody-mock-chain")]
#[command(about = "Mock chain serving custody contract state over JSON-RPC")]
struct Cli {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:9944")]
    listen: SocketAddr,

    /// Contract to register at startup
    #[arg(long)]
    contract: Option<String>,

    /// Engine endpoint of the startup contract, repeatable
    #[arg(long = "engine")]
    engines: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("custody_mock_chain=info".parse()?)
                .add_directive("jsonrpsee=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let chain = MockChainServer::new();
    if let Some(contract) = &cli.contract {
        chain.register(contract, cli.engines.clone());
    }

    let (_, handle) = serve(cli.listen, chain).await?;

    info!("Mock chain server running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}
