//! Mock chain server binary.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dutch_types::{chain_name, SEPOLIA_CHAIN_ID};
use tracing::info;

use mock_chain::state::{
    AUCTION_ADDRESS, AUCTION_TOKEN_ADDRESS, PAYMENT_TOKEN_ADDRESS, STABLE_TOKEN_ADDRESS,
};
use mock_chain::{serve, Genesis};

#[derive(Parser)]
#[command(name = "mock-chain")]
#[command(about = "Development node for the confidential Dutch auction")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8545")]
    listen: SocketAddr,

    /// Chain id reported by eth_chainId
    #[arg(long, default_value_t = SEPOLIA_CHAIN_ID)]
    chain_id: u64,

    /// Auction length in seconds
    #[arg(long, default_value_t = 3600)]
    duration_secs: u64,

    /// Seconds between produced blocks (0 disables block production)
    #[arg(long, default_value_t = 12)]
    block_time_secs: u64,

    /// Leave the auction unstarted until admin_startAuction
    #[arg(long)]
    not_started: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mock_chain=info".parse()?)
                .add_directive("jsonrpsee=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let genesis = Genesis {
        chain_id: args.chain_id,
        auction_duration: args.duration_secs,
        auction_started: !args.not_started,
        ..Genesis::now()
    };
    let accounts = genesis.accounts.clone();

    info!("Starting mock chain server on {}", args.listen);
    let chain = serve(args.listen, genesis).await?;

    info!(chain = %chain_name(args.chain_id), url = %chain.url(), "Mock chain server running. Press Ctrl+C to stop.");
    info!(auction = %AUCTION_ADDRESS, token = %AUCTION_TOKEN_ADDRESS, "Auction");
    info!(confidential = %PAYMENT_TOKEN_ADDRESS, plain = %STABLE_TOKEN_ADDRESS, "Tokens");
    for account in &accounts {
        info!(%account, "Unlocked account");
    }

    if args.block_time_secs > 0 {
        let state = chain.state.clone();
        let block_time = Duration::from_secs(args.block_time_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(block_time);
            interval.tick().await;
            loop {
                interval.tick().await;
                state.write().mine_empty_block(block_time.as_secs());
            }
        });
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    chain.handle.stop()?;
    chain.handle.stopped().await;

    Ok(())
}
