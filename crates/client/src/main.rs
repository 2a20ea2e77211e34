//! CLI for confidential Dutch auctions.
//!
//! This binary provides commands for:
//! - Inspecting an auction and following its countdown
//! - Printing the price and supply curves
//! - Submitting encrypted bids
//! - Listing, decrypting and sending tokens

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use dutch_client::chart::DecayModel;
use dutch_client::config::load_token_list;
use dutch_client::timer::snapshot;
use dutch_client::{
    AuctionSession, ClientConfig, PlaceholderSdk, Services, SystemClock, TokenStore,
    TracingNotifier, TransferOutcome,
};
use dutch_contracts::{RpcContracts, Wallet};
use dutch_types::{chain_name, short_address, Address};

#[derive(Parser)]
#[command(name = "dutch-cli")]
#[command(about = "CLI for confidential Dutch auctions")]
struct Cli {
    /// JSON-RPC endpoint of the node / wallet
    #[arg(long, default_value = "http://127.0.0.1:8545")]
    rpc: String,

    /// Account to act as (defaults to the node's first account)
    #[arg(long)]
    from: Option<Address>,

    /// Seconds between live-state refreshes
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    /// Straight line to the reserve price
    Linear,
    /// The contract's per-second discount, floored at the reserve
    DiscountRate,
}

#[derive(Subcommand)]
enum Commands {
    /// Show auction parameters, live state and countdown
    Auction {
        /// Auction contract address
        #[arg(long)]
        address: Address,
    },

    /// Follow the countdown until the auction ends
    Watch {
        #[arg(long)]
        address: Address,
    },

    /// Print the price and supply curves
    Chart {
        #[arg(long)]
        address: Address,

        /// Number of segments (defaults to 12)
        #[arg(long)]
        steps: Option<usize>,

        #[arg(long, value_enum, default_value = "discount-rate")]
        model: ModelArg,
    },

    /// Submit an encrypted bid
    Bid {
        #[arg(long)]
        address: Address,

        /// Amount of payment token (will be encrypted)
        #[arg(long)]
        amount: String,
    },

    /// List tokens and balances
    Tokens {
        /// JSON token list
        #[arg(long)]
        tokens: PathBuf,
    },

    /// Decrypt a confidential balance
    Decrypt {
        #[arg(long)]
        tokens: PathBuf,

        /// Token id from the list
        #[arg(long)]
        id: String,
    },

    /// Send tokens and print the transaction history
    Send {
        #[arg(long)]
        tokens: PathBuf,

        #[arg(long)]
        id: String,

        /// Recipient address
        #[arg(long)]
        to: Address,

        #[arg(long)]
        amount: String,
    },

    /// Mine an empty block (development chains only)
    AdvanceBlock,

    /// Set chain timestamp (development chains only)
    ///
    /// Only the chain's pricing follows this clock. The countdown shown by
    /// `auction` and `watch` is computed from the local wall clock, so after
    /// moving the chain clock the two can disagree.
    SetTimestamp {
        /// Unix timestamp to set
        #[arg(long)]
        timestamp: u64,
    },
}

async fn auction_cmd(services: Services, config: &ClientConfig, address: Address) -> Result<()> {
    let session = AuctionSession::open(services.clone(), address, config).await?;
    let params = session.parameters();
    let live = session.live_state().unwrap_or_default();
    let symbol = session.payment_symbol().unwrap_or("units");
    let token_name = services.tokens.name(params.auction_token).await.ok();

    println!("Auction {}:", params.address);
    if let Some(name) = token_name {
        println!("  Token: {}", name);
    }
    println!("  Seller: {}", short_address(&params.seller));
    println!("  Start Price: {} {}", params.start_price, symbol);
    println!("  Reserve Price: {} {}", params.reserve_price, symbol);
    println!("  Discount Rate: {} per second", params.discount_rate);
    println!("  Start: {}", params.start_at);
    println!("  End: {}", params.expires_at);
    println!("  Supply: {}", params.initial_token_supply);
    println!("  Current Price: {} {}", live.current_price, symbol);
    println!("  Tokens Left: {}", live.tokens_left);
    println!(
        "  Status: {}",
        snapshot(params, Some(&live), services.clock.now()).formatted
    );
    if session.is_owner() {
        println!("  (you are the seller)");
    }
    Ok(())
}

async fn watch_cmd(services: Services, config: &ClientConfig, address: Address) -> Result<()> {
    let session = AuctionSession::open(services, address, config).await?;
    let handle = session.timer(config.poll_interval).spawn();
    let mut updates = handle.subscribe();

    loop {
        {
            let snap = updates.borrow_and_update();
            let live = session.live_state().unwrap_or_default();
            println!(
                "{}  price={} left={}",
                snap.formatted, live.current_price, live.tokens_left
            );
            if snap.status.is_final() {
                break;
            }
        }
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}

async fn chart_cmd(
    services: Services,
    config: &ClientConfig,
    address: Address,
    steps: Option<usize>,
    model: ModelArg,
) -> Result<()> {
    let session = AuctionSession::open(services, address, config).await?;
    let model = match model {
        ModelArg::Linear => DecayModel::Linear,
        ModelArg::DiscountRate => DecayModel::from_parameters(session.parameters()),
    };
    let chart = session.chart(model, steps.unwrap_or(config.chart_steps));

    println!("{:>8}  {:>14}", "hours", "price");
    for point in &chart.price_points {
        println!("{:>8.2}  {:>14.4}", point.time_hours, point.price);
    }
    if !chart.supply_points.is_empty() {
        println!();
        println!("{:>8}  {:>14}", "hours", "sold");
        for point in &chart.supply_points {
            println!("{:>8.2}  {:>14.2}", point.time_hours, point.sold);
        }
    }
    Ok(())
}

async fn bid_cmd(
    services: Services,
    config: &ClientConfig,
    address: Address,
    amount: &str,
) -> Result<()> {
    let session = AuctionSession::open(services, address, config).await?;
    let mut phases = session.submitter().subscribe();
    let printer = tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            println!("  phase: {}", phases.borrow_and_update().name());
        }
    });

    let result = session.place_bid(amount).await;
    printer.abort();
    println!("  phase: {}", session.submitter().phase().name());

    let record = result?;
    println!("Bid confirmed");
    println!("  Amount: {} (encrypted)", record.amount);
    println!("  Tx: {}", record.tx_hash);
    println!("  Block: {}", record.block_number);
    println!("  Price at submit: {}", record.price_at_submit);
    Ok(())
}

async fn open_store(
    services: Services,
    config: &ClientConfig,
    tokens: &Path,
) -> Result<TokenStore> {
    let store = TokenStore::new(services, config);
    store.load(load_token_list(tokens)?);
    store.refresh_balances().await?;
    Ok(store)
}

async fn tokens_cmd(services: Services, config: &ClientConfig, tokens: &Path) -> Result<()> {
    let chain_id = services.wallet.chain_id().await?;
    let store = open_store(services, config, tokens).await?;

    println!("Tokens on {}:", chain_name(chain_id));
    for token in store.tokens() {
        let location = token
            .address
            .map(|a| short_address(&a))
            .unwrap_or_else(|| "native".to_string());
        println!(
            "  [{}] {} {} ({}, {})",
            token.id, token.balance, token.symbol, token.name, location
        );
    }
    Ok(())
}

async fn decrypt_cmd(
    services: Services,
    config: &ClientConfig,
    tokens: &Path,
    id: &str,
) -> Result<()> {
    let store = open_store(services, config, tokens).await?;
    match store.decrypt_token(id).await? {
        Some(balance) => {
            let symbol = store.token(id).map(|t| t.symbol).unwrap_or_default();
            println!("{} {}", balance, symbol);
        }
        None => println!("Token {} is not a confidential token", id),
    }
    Ok(())
}

async fn send_cmd(
    services: Services,
    config: &ClientConfig,
    tokens: &Path,
    id: &str,
    to: Address,
    amount: &str,
) -> Result<()> {
    let store = open_store(services, config, tokens).await?;
    let mut phases = store.submitter().subscribe();
    let printer = tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            println!("  phase: {}", phases.borrow_and_update().name());
        }
    });

    let submitted = store.send_token(id, to, amount).await;
    printer.abort();
    let state = if submitted {
        store.track_transfer().await
    } else {
        store.transfer_state()
    };
    print_history(&store);

    if let Some(tx_hash) = state.tx_hash {
        println!("Tx: {}", tx_hash);
    }
    match (state.is_success, state.error) {
        (true, _) => println!("Transfer confirmed"),
        (false, Some(error)) => return Err(anyhow!(error)),
        (false, None) => println!("Transfer pending"),
    }
    Ok(())
}

fn print_history(store: &TokenStore) {
    let history = store.history();
    if history.is_empty() {
        return;
    }
    println!("Transaction history:");
    for record in history {
        let outcome = match &record.outcome {
            TransferOutcome::Pending => "pending".to_string(),
            TransferOutcome::Confirmed => "confirmed".to_string(),
            TransferOutcome::Failed(error) => format!("failed: {}", error),
        };
        println!(
            "  {} {} -> {}  {}  [{}]",
            record.amount,
            record.symbol,
            short_address(&record.to),
            record.tx_hash,
            outcome
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dutch_cli=info".parse()?)
                .add_directive("dutch_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig {
        rpc_endpoint: cli.rpc.clone(),
        poll_interval: Duration::from_secs(cli.poll_interval_secs.max(1)),
        ..Default::default()
    };

    let chain = Arc::new(RpcContracts::connect(&config.rpc_endpoint, cli.from).await?);
    if let Some(account) = chain.account() {
        info!(account = %account, "Using account");
    }
    let services = Services::from_chain(
        chain.clone(),
        Arc::new(PlaceholderSdk),
        Arc::new(TracingNotifier),
        Arc::new(SystemClock),
    );

    match cli.command {
        Commands::Auction { address } => auction_cmd(services, &config, address).await?,

        Commands::Watch { address } => watch_cmd(services, &config, address).await?,

        Commands::Chart {
            address,
            steps,
            model,
        } => chart_cmd(services, &config, address, steps, model).await?,

        Commands::Bid { address, amount } => bid_cmd(services, &config, address, &amount).await?,

        Commands::Tokens { tokens } => tokens_cmd(services, &config, &tokens).await?,

        Commands::Decrypt { tokens, id } => decrypt_cmd(services, &config, &tokens, &id).await?,

        Commands::Send {
            tokens,
            id,
            to,
            amount,
        } => send_cmd(services, &config, &tokens, &id, to, &amount).await?,

        Commands::AdvanceBlock => {
            let info = chain.advance_block().await?;
            println!("Block advanced: height={}, timestamp={}", info.height, info.timestamp);
        }

        Commands::SetTimestamp { timestamp } => {
            chain.set_timestamp(timestamp).await?;
            println!("Timestamp set to {}", timestamp);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_set_timestamp_help_mentions_wall_clock() {
        let mut cmd = Cli::command();
        let sub = cmd.find_subcommand_mut("set-timestamp").unwrap();
        let help = sub.render_long_help().to_string();
        assert!(help.contains("wall"));

        let cli = Cli::try_parse_from(["dutch-cli", "set-timestamp", "--timestamp", "1700000000"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::SetTimestamp { timestamp: 1_700_000_000 }
        ));
    }
}
