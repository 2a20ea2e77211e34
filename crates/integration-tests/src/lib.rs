//! End-to-end integration tests for the confidential Dutch auction client.
//!
//! These tests exercise the full flows against a mock chain served over
//! JSON-RPC:
//! 1. Opening an auction and following its countdown
//! 2. Encrypted bid submission through the wallet
//! 3. Token dashboard: balances, decryption and transfers
//! 4. Network checks for confidential operations

#![cfg(test)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dutch_client::chart::DecayModel;
use dutch_client::store::TransferOutcome;
use dutch_client::testing::FakeSdk;
use dutch_client::{
    AuctionSession, ClientConfig, ClientError, ManualClock, MemoryNotifier, Services,
    TimerStatus, TokenStore,
};
use dutch_contracts::{RpcContracts, Wallet};
use dutch_types::{
    Address, TokenConfig, TokenKind, MAINNET_CHAIN_ID, MASKED_BALANCE, U256,
};
use mock_chain::state::{
    AUCTION_ADDRESS, AUCTION_TOKEN_ADDRESS, PAYMENT_TOKEN_ADDRESS, STABLE_TOKEN_ADDRESS,
};
use mock_chain::{serve, Genesis, RunningChain};

const GENESIS_TIME: u64 = 1_700_000_000;
const BIDDER: Address = Address::repeat_byte(0x11);
const FRIEND: Address = Address::repeat_byte(0x22);

struct Harness {
    chain: RunningChain,
    services: Services,
    clock: Arc<ManualClock>,
    sdk: Arc<FakeSdk>,
    notifier: Arc<MemoryNotifier>,
    config: ClientConfig,
}

async fn harness(genesis: Genesis) -> Harness {
    let listen: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let chain = serve(listen, genesis).await.unwrap();
    let contracts = Arc::new(RpcContracts::connect(&chain.url(), None).await.unwrap());
    assert_eq!(contracts.account(), Some(BIDDER));

    let clock = Arc::new(ManualClock::new(GENESIS_TIME));
    let sdk = Arc::new(FakeSdk::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let services = Services::from_chain(contracts, sdk.clone(), notifier.clone(), clock.clone());
    let config = ClientConfig {
        rpc_endpoint: chain.url(),
        poll_interval: Duration::from_millis(20),
        receipt_poll_interval: Duration::from_millis(10),
        ..Default::default()
    };

    Harness {
        chain,
        services,
        clock,
        sdk,
        notifier,
        config,
    }
}

fn token_list() -> Vec<TokenConfig> {
    let token = |id: &str, symbol: &str, kind, address: Option<Address>, decimals| TokenConfig {
        id: id.into(),
        symbol: symbol.into(),
        name: symbol.into(),
        kind,
        address,
        decimals,
    };
    vec![
        token("eth", "ETH", TokenKind::Native, None, None),
        token("tusd", "tUSD", TokenKind::Erc20, Some(STABLE_TOKEN_ADDRESS), Some(6)),
        token("cusd", "cUSD", TokenKind::Confidential, Some(PAYMENT_TOKEN_ADDRESS), Some(6)),
        token("auc", "AUC", TokenKind::Erc20, Some(AUCTION_TOKEN_ADDRESS), Some(0)),
    ]
}

/// Test the complete auction flow against the mock chain.
#[tokio::test]
async fn test_full_auction_flow() {
    let h = harness(Genesis::at(GENESIS_TIME)).await;

    // ========================================
    // Phase 1: Open the auction
    // ========================================

    let session = AuctionSession::open(h.services.clone(), AUCTION_ADDRESS, &h.config)
        .await
        .unwrap();
    let params = session.parameters().clone();
    assert_eq!(params.start_price, U256::from(2_000_000u64));
    assert_eq!(params.reserve_price, U256::from(500_000u64));
    assert_eq!(params.start_at, GENESIS_TIME);
    assert_eq!(params.duration_secs(), 3600);
    assert_eq!(session.payment_symbol(), Some("cUSD"));
    assert!(!session.is_owner());

    // ========================================
    // Phase 2: Countdown and chart
    // ========================================

    h.clock.set(GENESIS_TIME + 1800);
    let timer = session.timer(h.config.poll_interval);
    let tick = timer.tick().unwrap();
    assert_eq!(tick.snapshot.status, TimerStatus::Running { remaining: 1800 });
    assert_eq!(tick.snapshot.formatted, "30m 00s");
    assert!(tick.polled);

    let chart = session.chart(DecayModel::Linear, 12);
    assert_eq!(chart.price_points.last().unwrap().price, 500_000.0);
    let contract_chart = session.chart(DecayModel::from_parameters(&params), 12);
    assert!(contract_chart.price_points.last().unwrap().price >= 500_000.0);

    // ========================================
    // Phase 3: Place an encrypted bid
    // ========================================

    let record = session.place_bid("10").await.unwrap();
    assert_eq!(record.amount, 10_000_000);
    assert_eq!(record.bidder, BIDDER);
    assert_eq!(record.block_number, 1);
    assert_eq!(session.bid_history().len(), 1);
    assert_eq!(h.sdk.encrypt_calls(), 1);
    assert_eq!(
        h.notifier.titles(),
        vec!["Encrypting Transaction", "Confirming Transaction", "Transfer Complete"]
    );

    // Mined 12s after genesis: 10 cUSD buys 5 tokens at 1.995008 each.
    let live = session.refresh_live_state().await.unwrap();
    assert_eq!(live.tokens_left, U256::from(995u64));

    // ========================================
    // Phase 4: Expiry stops polling
    // ========================================

    h.chain.state.write().set_timestamp(GENESIS_TIME + 7200);
    h.clock.set(GENESIS_TIME + 3600);
    let price = h.services.auctions.get_price(AUCTION_ADDRESS).await.unwrap();
    assert_eq!(price, params.reserve_price);

    let tick = timer.tick().unwrap();
    assert_eq!(tick.snapshot.status, TimerStatus::Expired);
    assert!(!tick.polled && !tick.keep_running);

    let err = session.place_bid("1").await;
    assert!(matches!(err, Err(ClientError::SubmissionInProgress)));
    assert!(session.submitter().acknowledge());
    let err = session.place_bid("1").await.unwrap_err();
    assert_eq!(
        err,
        ClientError::TransactionRejectedOrFailed("transaction reverted".into())
    );
    assert_eq!(session.bid_history().len(), 1);
}

/// Timer runs on its own until the auction sells out.
#[tokio::test]
async fn test_timer_stops_when_auction_sells_out() {
    let genesis = Genesis {
        token_supply: U256::from(10u64),
        ..Genesis::at(GENESIS_TIME)
    };
    let h = harness(genesis).await;
    let session = AuctionSession::open(h.services.clone(), AUCTION_ADDRESS, &h.config)
        .await
        .unwrap();

    let handle = session.timer(h.config.poll_interval).spawn();
    let updates = handle.subscribe();
    assert!(matches!(
        updates.borrow().status,
        TimerStatus::Running { .. }
    ));

    session.place_bid("100").await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("timer did not stop");

    assert_eq!(updates.borrow().status, TimerStatus::SoldOut);
    assert!(session.live_state().unwrap().is_sold_out());
}

/// Test the token dashboard against the mock chain.
#[tokio::test]
async fn test_dashboard_flow() {
    let h = harness(Genesis::at(GENESIS_TIME)).await;
    let store = TokenStore::new(h.services.clone(), &h.config);
    store.load(token_list());

    // Balances
    store.refresh_balances().await.unwrap();
    assert_eq!(store.token("eth").unwrap().balance, "100");
    assert_eq!(store.token("tusd").unwrap().balance, "1000");
    assert_eq!(store.token("auc").unwrap().balance, "0");
    assert_eq!(store.token("cusd").unwrap().balance, MASKED_BALANCE);

    // Decryption
    assert_eq!(
        store.decrypt_token("cusd").await.unwrap(),
        Some("1000".to_string())
    );
    assert_eq!(
        store.token("cusd").unwrap().last_updated,
        Some(GENESIS_TIME)
    );

    // Plain transfer
    assert!(store.send_token("tusd", FRIEND, "1.5").await);
    let state = store.track_transfer().await;
    assert!(state.is_success);
    store.refresh_balances().await.unwrap();
    assert_eq!(store.token("tusd").unwrap().balance, "998.5");

    // Confidential transfer
    assert!(store.send_token("cusd", FRIEND, "5").await);
    assert!(store.track_transfer().await.is_success);
    assert!(h
        .notifier
        .titles()
        .contains(&"Confidential Transfer Initiated".to_string()));

    // Transaction history
    let history = store.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].token_id, "tusd");
    assert_eq!(history[1].token_id, "cusd");
    assert!(history
        .iter()
        .all(|r| r.outcome == TransferOutcome::Confirmed && r.to == FRIEND));

    // Cached until the store is reloaded
    assert_eq!(
        store.decrypt_token("cusd").await.unwrap(),
        Some("1000".to_string())
    );
    store.reset();
    assert!(store.history().is_empty());
    store.load(token_list());
    assert_eq!(
        store.decrypt_token("cusd").await.unwrap(),
        Some("995".to_string())
    );

    // Unknown token never reaches the chain
    let height = h.services.wallet.block_number().await.unwrap();
    assert!(!store.send_token("doge", FRIEND, "1").await);
    assert_eq!(h.services.wallet.block_number().await.unwrap(), height);
}

/// Confidential operations are refused off Sepolia.
#[tokio::test]
async fn test_wrong_network() {
    let genesis = Genesis {
        chain_id: MAINNET_CHAIN_ID,
        ..Genesis::at(GENESIS_TIME)
    };
    let h = harness(genesis).await;

    let store = TokenStore::new(h.services.clone(), &h.config);
    store.load(token_list());
    let err = store
        .try_send_token("cusd", FRIEND, "1")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::WrongNetwork { .. }));
    assert_eq!(h.sdk.encrypt_calls(), 0);

    // Plain tokens still work
    assert!(store.send_token("tusd", FRIEND, "1").await);

    let session = AuctionSession::open(h.services.clone(), AUCTION_ADDRESS, &h.config)
        .await
        .unwrap();
    assert!(matches!(
        session.place_bid("1").await,
        Err(ClientError::WrongNetwork { .. })
    ));
    assert_eq!(h.services.wallet.block_number().await.unwrap(), 1);
}

/// Auction that has not been started is shown as not active until it is.
#[tokio::test]
async fn test_auction_not_started() {
    let genesis = Genesis {
        auction_started: false,
        ..Genesis::at(GENESIS_TIME)
    };
    let h = harness(genesis).await;
    let session = AuctionSession::open(h.services.clone(), AUCTION_ADDRESS, &h.config)
        .await
        .unwrap();

    let timer = session.timer(h.config.poll_interval);
    let tick = timer.tick().unwrap();
    assert_eq!(tick.snapshot.status, TimerStatus::NotActive);
    assert_eq!(tick.snapshot.formatted, "Not active");

    h.chain.state.write().start_auction();
    let live = session.refresh_live_state().await.unwrap();
    assert!(live.has_started);
    assert!(matches!(
        timer.tick().unwrap().snapshot.status,
        TimerStatus::Running { .. }
    ));
}

/// Two bids racing through one session: only one gets encrypted.
#[tokio::test]
async fn test_concurrent_bids_with_fakes() {
    use dutch_client::testing::{services, FakeChain, AUCTION};

    let chain = Arc::new(FakeChain::new());
    let sdk = Arc::new(FakeSdk::new());
    let gate = sdk.hold_encryption();
    let services = services(chain.clone(), sdk.clone(), Arc::new(MemoryNotifier::new()));
    let session = AuctionSession::open(services, AUCTION, &ClientConfig::default())
        .await
        .unwrap();

    let mut phases = session.submitter().subscribe();
    let first = tokio::spawn({
        let session = session.clone();
        async move { session.place_bid("1").await }
    });
    phases.wait_for(|p| p.is_busy()).await.unwrap();

    assert_eq!(
        session.place_bid("2").await.unwrap_err(),
        ClientError::SubmissionInProgress
    );
    gate.add_permits(1);
    first.await.unwrap().unwrap();

    assert_eq!(sdk.encrypt_calls(), 1);
    assert_eq!(chain.sent().len(), 1);
    assert_eq!(session.bid_history().len(), 1);
}
