//! One Dutch auction as seen from the client.

use std::sync::Arc;
use std::time::Duration;

use dutch_types::{
    chain_name, u256_to_f64, Address, AuctionLiveState, AuctionParameters, BidRecord, Token,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::chart::{derive_chart, ChartData, ChartInput, DecayModel};
use crate::config::ClientConfig;
use crate::context::Services;
use crate::error::ClientError;
use crate::latest::Latest;
use crate::notify::Notification;
use crate::submission::{SubmissionRequest, Submitter};
use crate::timer::AuctionTimer;
use crate::units::parse_amount_u64;

/// Parameters, live state and bid history of a single auction.
///
/// Parameters are read once on [`open`](Self::open). Live state is replaced
/// wholesale by refreshes, newest request wins.
pub struct AuctionSession {
    services: Services,
    params: AuctionParameters,
    live: Latest<AuctionLiveState>,
    bids: Mutex<Vec<BidRecord>>,
    submitter: Submitter,
    payment_decimals: u8,
    payment_symbol: Option<String>,
    confidential_chain_id: u64,
}

impl AuctionSession {
    /// Read the auction at `address` and start a session on it.
    pub async fn open(
        services: Services,
        address: Address,
        config: &ClientConfig,
    ) -> Result<Arc<Self>, ClientError> {
        let params = services.auctions.parameters(address).await?;
        let live = services.auctions.live_state(address).await?;

        let payment_decimals = services
            .tokens
            .decimals(params.payment_token)
            .await
            .unwrap_or_else(|e| {
                warn!(token = %params.payment_token, error = %e, "Using default decimals for payment token");
                Token::DEFAULT_DECIMALS
            });
        let payment_symbol = services.tokens.symbol(params.payment_token).await.ok();

        info!(
            auction = %address,
            start_at = params.start_at,
            expires_at = params.expires_at,
            "Opened auction"
        );

        let latest = Latest::new();
        let ticket = latest.ticket();
        latest.apply(ticket, live);

        Ok(Arc::new(Self {
            submitter: Submitter::new(services.clone(), config.receipt_poll_interval),
            services,
            params,
            live: latest,
            bids: Mutex::new(Vec::new()),
            payment_decimals,
            payment_symbol,
            confidential_chain_id: config.confidential_chain_id,
        }))
    }

    pub fn address(&self) -> Address {
        self.params.address
    }

    pub fn parameters(&self) -> &AuctionParameters {
        &self.params
    }

    pub fn payment_symbol(&self) -> Option<&str> {
        self.payment_symbol.as_deref()
    }

    /// Last applied live state.
    pub fn live_state(&self) -> Option<AuctionLiveState> {
        self.live.get()
    }

    /// Reserve a sequence number for a refresh about to be issued.
    pub fn live_ticket(&self) -> u64 {
        self.live.ticket()
    }

    /// Apply a refresh result unless a newer one already landed.
    pub fn apply_live_state(&self, ticket: u64, state: AuctionLiveState) -> bool {
        let applied = self.live.apply(ticket, state);
        if !applied {
            debug!(ticket, "Dropping stale auction state");
        }
        applied
    }

    /// Re-read price, supply and start flag from the contract.
    pub async fn refresh_live_state(&self) -> Result<AuctionLiveState, ClientError> {
        let ticket = self.live_ticket();
        let state = self.services.auctions.live_state(self.address()).await?;
        self.apply_live_state(ticket, state.clone());
        Ok(self.live_state().unwrap_or(state))
    }

    /// Whether the connected account is the seller.
    pub fn is_owner(&self) -> bool {
        self.services
            .wallet
            .account()
            .is_some_and(|account| self.params.is_seller(&account))
    }

    /// Price and supply curves, with the supply at the current hour taken
    /// from the last observed `tokens_left` once the auction is running.
    pub fn chart(&self, model: DecayModel, steps: usize) -> ChartData {
        let input = ChartInput::from_parameters(&self.params);
        let mut chart = derive_chart(&input, model, steps);
        if chart.supply_points.is_empty() {
            return chart;
        }

        let now = self.services.clock.now();
        if let Some(live) = self.live_state().filter(|live| live.has_started) {
            if now >= self.params.start_at {
                let elapsed = now.min(self.params.expires_at).saturating_sub(self.params.start_at);
                chart.record_supply(
                    elapsed as f64 / 3600.0,
                    u256_to_f64(live.tokens_left),
                    input.initial_token_supply,
                );
            }
        }
        chart
    }

    /// Countdown timer refreshing this session every `interval`.
    pub fn timer(self: &Arc<Self>, interval: Duration) -> AuctionTimer {
        AuctionTimer::new(self, self.services.clock.clone(), interval)
    }

    pub(crate) fn services(&self) -> &Services {
        &self.services
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Bids confirmed from this session, oldest first.
    pub fn bid_history(&self) -> Vec<BidRecord> {
        self.bids.lock().clone()
    }

    /// Encrypt and submit a bid of `amount` payment tokens.
    ///
    /// Waits for the receipt; the bid is recorded in the history once confirmed.
    pub async fn place_bid(&self, amount: &str) -> Result<BidRecord, ClientError> {
        let prepared = self.prepare_bid(amount).await;
        let (bidder, amount) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if e != ClientError::SubmissionInProgress {
                    self.services
                        .notifier
                        .notify(Notification::error("Transaction Failed", e.to_string()));
                }
                return Err(e);
            }
        };

        let price_at_submit = self
            .live_state()
            .map(|live| live.current_price)
            .unwrap_or_default();
        let receipt = self
            .submitter
            .submit(SubmissionRequest::Bid {
                auction: self.address(),
                amount,
            })
            .await?;

        let record = BidRecord {
            bidder,
            amount,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            price_at_submit,
        };
        info!(tx_hash = %record.tx_hash, amount, "Bid confirmed");
        self.bids.lock().push(record.clone());
        Ok(record)
    }

    async fn prepare_bid(&self, amount: &str) -> Result<(Address, u64), ClientError> {
        let bidder = self
            .services
            .wallet
            .account()
            .ok_or(ClientError::SignerNotInitialized)?;
        if self.submitter.is_busy() {
            return Err(ClientError::SubmissionInProgress);
        }
        let chain_id = self.services.wallet.chain_id().await?;
        if chain_id != self.confidential_chain_id {
            return Err(ClientError::WrongNetwork {
                expected: chain_name(self.confidential_chain_id),
                connected: chain_name(chain_id),
            });
        }
        let amount = parse_amount_u64(amount, self.payment_decimals)?;
        Ok((bidder, amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;
    use crate::testing::{services, FakeChain, FakeSdk, AUCTION, SELLER, USER};
    use dutch_types::{MAINNET_CHAIN_ID, U256};

    async fn open(chain: &Arc<FakeChain>) -> (Arc<AuctionSession>, Arc<MemoryNotifier>) {
        let notifier = Arc::new(MemoryNotifier::new());
        let services = services(chain.clone(), Arc::new(FakeSdk::new()), notifier.clone());
        let config = ClientConfig {
            receipt_poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let session = AuctionSession::open(services, AUCTION, &config).await.unwrap();
        (session, notifier)
    }

    #[tokio::test]
    async fn test_open_reads_parameters() {
        let chain = Arc::new(FakeChain::new());
        let (session, _) = open(&chain).await;

        assert_eq!(session.parameters().start_price, U256::from(100u64));
        assert_eq!(session.parameters().duration_secs(), 3600);
        assert_eq!(session.live_state().unwrap().current_price, U256::from(55u64));
        assert_eq!(session.payment_symbol(), Some("cUSD"));
        assert!(!session.is_owner());

        chain.set_account(Some(SELLER));
        assert!(session.is_owner());
    }

    #[tokio::test]
    async fn test_stale_refresh_is_dropped() {
        let chain = Arc::new(FakeChain::new());
        let (session, _) = open(&chain).await;

        let older = session.live_ticket();
        let newer = session.live_ticket();
        let fresh = AuctionLiveState {
            current_price: U256::from(40u64),
            tokens_left: U256::from(900u64),
            has_started: true,
        };
        assert!(session.apply_live_state(newer, fresh.clone()));
        assert!(!session.apply_live_state(older, AuctionLiveState::default()));
        assert_eq!(session.live_state(), Some(fresh));
    }

    #[tokio::test]
    async fn test_place_bid_records_history() {
        let chain = Arc::new(FakeChain::new());
        let (session, notifier) = open(&chain).await;

        let record = session.place_bid("1.5").await.unwrap();
        assert_eq!(record.amount, 1_500_000);
        assert_eq!(record.bidder, USER);
        assert_eq!(record.price_at_submit, U256::from(55u64));
        assert_eq!(session.bid_history(), vec![record]);
        assert_eq!(
            notifier.all().last().unwrap().title,
            "Transfer Complete"
        );
    }

    #[tokio::test]
    async fn test_place_bid_requires_sepolia() {
        let chain = Arc::new(FakeChain::new());
        chain.set_chain_id(MAINNET_CHAIN_ID);
        let (session, notifier) = open(&chain).await;

        let err = session.place_bid("1").await.unwrap_err();
        assert!(matches!(err, ClientError::WrongNetwork { .. }));
        assert!(chain.sent().is_empty());
        assert!(session.bid_history().is_empty());
        assert_eq!(notifier.titles(), vec!["Transaction Failed"]);
    }

    #[tokio::test]
    async fn test_place_bid_rejects_bad_amount() {
        let chain = Arc::new(FakeChain::new());
        let (session, _) = open(&chain).await;

        assert!(matches!(
            session.place_bid("-3").await,
            Err(ClientError::InvalidAmount(_))
        ));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_chart_uses_contract_rate() {
        let chain = Arc::new(FakeChain::new());
        let (session, _) = open(&chain).await;

        let chart = session.chart(DecayModel::from_parameters(session.parameters()), 12);
        assert_eq!(chart.price_points.len(), 13);
        assert_eq!(chart.price_points.last().unwrap().price, 10.0);
    }

    #[tokio::test]
    async fn test_chart_records_observed_supply() {
        let chain = Arc::new(FakeChain::new());
        let (session, _) = open(&chain).await;

        chain.set_tokens_left(700);
        session.refresh_live_state().await.unwrap();

        // The clock sits at t=1800, halfway through, where the projection says 500.
        let chart = session.chart(DecayModel::Linear, 12);
        assert_eq!(chart.supply_points.len(), 13);
        assert_eq!(chart.supply_points[6].time_hours, 0.5);
        assert_eq!(chart.supply_points[6].sold, 300.0);
        assert_eq!(chart.supply_points[12].sold, 1000.0);
    }

    #[tokio::test]
    async fn test_chart_is_projection_before_start() {
        let chain = Arc::new(FakeChain::new());
        chain.set_started(false);
        chain.set_tokens_left(700);
        let (session, _) = open(&chain).await;

        let chart = session.chart(DecayModel::Linear, 12);
        assert_eq!(chart.supply_points[6].sold, 500.0);
    }
}
