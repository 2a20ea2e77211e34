//! Countdown and polling loop for a running auction.
//!
//! Every tick recomputes the remaining time from the wall clock and, while the
//! auction is live, issues a refresh of price and supply. Refreshes run as
//! their own tasks and may overlap; the session keeps only the newest result.
//! Polling stops for good once the auction has expired or sold out.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dutch_types::{AuctionLiveState, AuctionParameters};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::auction::AuctionSession;
use crate::clock::Clock;

/// Seconds left until `expires_at`, zero once passed.
pub fn remaining_seconds(params: &AuctionParameters, now: u64) -> u64 {
    params.expires_at.saturating_sub(now)
}

/// Render a duration as `1d 02h 03m 04s`, dropping leading zero units.
pub fn format_time_remaining(secs: u64) -> String {
    if secs == 0 {
        return "Ended".to_string();
    }
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{}d {:02}h {:02}m {:02}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{:02}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{:02}m {:02}s", minutes, seconds)
    } else {
        format!("{:02}s", seconds)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimerStatus {
    /// The seller has not started the auction
    NotActive,
    Running { remaining: u64 },
    Expired,
    SoldOut,
}

impl TimerStatus {
    /// Whether polling is over for good.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Expired | Self::SoldOut)
    }
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotActive => write!(f, "Not active"),
            Self::Running { remaining } => write!(f, "{}", format_time_remaining(*remaining)),
            Self::Expired => write!(f, "Ended"),
            Self::SoldOut => write!(f, "Sold out"),
        }
    }
}

/// What the countdown shows at one instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub remaining: u64,
    pub formatted: String,
}

/// Derive the countdown from parameters and the last known live state.
///
/// Expiry wins over everything else: an auction past `expires_at` is over
/// whether or not the seller ever started it. Before that, an unstarted
/// auction reads as not active.
pub fn snapshot(
    params: &AuctionParameters,
    live: Option<&AuctionLiveState>,
    now: u64,
) -> TimerSnapshot {
    let remaining = remaining_seconds(params, now);
    let status = match live {
        _ if remaining == 0 => TimerStatus::Expired,
        Some(live) if live.has_started => {
            if live.is_sold_out() {
                TimerStatus::SoldOut
            } else {
                TimerStatus::Running { remaining }
            }
        }
        _ => TimerStatus::NotActive,
    };
    TimerSnapshot {
        status,
        remaining,
        formatted: status.to_string(),
    }
}

/// Result of one timer step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tick {
    pub snapshot: TimerSnapshot,
    /// Whether a price and supply refresh was issued
    pub polled: bool,
    pub keep_running: bool,
}

/// Drives the countdown of one [`AuctionSession`].
///
/// Holds the session weakly; the timer winds down once the session is gone.
pub struct AuctionTimer {
    session: Weak<AuctionSession>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    active: Arc<AtomicBool>,
}

impl AuctionTimer {
    pub fn new(session: &Arc<AuctionSession>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            session: Arc::downgrade(session),
            clock,
            interval,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Countdown as of now, without polling.
    pub fn current(&self) -> Option<TimerSnapshot> {
        let session = self.session.upgrade()?;
        Some(snapshot(
            session.parameters(),
            session.live_state().as_ref(),
            self.clock.now(),
        ))
    }

    /// Advance one step. Returns `None` once the session has been dropped.
    ///
    /// A running auction gets a price and supply refresh. An auction that
    /// has not started only has its start flag re-checked.
    pub fn tick(&self) -> Option<Tick> {
        let session = self.session.upgrade()?;
        let snapshot = snapshot(
            session.parameters(),
            session.live_state().as_ref(),
            self.clock.now(),
        );

        let (polled, keep_running) = match snapshot.status {
            TimerStatus::Running { .. } => {
                self.spawn_refresh(&session, false);
                (true, true)
            }
            TimerStatus::NotActive => {
                self.spawn_refresh(&session, true);
                (false, true)
            }
            TimerStatus::Expired | TimerStatus::SoldOut => (false, false),
        };
        Some(Tick {
            snapshot,
            polled,
            keep_running,
        })
    }

    fn spawn_refresh(&self, session: &Arc<AuctionSession>, only_if_started: bool) {
        let auctions = session.services().auctions.clone();
        let address = session.address();
        let ticket = session.live_ticket();
        let weak = Arc::downgrade(session);
        let active = self.active.clone();

        tokio::spawn(async move {
            if only_if_started {
                match auctions.auction_start(address).await {
                    Ok(true) => info!(auction = %address, "Auction has started"),
                    Ok(false) => return,
                    Err(e) => {
                        warn!(auction = %address, error = %e, "Failed to check auction start");
                        return;
                    }
                }
            }

            let state = match auctions.live_state(address).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(auction = %address, error = %e, "Failed to refresh auction state");
                    return;
                }
            };
            if !active.load(Ordering::SeqCst) {
                debug!(ticket, "Timer stopped, discarding refresh");
                return;
            }
            if let Some(session) = weak.upgrade() {
                session.apply_live_state(ticket, state);
            }
        });
    }

    /// Run the loop on the current runtime.
    pub fn spawn(self) -> TimerHandle {
        let initial = self.current().unwrap_or_else(|| TimerSnapshot {
            status: TimerStatus::Expired,
            remaining: 0,
            formatted: TimerStatus::Expired.to_string(),
        });
        let (updates, receiver) = watch::channel(initial);
        let active = self.active.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !self.active.load(Ordering::SeqCst) {
                    break;
                }
                let Some(tick) = self.tick() else {
                    debug!("Auction session dropped, stopping timer");
                    break;
                };
                updates.send_replace(tick.snapshot.clone());
                if !tick.keep_running {
                    info!(status = %tick.snapshot.status, "Auction over, polling stopped");
                    break;
                }
            }
            self.active.store(false, Ordering::SeqCst);
        });

        TimerHandle {
            task: Some(task),
            active,
            updates: receiver,
        }
    }
}

/// Handle to a running timer loop. Dropping it stops the loop.
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
    updates: watch::Receiver<TimerSnapshot>,
}

impl TimerHandle {
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.updates.clone()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop scheduling. Refreshes still in flight are discarded.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Wait for the loop to end on its own.
    pub async fn wait(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ClientConfig;
    use crate::notify::MemoryNotifier;
    use crate::testing::{default_auction, services, FakeChain, FakeSdk, AUCTION};
    use dutch_types::U256;

    fn live(tokens_left: u64, has_started: bool) -> AuctionLiveState {
        AuctionLiveState {
            current_price: U256::from(50u64),
            tokens_left: U256::from(tokens_left),
            has_started,
        }
    }

    async fn session_at(
        chain: &Arc<FakeChain>,
        now: u64,
    ) -> (Arc<AuctionSession>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let mut services = services(
            chain.clone(),
            Arc::new(FakeSdk::new()),
            Arc::new(MemoryNotifier::new()),
        );
        services.clock = clock.clone();
        let session = AuctionSession::open(services, AUCTION, &ClientConfig::default())
            .await
            .unwrap();
        (session, clock)
    }

    #[test]
    fn test_format_time_remaining() {
        assert_eq!(format_time_remaining(0), "Ended");
        assert_eq!(format_time_remaining(4), "04s");
        assert_eq!(format_time_remaining(184), "03m 04s");
        assert_eq!(format_time_remaining(7384), "02h 03m 04s");
        assert_eq!(format_time_remaining(93_784), "1d 02h 03m 04s");
    }

    #[test]
    fn test_remaining_is_zero_after_expiry() {
        let params = default_auction();
        for now in [3600, 3601, 10_000, u64::MAX] {
            assert_eq!(remaining_seconds(&params, now), 0);
            let snap = snapshot(&params, Some(&live(10, true)), now);
            assert_eq!(snap.status, TimerStatus::Expired);
            assert_eq!(snap.formatted, "Ended");
        }
        assert_eq!(remaining_seconds(&params, 1800), 1800);
    }

    #[test]
    fn test_snapshot_statuses() {
        let params = default_auction();
        assert_eq!(
            snapshot(&params, Some(&live(10, false)), 100).status,
            TimerStatus::NotActive
        );
        assert_eq!(snapshot(&params, None, 100).formatted, "Not active");
        assert_eq!(
            snapshot(&params, Some(&live(0, true)), 100).status,
            TimerStatus::SoldOut
        );
        assert_eq!(
            snapshot(&params, Some(&live(10, true)), 100).status,
            TimerStatus::Running { remaining: 3500 }
        );
    }

    #[tokio::test]
    async fn test_expired_tick_does_not_poll() {
        let chain = Arc::new(FakeChain::new());
        let (session, _) = session_at(&chain, 3600).await;
        let timer = session.timer(Duration::from_secs(5));
        let before = chain.price_reads();

        let tick = timer.tick().unwrap();
        assert!(!tick.polled);
        assert!(!tick.keep_running);
        assert_eq!(tick.snapshot.remaining, 0);

        tokio::task::yield_now().await;
        assert_eq!(chain.price_reads(), before);
    }

    #[tokio::test]
    async fn test_not_started_auction_is_not_polled() {
        let chain = Arc::new(FakeChain::new());
        chain.set_started(false);
        let (session, _) = session_at(&chain, 100).await;
        let timer = session.timer(Duration::from_secs(5));
        let before = chain.price_reads();

        let tick = timer.tick().unwrap();
        assert_eq!(tick.snapshot.status, TimerStatus::NotActive);
        assert!(!tick.polled);
        assert!(tick.keep_running);

        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(chain.price_reads(), before);
    }

    #[test]
    fn test_expired_wins_over_not_started() {
        let params = default_auction();
        assert_eq!(snapshot(&params, Some(&live(10, false)), 3600).status, TimerStatus::Expired);
        assert_eq!(snapshot(&params, None, 10_000).status, TimerStatus::Expired);
        assert_eq!(snapshot(&params, Some(&live(0, false)), 3599).status, TimerStatus::NotActive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unstarted_auction_stops_polling_after_expiry() {
        let chain = Arc::new(FakeChain::new());
        chain.set_started(false);
        let (session, _) = session_at(&chain, 10_000).await;
        let handle = session.timer(Duration::from_secs(5)).spawn();
        let updates = handle.subscribe();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!handle.is_running());
        assert_eq!(updates.borrow().status, TimerStatus::Expired);

        let calls = chain.network_calls();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(chain.network_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_when_sold_out() {
        let chain = Arc::new(FakeChain::new());
        let (session, _) = session_at(&chain, 100).await;
        let handle = session.timer(Duration::from_secs(5)).spawn();
        let updates = handle.subscribe();

        chain.set_tokens_left(0);
        handle.wait().await;

        assert_eq!(updates.borrow().status, TimerStatus::SoldOut);
        assert!(session.live_state().unwrap().is_sold_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_at_expiry() {
        let chain = Arc::new(FakeChain::new());
        let (session, clock) = session_at(&chain, 3590).await;
        let handle = session.timer(Duration::from_secs(5)).spawn();
        let mut updates = handle.subscribe();

        updates
            .wait_for(|snap| matches!(snap.status, TimerStatus::Running { .. }))
            .await
            .unwrap();
        clock.advance(10);
        handle.wait().await;

        let reads = chain.price_reads();
        assert_eq!(updates.borrow().status, TimerStatus::Expired);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(chain.price_reads(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_polling() {
        let chain = Arc::new(FakeChain::new());
        let (session, _) = session_at(&chain, 100).await;
        let before = session.live_state();

        let mut handle = session.timer(Duration::from_secs(5)).spawn();
        chain.set_tokens_left(1);
        handle.stop();
        assert!(!handle.is_running());
        let reads = chain.price_reads();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(chain.price_reads(), reads);
        assert_eq!(session.live_state(), before);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_state() {
        let chain = Arc::new(FakeChain::new());
        let (session, _) = session_at(&chain, 100).await;
        let timer = session.timer(Duration::from_secs(5));
        let before = session.live_state();

        chain.fail_reads(true);
        assert!(timer.tick().unwrap().polled);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.live_state(), before);
        assert!(timer.tick().unwrap().keep_running);
    }
}
