//! Client SDK for confidential Dutch auctions.
//!
//! This crate provides a high-level API for:
//! - Following an auction's countdown and live price
//! - Deriving price and supply charts
//! - Submitting encrypted bids and confidential transfers
//! - Managing the connected account's tokens and decrypting balances

pub mod auction;
pub mod chart;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod latest;
pub mod notify;
pub mod sdk;
pub mod store;
pub mod submission;
pub mod timer;
pub mod units;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auction::AuctionSession;
pub use chart::{derive_chart, ChartData, ChartInput, DecayModel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use context::Services;
pub use error::ClientError;
pub use notify::{MemoryNotifier, Notification, NotificationLevel, Notifier, TracingNotifier};
pub use sdk::{ConfidentialSdk, PlaceholderSdk, SdkError};
pub use store::{TokenStore, TransferOutcome, TransferRecord, TransferState};
pub use submission::{SubmissionPhase, SubmissionRequest, Submitter};
pub use timer::{AuctionTimer, TimerHandle, TimerSnapshot, TimerStatus};
