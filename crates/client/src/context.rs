//! Handles to the external collaborators a client session works with.

use std::sync::Arc;

use dutch_contracts::{AuctionReader, TokenReader, Wallet};

use crate::clock::Clock;
use crate::notify::Notifier;
use crate::sdk::ConfidentialSdk;

/// Everything a session needs from the outside world.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct Services {
    pub auctions: Arc<dyn AuctionReader>,
    pub tokens: Arc<dyn TokenReader>,
    pub wallet: Arc<dyn Wallet>,
    pub sdk: Arc<dyn ConfidentialSdk>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Use one object for every chain-facing role.
    pub fn from_chain<C>(
        chain: Arc<C>,
        sdk: Arc<dyn ConfidentialSdk>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        C: AuctionReader + TokenReader + Wallet + 'static,
    {
        Self {
            auctions: chain.clone(),
            tokens: chain.clone(),
            wallet: chain,
            sdk,
            notifier,
            clock,
        }
    }
}
