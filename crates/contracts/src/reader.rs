//! Read-only access to the auction and token contracts.

use async_trait::async_trait;
use dutch_types::{Address, AuctionLiveState, AuctionParameters, U256};

use crate::error::ContractError;

/// Typed reads against a Dutch auction contract.
///
/// Every call is keyed by the auction's contract address.
#[async_trait]
pub trait AuctionReader: Send + Sync {
    async fn get_price(&self, auction: Address) -> Result<U256, ContractError>;

    async fn tokens_left_reveal(&self, auction: Address) -> Result<U256, ContractError>;

    async fn starting_price(&self, auction: Address) -> Result<U256, ContractError>;

    async fn discount_rate(&self, auction: Address) -> Result<U256, ContractError>;

    async fn start_at(&self, auction: Address) -> Result<u64, ContractError>;

    async fn expires_at(&self, auction: Address) -> Result<u64, ContractError>;

    async fn reserve_price(&self, auction: Address) -> Result<U256, ContractError>;

    /// Initial token supply offered by the auction.
    async fn amount(&self, auction: Address) -> Result<U256, ContractError>;

    async fn auction_start(&self, auction: Address) -> Result<bool, ContractError>;

    async fn seller(&self, auction: Address) -> Result<Address, ContractError>;

    /// Token being sold.
    async fn token(&self, auction: Address) -> Result<Address, ContractError>;

    /// Token bids are paid in.
    async fn payment_token(&self, auction: Address) -> Result<Address, ContractError>;

    /// Read the immutable auction parameters in one go.
    async fn parameters(&self, auction: Address) -> Result<AuctionParameters, ContractError> {
        let (start_price, reserve_price, discount_rate, start_at, expires_at) = tokio::try_join!(
            self.starting_price(auction),
            self.reserve_price(auction),
            self.discount_rate(auction),
            self.start_at(auction),
            self.expires_at(auction),
        )?;
        let (initial_token_supply, seller, auction_token, payment_token) = tokio::try_join!(
            self.amount(auction),
            self.seller(auction),
            self.token(auction),
            self.payment_token(auction),
        )?;

        Ok(AuctionParameters {
            address: auction,
            start_price,
            reserve_price,
            discount_rate,
            start_at,
            expires_at,
            initial_token_supply,
            seller,
            auction_token,
            payment_token,
        })
    }

    /// Read the values that change while the auction runs.
    async fn live_state(&self, auction: Address) -> Result<AuctionLiveState, ContractError> {
        let (current_price, tokens_left, has_started) = tokio::try_join!(
            self.get_price(auction),
            self.tokens_left_reveal(auction),
            self.auction_start(auction),
        )?;
        Ok(AuctionLiveState {
            current_price,
            tokens_left,
            has_started,
        })
    }
}

/// Reads against ERC20 and confidential ERC20 contracts.
#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn name(&self, token: Address) -> Result<String, ContractError>;

    async fn symbol(&self, token: Address) -> Result<String, ContractError>;

    async fn decimals(&self, token: Address) -> Result<u8, ContractError>;

    async fn total_supply(&self, token: Address) -> Result<U256, ContractError>;

    /// Plain balance for ERC20s, opaque ciphertext handle for confidential tokens.
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ContractError>;

    /// Balance in the chain's native currency.
    async fn native_balance(&self, owner: Address) -> Result<U256, ContractError>;
}
