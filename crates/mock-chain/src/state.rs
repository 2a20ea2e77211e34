//! Simulated chain state and contract execution.
//!
//! Hosts one Dutch auction, plain ERC20 tokens and one confidential token.
//! Encryption is transparent here: a ciphertext handle is simply the
//! plaintext amount as a 256-bit integer, so balance handles can be revealed
//! by reading them as numbers.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface};
use dutch_contracts::abi::{IConfidentialERC20, IDutchAuction, IERC20};
use dutch_types::{TransactionReceipt, TransactionRequest, TxStatus, SEPOLIA_CHAIN_ID};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

/// Seconds added to the clock per mined block.
pub const BLOCK_TIME_SECS: u64 = 12;

pub const AUCTION_ADDRESS: Address = Address::repeat_byte(0xa0);
/// Plain ERC20 sold by the auction
pub const AUCTION_TOKEN_ADDRESS: Address = Address::repeat_byte(0xb0);
/// Confidential token bids are paid in
pub const PAYMENT_TOKEN_ADDRESS: Address = Address::repeat_byte(0xc0);
/// Plain ERC20 for ordinary transfers
pub const STABLE_TOKEN_ADDRESS: Address = Address::repeat_byte(0xd0);

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("unknown account {0}")]
    UnknownAccount(Address),

    #[error("insufficient funds for transfer")]
    InsufficientFunds,

    #[error("no contract at {0}")]
    UnknownContract(Address),

    #[error("invalid calldata: {0}")]
    Abi(String),

    #[error("execution reverted: {0}")]
    Revert(String),
}

impl From<alloy_sol_types::Error> for ChainError {
    fn from(e: alloy_sol_types::Error) -> Self {
        Self::Abi(e.to_string())
    }
}

/// Initial state of the chain.
#[derive(Clone, Debug)]
pub struct Genesis {
    pub chain_id: u64,
    pub timestamp: u64,
    /// Unlocked accounts, in `eth_accounts` order
    pub accounts: Vec<Address>,
    pub seller: Address,
    /// Price per auction token, in payment token base units
    pub start_price: U256,
    pub reserve_price: U256,
    pub auction_duration: u64,
    pub token_supply: U256,
    pub auction_started: bool,
}

impl Genesis {
    /// Sepolia-like chain starting at the current wall-clock time.
    pub fn now() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::at(timestamp)
    }

    pub fn at(timestamp: u64) -> Self {
        Self {
            chain_id: SEPOLIA_CHAIN_ID,
            timestamp,
            accounts: vec![
                Address::repeat_byte(0x11),
                Address::repeat_byte(0x22),
                Address::repeat_byte(0x33),
            ],
            seller: Address::repeat_byte(0x33),
            start_price: U256::from(2_000_000u64),
            reserve_price: U256::from(500_000u64),
            auction_duration: 3600,
            token_supply: U256::from(1000u64),
            auction_started: true,
        }
    }

    /// Discount that reaches the reserve exactly at expiry.
    pub fn discount_rate(&self) -> U256 {
        if self.auction_duration == 0 {
            return U256::ZERO;
        }
        self.start_price.saturating_sub(self.reserve_price) / U256::from(self.auction_duration)
    }
}

#[derive(Clone, Debug)]
struct Erc20 {
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: U256,
    balances: HashMap<Address, U256>,
}

impl Erc20 {
    fn new(name: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            total_supply: U256::ZERO,
            balances: HashMap::new(),
        }
    }

    fn mint(&mut self, to: Address, value: U256) {
        *self.balances.entry(to).or_default() += value;
        self.total_supply += value;
    }

    fn balance(&self, owner: &Address) -> U256 {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> bool {
        let balance = self.balance(&from);
        if balance < value {
            return false;
        }
        self.balances.insert(from, balance - value);
        *self.balances.entry(to).or_default() += value;
        true
    }

    /// Encrypted-token semantics: an overdraft moves nothing instead of failing.
    fn transfer_or_nothing(&mut self, from: Address, to: Address, value: U256) -> U256 {
        if self.transfer(from, to, value) {
            value
        } else {
            U256::ZERO
        }
    }
}

#[derive(Clone, Debug)]
struct DutchAuction {
    seller: Address,
    start_price: U256,
    reserve_price: U256,
    discount_rate: U256,
    start_at: u64,
    expires_at: u64,
    amount: U256,
    tokens_left: U256,
    started: bool,
}

impl DutchAuction {
    fn price_at(&self, timestamp: u64) -> U256 {
        let elapsed = timestamp.saturating_sub(self.start_at);
        let discount = self.discount_rate.saturating_mul(U256::from(elapsed));
        self.start_price
            .saturating_sub(discount)
            .max(self.reserve_price)
    }
}

/// Everything the node knows.
#[derive(Debug)]
pub struct ChainState {
    pub chain_id: u64,
    pub block_height: u64,
    pub timestamp: u64,
    accounts: Vec<Address>,
    native: HashMap<Address, U256>,
    auction: DutchAuction,
    erc20s: HashMap<Address, Erc20>,
    confidential: Erc20,
    receipts: HashMap<B256, TransactionReceipt>,
    nonce: u64,
}

impl ChainState {
    pub fn new(genesis: Genesis) -> Self {
        let ether = U256::from(10u64).pow(U256::from(18u64));
        let native = genesis
            .accounts
            .iter()
            .map(|a| (*a, U256::from(100u64) * ether))
            .collect();

        let mut auction_token = Erc20::new("Auction Token", "AUC", 0);
        auction_token.mint(AUCTION_ADDRESS, genesis.token_supply);

        let mut stable = Erc20::new("Test USD", "tUSD", 6);
        let mut confidential = Erc20::new("Confidential USD", "cUSD", 6);
        for account in &genesis.accounts {
            stable.mint(*account, U256::from(1_000_000_000u64));
            if *account != genesis.seller {
                confidential.mint(*account, U256::from(1_000_000_000u64));
            }
        }

        let mut erc20s = HashMap::new();
        erc20s.insert(AUCTION_TOKEN_ADDRESS, auction_token);
        erc20s.insert(STABLE_TOKEN_ADDRESS, stable);

        let auction = DutchAuction {
            seller: genesis.seller,
            start_price: genesis.start_price,
            reserve_price: genesis.reserve_price,
            discount_rate: genesis.discount_rate(),
            start_at: genesis.timestamp,
            expires_at: genesis.timestamp + genesis.auction_duration,
            amount: genesis.token_supply,
            tokens_left: genesis.token_supply,
            started: genesis.auction_started,
        };

        Self {
            chain_id: genesis.chain_id,
            block_height: 0,
            timestamp: genesis.timestamp,
            accounts: genesis.accounts,
            native,
            auction,
            erc20s,
            confidential,
            receipts: HashMap::new(),
            nonce: 0,
        }
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    pub fn native_balance(&self, owner: &Address) -> U256 {
        self.native.get(owner).copied().unwrap_or_default()
    }

    pub fn receipt(&self, hash: &B256) -> Option<&TransactionReceipt> {
        self.receipts.get(hash)
    }

    pub fn advance_block(&mut self) {
        self.mine_empty_block(BLOCK_TIME_SECS);
    }

    /// Mine a block `secs` after the previous one.
    pub fn mine_empty_block(&mut self, secs: u64) {
        self.block_height += 1;
        self.timestamp += secs;
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    pub fn start_auction(&mut self) {
        self.auction.started = true;
    }

    /// Execute a read-only call and return the ABI-encoded result.
    pub fn call(&self, to: Address, data: &[u8]) -> Result<Bytes, ChainError> {
        let out = if to == AUCTION_ADDRESS {
            self.call_auction(data)?
        } else if to == PAYMENT_TOKEN_ADDRESS {
            self.call_confidential(data)?
        } else if let Some(token) = self.erc20s.get(&to) {
            call_erc20(token, data)?
        } else {
            return Err(ChainError::UnknownContract(to));
        };
        Ok(out.into())
    }

    fn call_auction(&self, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        use IDutchAuction::IDutchAuctionCalls as Calls;
        use IDutchAuction::*;

        let a = &self.auction;
        let to_u256 = |ts: u64| U256::from(ts);
        Ok(match Calls::abi_decode(data, true)? {
            Calls::getPrice(_) => getPriceCall::abi_encode_returns(&(a.price_at(self.timestamp),)),
            Calls::tokensLeftReveal(_) => tokensLeftRevealCall::abi_encode_returns(&(a.tokens_left,)),
            Calls::startingPrice(_) => startingPriceCall::abi_encode_returns(&(a.start_price,)),
            Calls::discountRate(_) => discountRateCall::abi_encode_returns(&(a.discount_rate,)),
            Calls::startAt(_) => startAtCall::abi_encode_returns(&(to_u256(a.start_at),)),
            Calls::expiresAt(_) => expiresAtCall::abi_encode_returns(&(to_u256(a.expires_at),)),
            Calls::reservePrice(_) => reservePriceCall::abi_encode_returns(&(a.reserve_price,)),
            Calls::amount(_) => amountCall::abi_encode_returns(&(a.amount,)),
            Calls::auctionStart(_) => auctionStartCall::abi_encode_returns(&(a.started,)),
            Calls::seller(_) => sellerCall::abi_encode_returns(&(a.seller,)),
            Calls::token(_) => tokenCall::abi_encode_returns(&(AUCTION_TOKEN_ADDRESS,)),
            Calls::paymentToken(_) => paymentTokenCall::abi_encode_returns(&(PAYMENT_TOKEN_ADDRESS,)),
            Calls::bid(_) => return Err(ChainError::Revert("bid is not a view function".into())),
        })
    }

    fn call_confidential(&self, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        use IConfidentialERC20::IConfidentialERC20Calls as Calls;

        // Metadata getters share the plain ERC20 selectors.
        if let Ok(call) = Calls::abi_decode(data, true) {
            return match call {
                Calls::balanceOf(c) => Ok(IConfidentialERC20::balanceOfCall::abi_encode_returns(
                    &(self.confidential.balance(&c.owner),),
                )),
                Calls::transfer(_) => Err(ChainError::Revert("transfer is not a view function".into())),
            };
        }
        call_erc20(&self.confidential, data)
    }

    /// Execute `tx`, mine it into a new block and return its hash.
    ///
    /// Plain value transfers with insufficient funds are rejected outright;
    /// failing contract calls are mined with a reverted receipt.
    pub fn send_transaction(&mut self, tx: TransactionRequest) -> Result<B256, ChainError> {
        if !self.accounts.contains(&tx.from) {
            return Err(ChainError::UnknownAccount(tx.from));
        }
        let sender_balance = self.native_balance(&tx.from);
        if sender_balance < tx.value {
            return Err(ChainError::InsufficientFunds);
        }

        self.nonce += 1;
        let tx_hash = transaction_hash(&tx, self.nonce);
        self.advance_block();

        let outcome = self.execute(&tx);
        let status = match &outcome {
            Ok(()) => TxStatus::Success,
            Err(e) => {
                debug!(%tx_hash, error = %e, "Transaction reverted");
                TxStatus::Reverted
            }
        };
        if status == TxStatus::Success && !tx.value.is_zero() {
            self.native.insert(tx.from, sender_balance - tx.value);
            *self.native.entry(tx.to).or_default() += tx.value;
        }

        info!(%tx_hash, from = %tx.from, to = %tx.to, block = self.block_height, ?status, "Mined transaction");
        self.receipts.insert(
            tx_hash,
            TransactionReceipt {
                tx_hash,
                block_number: self.block_height,
                status,
            },
        );
        Ok(tx_hash)
    }

    fn execute(&mut self, tx: &TransactionRequest) -> Result<(), ChainError> {
        if tx.data.is_empty() {
            return Ok(());
        }
        if tx.to == AUCTION_ADDRESS {
            let call = IDutchAuction::bidCall::abi_decode(&tx.data, true)?;
            self.bid(tx.from, plaintext(call.encryptedValue))
        } else if tx.to == PAYMENT_TOKEN_ADDRESS {
            let call = IConfidentialERC20::transferCall::abi_decode(&tx.data, true)?;
            let amount = plaintext(call.encryptedAmount);
            self.confidential.transfer_or_nothing(tx.from, call.to, amount);
            Ok(())
        } else if let Some(token) = self.erc20s.get_mut(&tx.to) {
            let call = IERC20::transferCall::abi_decode(&tx.data, true)?;
            if token.transfer(tx.from, call.to, call.value) {
                Ok(())
            } else {
                Err(ChainError::Revert("transfer amount exceeds balance".into()))
            }
        } else {
            Err(ChainError::UnknownContract(tx.to))
        }
    }

    fn bid(&mut self, bidder: Address, payment: U256) -> Result<(), ChainError> {
        let auction = &self.auction;
        if !auction.started {
            return Err(ChainError::Revert("auction not started".into()));
        }
        if self.timestamp >= auction.expires_at {
            return Err(ChainError::Revert("auction expired".into()));
        }
        if auction.tokens_left.is_zero() {
            return Err(ChainError::Revert("sold out".into()));
        }

        let price = auction.price_at(self.timestamp);
        let wanted = if price.is_zero() {
            auction.tokens_left
        } else {
            payment / price
        };
        let bought = wanted.min(auction.tokens_left);
        let cost = bought * price;
        let seller = auction.seller;

        let paid = self.confidential.transfer_or_nothing(bidder, seller, cost);
        let bought = if paid == cost { bought } else { U256::ZERO };
        if let Some(token) = self.erc20s.get_mut(&AUCTION_TOKEN_ADDRESS) {
            token.transfer(AUCTION_ADDRESS, bidder, bought);
        }
        self.auction.tokens_left -= bought;
        info!(%bidder, %bought, %price, "Bid executed");
        Ok(())
    }
}

fn call_erc20(token: &Erc20, data: &[u8]) -> Result<Vec<u8>, ChainError> {
    use IERC20::IERC20Calls as Calls;
    use IERC20::*;

    Ok(match Calls::abi_decode(data, true)? {
        Calls::name(_) => nameCall::abi_encode_returns(&(token.name.clone(),)),
        Calls::symbol(_) => symbolCall::abi_encode_returns(&(token.symbol.clone(),)),
        Calls::decimals(_) => decimalsCall::abi_encode_returns(&(token.decimals,)),
        Calls::totalSupply(_) => totalSupplyCall::abi_encode_returns(&(token.total_supply,)),
        Calls::balanceOf(c) => balanceOfCall::abi_encode_returns(&(token.balance(&c.owner),)),
        Calls::transfer(_) => return Err(ChainError::Revert("transfer is not a view function".into())),
    })
}

/// Read a ciphertext handle as the amount it stands for.
fn plaintext(handle: B256) -> U256 {
    U256::from_be_bytes(handle.0)
}

fn transaction_hash(tx: &TransactionRequest, nonce: u64) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(tx.from.as_slice());
    hasher.update(tx.to.as_slice());
    hasher.update(tx.value.to_be_bytes::<32>());
    hasher.update(&tx.data);
    hasher.update(nonce.to_be_bytes());
    B256::from_slice(&hasher.finalize())
}
