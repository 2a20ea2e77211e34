//! Core type definitions for the confidential Dutch auction client.
//!
//! This crate provides the shared data structures used across the workspace:
//! auction parameters and live state as read from the auction contract, the
//! token model held by the token store, and the encrypted inputs and receipts
//! exchanged with the wallet and the encryption SDK.

use serde::{Deserialize, Serialize};

pub use alloy_primitives::{Address, Bytes, B256, U256};

/// Transaction hash as returned by `eth_sendTransaction`.
pub type TxHash = B256;

/// Placeholder shown for a confidential balance that has not been decrypted.
pub const MASKED_BALANCE: &str = "•••••••";

// =========================
// CHAINS
// =========================

/// Chain id of the Ethereum mainnet.
pub const MAINNET_CHAIN_ID: u64 = 1;

/// Chain id of the Sepolia testnet, the only chain hosting confidential tokens.
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Chains the client knows by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnownChain {
    Mainnet,
    Sepolia,
    Polygon,
    Optimism,
    Arbitrum,
}

impl KnownChain {
    /// Look up a chain by id.
    pub fn from_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            MAINNET_CHAIN_ID => Some(Self::Mainnet),
            SEPOLIA_CHAIN_ID => Some(Self::Sepolia),
            137 => Some(Self::Polygon),
            10 => Some(Self::Optimism),
            42_161 => Some(Self::Arbitrum),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mainnet => "Ethereum",
            Self::Sepolia => "Sepolia",
            Self::Polygon => "Polygon",
            Self::Optimism => "Optimism",
            Self::Arbitrum => "Arbitrum One",
        }
    }
}

/// Human readable name for a chain id, falling back to the raw id.
pub fn chain_name(chain_id: u64) -> String {
    KnownChain::from_id(chain_id)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| format!("chain {}", chain_id))
}

// =========================
// AUCTION TYPES
// =========================

/// Parameters of a Dutch auction instance.
///
/// Read once from the contract and never mutated; a refresh replaces the whole
/// value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionParameters {
    /// Auction contract address
    pub address: Address,
    /// Price at `start_at`
    pub start_price: U256,
    /// Floor the price never drops below
    pub reserve_price: U256,
    /// Price decrease per second
    pub discount_rate: U256,
    /// Unix seconds
    pub start_at: u64,
    /// Unix seconds
    pub expires_at: u64,
    /// Tokens offered when the auction opened
    pub initial_token_supply: U256,
    pub seller: Address,
    /// Token being sold
    pub auction_token: Address,
    /// Token bids are paid in
    pub payment_token: Address,
}

impl AuctionParameters {
    /// Auction length in seconds.
    pub fn duration_secs(&self) -> u64 {
        self.expires_at.saturating_sub(self.start_at)
    }

    /// Whether `account` created this auction.
    pub fn is_seller(&self, account: &Address) -> bool {
        self.seller == *account
    }
}

/// Values that move while the auction runs.
///
/// Advisory only: nothing here is settlement-final until the next contract read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionLiveState {
    pub current_price: U256,
    pub tokens_left: U256,
    pub has_started: bool,
}

impl AuctionLiveState {
    pub fn is_sold_out(&self) -> bool {
        self.has_started && self.tokens_left.is_zero()
    }
}

/// A bid placed from this client and confirmed on-chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRecord {
    pub bidder: Address,
    /// Plaintext amount (only known locally, encrypted on-chain)
    pub amount: u64,
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// Advisory price observed when the bid was submitted
    pub price_at_submit: U256,
}

// =========================
// TOKENS
// =========================

/// How a token's balance is held and transferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// The chain's native currency
    Native,
    /// Plain ERC20
    Erc20,
    /// Confidential ERC20 with encrypted balances
    Confidential,
}

/// Static description of a token, as configured by the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub kind: TokenKind,
    /// Contract address; absent for the native currency
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub decimals: Option<u8>,
}

/// A token held by the connected account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub symbol: String,
    pub name: String,
    /// Display string; [`MASKED_BALANCE`] until decrypted for confidential tokens
    pub balance: String,
    pub kind: TokenKind,
    pub is_decrypted: bool,
    pub address: Option<Address>,
    pub decimals: u8,
    /// Unix seconds of the last successful decryption
    pub last_updated: Option<u64>,
}

impl Token {
    /// Decimals assumed when the configuration leaves them out.
    pub const DEFAULT_DECIMALS: u8 = 18;

    /// Build a token from configuration with an initial balance.
    ///
    /// Confidential tokens always start masked.
    pub fn from_config(config: TokenConfig) -> Self {
        let balance = match config.kind {
            TokenKind::Confidential => MASKED_BALANCE.to_string(),
            _ => "0".to_string(),
        };
        Self {
            id: config.id,
            symbol: config.symbol,
            name: config.name,
            balance,
            kind: config.kind,
            is_decrypted: false,
            address: config.address,
            decimals: config.decimals.unwrap_or(Self::DEFAULT_DECIMALS),
            last_updated: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.kind == TokenKind::Confidential
    }

    pub fn is_masked(&self) -> bool {
        self.is_encrypted() && !self.is_decrypted
    }
}

// =========================
// TRANSACTIONS
// =========================

/// Ciphertext handle and proof produced by the encryption SDK.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    /// `einput` handle passed as `bytes32`
    pub handle: B256,
    pub input_proof: Bytes,
}

/// A transaction as handed to the wallet for signing and broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Outcome recorded in a mined transaction's receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Reverted,
}

/// Minimal transaction receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub status: TxStatus,
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Abbreviate an address as `0x1234...abcd`.
pub fn short_address(address: &Address) -> String {
    let full = format!("{:#x}", address);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Lossy conversion of an on-chain integer for display and charting.
pub fn u256_to_f64(value: U256) -> f64 {
    u128::try_from(value).map(|v| v as f64).unwrap_or(f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidential_token_starts_masked() {
        let token = Token::from_config(TokenConfig {
            id: "ctok".into(),
            symbol: "cTOK".into(),
            name: "Confidential Token".into(),
            kind: TokenKind::Confidential,
            address: Some(Address::repeat_byte(7)),
            decimals: Some(6),
        });

        assert_eq!(token.balance, MASKED_BALANCE);
        assert!(token.is_encrypted());
        assert!(token.is_masked());
        assert_eq!(token.decimals, 6);
    }

    #[test]
    fn test_default_decimals() {
        let token = Token::from_config(TokenConfig {
            id: "eth".into(),
            symbol: "ETH".into(),
            name: "Ether".into(),
            kind: TokenKind::Native,
            address: None,
            decimals: None,
        });

        assert_eq!(token.decimals, 18);
        assert_eq!(token.balance, "0");
        assert!(!token.is_masked());
    }

    #[test]
    fn test_token_config_from_json() {
        let json = r#"{
            "id": "usdc",
            "symbol": "USDC",
            "name": "USD Coin",
            "kind": "erc20",
            "address": "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238",
            "decimals": 6
        }"#;
        let config: TokenConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind, TokenKind::Erc20);
        assert_eq!(config.decimals, Some(6));
        assert!(config.address.is_some());
    }

    #[test]
    fn test_short_address() {
        let addr = Address::repeat_byte(0xab);
        assert_eq!(short_address(&addr), "0xabab...abab");
    }

    #[test]
    fn test_known_chains() {
        assert_eq!(KnownChain::from_id(SEPOLIA_CHAIN_ID), Some(KnownChain::Sepolia));
        assert_eq!(KnownChain::from_id(42_161), Some(KnownChain::Arbitrum));
        assert_eq!(chain_name(999), "chain 999");
    }

    #[test]
    fn test_sold_out_requires_started() {
        let mut state = AuctionLiveState::default();
        assert!(!state.is_sold_out());
        state.has_started = true;
        assert!(state.is_sold_out());
        state.tokens_left = U256::from(5);
        assert!(!state.is_sold_out());
    }
}
