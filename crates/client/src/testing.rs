//! In-memory stand-ins for the chain, the wallet and the encryption SDK.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dutch_contracts::{AuctionReader, ContractError, TokenReader, Wallet};
use dutch_types::{
    Address, AuctionLiveState, AuctionParameters, Bytes, EncryptedInput, TransactionReceipt,
    TransactionRequest, TxHash, TxStatus, B256, SEPOLIA_CHAIN_ID, U256,
};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::clock::ManualClock;
use crate::context::Services;
use crate::notify::Notifier;
use crate::sdk::{ConfidentialSdk, SdkError};

pub const AUCTION: Address = Address::repeat_byte(0xa1);
pub const SELLER: Address = Address::repeat_byte(0x5e);
pub const USER: Address = Address::repeat_byte(0xaa);
pub const AUCTION_TOKEN: Address = Address::repeat_byte(0x70);
/// Confidential token bids are paid in
pub const PAYMENT_TOKEN: Address = Address::repeat_byte(0xc0);
pub const ERC20_TOKEN: Address = Address::repeat_byte(0xe2);

/// Wire every role to the given fakes, with a clock stopped at t=1800.
pub fn services(
    chain: Arc<FakeChain>,
    sdk: Arc<FakeSdk>,
    notifier: Arc<dyn Notifier>,
) -> Services {
    Services::from_chain(chain, sdk, notifier, Arc::new(ManualClock::new(1800)))
}

/// Parameters of the auction every [`FakeChain`] starts with.
///
/// One hour long from t=0, 1000 tokens, price falling from 100 by 1/s with a
/// reserve of 10.
pub fn default_auction() -> AuctionParameters {
    AuctionParameters {
        address: AUCTION,
        start_price: U256::from(100u64),
        reserve_price: U256::from(10u64),
        discount_rate: U256::from(1u64),
        start_at: 0,
        expires_at: 3600,
        initial_token_supply: U256::from(1000u64),
        seller: SELLER,
        auction_token: AUCTION_TOKEN,
        payment_token: PAYMENT_TOKEN,
    }
}

#[derive(Clone, Debug)]
struct TokenMeta {
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: U256,
}

#[derive(Debug)]
struct ChainState {
    chain_id: u64,
    account: Option<Address>,
    block: u64,
    auction: AuctionParameters,
    live: AuctionLiveState,
    tokens: HashMap<Address, TokenMeta>,
    balances: HashMap<(Address, Address), U256>,
    native: HashMap<Address, U256>,
    sent: Vec<TransactionRequest>,
    receipts: HashMap<TxHash, TransactionReceipt>,
    unmined_polls: HashMap<TxHash, u32>,
    receipt_delay: u32,
    reject_with: Option<String>,
    revert_next: bool,
    fail_reads: bool,
}

/// A chain holding one auction and a handful of tokens.
///
/// Transactions are recorded, not executed. Every trait call other than
/// `Wallet::account` counts as a network call.
#[derive(Debug)]
pub struct FakeChain {
    state: Mutex<ChainState>,
    network_calls: AtomicUsize,
    price_reads: AtomicUsize,
    receipt_polls: AtomicUsize,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChain {
    pub fn new() -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(
            PAYMENT_TOKEN,
            TokenMeta {
                name: "Confidential USD".into(),
                symbol: "cUSD".into(),
                decimals: 6,
                total_supply: U256::from(1_000_000_000u64),
            },
        );
        tokens.insert(
            AUCTION_TOKEN,
            TokenMeta {
                name: "Auction Token".into(),
                symbol: "AUC".into(),
                decimals: 18,
                total_supply: U256::from(1000u64),
            },
        );
        tokens.insert(
            ERC20_TOKEN,
            TokenMeta {
                name: "Plain Token".into(),
                symbol: "PLN".into(),
                decimals: 6,
                total_supply: U256::from(1_000_000_000u64),
            },
        );

        Self {
            state: Mutex::new(ChainState {
                chain_id: SEPOLIA_CHAIN_ID,
                account: Some(USER),
                block: 1,
                auction: default_auction(),
                live: AuctionLiveState {
                    current_price: U256::from(55u64),
                    tokens_left: U256::from(1000u64),
                    has_started: true,
                },
                tokens,
                balances: HashMap::new(),
                native: HashMap::new(),
                sent: Vec::new(),
                receipts: HashMap::new(),
                unmined_polls: HashMap::new(),
                receipt_delay: 0,
                reject_with: None,
                revert_next: false,
                fail_reads: false,
            }),
            network_calls: AtomicUsize::new(0),
            price_reads: AtomicUsize::new(0),
            receipt_polls: AtomicUsize::new(0),
        }
    }

    // ---- setup ----

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state.lock().chain_id = chain_id;
    }

    pub fn set_account(&self, account: Option<Address>) {
        self.state.lock().account = account;
    }

    pub fn set_tokens_left(&self, tokens_left: u64) {
        self.state.lock().live.tokens_left = U256::from(tokens_left);
    }

    pub fn set_started(&self, started: bool) {
        self.state.lock().live.has_started = started;
    }

    /// ERC20 balance, or the balance handle for a confidential token.
    pub fn set_balance(&self, token: Address, owner: Address, value: U256) {
        self.state.lock().balances.insert((token, owner), value);
    }

    pub fn set_native_balance(&self, owner: Address, value: U256) {
        self.state.lock().native.insert(owner, value);
    }

    /// Fail every send with `message`.
    pub fn reject_sends(&self, message: &str) {
        self.state.lock().reject_with = Some(message.to_string());
    }

    /// Mine the next transaction with a reverted status.
    pub fn revert_next(&self) {
        self.state.lock().revert_next = true;
    }

    /// Report new transactions as unmined for `polls` receipt queries.
    pub fn delay_receipts(&self, polls: u32) {
        self.state.lock().receipt_delay = polls;
    }

    /// Make every contract read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    // ---- inspection ----

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.state.lock().sent.clone()
    }

    pub fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }

    /// Number of `getPrice` reads, one per live-state refresh.
    pub fn price_reads(&self) -> usize {
        self.price_reads.load(Ordering::SeqCst)
    }

    pub fn receipt_polls(&self) -> usize {
        self.receipt_polls.load(Ordering::SeqCst)
    }

    fn read<T>(&self, f: impl FnOnce(&ChainState) -> T) -> Result<T, ContractError> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.fail_reads {
            return Err(ContractError::Rpc("connection refused".into()));
        }
        Ok(f(&state))
    }

    fn token_meta(&self, token: Address) -> Result<TokenMeta, ContractError> {
        self.read(|s| s.tokens.get(&token).cloned())?
            .ok_or_else(|| ContractError::InvalidResponse(format!("no contract at {}", token)))
    }
}

#[async_trait]
impl AuctionReader for FakeChain {
    async fn get_price(&self, _auction: Address) -> Result<U256, ContractError> {
        self.price_reads.fetch_add(1, Ordering::SeqCst);
        self.read(|s| s.live.current_price)
    }

    async fn tokens_left_reveal(&self, _auction: Address) -> Result<U256, ContractError> {
        self.read(|s| s.live.tokens_left)
    }

    async fn starting_price(&self, _auction: Address) -> Result<U256, ContractError> {
        self.read(|s| s.auction.start_price)
    }

    async fn discount_rate(&self, _auction: Address) -> Result<U256, ContractError> {
        self.read(|s| s.auction.discount_rate)
    }

    async fn start_at(&self, _auction: Address) -> Result<u64, ContractError> {
        self.read(|s| s.auction.start_at)
    }

    async fn expires_at(&self, _auction: Address) -> Result<u64, ContractError> {
        self.read(|s| s.auction.expires_at)
    }

    async fn reserve_price(&self, _auction: Address) -> Result<U256, ContractError> {
        self.read(|s| s.auction.reserve_price)
    }

    async fn amount(&self, _auction: Address) -> Result<U256, ContractError> {
        self.read(|s| s.auction.initial_token_supply)
    }

    async fn auction_start(&self, _auction: Address) -> Result<bool, ContractError> {
        self.read(|s| s.live.has_started)
    }

    async fn seller(&self, _auction: Address) -> Result<Address, ContractError> {
        self.read(|s| s.auction.seller)
    }

    async fn token(&self, _auction: Address) -> Result<Address, ContractError> {
        self.read(|s| s.auction.auction_token)
    }

    async fn payment_token(&self, _auction: Address) -> Result<Address, ContractError> {
        self.read(|s| s.auction.payment_token)
    }
}

#[async_trait]
impl TokenReader for FakeChain {
    async fn name(&self, token: Address) -> Result<String, ContractError> {
        Ok(self.token_meta(token)?.name)
    }

    async fn symbol(&self, token: Address) -> Result<String, ContractError> {
        Ok(self.token_meta(token)?.symbol)
    }

    async fn decimals(&self, token: Address) -> Result<u8, ContractError> {
        Ok(self.token_meta(token)?.decimals)
    }

    async fn total_supply(&self, token: Address) -> Result<U256, ContractError> {
        Ok(self.token_meta(token)?.total_supply)
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ContractError> {
        self.read(|s| s.balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ContractError> {
        self.read(|s| s.native.get(&owner).copied().unwrap_or_default())
    }
}

#[async_trait]
impl Wallet for FakeChain {
    fn account(&self) -> Option<Address> {
        self.state.lock().account
    }

    async fn chain_id(&self) -> Result<u64, ContractError> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().chain_id)
    }

    async fn block_number(&self) -> Result<u64, ContractError> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().block)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ContractError> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if let Some(message) = &state.reject_with {
            return Err(ContractError::Rpc(message.clone()));
        }

        state.sent.push(tx);
        state.block += 1;
        let tx_hash = B256::left_padding_from(&(state.sent.len() as u64).to_be_bytes());
        let status = if std::mem::take(&mut state.revert_next) {
            TxStatus::Reverted
        } else {
            TxStatus::Success
        };
        let receipt = TransactionReceipt {
            tx_hash,
            block_number: state.block,
            status,
        };
        state.receipts.insert(tx_hash, receipt);
        let delay = state.receipt_delay;
        state.unmined_polls.insert(tx_hash, delay);
        Ok(tx_hash)
    }

    async fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ContractError> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if let Some(remaining) = state.unmined_polls.get_mut(&hash) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(state.receipts.get(&hash).cloned())
    }
}

/// Encryption SDK double.
///
/// Encrypting `v` yields the handle `v` with a fixed proof; reencrypting a
/// handle returns its numeric value.
#[derive(Debug, Default)]
pub struct FakeSdk {
    encrypt_calls: AtomicUsize,
    reencrypt_calls: AtomicUsize,
    encrypt_error: Mutex<Option<SdkError>>,
    reencrypt_error: Mutex<Option<SdkError>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeSdk {
    pub fn new() -> Self {
        Self::default()
    }

    /// The input produced for `value`.
    pub fn input_for(value: u64) -> EncryptedInput {
        EncryptedInput {
            handle: B256::left_padding_from(&value.to_be_bytes()),
            input_proof: Bytes::from_static(&[0xab; 4]),
        }
    }

    pub fn fail_encryption(&self, error: SdkError) {
        *self.encrypt_error.lock() = Some(error);
    }

    pub fn fail_reencryption(&self, error: SdkError) {
        *self.reencrypt_error.lock() = Some(error);
    }

    /// Block encryption until a permit is added to the returned semaphore.
    pub fn hold_encryption(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn reencrypt_calls(&self) -> usize {
        self.reencrypt_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfidentialSdk for FakeSdk {
    async fn encrypt_u64(
        &self,
        value: u64,
        _contract: Address,
        _user: Address,
    ) -> Result<EncryptedInput, SdkError> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| SdkError::Failed(e.to_string()))?
                .forget();
        }
        if let Some(error) = self.encrypt_error.lock().clone() {
            return Err(error);
        }
        Ok(Self::input_for(value))
    }

    async fn reencrypt_u64(
        &self,
        _signer: Address,
        handle: U256,
        _contract: Address,
    ) -> Result<u64, SdkError> {
        self.reencrypt_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.reencrypt_error.lock().clone() {
            return Err(error);
        }
        if handle.is_zero() {
            return Err(SdkError::HandleNotInitialized);
        }
        u64::try_from(handle).map_err(|e| SdkError::Failed(e.to_string()))
    }
}
