//! Tokens held by the connected account.
//!
//! The store is owned by whoever drives the dashboard and is cleared on wallet
//! disconnect. Confidential balances stay masked until explicitly decrypted.
//! Confidential transfers run through the store's own [`Submitter`], so only
//! one of them is in flight at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dutch_contracts::abi::encode_erc20_transfer;
use dutch_types::{
    chain_name, Address, Bytes, Token, TokenConfig, TokenKind, TransactionRequest, TxHash,
    TxStatus, U256,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::context::Services;
use crate::error::ClientError;
use crate::notify::Notification;
use crate::sdk::SdkError;
use crate::submission::{wait_for_receipt, SubmissionRequest, Submitter};
use crate::units::{format_amount, parse_amount, parse_amount_u64};

/// Status of the most recent transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferState {
    pub tx_hash: Option<TxHash>,
    pub is_pending: bool,
    pub is_success: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Pending,
    Confirmed,
    Failed(String),
}

/// One transfer handed to the wallet, as listed in the dashboard history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRecord {
    pub token_id: String,
    pub symbol: String,
    pub to: Address,
    /// Amount as entered, in display units
    pub amount: String,
    pub tx_hash: TxHash,
    pub outcome: TransferOutcome,
    pub submitted_at: u64,
}

/// A failed send and whether the user was already notified of it.
struct SendFailure {
    error: ClientError,
    tx_hash: Option<TxHash>,
    reported: bool,
}

impl From<ClientError> for SendFailure {
    fn from(error: ClientError) -> Self {
        Self {
            error,
            tx_hash: None,
            reported: false,
        }
    }
}

pub struct TokenStore {
    services: Services,
    confidential_chain_id: u64,
    receipt_poll_interval: Duration,
    tokens: RwLock<Vec<Token>>,
    loading: AtomicBool,
    transfer: Mutex<TransferState>,
    history: Mutex<Vec<TransferRecord>>,
    submitter: Submitter,
}

impl TokenStore {
    pub fn new(services: Services, config: &ClientConfig) -> Self {
        Self {
            submitter: Submitter::new(services.clone(), config.receipt_poll_interval),
            services,
            confidential_chain_id: config.confidential_chain_id,
            receipt_poll_interval: config.receipt_poll_interval,
            tokens: RwLock::new(Vec::new()),
            loading: AtomicBool::new(false),
            transfer: Mutex::new(TransferState::default()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Install the configured token list, replacing whatever was loaded.
    pub fn load(&self, configs: Vec<TokenConfig>) {
        let tokens: Vec<Token> = configs.into_iter().map(Token::from_config).collect();
        info!(count = tokens.len(), "Loaded token list");
        *self.tokens.write() = tokens;
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.tokens.read().clone()
    }

    pub fn token(&self, id: &str) -> Option<Token> {
        self.tokens.read().iter().find(|t| t.id == id).cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn transfer_state(&self) -> TransferState {
        self.transfer.lock().clone()
    }

    /// Transfers submitted since the store was created or reset, oldest first.
    pub fn history(&self) -> Vec<TransferRecord> {
        self.history.lock().clone()
    }

    /// State machine confidential transfers run through.
    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Forget every token and transfer, e.g. on wallet disconnect.
    pub fn reset(&self) {
        self.tokens.write().clear();
        *self.transfer.lock() = TransferState::default();
        self.history.lock().clear();
        self.submitter.acknowledge();
        self.loading.store(false, Ordering::SeqCst);
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Token)) {
        if let Some(token) = self.tokens.write().iter_mut().find(|t| t.id == id) {
            f(token);
        }
    }

    /// Re-read native and ERC20 balances. Confidential balances are left alone.
    ///
    /// A failed read keeps that token's previous balance.
    pub async fn refresh_balances(&self) -> Result<(), ClientError> {
        let owner = self
            .services
            .wallet
            .account()
            .ok_or(ClientError::SignerNotInitialized)?;
        self.loading.store(true, Ordering::SeqCst);

        for token in self.tokens() {
            let balance = match (token.kind, token.address) {
                (TokenKind::Native, _) => self.services.tokens.native_balance(owner).await,
                (TokenKind::Erc20, Some(address)) => {
                    self.services.tokens.balance_of(address, owner).await
                }
                _ => continue,
            };
            match balance {
                Ok(value) => {
                    let display = format_amount(value, token.decimals);
                    self.update(&token.id, |t| t.balance = display);
                }
                Err(e) => warn!(token = %token.id, error = %e, "Failed to read balance"),
            }
        }

        self.loading.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Reveal a confidential balance.
    ///
    /// Unknown and plain tokens are ignored. A token already decrypted returns
    /// its cached balance without touching the network. On failure the
    /// balance stays masked.
    pub async fn decrypt_token(&self, id: &str) -> Result<Option<String>, ClientError> {
        let Some(token) = self.token(id) else {
            debug!(token = id, "Ignoring decrypt of unknown token");
            return Ok(None);
        };
        if !token.is_encrypted() {
            return Ok(None);
        }
        if token.is_decrypted {
            return Ok(Some(token.balance));
        }

        match self.reveal(&token).await {
            Ok(balance) => {
                let now = self.services.clock.now();
                self.update(id, |t| {
                    t.balance = balance.clone();
                    t.is_decrypted = true;
                    t.last_updated = Some(now);
                });
                info!(token = id, "Decrypted balance");
                Ok(Some(balance))
            }
            Err(e) => {
                warn!(token = id, error = %e, "Decryption failed");
                self.services
                    .notifier
                    .notify(Notification::error("Decryption failed", e.to_string()));
                Err(e)
            }
        }
    }

    async fn reveal(&self, token: &Token) -> Result<String, ClientError> {
        let signer = self
            .services
            .wallet
            .account()
            .ok_or(ClientError::SignerNotInitialized)?;
        let contract = token
            .address
            .ok_or_else(|| ClientError::MissingContract(token.id.clone()))?;

        let handle = self.services.tokens.balance_of(contract, signer).await?;
        if handle.is_zero() {
            return Err(ClientError::DecryptionFailure("Balance not found".into()));
        }

        match self.services.sdk.reencrypt_u64(signer, handle, contract).await {
            Ok(clear) => Ok(format_amount(U256::from(clear), token.decimals)),
            Err(SdkError::HandleNotInitialized) => Ok("0".to_string()),
            Err(e) => Err(ClientError::DecryptionFailure(e.to_string())),
        }
    }

    /// Submit a transfer of `amount` of token `id` to `to`.
    ///
    /// Returns true once the transaction is handed to the wallet; plain
    /// transfers settle later through [`track_transfer`](Self::track_transfer).
    /// Confidential transfers go through the submission state machine and
    /// return once confirmed. Failures are reported as notifications.
    pub async fn send_token(&self, id: &str, to: Address, amount: &str) -> bool {
        match self.send(id, to, amount).await {
            Ok(_) => true,
            Err(failure) => {
                warn!(token = id, error = %failure.error, "Transfer failed");
                if !failure.reported {
                    self.services.notifier.notify(Notification::error(
                        "Transfer failed",
                        failure.error.to_string(),
                    ));
                }
                *self.transfer.lock() = TransferState {
                    tx_hash: failure.tx_hash,
                    error: Some(failure.error.to_string()),
                    ..Default::default()
                };
                false
            }
        }
    }

    pub async fn try_send_token(
        &self,
        id: &str,
        to: Address,
        amount: &str,
    ) -> Result<TxHash, ClientError> {
        self.send(id, to, amount).await.map_err(|failure| failure.error)
    }

    async fn send(&self, id: &str, to: Address, amount: &str) -> Result<TxHash, SendFailure> {
        let token = self
            .token(id)
            .ok_or_else(|| ClientError::TokenNotFound(id.to_string()))?;
        let from = self
            .services
            .wallet
            .account()
            .ok_or(ClientError::SignerNotInitialized)?;

        let tx = match token.kind {
            TokenKind::Native => TransactionRequest {
                from,
                to,
                value: parse_amount(amount, token.decimals)?,
                data: Bytes::new(),
            },
            TokenKind::Erc20 => TransactionRequest {
                from,
                to: contract_of(&token)?,
                value: U256::ZERO,
                data: encode_erc20_transfer(to, parse_amount(amount, token.decimals)?),
            },
            TokenKind::Confidential => return self.send_confidential(&token, to, amount).await,
        };

        let tx_hash = self
            .services
            .wallet
            .send_transaction(tx)
            .await
            .map_err(|e| ClientError::TransactionRejectedOrFailed(e.to_string()))?;

        info!(token = id, %tx_hash, %to, "Transfer submitted");
        *self.transfer.lock() = TransferState {
            tx_hash: Some(tx_hash),
            is_pending: true,
            ..Default::default()
        };
        self.record(&token, to, amount, tx_hash, TransferOutcome::Pending);
        Ok(tx_hash)
    }

    async fn send_confidential(
        &self,
        token: &Token,
        to: Address,
        amount: &str,
    ) -> Result<TxHash, SendFailure> {
        let contract = contract_of(token)?;
        let chain_id = self.services.wallet.chain_id().await.map_err(ClientError::from)?;
        if chain_id != self.confidential_chain_id {
            return Err(ClientError::WrongNetwork {
                expected: chain_name(self.confidential_chain_id),
                connected: chain_name(chain_id),
            }
            .into());
        }
        let value = parse_amount_u64(amount, token.decimals)?;

        // A finished transfer is already reflected in the history.
        if self.submitter.phase().is_terminal() {
            self.submitter.acknowledge();
        }
        let request = SubmissionRequest::ConfidentialTransfer {
            token: contract,
            to,
            amount: value,
        };
        match self.submitter.submit(request).await {
            Ok(receipt) => {
                info!(
                    token = %token.id,
                    tx_hash = %receipt.tx_hash,
                    %to,
                    "Confidential transfer confirmed"
                );
                *self.transfer.lock() = TransferState {
                    tx_hash: Some(receipt.tx_hash),
                    is_success: true,
                    ..Default::default()
                };
                self.record(token, to, amount, receipt.tx_hash, TransferOutcome::Confirmed);
                Ok(receipt.tx_hash)
            }
            Err(ClientError::SubmissionInProgress) => {
                Err(ClientError::SubmissionInProgress.into())
            }
            Err(error) => {
                let tx_hash = self.submitter.phase().tx_hash();
                if let Some(tx_hash) = tx_hash {
                    let outcome = TransferOutcome::Failed(error.to_string());
                    self.record(token, to, amount, tx_hash, outcome);
                }
                Err(SendFailure {
                    error,
                    tx_hash,
                    reported: true,
                })
            }
        }
    }

    fn record(
        &self,
        token: &Token,
        to: Address,
        amount: &str,
        tx_hash: TxHash,
        outcome: TransferOutcome,
    ) {
        self.history.lock().push(TransferRecord {
            token_id: token.id.clone(),
            symbol: token.symbol.clone(),
            to,
            amount: amount.trim().to_string(),
            tx_hash,
            outcome,
            submitted_at: self.services.clock.now(),
        });
    }

    /// Wait for the last submitted transfer to be mined and record the outcome.
    pub async fn track_transfer(&self) -> TransferState {
        let current = self.transfer_state();
        let Some(tx_hash) = current.tx_hash.filter(|_| current.is_pending) else {
            return current;
        };

        let outcome = wait_for_receipt(
            self.services.wallet.as_ref(),
            tx_hash,
            self.receipt_poll_interval,
        )
        .await;
        let outcome = match outcome {
            Ok(receipt) if receipt.status == TxStatus::Success => TransferOutcome::Confirmed,
            Ok(_) => TransferOutcome::Failed("transaction reverted".into()),
            Err(e) => TransferOutcome::Failed(e.to_string()),
        };

        if let Some(record) = self
            .history
            .lock()
            .iter_mut()
            .rev()
            .find(|r| r.tx_hash == tx_hash)
        {
            record.outcome = outcome.clone();
        }

        let mut state = self.transfer.lock();
        if state.tx_hash != Some(tx_hash) {
            // A newer transfer replaced this one.
            return state.clone();
        }
        state.is_pending = false;
        match outcome {
            TransferOutcome::Confirmed => state.is_success = true,
            TransferOutcome::Failed(error) => state.error = Some(error),
            TransferOutcome::Pending => {}
        }
        state.clone()
    }
}

fn contract_of(token: &Token) -> Result<Address, ClientError> {
    token
        .address
        .ok_or_else(|| ClientError::MissingContract(token.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;
    use crate::submission::SubmissionPhase;
    use crate::testing::{services, FakeChain, FakeSdk, ERC20_TOKEN, PAYMENT_TOKEN, USER};
    use dutch_contracts::abi::encode_confidential_transfer;
    use dutch_types::{MASKED_BALANCE, MAINNET_CHAIN_ID};
    use std::sync::Arc;

    const RECIPIENT: Address = Address::repeat_byte(0x42);

    fn token_list() -> Vec<TokenConfig> {
        vec![
            TokenConfig {
                id: "eth".into(),
                symbol: "ETH".into(),
                name: "Ether".into(),
                kind: TokenKind::Native,
                address: None,
                decimals: None,
            },
            TokenConfig {
                id: "pln".into(),
                symbol: "PLN".into(),
                name: "Plain Token".into(),
                kind: TokenKind::Erc20,
                address: Some(ERC20_TOKEN),
                decimals: Some(6),
            },
            TokenConfig {
                id: "cusd".into(),
                symbol: "cUSD".into(),
                name: "Confidential USD".into(),
                kind: TokenKind::Confidential,
                address: Some(PAYMENT_TOKEN),
                decimals: Some(6),
            },
        ]
    }

    struct Fixture {
        chain: Arc<FakeChain>,
        sdk: Arc<FakeSdk>,
        notifier: Arc<MemoryNotifier>,
        store: Arc<TokenStore>,
    }

    fn fixture() -> Fixture {
        let chain = Arc::new(FakeChain::new());
        let sdk = Arc::new(FakeSdk::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let config = ClientConfig {
            receipt_poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let store = Arc::new(TokenStore::new(
            services(chain.clone(), sdk.clone(), notifier.clone()),
            &config,
        ));
        store.load(token_list());
        Fixture {
            chain,
            sdk,
            notifier,
            store,
        }
    }

    #[tokio::test]
    async fn test_refresh_leaves_confidential_masked() {
        let f = fixture();
        f.chain
            .set_native_balance(USER, U256::from(2_500_000_000_000_000_000u128));
        f.chain
            .set_balance(ERC20_TOKEN, USER, U256::from(12_340_000u64));
        f.chain.set_balance(PAYMENT_TOKEN, USER, U256::from(99u64));

        f.store.refresh_balances().await.unwrap();
        assert_eq!(f.store.token("eth").unwrap().balance, "2.5");
        assert_eq!(f.store.token("pln").unwrap().balance, "12.34");
        assert_eq!(f.store.token("cusd").unwrap().balance, MASKED_BALANCE);
        assert!(!f.store.is_loading());
    }

    #[tokio::test]
    async fn test_send_unknown_token_makes_no_call() {
        let f = fixture();
        assert!(!f.store.send_token("nope", RECIPIENT, "1").await);
        assert_eq!(f.chain.network_calls(), 0);
        assert_eq!(
            f.store.try_send_token("nope", RECIPIENT, "1").await,
            Err(ClientError::TokenNotFound("nope".into()))
        );
        assert_eq!(f.notifier.titles(), vec!["Transfer failed"]);
    }

    #[tokio::test]
    async fn test_confidential_send_requires_sepolia() {
        let f = fixture();
        f.chain.set_chain_id(MAINNET_CHAIN_ID);

        let err = f.store.try_send_token("cusd", RECIPIENT, "1").await.unwrap_err();
        assert_eq!(
            err,
            ClientError::WrongNetwork {
                expected: "Sepolia".into(),
                connected: "Ethereum".into(),
            }
        );
        assert!(f.chain.sent().is_empty());
        assert_eq!(f.sdk.encrypt_calls(), 0);
    }

    #[tokio::test]
    async fn test_confidential_send() {
        let f = fixture();
        assert!(f.store.send_token("cusd", RECIPIENT, "0.5").await);

        let sent = f.chain.sent();
        assert_eq!(sent[0].to, PAYMENT_TOKEN);
        assert_eq!(
            sent[0].data,
            encode_confidential_transfer(RECIPIENT, &FakeSdk::input_for(500_000))
        );
        assert_eq!(
            f.notifier.titles(),
            vec![
                "Encrypting Transaction",
                "Confidential Transfer Initiated",
                "Transfer Complete"
            ]
        );

        let state = f.store.transfer_state();
        assert!(state.is_success && !state.is_pending);
        assert_eq!(f.store.track_transfer().await, state);
        assert!(matches!(
            f.store.submitter().phase(),
            SubmissionPhase::Confirmed { amount: 500_000, .. }
        ));

        // The next transfer clears the finished one.
        assert!(f.store.send_token("cusd", RECIPIENT, "1").await);
        assert_eq!(f.store.history().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_confidential_sends_encrypt_once() {
        let f = fixture();
        let gate = f.sdk.hold_encryption();
        let mut phases = f.store.submitter().subscribe();

        let first = tokio::spawn({
            let store = f.store.clone();
            async move { store.send_token("cusd", RECIPIENT, "1").await }
        });
        phases.wait_for(|phase| phase.is_busy()).await.unwrap();

        assert_eq!(
            f.store.try_send_token("cusd", RECIPIENT, "2").await,
            Err(ClientError::SubmissionInProgress)
        );
        assert!(!f.store.send_token("cusd", RECIPIENT, "3").await);

        gate.add_permits(1);
        assert!(first.await.unwrap());
        assert_eq!(f.sdk.encrypt_calls(), 1);
        assert_eq!(f.chain.sent().len(), 1);
        assert_eq!(f.store.history().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_confidential_send_is_notified_once() {
        let f = fixture();
        f.chain.revert_next();

        assert!(!f.store.send_token("cusd", RECIPIENT, "1").await);
        assert_eq!(
            f.notifier.titles(),
            vec![
                "Encrypting Transaction",
                "Confidential Transfer Initiated",
                "Transaction Failed"
            ]
        );
        let state = f.store.transfer_state();
        assert_eq!(state.error.as_deref(), Some("transaction reverted"));
        assert!(state.tx_hash.is_some());

        let history = f.store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].outcome,
            TransferOutcome::Failed("transaction reverted".into())
        );
    }

    #[tokio::test]
    async fn test_history_lists_transfers() {
        let f = fixture();
        assert!(f.store.send_token("pln", RECIPIENT, "1").await);
        let first = f.store.transfer_state().tx_hash.unwrap();
        f.chain.revert_next();
        assert!(f.store.send_token("pln", RECIPIENT, " 2.5 ").await);

        let history = f.store.history();
        assert_eq!(history.len(), 2);
        assert!(history
            .iter()
            .all(|r| r.outcome == TransferOutcome::Pending));

        f.store.track_transfer().await;
        let history = f.store.history();
        assert_eq!(history[0].tx_hash, first);
        assert_eq!(history[0].outcome, TransferOutcome::Pending);
        assert_eq!(history[1].amount, "2.5");
        assert_eq!(history[1].symbol, "PLN");
        assert_eq!(history[1].to, RECIPIENT);
        assert_eq!(history[1].submitted_at, 1800);
        assert_eq!(
            history[1].outcome,
            TransferOutcome::Failed("transaction reverted".into())
        );

        // Failed before reaching the wallet: nothing to list.
        assert!(!f.store.send_token("pln", RECIPIENT, "-1").await);
        assert_eq!(f.store.history().len(), 2);
    }

    #[tokio::test]
    async fn test_plain_sends() {
        let f = fixture();
        f.store.try_send_token("eth", RECIPIENT, "1").await.unwrap();
        f.store.try_send_token("pln", RECIPIENT, "3").await.unwrap();

        let sent = f.chain.sent();
        assert_eq!(sent[0].to, RECIPIENT);
        assert_eq!(sent[0].value, U256::from(1_000_000_000_000_000_000u128));
        assert_eq!(sent[1].to, ERC20_TOKEN);
        assert_eq!(
            sent[1].data,
            encode_erc20_transfer(RECIPIENT, U256::from(3_000_000u64))
        );
    }

    #[tokio::test]
    async fn test_reverted_transfer_is_tracked() {
        let f = fixture();
        f.chain.revert_next();
        assert!(f.store.send_token("pln", RECIPIENT, "1").await);
        let state = f.store.track_transfer().await;
        assert!(!state.is_success);
        assert_eq!(state.error.as_deref(), Some("transaction reverted"));
    }

    #[tokio::test]
    async fn test_decrypt_is_idempotent() {
        let f = fixture();
        f.chain
            .set_balance(PAYMENT_TOKEN, USER, U256::from(1_250_000u64));

        assert_eq!(
            f.store.decrypt_token("cusd").await.unwrap(),
            Some("1.25".to_string())
        );
        let token = f.store.token("cusd").unwrap();
        assert!(token.is_decrypted);
        assert_eq!(token.last_updated, Some(1800));

        let calls = f.chain.network_calls();
        assert_eq!(
            f.store.decrypt_token("cusd").await.unwrap(),
            Some("1.25".to_string())
        );
        assert_eq!(f.chain.network_calls(), calls);
        assert_eq!(f.sdk.reencrypt_calls(), 1);
    }

    #[tokio::test]
    async fn test_decrypt_failure_keeps_mask() {
        let f = fixture();
        f.chain.set_balance(PAYMENT_TOKEN, USER, U256::from(5u64));
        f.sdk
            .fail_reencryption(SdkError::Failed("user denied signature".into()));

        let err = f.store.decrypt_token("cusd").await.unwrap_err();
        assert!(matches!(err, ClientError::DecryptionFailure(_)));
        let token = f.store.token("cusd").unwrap();
        assert_eq!(token.balance, MASKED_BALANCE);
        assert!(!token.is_decrypted);
        assert_eq!(f.notifier.all()[0].title, "Decryption failed");
    }

    #[tokio::test]
    async fn test_uninitialized_handle_reads_as_zero() {
        let f = fixture();
        f.chain.set_balance(PAYMENT_TOKEN, USER, U256::from(5u64));
        f.sdk.fail_reencryption(SdkError::HandleNotInitialized);

        assert_eq!(
            f.store.decrypt_token("cusd").await.unwrap(),
            Some("0".to_string())
        );
        assert!(f.store.token("cusd").unwrap().is_decrypted);
    }

    #[tokio::test]
    async fn test_decrypt_ignores_plain_and_unknown_tokens() {
        let f = fixture();
        assert_eq!(f.store.decrypt_token("pln").await.unwrap(), None);
        assert_eq!(f.store.decrypt_token("nope").await.unwrap(), None);
        assert_eq!(f.chain.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_decrypt_without_signer() {
        let f = fixture();
        f.chain.set_account(None);
        assert_eq!(
            f.store.decrypt_token("cusd").await.unwrap_err(),
            ClientError::SignerNotInitialized
        );
    }

    #[tokio::test]
    async fn test_reset_clears_tokens() {
        let f = fixture();
        f.store.send_token("pln", RECIPIENT, "1").await;
        f.store.reset();
        assert!(f.store.tokens().is_empty());
        assert!(f.store.history().is_empty());
        assert_eq!(f.store.transfer_state(), TransferState::default());
    }
}
