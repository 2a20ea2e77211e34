//! Encrypted bid and transfer submission.
//!
//! A [`Submitter`] walks one request at a time through
//! `Idle -> Encrypting -> Pending -> Confirming -> Confirmed`, dropping into
//! `Failed` from any step. Terminal phases stay visible until the caller
//! acknowledges them.

use std::time::Duration;

use dutch_contracts::abi::{encode_bid, encode_confidential_transfer};
use dutch_contracts::{ContractError, Wallet};
use dutch_types::{
    Address, Bytes, EncryptedInput, TransactionReceipt, TransactionRequest, TxHash, TxStatus, U256,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::context::Services;
use crate::error::ClientError;
use crate::notify::Notification;

/// What to submit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionRequest {
    /// `bid(encryptedValue, inputProof)` on an auction
    Bid { auction: Address, amount: u64 },
    /// `transfer(to, encryptedAmount, inputProof)` on a confidential token
    ConfidentialTransfer {
        token: Address,
        to: Address,
        amount: u64,
    },
}

impl SubmissionRequest {
    pub fn amount(&self) -> u64 {
        match self {
            Self::Bid { amount, .. } | Self::ConfidentialTransfer { amount, .. } => *amount,
        }
    }

    /// Contract the amount is encrypted for and the transaction is sent to.
    pub fn contract(&self) -> Address {
        match self {
            Self::Bid { auction, .. } => *auction,
            Self::ConfidentialTransfer { token, .. } => *token,
        }
    }

    fn calldata(&self, input: &EncryptedInput) -> Bytes {
        match self {
            Self::Bid { .. } => encode_bid(input),
            Self::ConfidentialTransfer { to, .. } => encode_confidential_transfer(*to, input),
        }
    }

    /// Shown once the wallet has broadcast the transaction.
    fn broadcast_notification(&self) -> Notification {
        match self {
            Self::Bid { .. } => {
                Notification::info("Confirming Transaction", "Waiting for confirmation...")
            }
            Self::ConfidentialTransfer { .. } => Notification::info(
                "Confidential Transfer Initiated",
                "Processing encrypted transaction. This may take longer than regular transfers.",
            ),
        }
    }

    fn success_message(&self) -> String {
        match self {
            Self::Bid { amount, .. } => format!("Successfully bid {}", amount),
            Self::ConfidentialTransfer { amount, to, .. } => {
                format!("Successfully transferred {} to {}", amount, to)
            }
        }
    }
}

/// Where a submission currently stands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SubmissionPhase {
    #[default]
    Idle,
    /// Waiting on the encryption SDK
    Encrypting { amount: u64 },
    /// Handed to the wallet, no hash yet
    Pending { amount: u64 },
    /// Broadcast, waiting for the receipt
    Confirming { amount: u64, tx_hash: TxHash },
    Confirmed {
        amount: u64,
        tx_hash: TxHash,
        receipt: TransactionReceipt,
    },
    Failed {
        amount: u64,
        tx_hash: Option<TxHash>,
        error: ClientError,
    },
}

impl SubmissionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::Failed { .. })
    }

    /// True while a request is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Encrypting { .. } | Self::Pending { .. } | Self::Confirming { .. }
        )
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::Confirming { tx_hash, .. } | Self::Confirmed { tx_hash, .. } => Some(*tx_hash),
            Self::Failed { tx_hash, .. } => *tx_hash,
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Encrypting { .. } => "encrypting",
            Self::Pending { .. } => "pending",
            Self::Confirming { .. } => "confirming",
            Self::Confirmed { .. } => "confirmed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Runs submissions one at a time.
pub struct Submitter {
    services: Services,
    receipt_poll_interval: Duration,
    phase: Mutex<SubmissionPhase>,
    updates: watch::Sender<SubmissionPhase>,
}

impl Submitter {
    pub fn new(services: Services, receipt_poll_interval: Duration) -> Self {
        let (updates, _) = watch::channel(SubmissionPhase::Idle);
        Self {
            services,
            receipt_poll_interval,
            phase: Mutex::new(SubmissionPhase::Idle),
            updates,
        }
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.phase.lock().is_busy()
    }

    /// Receive every phase change.
    pub fn subscribe(&self) -> watch::Receiver<SubmissionPhase> {
        self.updates.subscribe()
    }

    /// Return to `Idle` after a terminal phase. Returns false if a submission
    /// is still running.
    pub fn acknowledge(&self) -> bool {
        let mut phase = self.phase.lock();
        if phase.is_busy() {
            return false;
        }
        *phase = SubmissionPhase::Idle;
        self.updates.send_replace(SubmissionPhase::Idle);
        true
    }

    /// Encrypt, send and confirm `request`.
    ///
    /// Only starts from `Idle`; otherwise fails with `SubmissionInProgress`
    /// without touching the SDK or the wallet. Every other failure leaves the
    /// submitter in `Failed` until acknowledged. Dropping the returned future
    /// mid-flight also ends in `Failed`.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<TransactionReceipt, ClientError> {
        let user = self
            .services
            .wallet
            .account()
            .ok_or(ClientError::SignerNotInitialized)?;
        let amount = request.amount();
        let contract = request.contract();

        let _in_flight = self.claim(amount)?;
        info!(%contract, amount, "Encrypting submission");
        self.services.notifier.notify(Notification::info(
            "Encrypting Transaction",
            "Generating encrypted proof for your transaction...",
        ));

        let input = match self.services.sdk.encrypt_u64(amount, contract, user).await {
            Ok(input) => input,
            Err(e) => return Err(self.fail(amount, None, ClientError::EncryptionFailure(e.to_string()))),
        };

        self.set(SubmissionPhase::Pending { amount });
        let tx = TransactionRequest {
            from: user,
            to: contract,
            value: U256::ZERO,
            data: request.calldata(&input),
        };
        let tx_hash = match self.services.wallet.send_transaction(tx).await {
            Ok(hash) => hash,
            Err(e) => return Err(self.fail(amount, None, rejected(e))),
        };

        info!(%tx_hash, "Submission broadcast");
        self.set(SubmissionPhase::Confirming { amount, tx_hash });
        self.services
            .notifier
            .notify(request.broadcast_notification());

        let receipt = match wait_for_receipt(
            self.services.wallet.as_ref(),
            tx_hash,
            self.receipt_poll_interval,
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.fail(amount, Some(tx_hash), rejected(e))),
        };

        if receipt.status == TxStatus::Reverted {
            return Err(self.fail(
                amount,
                Some(tx_hash),
                ClientError::TransactionRejectedOrFailed("transaction reverted".into()),
            ));
        }

        info!(%tx_hash, block = receipt.block_number, "Submission confirmed");
        self.set(SubmissionPhase::Confirmed {
            amount,
            tx_hash,
            receipt: receipt.clone(),
        });
        self.services
            .notifier
            .notify(Notification::success("Transfer Complete", request.success_message()));
        Ok(receipt)
    }

    /// Atomically move `Idle -> Encrypting`.
    fn claim(&self, amount: u64) -> Result<InFlight<'_>, ClientError> {
        let mut phase = self.phase.lock();
        if *phase != SubmissionPhase::Idle {
            debug!(phase = phase.name(), "Rejecting submission while another is active");
            return Err(ClientError::SubmissionInProgress);
        }
        *phase = SubmissionPhase::Encrypting { amount };
        self.updates.send_replace(phase.clone());
        Ok(InFlight {
            submitter: self,
            amount,
        })
    }

    fn set(&self, next: SubmissionPhase) {
        let mut phase = self.phase.lock();
        *phase = next;
        self.updates.send_replace(phase.clone());
    }

    fn fail(&self, amount: u64, tx_hash: Option<TxHash>, error: ClientError) -> ClientError {
        warn!(error = %error, ?tx_hash, "Submission failed");
        self.set(SubmissionPhase::Failed {
            amount,
            tx_hash,
            error: error.clone(),
        });
        self.services
            .notifier
            .notify(Notification::error("Transaction Failed", error.to_string()));
        error
    }
}

/// Held for the lifetime of a claimed submission.
///
/// If the submission is abandoned before reaching a terminal phase, the
/// submitter falls back to `Failed` so it can be acknowledged and reused.
struct InFlight<'a> {
    submitter: &'a Submitter,
    amount: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut phase = self.submitter.phase.lock();
        if !phase.is_busy() {
            return;
        }
        let tx_hash = phase.tx_hash();
        warn!(phase = phase.name(), ?tx_hash, "Submission cancelled");
        *phase = SubmissionPhase::Failed {
            amount: self.amount,
            tx_hash,
            error: ClientError::TransactionRejectedOrFailed("cancelled".into()),
        };
        self.submitter.updates.send_replace(phase.clone());
    }
}

fn rejected(e: ContractError) -> ClientError {
    ClientError::TransactionRejectedOrFailed(e.to_string())
}

/// Poll for the receipt of `tx_hash` until it is mined.
pub async fn wait_for_receipt(
    wallet: &dyn Wallet,
    tx_hash: TxHash,
    poll_interval: Duration,
) -> Result<TransactionReceipt, ContractError> {
    loop {
        if let Some(receipt) = wallet.transaction_receipt(tx_hash).await? {
            return Ok(receipt);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{services, FakeChain, FakeSdk, AUCTION, PAYMENT_TOKEN};
    use crate::notify::{MemoryNotifier, NotificationLevel};
    use crate::sdk::SdkError;
    use std::sync::Arc;

    fn submitter(chain: &Arc<FakeChain>, sdk: &Arc<FakeSdk>) -> (Arc<Submitter>, Arc<MemoryNotifier>) {
        let notifier = Arc::new(MemoryNotifier::new());
        let services = services(chain.clone(), sdk.clone(), notifier.clone());
        (
            Arc::new(Submitter::new(services, Duration::from_millis(10))),
            notifier,
        )
    }

    fn bid(amount: u64) -> SubmissionRequest {
        SubmissionRequest::Bid {
            auction: AUCTION,
            amount,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bid_reaches_confirmed() {
        let chain = Arc::new(FakeChain::new());
        chain.delay_receipts(2);
        let sdk = Arc::new(FakeSdk::new());
        let (submitter, notifier) = submitter(&chain, &sdk);

        let receipt = submitter.submit(bid(5)).await.unwrap();
        assert_eq!(receipt.status, TxStatus::Success);
        assert!(matches!(
            submitter.phase(),
            SubmissionPhase::Confirmed { amount: 5, .. }
        ));
        assert_eq!(
            notifier.titles(),
            vec!["Encrypting Transaction", "Confirming Transaction", "Transfer Complete"]
        );

        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, AUCTION);
        assert_eq!(sent[0].data, encode_bid(&FakeSdk::input_for(5)));
        assert_eq!(chain.receipt_polls(), 3);

        assert!(submitter.acknowledge());
        assert_eq!(submitter.phase(), SubmissionPhase::Idle);
    }

    #[tokio::test]
    async fn test_encryption_failure() {
        let chain = Arc::new(FakeChain::new());
        let sdk = Arc::new(FakeSdk::new());
        sdk.fail_encryption(SdkError::Unavailable("offline".into()));
        let (submitter, notifier) = submitter(&chain, &sdk);

        let err = submitter.submit(bid(5)).await.unwrap_err();
        assert!(matches!(err, ClientError::EncryptionFailure(_)));
        assert!(chain.sent().is_empty());
        assert!(matches!(
            submitter.phase(),
            SubmissionPhase::Failed { tx_hash: None, .. }
        ));
        assert_eq!(notifier.all().last().unwrap().level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn test_wallet_rejection_is_verbatim() {
        let chain = Arc::new(FakeChain::new());
        chain.reject_sends("User rejected the request.");
        let sdk = Arc::new(FakeSdk::new());
        let (submitter, _) = submitter(&chain, &sdk);

        let err = submitter.submit(bid(5)).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::TransactionRejectedOrFailed("User rejected the request.".into())
        );
        assert_eq!(err.to_string(), "User rejected the request.");
    }

    #[tokio::test]
    async fn test_reverted_receipt_fails() {
        let chain = Arc::new(FakeChain::new());
        chain.revert_next();
        let sdk = Arc::new(FakeSdk::new());
        let (submitter, _) = submitter(&chain, &sdk);

        let err = submitter.submit(bid(5)).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::TransactionRejectedOrFailed("transaction reverted".into())
        );
        assert!(submitter.phase().tx_hash().is_some());
    }

    #[tokio::test]
    async fn test_terminal_phase_blocks_until_acknowledged() {
        let chain = Arc::new(FakeChain::new());
        let sdk = Arc::new(FakeSdk::new());
        let (submitter, _) = submitter(&chain, &sdk);

        submitter.submit(bid(1)).await.unwrap();
        assert_eq!(
            submitter.submit(bid(2)).await.unwrap_err(),
            ClientError::SubmissionInProgress
        );
        assert_eq!(sdk.encrypt_calls(), 1);

        submitter.acknowledge();
        submitter.submit(bid(2)).await.unwrap();
        assert_eq!(sdk.encrypt_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_encrypt_once() {
        let chain = Arc::new(FakeChain::new());
        let sdk = Arc::new(FakeSdk::new());
        let gate = sdk.hold_encryption();
        let (submitter, _) = submitter(&chain, &sdk);

        let mut updates = submitter.subscribe();
        let first = tokio::spawn({
            let submitter = submitter.clone();
            async move { submitter.submit(bid(1)).await }
        });
        updates
            .wait_for(|phase| matches!(phase, SubmissionPhase::Encrypting { .. }))
            .await
            .unwrap();

        assert!(submitter.is_busy());
        assert!(!submitter.acknowledge());
        assert_eq!(
            submitter.submit(bid(2)).await.unwrap_err(),
            ClientError::SubmissionInProgress
        );

        gate.add_permits(1);
        first.await.unwrap().unwrap();
        assert_eq!(sdk.encrypt_calls(), 1);
        assert_eq!(chain.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_submission_can_be_acknowledged() {
        let chain = Arc::new(FakeChain::new());
        let sdk = Arc::new(FakeSdk::new());
        let gate = sdk.hold_encryption();
        let (submitter, _) = submitter(&chain, &sdk);

        let mut updates = submitter.subscribe();
        let task = tokio::spawn({
            let submitter = submitter.clone();
            async move { submitter.submit(bid(1)).await }
        });
        updates.wait_for(|phase| phase.is_busy()).await.unwrap();

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(matches!(
            submitter.phase(),
            SubmissionPhase::Failed {
                amount: 1,
                tx_hash: None,
                error: ClientError::TransactionRejectedOrFailed(ref message),
            } if message == "cancelled"
        ));

        assert!(submitter.acknowledge());
        gate.add_permits(1);
        submitter.submit(bid(2)).await.unwrap();
        assert_eq!(chain.sent().len(), 1);
        assert_eq!(sdk.encrypt_calls(), 2);
    }

    #[tokio::test]
    async fn test_confidential_transfer_request() {
        let chain = Arc::new(FakeChain::new());
        let sdk = Arc::new(FakeSdk::new());
        let (submitter, notifier) = submitter(&chain, &sdk);
        let to = Address::repeat_byte(0x42);

        submitter
            .submit(SubmissionRequest::ConfidentialTransfer {
                token: PAYMENT_TOKEN,
                to,
                amount: 7,
            })
            .await
            .unwrap();

        let sent = chain.sent();
        assert_eq!(sent[0].to, PAYMENT_TOKEN);
        assert_eq!(sent[0].data, encode_confidential_transfer(to, &FakeSdk::input_for(7)));
        assert_eq!(
            notifier.titles(),
            vec![
                "Encrypting Transaction",
                "Confidential Transfer Initiated",
                "Transfer Complete"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_signer() {
        let chain = Arc::new(FakeChain::new());
        chain.set_account(None);
        let sdk = Arc::new(FakeSdk::new());
        let (submitter, _) = submitter(&chain, &sdk);

        assert_eq!(
            submitter.submit(bid(1)).await.unwrap_err(),
            ClientError::SignerNotInitialized
        );
        assert_eq!(submitter.phase(), SubmissionPhase::Idle);
        assert_eq!(sdk.encrypt_calls(), 0);
    }
}
