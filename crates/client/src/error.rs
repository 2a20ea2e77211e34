//! Client error types.

use dutch_contracts::ContractError;
use thiserror::Error;

/// Errors surfaced by client operations.
///
/// None of these are fatal; the caller turns them into a notification and
/// lets the user retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Signer not initialized - please connect your wallet")]
    SignerNotInitialized,

    #[error("Confidential tokens are only available on {expected} (connected to {connected})")]
    WrongNetwork { expected: String, connected: String },

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Token {0} has no contract address")]
    MissingContract(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailure(String),

    /// Wallet or node error, message kept verbatim for the user
    #[error("{0}")]
    TransactionRejectedOrFailed(String),

    #[error("Failed to decrypt balance: {0}")]
    DecryptionFailure(String),

    #[error("A submission is already in progress")]
    SubmissionInProgress,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error(transparent)]
    Contract(#[from] ContractError),
}
