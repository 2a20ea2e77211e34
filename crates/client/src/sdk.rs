//! Seam to the external encryption SDK.
//!
//! Encryption of amounts, input proofs and reencryption of balance handles are
//! done by an external service. The client only depends on [`ConfidentialSdk`].

use async_trait::async_trait;
use dutch_types::{Address, Bytes, EncryptedInput, B256, U256};
use thiserror::Error;

/// Errors reported by the encryption SDK.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    /// The balance handle was never written; the balance is zero.
    #[error("Handle is not initialized")]
    HandleNotInitialized,

    #[error("Encryption service unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

/// Encryption and reencryption of 64-bit confidential amounts.
#[async_trait]
pub trait ConfidentialSdk: Send + Sync {
    /// Encrypt `value` for `contract`, bound to `user`.
    async fn encrypt_u64(
        &self,
        value: u64,
        contract: Address,
        user: Address,
    ) -> Result<EncryptedInput, SdkError>;

    /// Reveal the plaintext behind `handle` for the holder `signer`.
    async fn reencrypt_u64(
        &self,
        signer: Address,
        handle: U256,
        contract: Address,
    ) -> Result<u64, SdkError>;
}

/// Stand-in used until a real encryption service is wired in.
///
/// Encryption yields a zero handle with an empty proof, and reencryption only
/// understands the uninitialized handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderSdk;

#[async_trait]
impl ConfidentialSdk for PlaceholderSdk {
    async fn encrypt_u64(
        &self,
        _value: u64,
        _contract: Address,
        _user: Address,
    ) -> Result<EncryptedInput, SdkError> {
        Ok(EncryptedInput {
            handle: B256::ZERO,
            input_proof: Bytes::new(),
        })
    }

    async fn reencrypt_u64(
        &self,
        _signer: Address,
        handle: U256,
        _contract: Address,
    ) -> Result<u64, SdkError> {
        if handle.is_zero() {
            return Err(SdkError::HandleNotInitialized);
        }
        Err(SdkError::Unavailable("no reencryption service configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_placeholder_encrypts_to_zero_handle() {
        let input = PlaceholderSdk
            .encrypt_u64(42, Address::repeat_byte(1), Address::repeat_byte(2))
            .await
            .unwrap();
        assert_eq!(input.handle, B256::ZERO);
        assert!(input.input_proof.is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_reencrypt() {
        let signer = Address::repeat_byte(2);
        let contract = Address::repeat_byte(1);
        assert_eq!(
            PlaceholderSdk.reencrypt_u64(signer, U256::ZERO, contract).await,
            Err(SdkError::HandleNotInitialized)
        );
        assert!(matches!(
            PlaceholderSdk.reencrypt_u64(signer, U256::from(7), contract).await,
            Err(SdkError::Unavailable(_))
        ));
    }
}
