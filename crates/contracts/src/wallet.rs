//! The connected wallet: signing, broadcast and receipts.

use async_trait::async_trait;
use dutch_types::{Address, TransactionReceipt, TransactionRequest, TxHash};

use crate::error::ContractError;

/// A wallet session able to sign and broadcast transactions.
///
/// Signing happens on the wallet side; the client only hands over the request
/// and watches for the receipt.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Account used to sign, if one is connected.
    fn account(&self) -> Option<Address>;

    async fn chain_id(&self) -> Result<u64, ContractError>;

    async fn block_number(&self) -> Result<u64, ContractError>;

    /// Hand a transaction to the wallet. Returns once it is broadcast.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ContractError>;

    /// `None` while the transaction is not yet mined.
    async fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ContractError>;
}
