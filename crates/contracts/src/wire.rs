//! JSON shapes of the Ethereum JSON-RPC methods used by the client.
//!
//! Quantities travel as `0x`-prefixed hex strings; the alloy primitive types
//! already serialize that way.

use alloy_primitives::U64;
use dutch_types::{Address, Bytes, TransactionReceipt, TransactionRequest, TxStatus, B256, U256};
use serde::{Deserialize, Serialize};

/// Block tag used for every read.
pub const LATEST: &str = "latest";

/// `eth_call` request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    pub to: Address,
    #[serde(default, alias = "input")]
    pub data: Bytes,
}

/// `eth_sendTransaction` request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionRpc {
    pub from: Address,
    pub to: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default, alias = "input")]
    pub data: Bytes,
}

impl From<TransactionRequest> for SendTransactionRpc {
    fn from(tx: TransactionRequest) -> Self {
        Self {
            from: tx.from,
            to: tx.to,
            value: tx.value,
            data: tx.data,
        }
    }
}

/// Subset of the receipt object returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRpc {
    pub transaction_hash: B256,
    pub block_number: U64,
    /// `0x1` on success, `0x0` when reverted
    pub status: U64,
}

impl From<ReceiptRpc> for TransactionReceipt {
    fn from(receipt: ReceiptRpc) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.to::<u64>(),
            status: if receipt.status.is_zero() {
                TxStatus::Reverted
            } else {
                TxStatus::Success
            },
        }
    }
}

impl From<&TransactionReceipt> for ReceiptRpc {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.tx_hash,
            block_number: U64::from(receipt.block_number),
            status: match receipt.status {
                TxStatus::Success => U64::from(1),
                TxStatus::Reverted => U64::ZERO,
            },
        }
    }
}

/// Head of a development chain, as returned by `admin_advanceBlock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_from_json() {
        let json = serde_json::json!({
            "transactionHash": format!("0x{}", "11".repeat(32)),
            "blockNumber": "0x1a",
            "status": "0x1",
            "gasUsed": "0x5208"
        });
        let rpc: ReceiptRpc = serde_json::from_value(json).unwrap();
        let receipt = TransactionReceipt::from(rpc);
        assert_eq!(receipt.block_number, 26);
        assert_eq!(receipt.status, TxStatus::Success);
    }

    #[test]
    fn test_reverted_receipt() {
        let json = serde_json::json!({
            "transactionHash": format!("0x{}", "22".repeat(32)),
            "blockNumber": "0x2",
            "status": "0x0"
        });
        let rpc: ReceiptRpc = serde_json::from_value(json).unwrap();
        assert_eq!(TransactionReceipt::from(rpc).status, TxStatus::Reverted);
    }

    #[test]
    fn test_call_request_skips_missing_from() {
        let req = CallRequest {
            from: None,
            to: Address::repeat_byte(1),
            data: Bytes::from_static(&[0xde, 0xad]),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("from").is_none());
        assert_eq!(value["data"], "0xdead");
    }
}
