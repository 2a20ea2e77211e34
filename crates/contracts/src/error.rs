//! Error types for contract reads and wallet calls.

use thiserror::Error;

/// Errors that can occur while talking to the node or wallet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// Transport or JSON-RPC error, message kept verbatim
    #[error("{0}")]
    Rpc(String),

    #[error("ABI decoding failed: {0}")]
    Abi(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<alloy_sol_types::Error> for ContractError {
    fn from(err: alloy_sol_types::Error) -> Self {
        Self::Abi(err.to_string())
    }
}
