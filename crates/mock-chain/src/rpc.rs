//! JSON-RPC surface of the mock chain.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::RwLock;
use tracing::info;

use dutch_contracts::wire::{BlockInfo, CallRequest, ReceiptRpc, SendTransactionRpc};
use dutch_types::TransactionRequest;

use crate::state::{ChainError, ChainState};

/// Ethereum subset understood by the client, plus development controls.
#[rpc(server)]
pub trait MockChainApi {
    // ============ Ethereum Methods ============

    #[method(name = "eth_chainId")]
    async fn eth_chain_id(&self) -> Result<U64, ErrorObjectOwned>;

    /// Unlocked accounts the node signs for.
    #[method(name = "eth_accounts")]
    async fn eth_accounts(&self) -> Result<Vec<Address>, ErrorObjectOwned>;

    #[method(name = "eth_blockNumber")]
    async fn eth_block_number(&self) -> Result<U64, ErrorObjectOwned>;

    #[method(name = "eth_getBalance")]
    async fn eth_get_balance(
        &self,
        address: Address,
        block: Option<String>,
    ) -> Result<U256, ErrorObjectOwned>;

    /// Execute a view call against the latest state.
    #[method(name = "eth_call")]
    async fn eth_call(&self, request: CallRequest, block: Option<String>)
        -> Result<Bytes, ErrorObjectOwned>;

    /// Sign with an unlocked account, execute and mine immediately.
    #[method(name = "eth_sendTransaction")]
    async fn eth_send_transaction(&self, tx: SendTransactionRpc) -> Result<B256, ErrorObjectOwned>;

    #[method(name = "eth_getTransactionReceipt")]
    async fn eth_get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<ReceiptRpc>, ErrorObjectOwned>;

    // ============ Admin Methods ============

    /// Advance the chain by one block.
    #[method(name = "admin_advanceBlock")]
    async fn admin_advance_block(&self) -> Result<BlockInfo, ErrorObjectOwned>;

    /// Set the current timestamp (for testing time-dependent logic).
    #[method(name = "admin_setTimestamp")]
    async fn admin_set_timestamp(&self, timestamp: u64) -> Result<bool, ErrorObjectOwned>;

    /// Flip the auction's start flag.
    #[method(name = "admin_startAuction")]
    async fn admin_start_auction(&self) -> Result<bool, ErrorObjectOwned>;
}

/// Implementation of the mock chain RPC server.
pub struct MockChainServer {
    state: Arc<RwLock<ChainState>>,
}

impl MockChainServer {
    pub fn new(state: Arc<RwLock<ChainState>>) -> Self {
        Self { state }
    }

    fn rpc_error(err: ChainError) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(-32000, err.to_string(), None::<()>)
    }
}

#[async_trait]
impl MockChainApiServer for MockChainServer {
    async fn eth_chain_id(&self) -> Result<U64, ErrorObjectOwned> {
        Ok(U64::from(self.state.read().chain_id))
    }

    async fn eth_accounts(&self) -> Result<Vec<Address>, ErrorObjectOwned> {
        Ok(self.state.read().accounts().to_vec())
    }

    async fn eth_block_number(&self) -> Result<U64, ErrorObjectOwned> {
        Ok(U64::from(self.state.read().block_height))
    }

    async fn eth_get_balance(
        &self,
        address: Address,
        _block: Option<String>,
    ) -> Result<U256, ErrorObjectOwned> {
        Ok(self.state.read().native_balance(&address))
    }

    async fn eth_call(
        &self,
        request: CallRequest,
        _block: Option<String>,
    ) -> Result<Bytes, ErrorObjectOwned> {
        self.state
            .read()
            .call(request.to, &request.data)
            .map_err(Self::rpc_error)
    }

    async fn eth_send_transaction(&self, tx: SendTransactionRpc) -> Result<B256, ErrorObjectOwned> {
        let tx = TransactionRequest {
            from: tx.from,
            to: tx.to,
            value: tx.value,
            data: tx.data,
        };
        self.state
            .write()
            .send_transaction(tx)
            .map_err(Self::rpc_error)
    }

    async fn eth_get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<ReceiptRpc>, ErrorObjectOwned> {
        Ok(self.state.read().receipt(&hash).map(ReceiptRpc::from))
    }

    async fn admin_advance_block(&self) -> Result<BlockInfo, ErrorObjectOwned> {
        let mut state = self.state.write();
        state.advance_block();
        info!(height = state.block_height, "Advanced to block");
        Ok(BlockInfo {
            height: state.block_height,
            timestamp: state.timestamp,
        })
    }

    async fn admin_set_timestamp(&self, timestamp: u64) -> Result<bool, ErrorObjectOwned> {
        self.state.write().set_timestamp(timestamp);
        info!(timestamp, "Set timestamp");
        Ok(true)
    }

    async fn admin_start_auction(&self) -> Result<bool, ErrorObjectOwned> {
        self.state.write().start_auction();
        info!("Auction started");
        Ok(true)
    }
}
