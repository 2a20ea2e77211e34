//! JSON-RPC backed implementation of the reader and wallet traits.

use alloy_primitives::U64;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::traits::ToRpcParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use dutch_types::{Address, Bytes, TransactionReceipt, TransactionRequest, TxHash, U256};

use crate::abi::{IConfidentialERC20, IDutchAuction, IERC20};
use crate::error::ContractError;
use crate::reader::{AuctionReader, TokenReader};
use crate::wallet::Wallet;
use crate::wire::{BlockInfo, CallRequest, ReceiptRpc, SendTransactionRpc, LATEST};

/// Contract bindings over an Ethereum JSON-RPC endpoint.
///
/// The endpoint doubles as the wallet: transactions go out through
/// `eth_sendTransaction` and are signed by whichever account the node holds.
pub struct RpcContracts {
    client: HttpClient,
    account: Option<Address>,
}

impl RpcContracts {
    /// Create bindings without a connected account.
    pub fn new(endpoint: &str) -> Result<Self, ContractError> {
        let client = HttpClientBuilder::default()
            .build(endpoint)
            .map_err(|e| ContractError::Rpc(e.to_string()))?;
        Ok(Self {
            client,
            account: None,
        })
    }

    /// Create bindings and connect an account.
    ///
    /// Without an explicit account the first one reported by `eth_accounts` is
    /// used; the session stays read-only if there is none.
    pub async fn connect(endpoint: &str, account: Option<Address>) -> Result<Self, ContractError> {
        let mut contracts = Self::new(endpoint)?;
        contracts.account = match account {
            Some(account) => Some(account),
            None => contracts.accounts().await?.into_iter().next(),
        };
        debug!(account = ?contracts.account, endpoint, "Connected to RPC endpoint");
        Ok(contracts)
    }

    /// Accounts the wallet endpoint can sign for.
    pub async fn accounts(&self) -> Result<Vec<Address>, ContractError> {
        self.request("eth_accounts", Vec::<()>::new()).await
    }

    /// Mine an empty block on a development chain.
    pub async fn advance_block(&self) -> Result<BlockInfo, ContractError> {
        self.request("admin_advanceBlock", Vec::<()>::new()).await
    }

    /// Move a development chain's clock.
    pub async fn set_timestamp(&self, timestamp: u64) -> Result<bool, ContractError> {
        self.request("admin_setTimestamp", vec![timestamp]).await
    }

    async fn request<R, P>(&self, method: &str, params: P) -> Result<R, ContractError>
    where
        R: DeserializeOwned,
        P: ToRpcParams + Send,
    {
        self.client
            .request(method, params)
            .await
            .map_err(|e| ContractError::Rpc(e.to_string()))
    }

    async fn call<C: SolCall + Send>(&self, to: Address, call: C) -> Result<C::Return, ContractError> {
        let request = CallRequest {
            from: self.account,
            to,
            data: call.abi_encode().into(),
        };
        let raw: Bytes = self.request("eth_call", (request, LATEST)).await?;
        Ok(C::abi_decode_returns(&raw, true)?)
    }
}

/// Narrow a uint256 timestamp to seconds.
fn to_seconds(value: U256, field: &str) -> Result<u64, ContractError> {
    u64::try_from(value)
        .map_err(|_| ContractError::InvalidResponse(format!("{} out of range: {}", field, value)))
}

#[async_trait]
impl AuctionReader for RpcContracts {
    async fn get_price(&self, auction: Address) -> Result<U256, ContractError> {
        Ok(self.call(auction, IDutchAuction::getPriceCall {}).await?.price)
    }

    async fn tokens_left_reveal(&self, auction: Address) -> Result<U256, ContractError> {
        Ok(self
            .call(auction, IDutchAuction::tokensLeftRevealCall {})
            .await?
            .tokensLeft)
    }

    async fn starting_price(&self, auction: Address) -> Result<U256, ContractError> {
        Ok(self.call(auction, IDutchAuction::startingPriceCall {}).await?.price)
    }

    async fn discount_rate(&self, auction: Address) -> Result<U256, ContractError> {
        Ok(self.call(auction, IDutchAuction::discountRateCall {}).await?.rate)
    }

    async fn start_at(&self, auction: Address) -> Result<u64, ContractError> {
        let ts = self.call(auction, IDutchAuction::startAtCall {}).await?.timestamp;
        to_seconds(ts, "startAt")
    }

    async fn expires_at(&self, auction: Address) -> Result<u64, ContractError> {
        let ts = self.call(auction, IDutchAuction::expiresAtCall {}).await?.timestamp;
        to_seconds(ts, "expiresAt")
    }

    async fn reserve_price(&self, auction: Address) -> Result<U256, ContractError> {
        Ok(self.call(auction, IDutchAuction::reservePriceCall {}).await?.price)
    }

    async fn amount(&self, auction: Address) -> Result<U256, ContractError> {
        Ok(self.call(auction, IDutchAuction::amountCall {}).await?.supply)
    }

    async fn auction_start(&self, auction: Address) -> Result<bool, ContractError> {
        Ok(self.call(auction, IDutchAuction::auctionStartCall {}).await?.started)
    }

    async fn seller(&self, auction: Address) -> Result<Address, ContractError> {
        Ok(self.call(auction, IDutchAuction::sellerCall {}).await?.account)
    }

    async fn token(&self, auction: Address) -> Result<Address, ContractError> {
        Ok(self.call(auction, IDutchAuction::tokenCall {}).await?.tokenAddress)
    }

    async fn payment_token(&self, auction: Address) -> Result<Address, ContractError> {
        Ok(self
            .call(auction, IDutchAuction::paymentTokenCall {})
            .await?
            .tokenAddress)
    }
}

#[async_trait]
impl TokenReader for RpcContracts {
    async fn name(&self, token: Address) -> Result<String, ContractError> {
        Ok(self.call(token, IERC20::nameCall {}).await?.tokenName)
    }

    async fn symbol(&self, token: Address) -> Result<String, ContractError> {
        Ok(self.call(token, IERC20::symbolCall {}).await?.tokenSymbol)
    }

    async fn decimals(&self, token: Address) -> Result<u8, ContractError> {
        Ok(self.call(token, IERC20::decimalsCall {}).await?.tokenDecimals)
    }

    async fn total_supply(&self, token: Address) -> Result<U256, ContractError> {
        Ok(self.call(token, IERC20::totalSupplyCall {}).await?.supply)
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ContractError> {
        // Same selector for both token flavours; the confidential one returns a handle.
        Ok(self
            .call(token, IConfidentialERC20::balanceOfCall { owner })
            .await?
            .handle)
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ContractError> {
        self.request("eth_getBalance", (owner, LATEST)).await
    }
}

#[async_trait]
impl Wallet for RpcContracts {
    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn chain_id(&self) -> Result<u64, ContractError> {
        let id: U64 = self.request("eth_chainId", Vec::<()>::new()).await?;
        Ok(id.to::<u64>())
    }

    async fn block_number(&self) -> Result<u64, ContractError> {
        let height: U64 = self.request("eth_blockNumber", Vec::<()>::new()).await?;
        Ok(height.to::<u64>())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ContractError> {
        debug!(from = %tx.from, to = %tx.to, value = %tx.value, "Sending transaction");
        self.request("eth_sendTransaction", vec![SendTransactionRpc::from(tx)])
            .await
    }

    async fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ContractError> {
        let receipt: Option<ReceiptRpc> = self
            .request("eth_getTransactionReceipt", vec![hash])
            .await?;
        Ok(receipt.map(TransactionReceipt::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_seconds_rejects_overflow() {
        assert_eq!(to_seconds(U256::from(3600u64), "startAt").unwrap(), 3600);
        assert!(matches!(
            to_seconds(U256::MAX, "expiresAt"),
            Err(ContractError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_new_rejects_bad_endpoint() {
        assert!(RpcContracts::new("not a url").is_err());
    }
}
