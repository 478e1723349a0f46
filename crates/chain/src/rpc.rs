//! Adapter over an ethers `Provider` for a node that signs for the users'
//! wallets through its managed accounts.

use ethers::providers::{Http, JsonRpcError, Middleware, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, Bytes, TransactionReceipt, U64};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::abi;
use crate::error::{ChainError, ChainResult};
use crate::types::{id_from_u256, wei_from_u256, Wei};

#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub url: String,
    pub receipt_poll: Duration,
    pub receipt_attempts: u32,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct RpcClient {
    provider: Provider<Http>,
    settings: Arc<RpcSettings>,
}

impl RpcClient {
    pub fn new(settings: RpcSettings) -> ChainResult<Self> {
        let provider = Provider::<Http>::try_from(settings.url.as_str())
            .map_err(|e| ChainError::Transport(format!("invalid RPC url {}: {}", settings.url, e)))?
            .interval(settings.receipt_poll);

        Ok(Self { provider, settings: Arc::new(settings) })
    }

    pub fn url(&self) -> &str {
        &self.settings.url
    }

    async fn timed<T, F>(&self, method: &'static str, request: F) -> ChainResult<T>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        debug!(method, "sending JSON-RPC request");
        match tokio::time::timeout(self.settings.request_timeout, request).await {
            Ok(result) => result.map_err(provider_error),
            Err(_) => Err(ChainError::Transport(format!(
                "{} timed out after {:?}",
                method, self.settings.request_timeout
            ))),
        }
    }

    pub async fn chain_id(&self) -> ChainResult<u64> {
        id_from_u256(self.timed("eth_chainId", self.provider.get_chainid()).await?)
    }

    pub async fn call(&self, tx: &TypedTransaction) -> ChainResult<Bytes> {
        self.timed("eth_call", self.provider.call(tx, None)).await
    }

    pub async fn get_balance(&self, address: Address) -> ChainResult<Wei> {
        wei_from_u256(self.timed("eth_getBalance", self.provider.get_balance(address, None)).await?)
    }

    /// Sends `tx`, polls for its receipt within the configured attempt budget
    /// and fails with the revert reason when the receipt reports failure.
    pub async fn transact(&self, tx: TypedTransaction) -> ChainResult<TransactionReceipt> {
        let hash = *self
            .timed("eth_sendTransaction", self.provider.send_transaction(tx.clone(), None))
            .await?;
        debug!(?hash, to = ?tx.to(), "transaction sent");

        for attempt in 0..self.settings.receipt_attempts {
            let receipt = self
                .timed("eth_getTransactionReceipt", self.provider.get_transaction_receipt(hash))
                .await?;
            if let Some(receipt) = receipt {
                return self.check_status(&tx, receipt).await;
            }
            debug!(?hash, attempt, "receipt not yet available");
            tokio::time::sleep(self.settings.receipt_poll).await;
        }

        Err(ChainError::ReceiptTimeout { hash, attempts: self.settings.receipt_attempts })
    }

    async fn check_status(&self, tx: &TypedTransaction, receipt: TransactionReceipt) -> ChainResult<TransactionReceipt> {
        let hash = receipt.transaction_hash;
        if succeeded(&receipt) {
            debug!(?hash, logs = receipt.logs.len(), "transaction mined");
            return Ok(receipt);
        }

        // replaying the call is the only way to recover the reason after the fact
        let block = receipt.block_number.map(BlockId::from);
        let reason = match self.timed("eth_call", self.provider.call(tx, block)).await {
            Err(ChainError::Reverted { reason }) => reason,
            Err(e) => {
                warn!(?hash, error = %e, "could not recover revert reason");
                "unknown reason".to_string()
            }
            Ok(_) => "unknown reason".to_string(),
        };
        Err(ChainError::Reverted { reason })
    }
}

/// Receipts without a status field predate Byzantium and count as success.
pub fn succeeded(receipt: &TransactionReceipt) -> bool {
    receipt.status != Some(U64::zero())
}

fn provider_error(error: ProviderError) -> ChainError {
    match error.as_error_response() {
        Some(response) => rpc_error(response),
        None => ChainError::Transport(error.to_string()),
    }
}

fn rpc_error(error: &JsonRpcError) -> ChainError {
    let payload = error.data.as_ref().and_then(|d| match d {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("data").and_then(Value::as_str),
        _ => None,
    });

    if let Some(reason) = payload
        .and_then(|hex_data| hex_data.parse::<Bytes>().ok())
        .and_then(|bytes| abi::decode_revert_reason(&bytes))
    {
        return ChainError::Reverted { reason };
    }

    if let Some(reason) = error.message.strip_prefix("execution reverted: ") {
        return ChainError::Reverted { reason: reason.to_string() };
    }
    if error.message == "execution reverted" {
        return ChainError::Reverted { reason: "unknown reason".to_string() };
    }

    ChainError::Rpc { code: error.code, message: error.message.clone() }
}
