use alloy_primitives::{Address, Bytes, U64};
use async_trait::async_trait;
use mt_api_types::{TxHash, WalletAddress};
use mt_chain_client::{
    ChainError, ProviderError, TransactionRequest, TransactionSigner, TxReceipt, WalletProvider,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// EIP-1193 code for "a request of this type is already pending".
pub const PENDING_REQUEST_CODE: i64 = -32002;

pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(4000);

/// Wallet provider speaking Ethereum JSON-RPC to a node or wallet bridge.
///
/// The node is expected to hold the unlocked accounts it reports, the same way
/// an injected browser wallet signs `eth_sendTransaction` on the user's behalf.
pub struct JsonRpcWallet {
    rpc: Arc<RpcClient>,
    receipt_poll_interval: Duration,
}

impl JsonRpcWallet {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            rpc: Arc::new(RpcClient {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                http: reqwest::Client::new(),
                next_id: AtomicU64::new(1),
            }),
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc.endpoint
    }
}

// ── JSON-RPC plumbing ────────────────────────────────────────────────

struct RpcClient {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RpcFailure {
    Transport(String),
    Rpc { code: i64, message: String },
}

impl RpcFailure {
    fn message(&self) -> String {
        match self {
            RpcFailure::Transport(message) => message.clone(),
            RpcFailure::Rpc { code, message } => format!("{message} (code {code})"),
        }
    }
}

impl RpcClient {
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcFailure> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| RpcFailure::Transport(format!("{method} transport: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RpcFailure::Transport(format!("{method} HTTP {status}: {text}")));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|err| RpcFailure::Transport(format!("{method} parse: {err}")))?;

        if let Some(error) = envelope.error {
            return Err(RpcFailure::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(envelope.result)
            .map_err(|err| RpcFailure::Transport(format!("{method} result: {err}")))
    }
}

fn provider_error(failure: RpcFailure) -> ProviderError {
    match failure {
        RpcFailure::Rpc { code, .. } if code == PENDING_REQUEST_CODE => ProviderError::ConnectionPending,
        other => ProviderError::UserRejected(other.message()),
    }
}

fn to_addresses(raw: Vec<String>) -> Vec<WalletAddress> {
    raw.into_iter()
        .map(|address| address.trim().to_owned())
        .filter(|address| match address.parse::<Address>() {
            Ok(_) => true,
            Err(err) => {
                if !address.is_empty() {
                    warn!("ignoring malformed account '{}': {}", address, err);
                }
                false
            }
        })
        .map(WalletAddress)
        .collect()
}

fn parse_address(role: &str, raw: &str) -> Result<Address, ChainError> {
    raw.parse::<Address>()
        .map_err(|err| ChainError::MintRejected(format!("invalid {role} address '{raw}': {err}")))
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    fn name(&self) -> &str {
        "json-rpc"
    }

    async fn accounts(&self) -> Result<Vec<WalletAddress>, ProviderError> {
        let raw: Vec<String> = self
            .rpc
            .call("eth_accounts", json!([]))
            .await
            .map_err(provider_error)?;
        Ok(to_addresses(raw))
    }

    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, ProviderError> {
        let raw: Vec<String> = self
            .rpc
            .call("eth_requestAccounts", json!([]))
            .await
            .map_err(|failure| {
                warn!("eth_requestAccounts failed: {}", failure.message());
                provider_error(failure)
            })?;
        Ok(to_addresses(raw))
    }

    fn signer(&self, account: &WalletAddress) -> Arc<dyn TransactionSigner> {
        Arc::new(JsonRpcSigner {
            rpc: self.rpc.clone(),
            address: account.clone(),
            poll_interval: self.receipt_poll_interval,
        })
    }
}

// ── signer ───────────────────────────────────────────────────────────

pub struct JsonRpcSigner {
    rpc: Arc<RpcClient>,
    address: WalletAddress,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<U64>,
    status: Option<U64>,
}

#[async_trait]
impl TransactionSigner for JsonRpcSigner {
    fn address(&self) -> &WalletAddress {
        &self.address
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ChainError> {
        let from = parse_address("sender", &tx.from.0)?;
        let to = parse_address("contract", &tx.to.0)?;
        let params = json!([{
            "from": from,
            "to": to,
            "data": Bytes::from(tx.data),
        }]);

        let hash: String = self
            .rpc
            .call("eth_sendTransaction", params)
            .await
            .map_err(|failure| ChainError::MintRejected(failure.message()))?;

        Ok(TxHash(hash))
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxReceipt, ChainError> {
        loop {
            let receipt: Option<RpcReceipt> = self
                .rpc
                .call("eth_getTransactionReceipt", json!([tx_hash.0]))
                .await
                .map_err(|failure| ChainError::ConfirmationFailed {
                    tx_hash: tx_hash.clone(),
                    message: failure.message(),
                })?;

            match receipt {
                Some(receipt) => return Ok(to_receipt(receipt)),
                None => {
                    debug!("transaction {} not yet included", tx_hash);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

fn to_receipt(receipt: RpcReceipt) -> TxReceipt {
    // Receipts without a status field predate Byzantium and carry no failure flag.
    let success = receipt
        .status
        .map(|status| status.to::<u64>() == 1)
        .unwrap_or(true);

    TxReceipt {
        tx_hash: TxHash(receipt.transaction_hash),
        block_number: receipt.block_number.map(|number| number.to::<u64>()),
        success,
    }
}
