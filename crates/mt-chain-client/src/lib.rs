use alloy_sol_types::SolCall;
use async_trait::async_trait;
use mt_api_types::{ContractAddress, ErrorKind, MetadataUrl, TxHash, WalletAddress};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

mod abi {
    alloy_sol_types::sol! {
        function mint(string uri);
    }
}

pub const MINT_SELECTOR: [u8; 4] = abi::mintCall::SELECTOR;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no wallet provider available; install a wallet to use this application")]
    ProviderAbsent,
    #[error("a wallet connection request is already pending; check your wallet")]
    ConnectionPending,
    #[error("wallet connection rejected: {0}")]
    UserRejected(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Provider
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("mint transaction rejected: {0}")]
    MintRejected(String),
    #[error("mint transaction {tx_hash} reverted")]
    MintReverted { tx_hash: TxHash },
    #[error("failed to confirm transaction {tx_hash}: {message}")]
    ConfirmationFailed { tx_hash: TxHash, message: String },
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Chain
    }
}

#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub from: WalletAddress,
    pub to: ContractAddress,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Signing capability handed out by a provider for one authorized account.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> &WalletAddress;
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ChainError>;
    /// Resolves once the transaction is included. There is no deadline.
    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxReceipt, ChainError>;
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Accounts already authorized for this application, without prompting.
    async fn accounts(&self) -> Result<Vec<WalletAddress>, ProviderError>;
    /// Asks the user to authorize account access.
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>, ProviderError>;
    fn signer(&self, account: &WalletAddress) -> Arc<dyn TransactionSigner>;
}

/// NFT contract bound to a signer.
#[derive(Clone)]
pub struct MintContract {
    address: ContractAddress,
    signer: Arc<dyn TransactionSigner>,
}

impl MintContract {
    pub fn new(address: ContractAddress, signer: Arc<dyn TransactionSigner>) -> Self {
        Self { address, signer }
    }

    pub fn address(&self) -> &ContractAddress {
        &self.address
    }

    pub fn signer_address(&self) -> &WalletAddress {
        self.signer.address()
    }

    pub async fn mint(&self, metadata_url: &MetadataUrl) -> Result<PendingMint, ChainError> {
        let tx_hash = self
            .signer
            .send_transaction(TransactionRequest {
                from: self.signer.address().clone(),
                to: self.address.clone(),
                data: encode_mint_call(&metadata_url.0),
            })
            .await?;

        info!("mint transaction {} submitted to {}", tx_hash, self.address.0);

        Ok(PendingMint {
            tx_hash,
            signer: self.signer.clone(),
        })
    }
}

pub struct PendingMint {
    pub tx_hash: TxHash,
    signer: Arc<dyn TransactionSigner>,
}

impl PendingMint {
    pub async fn wait(self) -> Result<TxReceipt, ChainError> {
        let receipt = self.signer.wait_for_receipt(&self.tx_hash).await?;
        if !receipt.success {
            return Err(ChainError::MintReverted {
                tx_hash: receipt.tx_hash,
            });
        }
        Ok(receipt)
    }
}

/// Calldata for `mint(string)`.
pub fn encode_mint_call(metadata_url: &str) -> Vec<u8> {
    abi::mintCall {
        uri: metadata_url.to_owned(),
    }
    .abi_encode()
}
