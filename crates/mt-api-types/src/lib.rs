use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WalletAddress(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractAddress(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxHash(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageUrl(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataUrl(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ContentId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobId(pub String);

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MetadataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse classification shared by every crate's error type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Provider,
    Validation,
    Network,
    Service,
    Timeout,
    Chain,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Provider => "provider",
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Service => "service",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Chain => "chain",
        }
    }
}

/// A file chosen by the user as the NFT image.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Generated(ImageUrl),
    Uploaded(UploadedFile),
}

impl ImageSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::Generated(_) => "generated",
            ImageSource::Uploaded(_) => "uploaded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "stage", content = "reason", rename_all = "snake_case")]
pub enum WorkflowStatus {
    Idle,
    GeneratingImage,
    PollingForResult,
    UploadingToStorage,
    ReadyToMint,
    Minting,
    Minted,
    Failed(String),
}

impl WorkflowStatus {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::GeneratingImage
                | WorkflowStatus::PollingForResult
                | WorkflowStatus::UploadingToStorage
                | WorkflowStatus::Minting
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatEntry {
    pub text: String,
    pub from_bot: bool,
}

// ── mint-service request/response bodies ─────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletResponse {
    pub connected: bool,
    pub wallet_address: Option<String>,
    pub contract_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAccountsResponse {
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    /// Base64 (standard alphabet) file contents.
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshotResponse {
    pub status: WorkflowStatus,
    pub message: String,
    pub name: String,
    pub description: String,
    pub image_source: Option<String>,
    pub image_url: Option<String>,
    pub uploaded_file_name: Option<String>,
    pub metadata_url: Option<String>,
    pub mint_enabled: bool,
    pub busy: bool,
    pub last_tx_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatusResponse {
    pub status: WorkflowStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintResponse {
    pub minted: bool,
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub metadata_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub transcript: Vec<ChatEntry>,
}
