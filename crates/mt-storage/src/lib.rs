use async_trait::async_trait;
use mt_api_types::{ContentId, ErrorKind, ImageUrl, UploadedFile};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

mod nft_storage;
mod publisher;

pub use nft_storage::{HttpImageFetcher, NftStorageClient};
pub use publisher::{DEFAULT_GATEWAY_BASE, StoragePublisher};

/// Record pinned for one NFT: the JSON fields plus the image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftMetadata {
    pub name: String,
    pub description: String,
    pub image: UploadedFile,
}

/// Failure talking to the storage network or fetching an image.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    Service(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Network(_) => ErrorKind::Network,
            TransferError::Service(_) => ErrorKind::Service,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("NFT.Storage API key is not configured")]
    Unconfigured,
    #[error("invalid image reference: {0}")]
    InvalidImageReference(String),
    #[error("failed to upload image: {0}")]
    UploadFailed(#[from] TransferError),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Unconfigured => ErrorKind::Configuration,
            StorageError::InvalidImageReference(_) => ErrorKind::Validation,
            StorageError::UploadFailed(err) => err.kind(),
        }
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn store(&self, token: &str, metadata: &NftMetadata) -> Result<ContentId, TransferError>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &ImageUrl) -> Result<Vec<u8>, TransferError>;
}

/// Content store kept in process memory, addressed by a SHA-256 digest of the record.
#[derive(Default)]
pub struct InMemoryContentStore {
    records: RwLock<HashMap<ContentId, NftMetadata>>,
}

impl InMemoryContentStore {
    pub fn content_id(metadata: &NftMetadata) -> ContentId {
        let mut hasher = Sha256::new();
        for field in [
            metadata.name.as_bytes(),
            metadata.description.as_bytes(),
            metadata.image.file_name.as_bytes(),
            metadata.image.content_type.as_bytes(),
            metadata.image.bytes.as_slice(),
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field);
        }
        ContentId(format!("bafy{}", to_hex(&hasher.finalize())))
    }

    pub async fn load(&self, content_id: &ContentId) -> Option<NftMetadata> {
        self.records.read().await.get(content_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn store(&self, _token: &str, metadata: &NftMetadata) -> Result<ContentId, TransferError> {
        let content_id = Self::content_id(metadata);
        let mut guard = self.records.write().await;
        guard.insert(content_id.clone(), metadata.clone());
        Ok(content_id)
    }
}

fn to_hex(input: &[u8]) -> String {
    let mut output = String::with_capacity(input.len() * 2);
    for byte in input {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
