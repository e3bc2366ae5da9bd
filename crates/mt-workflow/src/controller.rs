use mt_api_types::{ImageUrl, MetadataUrl, UploadedFile, WorkflowSnapshotResponse, WorkflowStatus};
use mt_chain_client::TxReceipt;
use mt_imagegen::{ImageError, ImageGenerator, Submission};
use mt_storage::{StorageError, StoragePublisher};
use mt_wallet_core::WalletSession;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{NftDraft, WorkflowError, mint};

/// Stage operations (`generate`, `upload`, `publish`, `mint`) must be driven
/// to completion. A dropped stage future leaves its running status behind, so
/// callers that may be cancelled should run them on their own task.
pub struct MintWorkflow {
    wallet: Arc<WalletSession>,
    images: ImageGenerator,
    publisher: StoragePublisher,
    draft: NftDraft,
    metadata_url: Option<MetadataUrl>,
    last_receipt: Option<TxReceipt>,
    message: String,
    status: watch::Sender<WorkflowStatus>,
}

impl MintWorkflow {
    pub fn new(wallet: Arc<WalletSession>, images: ImageGenerator, publisher: StoragePublisher) -> Self {
        let (status, _) = watch::channel(WorkflowStatus::Idle);
        Self {
            wallet,
            images,
            publisher,
            draft: NftDraft::default(),
            metadata_url: None,
            last_receipt: None,
            message: String::new(),
            status,
        }
    }

    pub fn wallet(&self) -> &Arc<WalletSession> {
        &self.wallet
    }

    pub fn draft(&self) -> &NftDraft {
        &self.draft
    }

    pub fn metadata_url(&self) -> Option<&MetadataUrl> {
        self.metadata_url.as_ref()
    }

    pub fn last_receipt(&self) -> Option<&TxReceipt> {
        self.last_receipt.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowStatus> {
        self.status.subscribe()
    }

    pub fn busy(&self) -> bool {
        self.status.borrow().is_running()
    }

    /// Mint is offered once metadata is published, and again after a failed attempt.
    pub fn mint_enabled(&self) -> bool {
        match &*self.status.borrow() {
            WorkflowStatus::ReadyToMint => true,
            WorkflowStatus::Failed(_) => self.metadata_url.is_some(),
            _ => false,
        }
    }

    pub fn set_details(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.draft.name = name.into();
        self.draft.description = description.into();
    }

    /// Generates an image from the description and publishes it.
    pub async fn generate(&mut self) -> Result<MetadataUrl, WorkflowError> {
        let (_, description) = self.draft.details().map_err(WorkflowError::Validation)?;
        let prompt = description.to_owned();
        if !self.images.is_configured() {
            return Err(ImageError::Unconfigured.into());
        }
        if !self.publisher.is_configured() {
            return Err(StorageError::Unconfigured.into());
        }

        self.transition(WorkflowStatus::GeneratingImage, "Generating Image...");
        let url = match self.acquire(&prompt).await {
            Ok(url) => url,
            Err(err) => return Err(self.fail("Failed to generate image", err.into())),
        };

        self.draft.set_generated(url);
        self.metadata_url = None;
        self.publish_current().await
    }

    async fn acquire(&mut self, prompt: &str) -> Result<ImageUrl, ImageError> {
        match self.images.submit(prompt).await? {
            Submission::Ready(url) => Ok(url),
            Submission::Pending(job) => {
                self.transition(WorkflowStatus::PollingForResult, "Generating Image...");
                self.images.await_job(&job).await
            }
        }
    }

    /// Uses `file` as the image, replacing any generated one, and publishes it.
    pub async fn upload(&mut self, file: UploadedFile) -> Result<MetadataUrl, WorkflowError> {
        self.draft.details().map_err(WorkflowError::Validation)?;
        if file.bytes.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "uploaded file '{}' is empty",
                file.file_name
            )));
        }
        if !self.publisher.is_configured() {
            return Err(StorageError::Unconfigured.into());
        }

        info!("image '{}' selected ({} bytes)", file.file_name, file.bytes.len());
        self.draft.set_uploaded(file);
        self.metadata_url = None;
        self.publish_current().await
    }

    /// Drops an uploaded file and its metadata. Returns false when nothing was uploaded.
    pub fn remove_upload(&mut self) -> bool {
        if self.draft.uploaded_file().is_none() {
            return false;
        }
        self.draft.clear_image();
        self.metadata_url = None;
        self.transition(WorkflowStatus::Idle, "");
        true
    }

    /// Publishes the current image source again.
    pub async fn publish(&mut self) -> Result<MetadataUrl, WorkflowError> {
        self.draft.details().map_err(WorkflowError::Validation)?;
        if !self.publisher.is_configured() {
            return Err(StorageError::Unconfigured.into());
        }
        if self.draft.image().is_none() {
            return Err(WorkflowError::Validation(
                "Please generate or upload an image first".to_owned(),
            ));
        }
        self.publish_current().await
    }

    async fn publish_current(&mut self) -> Result<MetadataUrl, WorkflowError> {
        self.transition(WorkflowStatus::UploadingToStorage, "Uploading Image...");

        let (name, description) = self.draft.details().map_err(WorkflowError::Validation)?;
        let published = self
            .publisher
            .publish(name, description, self.draft.image())
            .await;

        match published {
            Ok(url) => {
                self.metadata_url = Some(url.clone());
                self.transition(WorkflowStatus::ReadyToMint, "Image uploaded successfully!");
                Ok(url)
            }
            Err(err) => Err(self.fail("Failed to upload image", err.into())),
        }
    }

    pub async fn mint(&mut self) -> Result<TxReceipt, WorkflowError> {
        if self.wallet.current().await.is_none() {
            self.message = WorkflowError::MissingWallet.to_string();
            return Err(WorkflowError::MissingWallet);
        }
        if self.metadata_url.is_none() {
            self.message = WorkflowError::MissingMetadata.to_string();
            return Err(WorkflowError::MissingMetadata);
        }
        if !self.mint_enabled() {
            let reason = match self.status() {
                WorkflowStatus::Minted => "This NFT has already been minted; generate or upload a new image first",
                _ => "Minting is not available until the image is published",
            };
            self.message = reason.to_owned();
            return Err(WorkflowError::Validation(reason.to_owned()));
        }

        self.transition(WorkflowStatus::Minting, "Minting NFT...");
        match mint(&self.wallet, self.metadata_url.as_ref()).await {
            Ok(receipt) => {
                self.last_receipt = Some(receipt.clone());
                self.transition(WorkflowStatus::Minted, "NFT Minted Successfully!");
                Ok(receipt)
            }
            Err(err) => Err(self.fail("Failed to mint NFT", err)),
        }
    }

    pub fn snapshot(&self) -> WorkflowSnapshotResponse {
        let image = self.draft.image();
        WorkflowSnapshotResponse {
            status: self.status(),
            message: self.message.clone(),
            name: self.draft.name.clone(),
            description: self.draft.description.clone(),
            image_source: image.map(|source| source.kind().to_owned()),
            image_url: self.draft.generated_url().map(|url| url.0.clone()),
            uploaded_file_name: self.draft.uploaded_file().map(|file| file.file_name.clone()),
            metadata_url: self.metadata_url.as_ref().map(|url| url.0.clone()),
            mint_enabled: self.mint_enabled(),
            busy: self.busy(),
            last_tx_hash: self.last_receipt.as_ref().map(|receipt| receipt.tx_hash.0.clone()),
        }
    }

    fn transition(&mut self, status: WorkflowStatus, message: &str) {
        info!("workflow -> {:?}", status);
        self.message = message.to_owned();
        self.status.send_replace(status);
    }

    fn fail(&mut self, context: &str, err: WorkflowError) -> WorkflowError {
        let reason = err.to_string();
        warn!("{}: {} ({})", context, reason, err.kind().as_str());
        self.message = format!("{context}: {reason}");
        self.status.send_replace(WorkflowStatus::Failed(reason));
        err
    }
}
