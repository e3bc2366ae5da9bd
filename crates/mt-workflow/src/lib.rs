//! NFT creation workflow: draft, image acquisition, publishing and minting.
//!
//! [`MintWorkflow`] owns every piece of mutable workflow state. All
//! transitions of [`WorkflowStatus`] happen inside its operations.

mod controller;
mod draft;
mod mint;

use mt_api_types::ErrorKind;
use mt_chain_client::ChainError;
use mt_imagegen::ImageError;
use mt_storage::StorageError;
use thiserror::Error;

pub use controller::MintWorkflow;
pub use draft::NftDraft;
pub use mint::mint;
pub use mt_api_types::WorkflowStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("Please connect your wallet first")]
    MissingWallet,
    #[error("Please generate or upload an image first")]
    MissingMetadata,
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Validation(_) | WorkflowError::MissingWallet | WorkflowError::MissingMetadata => {
                ErrorKind::Validation
            }
            WorkflowError::Image(err) => err.kind(),
            WorkflowError::Storage(err) => err.kind(),
            WorkflowError::Chain(err) => err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_cause() {
        assert_eq!(WorkflowError::MissingWallet.kind(), ErrorKind::Validation);
        assert_eq!(
            WorkflowError::from(ImageError::Timeout { attempts: 10 }).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            WorkflowError::from(StorageError::Unconfigured).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            WorkflowError::from(ChainError::MintRejected("denied".to_owned())).kind(),
            ErrorKind::Chain
        );
    }

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(WorkflowError::MissingWallet.to_string(), "Please connect your wallet first");
        assert_eq!(
            WorkflowError::from(StorageError::Unconfigured).to_string(),
            "NFT.Storage API key is not configured"
        );
    }
}
