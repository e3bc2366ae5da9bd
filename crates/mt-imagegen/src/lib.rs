//! Text-to-image acquisition.
//!
//! `ImageGenerator` submits a prompt to an [`ImageApi`] and, when the job is
//! processed asynchronously, polls for the result on an exponential
//! [`Backoff`] schedule.

pub mod api;
pub mod backoff;
pub mod generator;

use mt_api_types::ErrorKind;
use thiserror::Error;

pub use api::{GenerationOptions, GenerationResponse, ImageApi, StableDiffusionApi};
pub use backoff::{Backoff, PollError, Verdict, poll_with_backoff};
pub use generator::{ImageGenerator, Submission};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("image generation API key is not configured")]
    Unconfigured,
    #[error("{0}")]
    Validation(String),
    #[error("image service request failed: {0}")]
    Network(String),
    #[error("{0}")]
    Generation(String),
    #[error("Image generation timed out after {attempts} polls")]
    Timeout { attempts: u32 },
}

impl ImageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImageError::Unconfigured => ErrorKind::Configuration,
            ImageError::Validation(_) => ErrorKind::Validation,
            ImageError::Network(_) => ErrorKind::Network,
            ImageError::Generation(_) => ErrorKind::Service,
            ImageError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}
