use mt_api_types::{ContentId, ImageSource, MetadataUrl, UploadedFile};
use std::sync::Arc;
use tracing::info;

use crate::{ContentStore, ImageFetcher, NftMetadata, StorageError};

pub const DEFAULT_GATEWAY_BASE: &str = "https://ipfs.io/ipfs";

const FETCHED_FILE_NAME: &str = "image.jpeg";
const FETCHED_CONTENT_TYPE: &str = "image/jpeg";

/// Packages an NFT's name, description and image and pins them to content storage.
pub struct StoragePublisher {
    store: Arc<dyn ContentStore>,
    fetcher: Arc<dyn ImageFetcher>,
    token: Option<String>,
    gateway_base: String,
}

impl StoragePublisher {
    pub fn new(
        store: Arc<dyn ContentStore>,
        fetcher: Arc<dyn ImageFetcher>,
        token: Option<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            token: token.filter(|token| !token.trim().is_empty()),
            gateway_base: DEFAULT_GATEWAY_BASE.to_owned(),
        }
    }

    pub fn with_gateway_base(mut self, base: impl Into<String>) -> Self {
        self.gateway_base = base.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    pub fn metadata_url(&self, content_id: &ContentId) -> MetadataUrl {
        MetadataUrl(format!("{}/{}/metadata.json", self.gateway_base, content_id.0))
    }

    pub async fn publish(
        &self,
        name: &str,
        description: &str,
        source: Option<&ImageSource>,
    ) -> Result<MetadataUrl, StorageError> {
        let token = self.token.as_deref().ok_or(StorageError::Unconfigured)?;

        let image = match source {
            None => {
                return Err(StorageError::InvalidImageReference(
                    "no image has been generated or uploaded".to_owned(),
                ));
            }
            Some(ImageSource::Uploaded(file)) => {
                if file.bytes.is_empty() {
                    return Err(StorageError::InvalidImageReference(format!(
                        "uploaded file '{}' is empty",
                        file.file_name
                    )));
                }
                file.clone()
            }
            Some(ImageSource::Generated(url)) => {
                if !(url.0.starts_with("http://") || url.0.starts_with("https://")) {
                    return Err(StorageError::InvalidImageReference(format!(
                        "'{}' is not an http(s) url",
                        url.0
                    )));
                }
                UploadedFile {
                    file_name: FETCHED_FILE_NAME.to_owned(),
                    content_type: FETCHED_CONTENT_TYPE.to_owned(),
                    bytes: self.fetcher.fetch(url).await?,
                }
            }
        };

        let metadata = NftMetadata {
            name: name.to_owned(),
            description: description.to_owned(),
            image,
        };
        let content_id = self.store.store(token, &metadata).await?;
        let url = self.metadata_url(&content_id);
        info!("nft metadata for '{}' pinned at {}", name, url);
        Ok(url)
    }
}
