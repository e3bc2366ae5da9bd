use async_trait::async_trait;
use mt_api_types::{ContentId, ImageUrl};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::{ContentStore, ImageFetcher, NftMetadata, TransferError};

pub const DEFAULT_ENDPOINT: &str = "https://api.nft.storage";

/// Client for the NFT.Storage `/store` endpoint.
pub struct NftStorageClient {
    endpoint: String,
    http: reqwest::Client,
}

impl Default for NftStorageClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl NftStorageClient {
    pub fn new(endpoint: Option<String>) -> Self {
        let endpoint = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoreResponse {
    #[serde(default)]
    ok: bool,
    value: Option<StoreValue>,
    error: Option<StoreErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StoreValue {
    ipnft: String,
}

#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    name: Option<String>,
    message: Option<String>,
}

impl StoreErrorBody {
    fn describe(&self) -> String {
        match (&self.name, &self.message) {
            (Some(name), Some(message)) => format!("{name}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(name), None) => name.clone(),
            (None, None) => "unknown storage error".to_owned(),
        }
    }
}

#[async_trait]
impl ContentStore for NftStorageClient {
    async fn store(&self, token: &str, metadata: &NftMetadata) -> Result<ContentId, TransferError> {
        // The image travels as its own part; `meta.image` is filled in by the service.
        let meta = json!({
            "name": metadata.name,
            "description": metadata.description,
            "image": null,
        });

        let image = Part::bytes(metadata.image.bytes.clone()).file_name(metadata.image.file_name.clone());
        let image = match image.mime_str(&metadata.image.content_type) {
            Ok(part) => part,
            Err(err) => {
                warn!("unusable content type '{}': {}", metadata.image.content_type, err);
                Part::bytes(metadata.image.bytes.clone())
                    .file_name(metadata.image.file_name.clone())
                    .mime_str("application/octet-stream")
                    .map_err(|err| TransferError::Service(format!("multipart image part: {err}")))?
            }
        };

        let form = Form::new().text("meta", meta.to_string()).part("image", image);

        let url = format!("{}/store", self.endpoint);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|err| TransferError::Network(format!("nft.storage store transport: {err}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        let parsed: StoreResponse = serde_json::from_str(&text).map_err(|_| {
            TransferError::Service(format!("nft.storage store HTTP {status}: {text}"))
        })?;

        if !status.is_success() || !parsed.ok {
            let detail = parsed
                .error
                .map(|err| err.describe())
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(TransferError::Service(detail));
        }

        parsed
            .value
            .map(|value| ContentId(value.ipnft))
            .filter(|cid| !cid.0.trim().is_empty())
            .ok_or_else(|| TransferError::Service("nft.storage reply carried no ipnft".to_owned()))
    }
}

/// Downloads generated images so they can be pinned alongside their metadata.
pub struct HttpImageFetcher {
    http: reqwest::Client,
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &ImageUrl) -> Result<Vec<u8>, TransferError> {
        let response = self
            .http
            .get(&url.0)
            .send()
            .await
            .map_err(|err| TransferError::Network(format!("image download {}: {err}", url.0)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Service(format!("image download {} HTTP {status}", url.0)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| TransferError::Network(format!("image download {} body: {err}", url.0)))?;
        Ok(bytes.to_vec())
    }
}
