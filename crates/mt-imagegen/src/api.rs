use async_trait::async_trait;
use mt_api_types::{ImageUrl, JobId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::ImageError;

pub const DEFAULT_ENDPOINT: &str = "https://stablediffusionapi.com/api/v3";

/// Tunables sent with every text-to-image request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub safety_checker: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            negative_prompt: "blurry, bad quality, distorted, deformed, ugly, bad anatomy".to_owned(),
            width: 512,
            height: 512,
            samples: 1,
            num_inference_steps: 20,
            guidance_scale: 7.5,
            safety_checker: true,
        }
    }
}

fn yes_no(flag: bool) -> String {
    let value = if flag { "yes" } else { "no" };
    value.to_owned()
}

// ── wire types ───────────────────────────────────────────────────────

const REDACTED: &str = "<redacted>";

#[derive(Clone, Serialize)]
pub struct Text2ImgRequest {
    pub key: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: String,
    pub height: String,
    pub samples: String,
    pub num_inference_steps: String,
    pub seed: Option<u64>,
    pub guidance_scale: f64,
    pub safety_checker: String,
    pub multi_lingual: String,
    pub panorama: String,
    pub self_attention: String,
    pub upscale: String,
    pub embeddings_model: Option<String>,
    pub webhook: Option<String>,
    pub track_id: Option<String>,
}

impl Text2ImgRequest {
    pub fn new(key: &str, prompt: &str, options: &GenerationOptions) -> Self {
        Self {
            key: key.to_owned(),
            prompt: prompt.to_owned(),
            negative_prompt: options.negative_prompt.clone(),
            width: options.width.to_string(),
            height: options.height.to_string(),
            samples: options.samples.to_string(),
            num_inference_steps: options.num_inference_steps.to_string(),
            seed: None,
            guidance_scale: options.guidance_scale,
            safety_checker: yes_no(options.safety_checker),
            multi_lingual: yes_no(false),
            panorama: yes_no(false),
            self_attention: yes_no(false),
            upscale: yes_no(false),
            embeddings_model: None,
            webhook: None,
            track_id: None,
        }
    }
}

impl fmt::Debug for Text2ImgRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Text2ImgRequest")
            .field("key", &REDACTED)
            .field("prompt", &self.prompt)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("samples", &self.samples)
            .field("num_inference_steps", &self.num_inference_steps)
            .field("guidance_scale", &self.guidance_scale)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize)]
pub struct FetchRequest {
    pub key: String,
    pub request_id: String,
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("key", &REDACTED)
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Shared response shape of the generate and fetch endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

impl GenerationResponse {
    pub fn first_output(&self) -> Option<ImageUrl> {
        self.output
            .iter()
            .map(|url| url.trim())
            .find(|url| !url.is_empty())
            .map(|url| ImageUrl(url.to_owned()))
    }

    /// The job id arrives as a number from some deployments and a string from others.
    pub fn job_id(&self) -> Option<JobId> {
        match self.id.as_ref()? {
            Value::String(id) if !id.trim().is_empty() => Some(JobId(id.trim().to_owned())),
            Value::Number(id) => Some(JobId(id.to_string())),
            _ => None,
        }
    }

    pub fn message_text(&self) -> Option<String> {
        match self.message.as_ref()? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn text2img(&self, request: &Text2ImgRequest) -> Result<GenerationResponse, ImageError>;
    async fn fetch(&self, request: &FetchRequest) -> Result<GenerationResponse, ImageError>;
}

/// HTTP client for the Stable Diffusion API (`/text2img`, `/fetch`).
pub struct StableDiffusionApi {
    endpoint: String,
    http: reqwest::Client,
}

impl Default for StableDiffusionApi {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StableDiffusionApi {
    pub fn new(endpoint: Option<String>) -> Self {
        let endpoint = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<GenerationResponse, ImageError> {
        let url = format!("{}/{}", self.endpoint, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| ImageError::Network(format!("{path}: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ImageError::Network(format!("{path} body: {err}")))?;

        match serde_json::from_str::<GenerationResponse>(&text) {
            Ok(parsed) => {
                if !status.is_success() {
                    warn!("image api {} answered HTTP {} with status '{}'", path, status, parsed.status);
                }
                Ok(parsed)
            }
            Err(_) if !status.is_success() => {
                Err(ImageError::Generation(format!("image api {path} HTTP {status}: {text}")))
            }
            Err(err) => Err(ImageError::Generation(format!("image api {path} parse: {err}"))),
        }
    }
}

#[async_trait]
impl ImageApi for StableDiffusionApi {
    async fn text2img(&self, request: &Text2ImgRequest) -> Result<GenerationResponse, ImageError> {
        self.post("text2img", request).await
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<GenerationResponse, ImageError> {
        self.post("fetch", request).await
    }
}
