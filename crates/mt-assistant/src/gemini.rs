use async_trait::async_trait;
use mt_api_types::ChatEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{ChatBackend, ChatError};

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

const FRAMING_PROMPT: &str = "You are a helpful assistant for the Minted AI DApp. You help users with wallet connection, NFT minting, and AI image generation. Keep responses concise and focused.";
const FRAMING_ACK: &str = "I understand. I'll help users with their questions about the Minted AI DApp, focusing on wallet connections, NFT minting, and AI image generation. I'll keep my responses concise and practical.";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

impl Content {
    fn new(role: &'static str, text: &str) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.to_owned() }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    fn new(history: &[ChatEntry], text: &str) -> Self {
        let mut contents = vec![
            Content::new("user", FRAMING_PROMPT),
            Content::new("model", FRAMING_ACK),
        ];
        contents.extend(
            history
                .iter()
                .map(|entry| Content::new(if entry.from_bot { "model" } else { "user" }, &entry.text)),
        );
        contents.push(Content::new("user", text));

        Self {
            contents,
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: 1024,
            },
            safety_settings: SAFETY_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|text| !text.trim().is_empty())
    }
}

/// Pulls `error.message` out of an error body when it has that shape.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(ToOwned::to_owned)
}

pub struct GeminiChat {
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl GeminiChat {
    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiChat {
    async fn complete(&self, history: &[ChatEntry], text: &str) -> Result<String, ChatError> {
        let key = self.api_key.as_deref().ok_or(ChatError::Unconfigured)?;

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", key)])
            .json(&GenerateContentRequest::new(history, text))
            .send()
            .await
            .map_err(|err| ChatError::Network(err.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ChatError::Network(err.without_url().to_string()))?;

        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| format!("HTTP {status}"));
            warn!("chat api answered HTTP {}: {}", status, message);
            return Err(ChatError::Service(message));
        }

        serde_json::from_str::<GenerateContentResponse>(&body)
            .map_err(|err| ChatError::MalformedReply(err.to_string()))?
            .first_text()
            .ok_or_else(|| ChatError::MalformedReply("no candidate text".to_owned()))
    }
}
