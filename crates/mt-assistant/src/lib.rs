//! Help-desk chat relay.
//!
//! [`Assistant::ask`] is total: backend failures are logged and answered with
//! [`FALLBACK_REPLY`] so the conversation can carry on.

mod gemini;

use async_trait::async_trait;
use mt_api_types::{ChatEntry, ErrorKind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub use gemini::{DEFAULT_ENDPOINT, GeminiChat};

pub const GREETING: &str = "Hi! I'm here to help you with Minted AI DApp. What would you like to know?";
pub const FALLBACK_REPLY: &str = "Sorry, I'm having trouble responding right now. Please try again.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Gemini API key is not configured")]
    Unconfigured,
    #[error("chat request failed: {0}")]
    Network(String),
    #[error("chat service error: {0}")]
    Service(String),
    #[error("Invalid response format from chat API: {0}")]
    MalformedReply(String),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Unconfigured => ErrorKind::Configuration,
            ChatError::Network(_) => ErrorKind::Network,
            ChatError::Service(_) | ChatError::MalformedReply(_) => ErrorKind::Service,
        }
    }
}

/// Append-only conversation log, opened with the greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTranscript {
    entries: Vec<ChatEntry>,
}

impl Default for ChatTranscript {
    fn default() -> Self {
        Self {
            entries: vec![ChatEntry {
                text: GREETING.to_owned(),
                from_bot: true,
            }],
        }
    }
}

impl ChatTranscript {
    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, text: String, from_bot: bool) {
        self.entries.push(ChatEntry { text, from_bot });
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `history` is the conversation before `text`, oldest first.
    async fn complete(&self, history: &[ChatEntry], text: &str) -> Result<String, ChatError>;
}

pub struct Assistant {
    backend: Arc<dyn ChatBackend>,
}

impl Assistant {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub async fn ask(&self, transcript: &mut ChatTranscript, text: &str) -> String {
        // The opening greeting is UI chrome and is not replayed to the model.
        let history = transcript.entries.get(1..).unwrap_or_default().to_vec();
        transcript.push(text.to_owned(), false);

        let reply = match self.backend.complete(&history, text).await {
            Ok(reply) => {
                debug!("assistant replied with {} chars", reply.len());
                reply
            }
            Err(err) => {
                warn!("assistant fallback ({}): {}", err.kind().as_str(), err);
                FALLBACK_REPLY.to_owned()
            }
        };

        transcript.push(reply.clone(), true);
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedBackend {
        replies: Mutex<Vec<Result<String, ChatError>>>,
        seen: Mutex<Vec<(Vec<ChatEntry>, String)>>,
    }

    impl ScriptedBackend {
        fn new(mut replies: Vec<Result<String, ChatError>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, history: &[ChatEntry], text: &str) -> Result<String, ChatError> {
            self.seen
                .lock()
                .unwrap()
                .push((history.to_vec(), text.to_owned()));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ChatError::Network("script exhausted".to_owned())))
        }
    }

    #[test]
    fn transcript_opens_with_greeting() {
        let transcript = ChatTranscript::default();
        assert_eq!(transcript.len(), 1);
        assert_eq!(
            transcript.last(),
            Some(&ChatEntry {
                text: GREETING.to_owned(),
                from_bot: true
            })
        );
    }

    #[tokio::test]
    async fn network_error_appends_fallback_instead_of_failing() {
        let backend = ScriptedBackend::new(vec![Err(ChatError::Network("connection refused".to_owned()))]);
        let assistant = Assistant::new(backend);
        let mut transcript = ChatTranscript::default();

        let reply = assistant.ask(&mut transcript, "How do I mint?").await;

        assert_eq!(reply, FALLBACK_REPLY);
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.entries()[1].text, "How do I mint?");
        assert!(!transcript.entries()[1].from_bot);
        assert_eq!(
            transcript.last(),
            Some(&ChatEntry {
                text: FALLBACK_REPLY.to_owned(),
                from_bot: true
            })
        );
    }

    #[tokio::test]
    async fn prior_turns_are_sent_without_greeting() {
        let backend = ScriptedBackend::new(vec![
            Ok("Click Connect Wallet.".to_owned()),
            Ok("Then press Mint.".to_owned()),
        ]);
        let assistant = Assistant::new(backend.clone());
        let mut transcript = ChatTranscript::default();

        assistant.ask(&mut transcript, "How do I connect?").await;
        let reply = assistant.ask(&mut transcript, "And then?").await;
        assert_eq!(reply, "Then press Mint.");

        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].0.is_empty());
        assert_eq!(seen[0].1, "How do I connect?");
        assert_eq!(
            seen[1].0,
            vec![
                ChatEntry {
                    text: "How do I connect?".to_owned(),
                    from_bot: false
                },
                ChatEntry {
                    text: "Click Connect Wallet.".to_owned(),
                    from_bot: true
                },
            ]
        );
        assert_eq!(transcript.len(), 5);
    }

    #[tokio::test]
    async fn every_failure_kind_is_swallowed() {
        let backend = ScriptedBackend::new(vec![
            Err(ChatError::Unconfigured),
            Err(ChatError::Service("quota exceeded".to_owned())),
            Err(ChatError::MalformedReply("no candidates".to_owned())),
        ]);
        let assistant = Assistant::new(backend);
        let mut transcript = ChatTranscript::default();

        for question in ["a", "b", "c"] {
            assert_eq!(assistant.ask(&mut transcript, question).await, FALLBACK_REPLY);
        }
        assert_eq!(transcript.len(), 7);
    }

    #[test]
    fn error_kinds() {
        assert_eq!(ChatError::Unconfigured.kind(), ErrorKind::Configuration);
        assert_eq!(ChatError::Network("x".to_owned()).kind(), ErrorKind::Network);
        assert_eq!(ChatError::MalformedReply("x".to_owned()).kind(), ErrorKind::Service);
    }
}
