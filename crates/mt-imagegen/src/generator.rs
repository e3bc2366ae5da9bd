use mt_api_types::{ImageUrl, JobId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{FetchRequest, GenerationOptions, GenerationResponse, ImageApi, Text2ImgRequest};
use crate::backoff::{Backoff, PollError, Verdict, poll_with_backoff};
use crate::ImageError;

/// Outcome of the initial generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Ready(ImageUrl),
    Pending(JobId),
}

pub struct ImageGenerator {
    api: Arc<dyn ImageApi>,
    api_key: Option<String>,
    options: GenerationOptions,
    backoff: Backoff,
}

impl ImageGenerator {
    pub fn new(api: Arc<dyn ImageApi>, api_key: Option<String>) -> Self {
        Self {
            api,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            options: GenerationOptions::default(),
            backoff: Backoff::image_poll(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> Result<&str, ImageError> {
        self.api_key.as_deref().ok_or(ImageError::Unconfigured)
    }

    pub async fn submit(&self, prompt: &str) -> Result<Submission, ImageError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ImageError::Validation(
                "a description is required to generate an image".to_owned(),
            ));
        }
        let key = self.key()?;

        let response = self
            .api
            .text2img(&Text2ImgRequest::new(key, prompt, &self.options))
            .await?;
        debug!("image api answered '{}'", response.status);

        match response.status.as_str() {
            "success" => ready_url(&response).map(Submission::Ready),
            "processing" => response.job_id().map(Submission::Pending).ok_or_else(|| {
                ImageError::Generation("image api is processing but returned no job id".to_owned())
            }),
            _ => Err(ImageError::Generation(
                response
                    .message_text()
                    .unwrap_or_else(|| "Failed to generate image".to_owned()),
            )),
        }
    }

    /// Polls the fetch endpoint for `job` on the configured backoff schedule.
    pub async fn await_job(&self, job: &JobId) -> Result<ImageUrl, ImageError> {
        let request = FetchRequest {
            key: self.key()?.to_owned(),
            request_id: job.0.clone(),
        };
        let request = &request;
        let api = &self.api;

        info!("waiting for image job {}", job.0);

        poll_with_backoff(&self.backoff, move |_| api.fetch(request), classify_poll)
            .await
            .map_err(|err| match err {
                PollError::Failed(err) => err,
                PollError::Exhausted { attempts } => ImageError::Timeout { attempts },
            })
    }

    pub async fn generate(&self, prompt: &str) -> Result<ImageUrl, ImageError> {
        match self.submit(prompt).await? {
            Submission::Ready(url) => Ok(url),
            Submission::Pending(job) => self.await_job(&job).await,
        }
    }
}

fn ready_url(response: &GenerationResponse) -> Result<ImageUrl, ImageError> {
    response
        .first_output()
        .ok_or_else(|| ImageError::Generation("image api reported success without output".to_owned()))
}

fn classify_poll(response: GenerationResponse) -> Verdict<ImageUrl, ImageError> {
    match response.status.as_str() {
        "success" => match ready_url(&response) {
            Ok(url) => Verdict::Done(url),
            Err(err) => Verdict::Fail(err),
        },
        "failed" => Verdict::Fail(ImageError::Generation(
            response
                .message_text()
                .unwrap_or_else(|| "Image generation failed".to_owned()),
        )),
        _ => Verdict::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Default)]
    struct ScriptedApi {
        initial: Mutex<Option<Result<GenerationResponse, ImageError>>>,
        polls: Mutex<VecDeque<Result<GenerationResponse, ImageError>>>,
        generate_calls: Mutex<Vec<Text2ImgRequest>>,
        poll_times: Mutex<Vec<Instant>>,
        poll_ids: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn new(initial: serde_json::Value, polls: Vec<serde_json::Value>) -> Arc<Self> {
            Arc::new(Self {
                initial: Mutex::new(Some(Ok(response(initial)))),
                polls: Mutex::new(polls.into_iter().map(|value| Ok(response(value))).collect()),
                ..Self::default()
            })
        }

        fn poll_count(&self) -> usize {
            self.poll_times.lock().unwrap().len()
        }
    }

    fn response(value: serde_json::Value) -> GenerationResponse {
        serde_json::from_value(value).expect("valid scripted response")
    }

    #[async_trait]
    impl ImageApi for ScriptedApi {
        async fn text2img(&self, request: &Text2ImgRequest) -> Result<GenerationResponse, ImageError> {
            self.generate_calls.lock().unwrap().push(request.clone());
            self.initial
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ImageError::Network("unexpected generate call".to_owned())))
        }

        async fn fetch(&self, request: &FetchRequest) -> Result<GenerationResponse, ImageError> {
            self.poll_times.lock().unwrap().push(Instant::now());
            self.poll_ids.lock().unwrap().push(request.request_id.clone());
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(response(json!({ "status": "processing" }))))
        }
    }

    fn generator(api: Arc<ScriptedApi>) -> ImageGenerator {
        ImageGenerator::new(api, Some("sd-key".to_owned()))
    }

    #[tokio::test(start_paused = true)]
    async fn processing_job_resolves_on_third_poll() -> Result<(), ImageError> {
        let api = ScriptedApi::new(
            json!({ "status": "processing", "id": "job-1" }),
            vec![
                json!({ "status": "processing" }),
                json!({ "status": "processing" }),
                json!({ "status": "success", "output": ["https://img/cat.png"] }),
            ],
        );
        let started = Instant::now();

        let url = generator(api.clone()).generate("Cat swimming in the ocean").await?;

        assert_eq!(url, ImageUrl("https://img/cat.png".to_owned()));
        assert_eq!(api.poll_count(), 3);
        assert_eq!(*api.poll_ids.lock().unwrap(), vec!["job-1"; 3]);

        let times = api.poll_times.lock().unwrap();
        assert_eq!(times[0] - started, Duration::from_millis(3000));
        let gaps: Vec<Duration> = times.windows(2).map(|pair| pair[1] - pair[0]).collect();
        assert_eq!(gaps, vec![Duration::from_millis(4500), Duration::from_millis(6750)]);
        assert_eq!(api.generate_calls.lock().unwrap()[0].prompt, "Cat swimming in the ocean");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_skips_polling() -> Result<(), ImageError> {
        let api = ScriptedApi::new(
            json!({ "status": "success", "output": ["https://img/now.png"] }),
            vec![],
        );
        let started = Instant::now();

        let url = generator(api.clone()).generate("a boat").await?;

        assert_eq!(url, ImageUrl("https://img/now.png".to_owned()));
        assert_eq!(api.poll_count(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_carries_api_message() {
        let api = ScriptedApi::new(
            json!({ "status": "processing", "id": 77 }),
            vec![json!({ "status": "failed", "message": "NSFW content detected" })],
        );

        let err = generator(api.clone()).generate("a boat").await.unwrap_err();
        assert_eq!(err, ImageError::Generation("NSFW content detected".to_owned()));
        assert_eq!(api.poll_count(), 1);
        assert_eq!(*api.poll_ids.lock().unwrap(), vec!["77"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_without_message_uses_default() {
        let api = ScriptedApi::new(
            json!({ "status": "processing", "id": "job" }),
            vec![json!({ "status": "failed" })],
        );

        let err = generator(api).generate("a boat").await.unwrap_err();
        assert_eq!(err, ImageError::Generation("Image generation failed".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn ten_pending_polls_time_out() {
        let api = ScriptedApi::new(json!({ "status": "processing", "id": "job" }), vec![]);

        let err = generator(api.clone()).generate("a boat").await.unwrap_err();
        assert_eq!(err, ImageError::Timeout { attempts: 10 });
        assert_eq!(api.poll_count(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_last_attempt_is_not_a_timeout() -> Result<(), ImageError> {
        let mut polls = vec![json!({ "status": "processing" }); 9];
        polls.push(json!({ "status": "success", "output": ["https://img/late.png"] }));
        let api = ScriptedApi::new(json!({ "status": "processing", "id": "job" }), polls);

        let url = generator(api.clone()).generate("a boat").await?;
        assert_eq!(url, ImageUrl("https://img/late.png".to_owned()));
        assert_eq!(api.poll_count(), 10);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_while_polling_aborts() {
        let api = Arc::new(ScriptedApi {
            initial: Mutex::new(Some(Ok(response(json!({ "status": "processing", "id": "job" }))))),
            polls: Mutex::new(VecDeque::from([Err(ImageError::Network("reset".to_owned()))])),
            ..ScriptedApi::default()
        });

        let err = generator(api.clone()).generate("a boat").await.unwrap_err();
        assert_eq!(err, ImageError::Network("reset".to_owned()));
        assert_eq!(api.poll_count(), 1);
    }

    #[tokio::test]
    async fn unknown_initial_status_is_a_generation_error() {
        let api = ScriptedApi::new(json!({ "status": "error", "message": "Invalid API key" }), vec![]);
        let err = generator(api).generate("a boat").await.unwrap_err();
        assert_eq!(err, ImageError::Generation("Invalid API key".to_owned()));

        let api = ScriptedApi::new(json!({ "status": "error" }), vec![]);
        let err = generator(api).generate("a boat").await.unwrap_err();
        assert_eq!(err, ImageError::Generation("Failed to generate image".to_owned()));
    }

    #[tokio::test]
    async fn missing_key_and_blank_prompt_make_no_request() {
        let api = ScriptedApi::new(json!({ "status": "success", "output": ["x"] }), vec![]);

        let unconfigured = ImageGenerator::new(api.clone(), Some("  ".to_owned()));
        assert_eq!(unconfigured.generate("a boat").await, Err(ImageError::Unconfigured));

        let err = generator(api.clone()).generate("   ").await.unwrap_err();
        assert!(matches!(err, ImageError::Validation(_)));
        assert!(api.generate_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn success_without_output_is_rejected() {
        let api = ScriptedApi::new(json!({ "status": "success", "output": [] }), vec![]);
        let err = generator(api).submit("a boat").await.unwrap_err();
        assert!(matches!(err, ImageError::Generation(_)));
    }
}
