use axum::{Json, extract::State};
use mt_api_types::{ChatRequest, ChatResponse};
use std::sync::Arc;

use crate::{ApiResult, AppState, bad_request};

pub(crate) async fn chat_transcript(State(state): State<Arc<AppState>>) -> Json<ChatResponse> {
    let transcript = state.transcript.lock().await;
    Json(ChatResponse {
        reply: transcript.last().map(|entry| entry.text.clone()).unwrap_or_default(),
        transcript: transcript.entries().to_vec(),
    })
}

pub(crate) async fn chat_ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    if request.text.trim().is_empty() {
        return Err(bad_request("text is required"));
    }

    let mut transcript = state.transcript.lock().await;
    let reply = state.assistant.ask(&mut transcript, &request.text).await;

    Ok(Json(ChatResponse {
        reply,
        transcript: transcript.entries().to_vec(),
    }))
}
