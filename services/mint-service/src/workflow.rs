use axum::{Json, extract::State};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use mt_api_types::{
    DraftRequest, MintResponse, UploadRequest, UploadedFile, WorkflowSnapshotResponse, WorkflowStatusResponse,
};
use mt_workflow::MintWorkflow;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::error;

use crate::{ApiError, ApiResult, AppState, bad_request, busy, internal_error, workflow_error};

type Claimed = OwnedMutexGuard<MintWorkflow>;

/// Mutating operations never queue behind a running stage.
fn claim(state: &AppState) -> Result<Claimed, ApiError> {
    state.workflow.clone().try_lock_owned().map_err(|_| busy())
}

fn remember(state: &AppState, workflow: &MintWorkflow) -> WorkflowSnapshotResponse {
    let snapshot = workflow.snapshot();
    state.snapshot.send_replace(snapshot.clone());
    snapshot
}

/// Runs a stage on its own task. The task owns the workflow lock, so a client
/// that goes away mid-stage does not cut the stage short.
async fn detached<T, Fut>(state: &Arc<AppState>, stage: Fut) -> Result<(Claimed, T), ApiError>
where
    T: Send + 'static,
    Fut: Future<Output = (Claimed, T)> + Send + 'static,
{
    let state = state.clone();
    let task = tokio::spawn(async move {
        let (workflow, outcome) = stage.await;
        remember(&state, &workflow);
        (workflow, outcome)
    });

    task.await.map_err(|err| {
        error!("workflow stage task failed: {}", err);
        internal_error("workflow stage did not finish")
    })
}

pub(crate) async fn workflow_snapshot(State(state): State<Arc<AppState>>) -> Json<WorkflowSnapshotResponse> {
    if let Ok(workflow) = state.workflow.try_lock() {
        return Json(workflow.snapshot());
    }

    let mut snapshot = state.snapshot.borrow().clone();
    snapshot.status = state.status.borrow().clone();
    snapshot.busy = snapshot.status.is_running();
    snapshot.mint_enabled = false;
    Json(snapshot)
}

pub(crate) async fn workflow_status(State(state): State<Arc<AppState>>) -> Json<WorkflowStatusResponse> {
    Json(WorkflowStatusResponse {
        status: state.status.borrow().clone(),
    })
}

pub(crate) async fn workflow_draft(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DraftRequest>,
) -> ApiResult<WorkflowSnapshotResponse> {
    let mut workflow = claim(&state)?;
    workflow.set_details(request.name, request.description);
    Ok(Json(remember(&state, &workflow)))
}

pub(crate) async fn workflow_generate(State(state): State<Arc<AppState>>) -> ApiResult<WorkflowSnapshotResponse> {
    let mut workflow = claim(&state)?;
    let (workflow, result) = detached(&state, async move {
        let result = workflow.generate().await;
        (workflow, result)
    })
    .await?;
    result.map_err(|err| workflow_error(&err))?;
    Ok(Json(workflow.snapshot()))
}

pub(crate) async fn workflow_upload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<WorkflowSnapshotResponse> {
    let file_name = request.file_name.trim();
    if file_name.is_empty() {
        return Err(bad_request("file_name is required"));
    }
    let bytes = STANDARD
        .decode(request.data.trim())
        .map_err(|_| bad_request("data must be base64"))?;
    let file = UploadedFile {
        file_name: file_name.to_owned(),
        content_type: request
            .content_type
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_owned()),
        bytes,
    };

    let mut workflow = claim(&state)?;
    let (workflow, result) = detached(&state, async move {
        let result = workflow.upload(file).await;
        (workflow, result)
    })
    .await?;
    result.map_err(|err| workflow_error(&err))?;
    Ok(Json(workflow.snapshot()))
}

pub(crate) async fn workflow_remove_upload(
    State(state): State<Arc<AppState>>,
) -> ApiResult<WorkflowSnapshotResponse> {
    let mut workflow = claim(&state)?;
    if !workflow.remove_upload() {
        return Err(bad_request("no uploaded image to remove"));
    }
    Ok(Json(remember(&state, &workflow)))
}

pub(crate) async fn workflow_publish(State(state): State<Arc<AppState>>) -> ApiResult<WorkflowSnapshotResponse> {
    let mut workflow = claim(&state)?;
    let (workflow, result) = detached(&state, async move {
        let result = workflow.publish().await;
        (workflow, result)
    })
    .await?;
    result.map_err(|err| workflow_error(&err))?;
    Ok(Json(workflow.snapshot()))
}

pub(crate) async fn workflow_mint(State(state): State<Arc<AppState>>) -> ApiResult<MintResponse> {
    let mut workflow = claim(&state)?;
    let (workflow, result) = detached(&state, async move {
        let result = workflow.mint().await;
        (workflow, result)
    })
    .await?;
    let receipt = result.map_err(|err| workflow_error(&err))?;

    Ok(Json(MintResponse {
        minted: true,
        tx_hash: receipt.tx_hash.0,
        block_number: receipt.block_number,
        metadata_url: workflow
            .metadata_url()
            .map(|url| url.0.clone())
            .unwrap_or_default(),
    }))
}
