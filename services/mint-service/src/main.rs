mod chat;
mod config;
mod wallet;
mod workflow;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use mt_api_types::{ContractAddress, ErrorKind, ErrorResponse, WorkflowSnapshotResponse, WorkflowStatus};
use mt_assistant::{Assistant, ChatTranscript, GeminiChat};
use mt_chain_client::{ProviderError, WalletProvider};
use mt_chain_evm::JsonRpcWallet;
use mt_imagegen::{ImageGenerator, StableDiffusionApi};
use mt_storage::{HttpImageFetcher, NftStorageClient, StoragePublisher};
use mt_wallet_core::WalletSession;
use mt_workflow::{MintWorkflow, WorkflowError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::ServiceConfig;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    service: &'static str,
    version: &'static str,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

pub(crate) struct AppState {
    pub wallet: Arc<WalletSession>,
    pub workflow: Arc<Mutex<MintWorkflow>>,
    pub status: watch::Receiver<WorkflowStatus>,
    /// Last snapshot taken after a mutation, served while a stage holds the workflow.
    pub snapshot: watch::Sender<WorkflowSnapshotResponse>,
    pub assistant: Assistant,
    pub transcript: Mutex<ChatTranscript>,
}

impl AppState {
    pub fn new(wallet: Arc<WalletSession>, workflow: MintWorkflow, assistant: Assistant) -> Arc<Self> {
        Arc::new(Self {
            wallet,
            status: workflow.subscribe(),
            snapshot: watch::channel(workflow.snapshot()).0,
            workflow: Arc::new(Mutex::new(workflow)),
            assistant,
            transcript: Mutex::new(ChatTranscript::default()),
        })
    }

    async fn from_config(config: &ServiceConfig) -> Arc<Self> {
        let provider = config.rpc_url.as_ref().map(|url| {
            Arc::new(JsonRpcWallet::new(url.clone()).with_receipt_poll_interval(config.receipt_poll_interval))
                as Arc<dyn WalletProvider>
        });
        if provider.is_none() {
            warn!("EVM_RPC_URL is not set; wallet operations will report a missing provider");
        }

        let wallet = Arc::new(WalletSession::new(
            provider,
            ContractAddress(config.contract_address.clone()),
        ));
        match wallet.bootstrap(config.bootstrap).await {
            Ok(Some(address)) => info!("wallet session restored for {}", address),
            Ok(None) => info!("wallet session starts disconnected ({:?})", config.bootstrap),
            Err(err) => warn!("wallet session restore failed: {}", err),
        }

        let images = ImageGenerator::new(
            Arc::new(StableDiffusionApi::new(config.image_api_url.clone())),
            config.image_api_key.clone(),
        );
        let publisher = StoragePublisher::new(
            Arc::new(NftStorageClient::new(config.storage_url.clone())),
            Arc::new(HttpImageFetcher::default()),
            config.storage_api_key.clone(),
        )
        .with_gateway_base(config.gateway_base.clone());
        let assistant = Assistant::new(Arc::new(GeminiChat::new(
            config.chat_api_url.clone(),
            config.chat_api_key.clone(),
        )));

        for (name, present) in [
            ("IMAGE_API_KEY", images.is_configured()),
            ("NFT_STORAGE_API_KEY", publisher.is_configured()),
            ("GEMINI_API_KEY", config.chat_api_key.is_some()),
        ] {
            if !present {
                warn!("{} is not set; the dependent operation will report a configuration error", name);
            }
        }

        let workflow = MintWorkflow::new(wallet.clone(), images, publisher);
        Self::new(wallet, workflow, assistant)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;
    let state = AppState::from_config(&config).await;
    let app = router(state);

    info!("mint-service listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/wallet", get(wallet::wallet_state))
        .route("/wallet/accounts", get(wallet::wallet_accounts))
        .route("/wallet/connect", post(wallet::wallet_connect))
        .route("/wallet/disconnect", post(wallet::wallet_disconnect))
        .route("/workflow", get(workflow::workflow_snapshot))
        .route("/workflow/status", get(workflow::workflow_status))
        .route("/workflow/draft", axum::routing::put(workflow::workflow_draft))
        .route("/workflow/generate", post(workflow::workflow_generate))
        .route(
            "/workflow/upload",
            post(workflow::workflow_upload).delete(workflow::workflow_remove_upload),
        )
        .route("/workflow/publish", post(workflow::workflow_publish))
        .route("/workflow/mint", post(workflow::workflow_mint))
        .route("/chat", get(chat::chat_transcript).post(chat::chat_ask))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "mint-service",
        status: "ok",
    })
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        service: "mint-service",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn error_body(status: StatusCode, message: impl ToString, kind: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            kind: kind.to_owned(),
        }),
    )
}

pub(crate) fn bad_request(message: &str) -> ApiError {
    error_body(StatusCode::BAD_REQUEST, message, ErrorKind::Validation.as_str())
}

pub(crate) fn busy() -> ApiError {
    error_body(
        StatusCode::CONFLICT,
        "another workflow stage is still running",
        "busy",
    )
}

pub(crate) fn internal_error(message: impl ToString) -> ApiError {
    error_body(StatusCode::INTERNAL_SERVER_ERROR, message, "internal")
}

pub(crate) fn provider_error(err: &ProviderError) -> ApiError {
    let status = match err {
        ProviderError::ProviderAbsent => StatusCode::SERVICE_UNAVAILABLE,
        ProviderError::ConnectionPending => StatusCode::CONFLICT,
        ProviderError::UserRejected(_) => StatusCode::FORBIDDEN,
    };
    error_body(status, err, err.kind().as_str())
}

pub(crate) fn workflow_error(err: &WorkflowError) -> ApiError {
    let kind = err.kind();
    let status = match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Configuration => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Provider => StatusCode::CONFLICT,
        ErrorKind::Network | ErrorKind::Service | ErrorKind::Chain => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    };
    error_body(status, err, kind.as_str())
}
