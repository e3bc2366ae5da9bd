use axum::{Json, extract::State};
use mt_api_types::{WalletAccountsResponse, WalletResponse};
use std::sync::Arc;

use crate::{ApiResult, AppState, provider_error};

async fn describe(state: &AppState) -> WalletResponse {
    let address = state.wallet.address().await;
    WalletResponse {
        connected: address.is_some(),
        wallet_address: address.map(|address| address.0),
        contract_address: Some(state.wallet.contract_address().0.clone()),
    }
}

pub(crate) async fn wallet_state(State(state): State<Arc<AppState>>) -> Json<WalletResponse> {
    Json(describe(&state).await)
}

/// Accounts the wallet has already authorized. Never prompts.
pub(crate) async fn wallet_accounts(State(state): State<Arc<AppState>>) -> ApiResult<WalletAccountsResponse> {
    let accounts = state
        .wallet
        .current_accounts()
        .await
        .map_err(|err| provider_error(&err))?;

    Ok(Json(WalletAccountsResponse {
        accounts: accounts.into_iter().map(|account| account.0).collect(),
    }))
}

pub(crate) async fn wallet_connect(State(state): State<Arc<AppState>>) -> ApiResult<WalletResponse> {
    state
        .wallet
        .connect()
        .await
        .map_err(|err| provider_error(&err))?;
    Ok(Json(describe(&state).await))
}

pub(crate) async fn wallet_disconnect(State(state): State<Arc<AppState>>) -> Json<WalletResponse> {
    state.wallet.disconnect().await;
    Json(describe(&state).await)
}
