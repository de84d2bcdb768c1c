use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use tracing::info;

use crate::api::rest::require_role;
use crate::error::AppError;
use crate::models::user::Role;
use crate::models::wallet::{AmountRequest, PayDeliveryRequest, Wallet};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/wallet", get(balance))
        .route("/wallet/add-money", post(add_money))
        .route("/wallet/pay", post(pay_delivery))
        .route("/wallet/withdraw", post(withdraw))
}

async fn balance(State(state): State<Arc<AppState>>) -> Result<Json<Wallet>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Customer, Role::Driver])?;
    Ok(Json(state.api.wallet_balance().await?))
}

async fn add_money(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<Wallet>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Customer])?;

    let wallet = state.api.add_money(&request).await?;
    info!(amount = request.amount, balance = wallet.balance, "wallet topped up");
    Ok(Json(wallet))
}

async fn pay_delivery(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PayDeliveryRequest>,
) -> Result<Json<Wallet>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Customer])?;

    let wallet = state
        .deliveries
        .mutate(state.api.pay_delivery(&request))
        .await?;
    info!(delivery_id = %request.delivery_id, amount = request.amount, "delivery paid");
    Ok(Json(wallet))
}

async fn withdraw(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<Wallet>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Driver])?;

    let wallet = state.api.withdraw(&request).await?;
    info!(amount = request.amount, balance = wallet.balance, "wallet withdrawal");
    Ok(Json(wallet))
}
