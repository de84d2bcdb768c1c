pub mod deliveries;
pub mod feedback;
pub mod fleet;
pub mod pricing;
pub mod session;
pub mod wallet;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::lifecycle::ActorRef;
use crate::models::user::Role;
use crate::store::ResourceKind;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(session::router())
        .merge(deliveries::router())
        .merge(pricing::router())
        .merge(fleet::router())
        .merge(wallet::router())
        .merge(feedback::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub(crate) fn require_role(actor: &ActorRef, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&actor.role) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "this view is not available to a {}",
        actor.role
    )))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    signed_in: bool,
    cached_deliveries: usize,
    polling: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        signed_in: state.session.token().is_some(),
        cached_deliveries: state.deliveries.snapshot().items.len(),
        polling: state.poller.is_polling(ResourceKind::Deliveries),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
