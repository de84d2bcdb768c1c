use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::models::user::{LoginRequest, RegisterRequest, User};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", get(current_session).delete(sign_out))
        .route("/session/login", post(login))
        .route("/session/register", post(register))
        .route("/session/profile", get(profile))
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub authenticated: bool,
    pub user: Option<User>,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionView>, AppError> {
    let previous = state.session.user().map(|user| user.id);
    let user = state.api.login(&request).await?;
    signed_in(&state, previous, user)
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let previous = state.session.user().map(|user| user.id);
    let user = state.api.register(&request).await?;
    Ok((StatusCode::CREATED, signed_in(&state, previous, user)?))
}

fn signed_in(
    state: &AppState,
    previous: Option<String>,
    user: User,
) -> Result<Json<SessionView>, AppError> {
    if previous.as_deref() != Some(user.id.as_str()) {
        state.reset_lists();
    }
    Ok(Json(SessionView {
        authenticated: true,
        user: Some(user),
    }))
}

async fn current_session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    let user = state.session.user().filter(|_| state.session.token().is_some());
    Json(SessionView {
        authenticated: user.is_some(),
        user,
    })
}

/// Re-reads the profile from the platform; an expired token ends the session.
async fn profile(State(state): State<Arc<AppState>>) -> Result<Json<User>, AppError> {
    state.session.actor()?;
    Ok(Json(state.api.profile().await?))
}

async fn sign_out(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.session.clear_credentials()?;
    state.reset_lists();
    info!("signed out");
    Ok(StatusCode::NO_CONTENT)
}
