use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use tracing::info;

use crate::api::rest::require_role;
use crate::error::AppError;
use crate::models::delivery::DeliveryStatus;
use crate::models::feedback::{Feedback, FeedbackReply, FeedbackSubmission};
use crate::models::user::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/feedback", get(list_feedback).post(submit_feedback))
        .route("/feedback/:id/respond", post(respond))
        .route("/feedback/:id/viewed", post(mark_viewed))
}

async fn list_feedback(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Feedback>>, AppError> {
    state.session.actor()?;
    Ok(Json(state.api.list_feedback().await?))
}

/// Customers rate a delivery once it has been delivered to them.
async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<FeedbackSubmission>,
) -> Result<(StatusCode, Json<Feedback>), AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Customer])?;
    submission.validate()?;

    let delivery = state.api.get_delivery(&submission.delivery_id).await?;
    if delivery.status != DeliveryStatus::Delivered {
        return Err(AppError::Conflict(format!(
            "feedback opens once a delivery is Delivered, this one is {}",
            delivery.status
        )));
    }
    let owner = delivery.lifecycle_state().customer_id;
    if owner.is_some_and(|owner| owner != actor.id) {
        return Err(AppError::Forbidden(
            "the delivery belongs to someone else".to_string(),
        ));
    }

    let feedback = state.api.submit_feedback(&submission).await?;
    info!(feedback_id = %feedback.id, delivery_id = %submission.delivery_id, rating = submission.rating, "feedback submitted");
    Ok((StatusCode::CREATED, Json(feedback)))
}

async fn respond(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(reply): Json<FeedbackReply>,
) -> Result<Json<Feedback>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Admin])?;
    Ok(Json(state.api.respond_to_feedback(&id, &reply).await?))
}

async fn mark_viewed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Feedback>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Admin, Role::Driver])?;
    Ok(Json(state.api.mark_feedback_viewed(&id).await?))
}
