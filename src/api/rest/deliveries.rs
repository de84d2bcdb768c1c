use std::cmp::Ordering;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::rest::require_role;
use crate::error::AppError;
use crate::lifecycle::{
    allowed_actions, attempt_transition, Action, ActorRef, Transition, TransitionPayload,
};
use crate::models::delivery::{
    AssignDelivery, AssignmentRequest, BookingRequest, Delivery, DeliveryStatus, NewDelivery,
    RejectDelivery, StatusChange,
};
use crate::models::user::Role;
use crate::presentation::{delivery_style, StatusStyle};
use crate::pricing::{compute_price, estimate_for_route, PriceEstimate};
use crate::realtime::tracker::TrackedDelivery;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", get(list_deliveries).post(book_delivery))
        .route("/deliveries/pending", get(pending_deliveries))
        .route(
            "/deliveries/:id",
            get(get_delivery).put(update_delivery).delete(delete_delivery),
        )
        .route("/deliveries/:id/actions", post(run_action))
        .route("/deliveries/:id/tracking", get(delivery_tracking))
}

/// A delivery as a view renders it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryView {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub style: StatusStyle,
    pub allowed_actions: Vec<Action>,
}

impl DeliveryView {
    fn new(delivery: Delivery, actor: &ActorRef) -> Self {
        let allowed_actions = allowed_actions(Some(&delivery.lifecycle_state()), actor);
        Self {
            style: delivery_style(delivery.status),
            allowed_actions,
            delivery,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryListView {
    pub items: Vec<DeliveryView>,
    pub loading: bool,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub from_fallback: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    CreatedAt,
    Price,
    Status,
    Code,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<DeliveryStatus>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: Action,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default, alias = "estimatedDistance")]
    pub estimated_distance_km: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub transition: Transition,
    pub delivery: DeliveryView,
}

#[derive(Debug, Serialize)]
pub struct TrackingView {
    #[serde(flatten)]
    pub tracked: TrackedDelivery,
    pub style: Option<StatusStyle>,
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DeliveryListView>, AppError> {
    let actor = state.session.actor()?;
    let snapshot = state.deliveries.ensure_loaded().await.require_session()?;

    let items = select(snapshot.items, &query)
        .into_iter()
        .map(|delivery| DeliveryView::new(delivery, &actor))
        .collect();

    Ok(Json(DeliveryListView {
        items,
        loading: snapshot.loading,
        error: snapshot.error,
        error_kind: snapshot.error_kind,
        refreshed_at: snapshot.refreshed_at,
        from_fallback: snapshot.from_fallback,
    }))
}

/// The admin queue of bookings waiting for approval, oldest first.
async fn pending_deliveries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeliveryView>>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Admin])?;

    let snapshot = state.deliveries.refresh().await.require_session()?;
    let query = ListQuery {
        status: Some(DeliveryStatus::Pending),
        order: SortOrder::Asc,
        ..ListQuery::default()
    };

    Ok(Json(
        select(snapshot.items, &query)
            .into_iter()
            .map(|delivery| DeliveryView::new(delivery, &actor))
            .collect(),
    ))
}

async fn book_delivery(
    State(state): State<Arc<AppState>>,
    Json(booking): Json<BookingRequest>,
) -> Result<(StatusCode, Json<DeliveryView>), AppError> {
    let actor = state.session.actor()?;
    attempt_transition(None, Action::Book, &actor, TransitionPayload::Booking(&booking))?;

    let request = priced(booking);
    let delivery = state
        .deliveries
        .mutate(state.api.create_delivery(&request))
        .await?;

    record_transition(&state, Action::Book, "applied");
    info!(
        delivery_id = %delivery.id,
        total_price = delivery.pricing.total_price,
        "delivery booked"
    );
    Ok((StatusCode::CREATED, Json(DeliveryView::new(delivery, &actor))))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryView>, AppError> {
    let actor = state.session.actor()?;
    let delivery = state.api.get_delivery(&id).await?;
    Ok(Json(DeliveryView::new(delivery, &actor)))
}

/// Edits a booking before it is approved. The price is recomputed from the
/// new route and package.
async fn update_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(booking): Json<BookingRequest>,
) -> Result<Json<DeliveryView>, AppError> {
    let actor = state.session.actor()?;
    require_role(&actor, &[Role::Customer, Role::Admin])?;
    booking.validate()?;

    let current = state.api.get_delivery(&id).await?;
    check_editable(&current, &actor)?;

    let request = priced(booking);
    let delivery = state
        .deliveries
        .mutate(state.api.update_delivery(&id, &request))
        .await?;
    Ok(Json(DeliveryView::new(delivery, &actor)))
}

async fn delete_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let actor = state.session.actor()?;
    if actor.role != Role::Admin {
        let current = state.api.get_delivery(&id).await?;
        check_editable(&current, &actor)?;
    }

    state.deliveries.mutate(state.api.delete_delivery(&id)).await?;
    info!(delivery_id = %id, "delivery deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn run_action(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let actor = state.session.actor()?;
    let current = state.api.get_delivery(&id).await?;

    let assignment = AssignmentRequest {
        driver_id: request.driver_id.clone().unwrap_or_default(),
        vehicle_id: request.vehicle_id.clone().unwrap_or_default(),
        estimated_distance_km: request.estimated_distance_km.unwrap_or_default(),
    };
    let reason = request.reason.as_deref().unwrap_or_default();
    let payload = match request.action {
        Action::Assign => TransitionPayload::Assignment(&assignment),
        Action::Reject => TransitionPayload::Rejection { reason },
        _ => TransitionPayload::None,
    };

    let transition =
        match attempt_transition(Some(&current.lifecycle_state()), request.action, &actor, payload) {
            Ok(transition) => transition,
            Err(rejection) => {
                record_transition(&state, request.action, "rejected");
                return Err(rejection.into());
            }
        };

    if !transition.applied {
        record_transition(&state, request.action, "noop");
        return Ok(Json(ActionResponse {
            transition,
            delivery: DeliveryView::new(current, &actor),
        }));
    }

    let api = &state.api;
    let delivery = state
        .deliveries
        .mutate(async {
            match request.action {
                Action::Approve => api.approve_delivery(&id).await,
                Action::Cancel => api.cancel_delivery(&id).await,
                Action::Assign => {
                    let breakdown = compute_price(
                        current.package_details.weight,
                        assignment.estimated_distance_km,
                        current.package_details.cluster,
                    );
                    let pricing = PriceEstimate {
                        distance_km: assignment.estimated_distance_km,
                        breakdown,
                    }
                    .to_pricing();
                    let command = AssignDelivery {
                        driver_id: assignment.driver_id.clone(),
                        vehicle_id: assignment.vehicle_id.clone(),
                        estimated_distance: assignment.estimated_distance_km,
                        pricing,
                    };
                    api.assign_delivery(&id, &command).await
                }
                Action::Accept => api.accept_delivery(&id).await,
                Action::Reject => {
                    let rejection = RejectDelivery {
                        reason: reason.trim().to_string(),
                    };
                    api.reject_delivery(&id, &rejection).await
                }
                Action::StartRoute | Action::Deliver => {
                    let change = StatusChange {
                        status: transition.to,
                        description: Some(format!("{} by {}", transition.to, actor.role)),
                    };
                    api.update_delivery_status(&id, &change).await
                }
                Action::Book => Err(AppError::Internal(
                    "booking is not an action on an existing delivery".to_string(),
                )),
            }
        })
        .await?;

    record_transition(&state, request.action, "applied");
    info!(
        delivery_id = %id,
        action = %request.action,
        from = ?transition.from,
        to = %transition.to,
        "delivery transitioned"
    );

    Ok(Json(ActionResponse {
        transition,
        delivery: DeliveryView::new(delivery, &actor),
    }))
}

async fn delivery_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TrackingView>, AppError> {
    state.session.actor()?;
    let tracking = state.api.delivery_tracking(&id).await?;
    let tracked = state.board.seed(&tracking);

    Ok(Json(TrackingView {
        style: tracked.status.map(delivery_style),
        tracked,
    }))
}

fn priced(booking: BookingRequest) -> NewDelivery {
    let estimate = estimate_for_route(
        &booking.pickup_location.point(),
        &booking.drop_location.point(),
        booking.package_details.weight,
        booking.package_details.cluster,
    );
    NewDelivery {
        pricing: estimate.to_pricing(),
        booking,
    }
}

fn check_editable(delivery: &Delivery, actor: &ActorRef) -> Result<(), AppError> {
    if delivery.status != DeliveryStatus::Pending {
        return Err(AppError::Conflict(format!(
            "only pending deliveries can be changed, this one is {}",
            delivery.status
        )));
    }

    if actor.role == Role::Customer {
        let owner = delivery.lifecycle_state().customer_id;
        if owner.is_some_and(|owner| owner != actor.id) {
            return Err(AppError::Forbidden(
                "the delivery belongs to someone else".to_string(),
            ));
        }
    }
    Ok(())
}

fn record_transition(state: &AppState, action: Action, outcome: &str) {
    state
        .metrics
        .transitions_total
        .with_label_values(&[action.label(), outcome])
        .inc();
}

/// Filters and orders a delivery list the way the list views ask for it.
pub fn select(mut items: Vec<Delivery>, query: &ListQuery) -> Vec<Delivery> {
    if let Some(status) = query.status {
        items.retain(|delivery| delivery.status == status);
    }
    if let Some(search) = query.search.as_deref() {
        items.retain(|delivery| delivery.matches_search(search));
    }

    items.sort_by(|a, b| {
        let ordering = match query.sort {
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::Price => a
                .pricing
                .total_price
                .partial_cmp(&b.pricing.total_price)
                .unwrap_or(Ordering::Equal),
            SortKey::Status => a.status.label().cmp(b.status.label()),
            SortKey::Code => a.delivery_code.cmp(&b.delivery_code),
        };
        match query.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    items
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{select, ListQuery, SortKey, SortOrder};
    use crate::models::delivery::{Delivery, DeliveryStatus};

    fn delivery(id: &str, status: &str, price: f64, day: u32) -> Delivery {
        let mut delivery: Delivery = serde_json::from_value(json!({
            "_id": id,
            "deliveryCode": format!("DLV-{id}"),
            "pickupLocation": { "address": "MG Road", "lat": 12.9, "lng": 77.6 },
            "dropLocation": { "address": "Indiranagar", "lat": 12.95, "lng": 77.65 },
            "packageDetails": { "weight": 5, "cluster": "Small" },
            "pricing": { "totalPrice": price },
            "status": status
        }))
        .unwrap();
        delivery.created_at = Some(Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap());
        delivery
    }

    #[test]
    fn filters_by_status_and_search() {
        let items = vec![
            delivery("a1", "Pending", 120.0, 1),
            delivery("b2", "Delivered", 90.0, 2),
            delivery("c3", "Pending", 300.0, 3),
        ];

        let query = ListQuery {
            status: Some(DeliveryStatus::Pending),
            search: Some("dlv-c".to_string()),
            ..ListQuery::default()
        };
        let selected = select(items, &query);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "c3");
    }

    #[test]
    fn newest_first_by_default_and_price_ascending_on_request() {
        let items = vec![
            delivery("a1", "Pending", 120.0, 1),
            delivery("b2", "Pending", 90.0, 3),
            delivery("c3", "Pending", 300.0, 2),
        ];

        let newest: Vec<_> = select(items.clone(), &ListQuery::default())
            .into_iter()
            .map(|delivery| delivery.id)
            .collect();
        assert_eq!(newest, ["b2", "c3", "a1"]);

        let cheapest: Vec<_> = select(
            items,
            &ListQuery {
                sort: SortKey::Price,
                order: SortOrder::Asc,
                ..ListQuery::default()
            },
        )
        .into_iter()
        .map(|delivery| delivery.id)
        .collect();
        assert_eq!(cheapest, ["b2", "a1", "c3"]);
    }
}
