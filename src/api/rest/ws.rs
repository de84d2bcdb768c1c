use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::StreamMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::rest::deliveries::TrackingView;
use crate::error::AppError;
use crate::geo::validate_point;
use crate::lifecycle::ActorRef;
use crate::models::delivery::Delivery;
use crate::models::location::GeoPoint;
use crate::presentation::delivery_style;
use crate::realtime::tracker::{Subscription, TrackedDelivery};
use crate::realtime::{check_publish, LocationPublish};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe { delivery_id: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { delivery_id: String },
    #[serde(rename_all = "camelCase")]
    PublishLocation {
        delivery_id: String,
        vehicle_id: String,
        lat: f64,
        lng: f64,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut watching: StreamMap<String, Subscription> = StreamMap::new();
    let client_id = Uuid::new_v4();

    info!(%client_id, "websocket client connected");

    loop {
        let outgoing = tokio::select! {
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(%client_id, error = %err, "websocket receive failed");
                        break;
                    }
                };

                match handle_message(&state, &mut watching, &text).await {
                    Ok(Some(reply)) => reply,
                    Ok(None) => continue,
                    Err(err) => json!({ "type": "error", "error": err.to_string(), "kind": err.kind() }),
                }
            }
            Some((_, tracked)) = watching.next(), if !watching.is_empty() => tracking_frame(tracked),
        };

        if sender.send(Message::Text(outgoing.to_string())).await.is_err() {
            break;
        }
    }

    // Dropping the subscriptions leaves their rooms.
    drop(watching);
    info!(%client_id, "websocket client disconnected");
}

async fn handle_message(
    state: &AppState,
    watching: &mut StreamMap<String, Subscription>,
    text: &str,
) -> Result<Option<Value>, AppError> {
    let message: ClientMessage = serde_json::from_str(text)
        .map_err(|err| AppError::validation("message", err.to_string()))?;
    let actor = state.session.actor()?;

    match message {
        ClientMessage::Subscribe { delivery_id } => {
            if watching.contains_key(&delivery_id) {
                return Ok(None);
            }
            // Subscribe before seeding so the snapshot reaches this client. A
            // failed fetch drops the subscription and leaves the room again.
            let subscription = state.board.subscribe(&delivery_id);
            let tracking = state.api.delivery_tracking(&delivery_id).await?;
            state.board.seed(&tracking);
            watching.insert(delivery_id.clone(), subscription);

            debug!(
                delivery_id = %delivery_id,
                watchers = state.board.watchers(&delivery_id),
                "tracking subscribed"
            );
            Ok(Some(json!({ "type": "subscribed", "deliveryId": delivery_id })))
        }
        ClientMessage::Unsubscribe { delivery_id } => {
            watching.remove(&delivery_id);
            Ok(Some(json!({ "type": "unsubscribed", "deliveryId": delivery_id })))
        }
        ClientMessage::PublishLocation {
            delivery_id,
            vehicle_id,
            lat,
            lng,
        } => {
            validate_point("location", &GeoPoint { lat, lng })?;
            let delivery = publishable_delivery(state, &delivery_id, &actor).await?;
            debug!(delivery_id = %delivery.id, "publishing driver location");

            state
                .channel
                .publish_location(&LocationPublish {
                    driver_id: actor.id,
                    vehicle_id,
                    delivery_id,
                    lat,
                    lng,
                })
                .await?;
            Ok(None)
        }
    }
}

/// Checks against the cached list first so a driver streaming positions does
/// not hit the platform on every fix. A cached copy that fails the check may be
/// stale, so the platform decides.
async fn publishable_delivery(
    state: &AppState,
    delivery_id: &str,
    actor: &ActorRef,
) -> Result<Delivery, AppError> {
    let cached = state
        .deliveries
        .snapshot()
        .items
        .into_iter()
        .find(|delivery| delivery.id == delivery_id)
        .filter(|delivery| check_publish(&delivery.lifecycle_state(), actor).is_ok());
    if let Some(delivery) = cached {
        return Ok(delivery);
    }

    let delivery = state.api.get_delivery(delivery_id).await?;
    check_publish(&delivery.lifecycle_state(), actor)?;
    Ok(delivery)
}

fn tracking_frame(tracked: TrackedDelivery) -> Value {
    let style = tracked.status.map(delivery_style);
    json!({ "type": "tracking", "delivery": TrackingView { tracked, style } })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_stream::StreamMap;

    use super::handle_message;
    use crate::models::user::{Role, User};
    use crate::observability::metrics::Metrics;
    use crate::realtime::local::LocalChannel;
    use crate::session::SessionStore;
    use crate::state::AppState;
    use crate::upstream::ApiClient;

    fn unreachable_platform() -> AppState {
        let session = Arc::new(SessionStore::in_memory());
        session
            .sign_in(
                "token-c-1".to_string(),
                User {
                    id: "c-1".to_string(),
                    name: "Asha".to_string(),
                    email: "asha@example.com".to_string(),
                    role: Role::Customer,
                    phone: None,
                },
            )
            .unwrap();
        let metrics = Metrics::new();
        let api = ApiClient::new(
            "http://127.0.0.1:1/api",
            Duration::from_millis(500),
            session,
            metrics.clone(),
        )
        .unwrap();
        let (state, _rooms) = AppState::new(
            api,
            Arc::new(LocalChannel::new(8)),
            metrics,
            Duration::from_secs(30),
            16,
        );
        state
    }

    #[tokio::test]
    async fn failed_subscribe_keeps_no_watcher_and_can_be_retried() {
        let state = unreachable_platform();
        let mut watching = StreamMap::new();
        let subscribe = r#"{"type":"subscribe","deliveryId":"d-1"}"#;

        let err = handle_message(&state, &mut watching, subscribe)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network");
        assert!(!watching.contains_key("d-1"));
        assert_eq!(state.board.watchers("d-1"), 0);

        // The retry reaches the platform again instead of being swallowed.
        let err = handle_message(&state, &mut watching, subscribe)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network");
        assert_eq!(state.board.watchers("d-1"), 0);
    }
}
