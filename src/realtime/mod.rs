pub mod local;
pub mod tracker;
pub mod ws_channel;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::lifecycle::{ActorRef, LifecycleState};
use crate::models::delivery::DeliveryStatus;
use crate::models::user::Role;
use crate::realtime::tracker::TrackingBoard;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub delivery_id: String,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
    #[serde(default, alias = "timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub delivery_id: String,
    pub status: DeliveryStatus,
    #[serde(default, alias = "updatedAt")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Location(LocationUpdate),
    Status(StatusUpdate),
}

impl ChannelEvent {
    pub fn delivery_id(&self) -> &str {
        match self {
            ChannelEvent::Location(update) => &update.delivery_id,
            ChannelEvent::Status(update) => &update.delivery_id,
        }
    }

    // `locationUpdate:<id>` carries the id in the event name.
    pub fn parse_frame(text: &str) -> Result<Option<Self>, AppError> {
        #[derive(Deserialize)]
        struct Frame {
            event: String,
            #[serde(default)]
            data: Value,
        }

        let frame: Frame = serde_json::from_str(text)
            .map_err(|err| AppError::Contract(format!("invalid channel frame: {err}")))?;

        let (name, scoped_id) = match frame.event.split_once(':') {
            Some((name, id)) => (name, Some(id)),
            None => (frame.event.as_str(), None),
        };

        let mut data = frame.data;
        if let (Some(id), Value::Object(object)) = (scoped_id, &mut data) {
            object
                .entry("deliveryId")
                .or_insert_with(|| Value::String(id.to_string()));
        }

        let event = match name {
            "locationUpdate" => serde_json::from_value(data).map(ChannelEvent::Location),
            "statusUpdate" => serde_json::from_value(data).map(ChannelEvent::Status),
            _ => return Ok(None),
        };

        event
            .map(Some)
            .map_err(|err| AppError::Contract(format!("invalid {name} payload: {err}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationPublish {
    pub driver_id: String,
    pub vehicle_id: String,
    pub delivery_id: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Join(String),
    Leave(String),
    Location(LocationPublish),
}

impl OutboundFrame {
    pub fn to_text(&self) -> String {
        let frame = match self {
            OutboundFrame::Join(id) => json!({ "event": "joinDelivery", "data": { "deliveryId": id } }),
            OutboundFrame::Leave(id) => {
                json!({ "event": "leaveDelivery", "data": { "deliveryId": id } })
            }
            OutboundFrame::Location(update) => json!({ "event": "locationUpdate", "data": update }),
        };
        frame.to_string()
    }
}

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn join(&self, delivery_id: &str) -> Result<(), AppError>;
    async fn leave(&self, delivery_id: &str) -> Result<(), AppError>;
    /// Fire-and-forget: no acknowledgement, no retry.
    async fn publish_location(&self, update: &LocationPublish) -> Result<(), AppError>;
    fn events(&self) -> broadcast::Receiver<ChannelEvent>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomChange {
    Join(String),
    Leave(String),
}

pub fn check_publish(state: &LifecycleState, actor: &ActorRef) -> Result<(), AppError> {
    if actor.role != Role::Driver {
        return Err(AppError::Forbidden(
            "only drivers publish locations".to_string(),
        ));
    }

    if state.assigned_driver_id.as_deref() != Some(actor.id.as_str()) {
        return Err(AppError::Forbidden(
            "delivery is not assigned to this driver".to_string(),
        ));
    }

    if state.status != DeliveryStatus::OnRoute {
        return Err(AppError::Conflict(format!(
            "locations are published only while On Route, delivery is {}",
            state.status
        )));
    }

    Ok(())
}

/// Runs until both the channel and the board's room sender are gone.
pub async fn run_bridge(
    board: Arc<TrackingBoard>,
    channel: Arc<dyn RealtimeChannel>,
    mut rooms: mpsc::UnboundedReceiver<RoomChange>,
) {
    let mut events = channel.events();
    info!("realtime bridge started");

    loop {
        tokio::select! {
            change = rooms.recv() => {
                let Some(change) = change else { break };
                let result = match &change {
                    RoomChange::Join(id) => channel.join(id).await,
                    RoomChange::Leave(id) => channel.leave(id).await,
                };
                if let Err(err) = result {
                    warn!(error = %err, ?change, "room change failed");
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let outcome = board.apply(event);
                    debug!(?outcome, "channel event applied");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "realtime bridge lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    warn!("realtime bridge stopped");
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{check_publish, ChannelEvent, OutboundFrame};
    use crate::lifecycle::{ActorRef, LifecycleState};
    use crate::models::delivery::DeliveryStatus;
    use crate::models::user::Role;

    #[test]
    fn parses_room_and_scoped_events() {
        let room = json!({
            "event": "locationUpdate",
            "data": { "deliveryId": "d-1", "latitude": 12.9, "longitude": 77.6 }
        });
        match ChannelEvent::parse_frame(&room.to_string()).unwrap() {
            Some(ChannelEvent::Location(update)) => {
                assert_eq!(update.delivery_id, "d-1");
                assert_eq!(update.lat, 12.9);
                assert!(update.last_updated.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }

        let scoped = json!({
            "event": "statusUpdate:d-2",
            "data": { "status": "Delivered" }
        });
        match ChannelEvent::parse_frame(&scoped.to_string()).unwrap() {
            Some(ChannelEvent::Status(update)) => {
                assert_eq!(update.delivery_id, "d-2");
                assert_eq!(update.status, DeliveryStatus::Delivered);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_events_are_ignored_and_bad_payloads_fail() {
        let other = json!({ "event": "chatMessage", "data": { "text": "hi" } });
        assert!(ChannelEvent::parse_frame(&other.to_string()).unwrap().is_none());

        let broken = json!({ "event": "statusUpdate", "data": { "deliveryId": "d-1" } });
        assert!(ChannelEvent::parse_frame(&broken.to_string()).is_err());
    }

    #[test]
    fn join_frame_names_the_delivery_room() {
        let text = OutboundFrame::Join("d-9".to_string()).to_text();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "joinDelivery");
        assert_eq!(value["data"]["deliveryId"], "d-9");
    }

    #[test]
    fn only_the_assigned_driver_publishes_while_on_route() {
        let driver = ActorRef {
            role: Role::Driver,
            id: "drv-1".to_string(),
        };
        let mut state = LifecycleState {
            status: DeliveryStatus::OnRoute,
            assigned_driver_id: Some("drv-1".to_string()),
            customer_id: None,
        };
        assert!(check_publish(&state, &driver).is_ok());

        state.status = DeliveryStatus::Accepted;
        assert_eq!(check_publish(&state, &driver).unwrap_err().kind(), "conflict");

        state.status = DeliveryStatus::OnRoute;
        state.assigned_driver_id = Some("drv-2".to_string());
        assert_eq!(check_publish(&state, &driver).unwrap_err().kind(), "forbidden");
    }
}
