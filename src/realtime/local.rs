use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::AppError;
use crate::realtime::{ChannelEvent, LocationPublish, LocationUpdate, RealtimeChannel};

/// In-process channel: published locations come straight back as events for
/// joined rooms. Used when no channel URL is configured.
pub struct LocalChannel {
    events: broadcast::Sender<ChannelEvent>,
    rooms: Mutex<HashSet<String>>,
}

impl LocalChannel {
    pub fn new(buffer: usize) -> Self {
        let (events, _unused_rx) = broadcast::channel(buffer.max(1));
        Self {
            events,
            rooms: Mutex::new(HashSet::new()),
        }
    }

    fn rooms(&self) -> Result<std::sync::MutexGuard<'_, HashSet<String>>, AppError> {
        self.rooms
            .lock()
            .map_err(|_| AppError::Internal("local channel rooms poisoned".to_string()))
    }
}

#[async_trait]
impl RealtimeChannel for LocalChannel {
    async fn join(&self, delivery_id: &str) -> Result<(), AppError> {
        self.rooms()?.insert(delivery_id.to_string());
        debug!(delivery_id, "joined local room");
        Ok(())
    }

    async fn leave(&self, delivery_id: &str) -> Result<(), AppError> {
        self.rooms()?.remove(delivery_id);
        debug!(delivery_id, "left local room");
        Ok(())
    }

    async fn publish_location(&self, update: &LocationPublish) -> Result<(), AppError> {
        if !self.rooms()?.contains(&update.delivery_id) {
            return Ok(());
        }

        // No receiver yet is fine.
        let _ = self.events.send(ChannelEvent::Location(LocationUpdate {
            delivery_id: update.delivery_id.clone(),
            lat: update.lat,
            lng: update.lng,
            last_updated: Some(Utc::now()),
        }));
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::LocalChannel;
    use crate::realtime::{ChannelEvent, LocationPublish, RealtimeChannel};

    fn publish(delivery_id: &str) -> LocationPublish {
        LocationPublish {
            driver_id: "drv-1".to_string(),
            vehicle_id: "veh-1".to_string(),
            delivery_id: delivery_id.to_string(),
            lat: 12.93,
            lng: 77.62,
        }
    }

    #[tokio::test]
    async fn loops_back_only_for_joined_rooms() {
        let channel = LocalChannel::new(8);
        let mut events = channel.events();

        channel.publish_location(&publish("d-1")).await.unwrap();
        assert!(events.try_recv().is_err());

        channel.join("d-1").await.unwrap();
        channel.publish_location(&publish("d-1")).await.unwrap();

        match events.recv().await.unwrap() {
            ChannelEvent::Location(update) => {
                assert_eq!(update.delivery_id, "d-1");
                assert!(update.last_updated.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }

        channel.leave("d-1").await.unwrap();
        channel.publish_location(&publish("d-1")).await.unwrap();
        assert!(events.try_recv().is_err());
    }
}
