use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::geo::validate_point;
use crate::models::delivery::{DeliveryStatus, DeliveryTracking};
use crate::models::location::{CurrentLocation, GeoPoint};
use crate::observability::metrics::Metrics;
use crate::realtime::{ChannelEvent, RoomChange};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedDelivery {
    pub delivery_id: String,
    pub status: Option<DeliveryStatus>,
    pub current_location: Option<CurrentLocation>,
    pub status_updated_at: Option<DateTime<Utc>>,
}

impl TrackedDelivery {
    fn empty(delivery_id: &str) -> Self {
        Self {
            delivery_id: delivery_id.to_string(),
            status: None,
            current_location: None,
            status_updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Older than what the board already holds.
    Stale,
    /// Not on the board, or unusable coordinates.
    Ignored,
}

impl ApplyOutcome {
    fn label(&self) -> &'static str {
        match self {
            ApplyOutcome::Applied => "applied",
            ApplyOutcome::Stale => "stale",
            ApplyOutcome::Ignored => "ignored",
        }
    }
}

struct Entry {
    tracked: TrackedDelivery,
    updates: broadcast::Sender<TrackedDelivery>,
    watchers: usize,
}

impl Entry {
    fn new(delivery_id: &str, buffer: usize) -> Self {
        let (updates, _unused_rx) = broadcast::channel(buffer);
        Self {
            tracked: TrackedDelivery::empty(delivery_id),
            updates,
            watchers: 0,
        }
    }

    fn merge_location(&mut self, location: CurrentLocation) -> ApplyOutcome {
        if let Some(held) = &self.tracked.current_location {
            if location.last_updated < held.last_updated {
                return ApplyOutcome::Stale;
            }
        }
        self.tracked.current_location = Some(location);
        ApplyOutcome::Applied
    }

    fn merge_status(
        &mut self,
        status: DeliveryStatus,
        at: Option<DateTime<Utc>>,
    ) -> ApplyOutcome {
        if let (Some(incoming), Some(held)) = (at, self.tracked.status_updated_at) {
            if incoming < held {
                return ApplyOutcome::Stale;
            }
        }
        self.tracked.status = Some(status);
        if at.is_some() {
            self.tracked.status_updated_at = at;
        }
        ApplyOutcome::Applied
    }

    fn publish(&self) {
        // Nobody listening is fine.
        let _ = self.updates.send(self.tracked.clone());
    }
}

pub struct TrackingBoard {
    entries: DashMap<String, Entry>,
    rooms: mpsc::UnboundedSender<RoomChange>,
    buffer: usize,
    metrics: Metrics,
}

impl TrackingBoard {
    pub fn new(
        rooms: mpsc::UnboundedSender<RoomChange>,
        buffer: usize,
        metrics: Metrics,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            rooms,
            buffer: buffer.max(1),
            metrics,
        }
    }

    pub fn get(&self, delivery_id: &str) -> Option<TrackedDelivery> {
        self.entries
            .get(delivery_id)
            .map(|entry| entry.tracked.clone())
    }

    pub fn watchers(&self, delivery_id: &str) -> usize {
        self.entries
            .get(delivery_id)
            .map_or(0, |entry| entry.watchers)
    }

    /// Reconciles one channel event. Location updates without a timestamp are
    /// stamped with the time they arrived.
    pub fn apply(&self, event: ChannelEvent) -> ApplyOutcome {
        let outcome = match self.entries.get_mut(event.delivery_id()) {
            None => ApplyOutcome::Ignored,
            Some(mut entry) => {
                let outcome = match event {
                    ChannelEvent::Location(update) => {
                        let point = GeoPoint {
                            lat: update.lat,
                            lng: update.lng,
                        };
                        if validate_point("location", &point).is_err() {
                            warn!(delivery_id = %update.delivery_id, "location update with invalid coordinates");
                            ApplyOutcome::Ignored
                        } else {
                            entry.merge_location(CurrentLocation {
                                lat: update.lat,
                                lng: update.lng,
                                last_updated: update.last_updated.unwrap_or_else(Utc::now),
                            })
                        }
                    }
                    ChannelEvent::Status(update) => entry.merge_status(update.status, update.timestamp),
                };

                if outcome == ApplyOutcome::Applied {
                    entry.publish();
                }
                outcome
            }
        };

        self.metrics
            .tracking_updates_total
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    /// Nothing is kept for deliveries nobody watches.
    pub fn seed(&self, tracking: &DeliveryTracking) -> TrackedDelivery {
        let merged = self.merge_snapshot(tracking);
        self.entries
            .remove_if(&tracking.id, |_, entry| entry.watchers == 0);
        merged
    }

    fn merge_snapshot(&self, tracking: &DeliveryTracking) -> TrackedDelivery {
        let mut entry = self
            .entries
            .entry(tracking.id.clone())
            .or_insert_with(|| Entry::new(&tracking.id, self.buffer));

        let status_at = tracking
            .status_history
            .iter()
            .filter(|item| item.status == tracking.status)
            .map(|item| item.timestamp)
            .max();
        let mut changed = entry.merge_status(tracking.status, status_at) == ApplyOutcome::Applied;
        if let Some(location) = tracking.current_location {
            changed |= entry.merge_location(location) == ApplyOutcome::Applied;
        }

        if changed {
            entry.publish();
        }
        entry.tracked.clone()
    }

    /// The stream starts with the current state, when there is one. The first
    /// local watcher joins the delivery's room.
    pub fn subscribe(self: &Arc<Self>, delivery_id: &str) -> Subscription {
        let (initial, receiver) = {
            let mut entry = self
                .entries
                .entry(delivery_id.to_string())
                .or_insert_with(|| Entry::new(delivery_id, self.buffer));
            entry.watchers += 1;

            // Room changes are sent under the entry lock so they reach the
            // bridge in the order the watcher count moved.
            if entry.watchers == 1 {
                self.metrics.tracked_deliveries.inc();
                self.send_room(RoomChange::Join(delivery_id.to_string()));
            }

            let known = entry.tracked.status.is_some() || entry.tracked.current_location.is_some();
            (known.then(|| entry.tracked.clone()), entry.updates.subscribe())
        };

        let live = BroadcastStream::new(receiver).filter_map(|item| async move {
            match item {
                Ok(update) => Some(update),
                Err(err) => {
                    debug!(error = %err, "tracking subscriber lagged");
                    None
                }
            }
        });

        Subscription {
            delivery_id: delivery_id.to_string(),
            board: Arc::clone(self),
            updates: stream::iter(initial).chain(live).boxed(),
        }
    }

    fn unsubscribe(&self, delivery_id: &str) {
        if let MapEntry::Occupied(mut occupied) = self.entries.entry(delivery_id.to_string()) {
            let entry = occupied.get_mut();
            entry.watchers = entry.watchers.saturating_sub(1);
            if entry.watchers == 0 {
                self.send_room(RoomChange::Leave(delivery_id.to_string()));
                self.metrics.tracked_deliveries.dec();
                occupied.remove();
            }
        }
    }

    fn send_room(&self, change: RoomChange) {
        if self.rooms.send(change).is_err() {
            warn!("realtime bridge is gone; room change dropped");
        }
    }
}

/// Live updates for one delivery. Dropping it unsubscribes.
pub struct Subscription {
    delivery_id: String,
    board: Arc<TrackingBoard>,
    updates: Pin<Box<dyn Stream<Item = TrackedDelivery> + Send>>,
}

impl Subscription {
    pub fn delivery_id(&self) -> &str {
        &self.delivery_id
    }
}

impl Stream for Subscription {
    type Item = TrackedDelivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.updates.as_mut().poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.board.unsubscribe(&self.delivery_id);
    }
}
