use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::models::delivery::Delivery;
use crate::models::driver::Driver;
use crate::models::vehicle::Vehicle;
use crate::observability::metrics::Metrics;
use crate::realtime::tracker::TrackingBoard;
use crate::realtime::{RealtimeChannel, RoomChange};
use crate::session::SessionStore;
use crate::store::poller::Poller;
use crate::store::{ListStore, ResourceKind};
use crate::upstream::ApiClient;

pub struct AppState {
    pub session: Arc<SessionStore>,
    pub api: Arc<ApiClient>,
    pub deliveries: Arc<ListStore<Delivery>>,
    pub drivers: Arc<ListStore<Driver>>,
    pub vehicles: Arc<ListStore<Vehicle>>,
    pub board: Arc<TrackingBoard>,
    pub channel: Arc<dyn RealtimeChannel>,
    pub poller: Poller,
    pub metrics: Metrics,
}

impl AppState {
    /// The returned receiver carries room joins and leaves for
    /// [`crate::realtime::run_bridge`].
    pub fn new(
        api: ApiClient,
        channel: Arc<dyn RealtimeChannel>,
        metrics: Metrics,
        poll_interval: Duration,
        event_buffer_size: usize,
    ) -> (Self, mpsc::UnboundedReceiver<RoomChange>) {
        let session = api.session().clone();
        let api = Arc::new(api);
        let (rooms_tx, rooms_rx) = mpsc::unbounded_channel();

        let deliveries =
            ListStore::<Delivery>::new(ResourceKind::Deliveries, api.clone(), metrics.clone())
                .with_fallback(session.clone());
        let drivers: ListStore<Driver> =
            ListStore::new(ResourceKind::Drivers, api.clone(), metrics.clone());
        let vehicles: ListStore<Vehicle> =
            ListStore::new(ResourceKind::Vehicles, api.clone(), metrics.clone());

        (
            Self {
                poller: Poller::new(poll_interval, session.clone()),
                session,
                api,
                deliveries: Arc::new(deliveries),
                drivers: Arc::new(drivers),
                vehicles: Arc::new(vehicles),
                board: Arc::new(TrackingBoard::new(
                    rooms_tx,
                    event_buffer_size,
                    metrics.clone(),
                )),
                channel,
                metrics,
            },
            rooms_rx,
        )
    }

    /// Starts the shared refresh loops. Repeated calls are no-ops.
    pub fn start_polling(&self) {
        self.poller.watch(self.deliveries.clone());
        self.poller.watch(self.drivers.clone());
        self.poller.watch(self.vehicles.clone());
    }

    /// Forgets every cached list, e.g. after sign-out or a change of user.
    pub fn reset_lists(&self) {
        self.deliveries.reset();
        self.drivers.reset();
        self.vehicles.reset();
    }
}
