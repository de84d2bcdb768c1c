pub mod poller;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::models::driver::Driver;
use crate::models::vehicle::Vehicle;
use crate::observability::metrics::Metrics;
use crate::session::SessionStore;
use crate::upstream::ApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deliveries,
    Drivers,
    Vehicles,
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Deliveries => "deliveries",
            ResourceKind::Drivers => "drivers",
            ResourceKind::Vehicles => "vehicles",
        }
    }
}

#[async_trait]
pub trait ListSource<T>: Send + Sync {
    async fn fetch(&self) -> Result<Vec<T>, AppError>;
}

pub trait SnapshotFallback<T>: Send + Sync {
    fn load(&self) -> Option<Vec<T>>;
    fn save(&self, items: &[T]) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSnapshot<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub from_fallback: bool,
}

impl<T> Default for ListSnapshot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
            error_kind: None,
            refreshed_at: None,
            from_fallback: false,
        }
    }
}

impl<T> ListSnapshot<T> {
    pub fn require_session(self) -> Result<Self, AppError> {
        if self.error_kind == Some("unauthorized") {
            return Err(AppError::Unauthorized(
                self.error.unwrap_or_else(|| "session expired".to_string()),
            ));
        }
        Ok(self)
    }
}

pub struct ListStore<T> {
    kind: ResourceKind,
    source: Arc<dyn ListSource<T>>,
    fallback: Option<Arc<dyn SnapshotFallback<T>>>,
    state: RwLock<ListSnapshot<T>>,
    refresh_lock: Mutex<()>,
    // Completed fetches; never goes backwards so queued refreshes can coalesce.
    generation: AtomicU64,
    // Bumped by `reset` under the state lock; a fetch started in an older epoch is dropped.
    epoch: AtomicU64,
    loaded: AtomicBool,
    metrics: Metrics,
}

impl<T> ListStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(kind: ResourceKind, source: Arc<dyn ListSource<T>>, metrics: Metrics) -> Self {
        Self {
            kind,
            source,
            fallback: None,
            state: RwLock::new(ListSnapshot::default()),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            loaded: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn SnapshotFallback<T>>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn snapshot(&self) -> ListSnapshot<T> {
        self.read().clone()
    }

    pub async fn ensure_loaded(&self) -> ListSnapshot<T> {
        if !self.loaded.load(Ordering::Acquire) {
            return self.refresh().await;
        }
        self.snapshot()
    }

    pub async fn refresh(&self) -> ListSnapshot<T> {
        let seen = self.generation.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;

        if self.generation.load(Ordering::Acquire) != seen {
            debug!(resource = self.kind.label(), "refresh coalesced");
            return self.snapshot();
        }

        self.fetch_locked().await
    }

    // Never coalesced: a refresh that started before the mutation is stale.
    pub async fn mutate<F, R>(&self, operation: F) -> Result<R, AppError>
    where
        F: Future<Output = Result<R, AppError>>,
    {
        let output = operation.await?;
        let _guard = self.refresh_lock.lock().await;
        self.fetch_locked().await;
        Ok(output)
    }

    /// Drops cached items, e.g. when a different user signs in. A fetch still
    /// in flight belongs to the previous session and is discarded.
    pub fn reset(&self) {
        let mut state = self.write();
        *state = ListSnapshot::default();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.loaded.store(false, Ordering::Release);
    }

    async fn fetch_locked(&self) -> ListSnapshot<T> {
        let epoch = self.epoch.load(Ordering::Acquire);
        self.write().loading = true;
        let result = self.source.fetch().await;

        let mut state = self.write();
        state.loading = false;

        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!(resource = self.kind.label(), "dropping refresh started before reset");
            return state.clone();
        }

        match result {
            Ok(items) => {
                if let Some(fallback) = &self.fallback {
                    if let Err(err) = fallback.save(&items) {
                        warn!(resource = self.kind.label(), error = %err, "failed to cache list snapshot");
                    }
                }
                state.items = items;
                state.error = None;
                state.error_kind = None;
                state.from_fallback = false;
                state.refreshed_at = Some(Utc::now());
                self.record("success");
            }
            Err(err) => {
                warn!(resource = self.kind.label(), error = %err, "list refresh failed");
                state.error = Some(err.to_string());
                state.error_kind = Some(err.kind());

                if state.items.is_empty() {
                    if let Some(cached) = self.fallback.as_ref().and_then(|fallback| fallback.load()) {
                        state.items = cached;
                        state.from_fallback = true;
                    }
                }
                self.record("error");
            }
        }

        self.loaded.store(true, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        state.clone()
    }

    fn record(&self, outcome: &str) {
        self.metrics
            .list_refreshes_total
            .with_label_values(&[self.kind.label(), outcome])
            .inc();
    }

    fn read(&self) -> RwLockReadGuard<'_, ListSnapshot<T>> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ListSnapshot<T>> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ListSource<Delivery> for ApiClient {
    async fn fetch(&self) -> Result<Vec<Delivery>, AppError> {
        self.list_deliveries().await
    }
}

#[async_trait]
impl ListSource<Driver> for ApiClient {
    async fn fetch(&self) -> Result<Vec<Driver>, AppError> {
        self.list_drivers().await
    }
}

#[async_trait]
impl ListSource<Vehicle> for ApiClient {
    async fn fetch(&self) -> Result<Vec<Vehicle>, AppError> {
        self.list_vehicles().await
    }
}

impl SnapshotFallback<Delivery> for SessionStore {
    fn load(&self) -> Option<Vec<Delivery>> {
        let cached = self.cached_deliveries()?;
        let current_user = self.user().map(|user| user.id);
        (cached.owner_id == current_user).then_some(cached.items)
    }

    fn save(&self, items: &[Delivery]) -> Result<(), AppError> {
        self.cache_deliveries(items)
    }
}
