use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::session::SessionStore;
use crate::store::{ListStore, ResourceKind};

#[async_trait]
pub trait Refresh: Send + Sync {
    fn kind(&self) -> ResourceKind;
    async fn refresh_now(&self);
}

#[async_trait]
impl<T> Refresh for ListStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn kind(&self) -> ResourceKind {
        ListStore::kind(self)
    }

    async fn refresh_now(&self) {
        self.refresh().await;
    }
}

/// One background refresh loop per resource kind, however many views ask
/// for it.
pub struct Poller {
    interval: Duration,
    session: Arc<SessionStore>,
    tasks: DashMap<ResourceKind, JoinHandle<()>>,
}

impl Poller {
    pub fn new(interval: Duration, session: Arc<SessionStore>) -> Self {
        Self {
            interval,
            session,
            tasks: DashMap::new(),
        }
    }

    /// Starts polling `store` unless a loop for its kind is already running.
    /// Returns whether a new loop was started.
    pub fn watch(&self, store: Arc<dyn Refresh>) -> bool {
        let kind = store.kind();
        if let Some(existing) = self.tasks.get(&kind) {
            if !existing.is_finished() {
                return false;
            }
        }

        let interval = self.interval;
        let session = self.session.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if session.token().is_none() {
                    debug!(resource = kind.label(), "not signed in; skipping poll");
                    continue;
                }
                store.refresh_now().await;
            }
        });

        info!(resource = kind.label(), interval_secs = interval.as_secs(), "polling started");
        self.tasks.insert(kind, handle);
        true
    }

    pub fn is_polling(&self, kind: ResourceKind) -> bool {
        self.tasks
            .get(&kind)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stop_all(&self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
        self.tasks.clear();
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{Poller, Refresh};
    use crate::models::user::{Role, User};
    use crate::session::SessionStore;
    use crate::store::ResourceKind;

    struct Counting {
        kind: ResourceKind,
        hits: AtomicUsize,
    }

    #[async_trait]
    impl Refresh for Counting {
        fn kind(&self) -> ResourceKind {
            self.kind
        }

        async fn refresh_now(&self) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn signed_in_session() -> Arc<SessionStore> {
        let session = SessionStore::in_memory();
        session
            .sign_in(
                "tok".to_string(),
                User {
                    id: "adm-1".to_string(),
                    name: "Admin".to_string(),
                    email: "admin@example.com".to_string(),
                    role: Role::Admin,
                    phone: None,
                },
            )
            .unwrap();
        Arc::new(session)
    }

    #[tokio::test(start_paused = true)]
    async fn one_loop_per_resource_kind() {
        let poller = Poller::new(Duration::from_secs(30), signed_in_session());
        let store = Arc::new(Counting {
            kind: ResourceKind::Deliveries,
            hits: AtomicUsize::new(0),
        });

        assert!(poller.watch(store.clone()));
        assert!(!poller.watch(store.clone()));
        assert!(poller.is_polling(ResourceKind::Deliveries));
        assert!(!poller.is_polling(ResourceKind::Vehicles));

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(store.hits.load(Ordering::SeqCst), 3);
        poller.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn skips_polls_while_signed_out() {
        let poller = Poller::new(Duration::from_secs(30), Arc::new(SessionStore::in_memory()));
        let store = Arc::new(Counting {
            kind: ResourceKind::Vehicles,
            hits: AtomicUsize::new(0),
        });

        poller.watch(store.clone());
        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(store.hits.load(Ordering::SeqCst), 0);
    }
}
