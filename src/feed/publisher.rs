use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::store::{Attendance, RecordStore, StoreError};

/// Current top-N attendance of one event, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    /// Monotonic per hub; a snapshot never replaces a newer one.
    pub generation: u64,
    pub records: Vec<Attendance>,
    /// Set when the last refresh failed and `records` may be out of date.
    pub stale: bool,
}

type Subscribers = HashMap<String, HashMap<u64, watch::Sender<FeedSnapshot>>>;

struct HubInner {
    store: Arc<dyn RecordStore>,
    limit: i64,
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
    generation: AtomicU64,
}

/// Pushes the full current top-N of an event to every live subscription of
/// that event whenever `refresh` is called.
#[derive(Clone)]
pub struct LiveFeedHub {
    inner: Arc<HubInner>,
}

impl LiveFeedHub {
    pub fn new(store: Arc<dyn RecordStore>, limit: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store,
                limit: limit as i64,
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.inner.limit as usize
    }

    /// Opens a subscription primed with the current top-N. A store failure
    /// yields an empty stale snapshot instead of an error.
    pub async fn subscribe(&self, event_id: &str) -> FeedSubscription {
        let snapshot = match self.load(event_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, %event_id, "initial feed load failed; starting stale");
                FeedSnapshot {
                    stale: true,
                    ..FeedSnapshot::default()
                }
            }
        };

        let (tx, rx) = watch::channel(snapshot);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(event_id.to_string())
            .or_default()
            .insert(id, tx);
        debug!(%event_id, subscription = id, "feed subscription opened");

        FeedSubscription {
            hub: self.clone(),
            event_id: event_id.to_string(),
            id,
            receiver: rx,
        }
    }

    /// Re-queries the event's top-N and delivers it. On store failure every
    /// subscription keeps its last list and is marked stale.
    pub async fn refresh(&self, event_id: &str) {
        if self.subscriber_count(event_id) == 0 {
            return;
        }
        let loaded = self.load(event_id).await;

        let subs = self.lock();
        let Some(senders) = subs.get(event_id) else {
            return;
        };
        match loaded {
            Ok(snapshot) => {
                for tx in senders.values() {
                    tx.send_if_modified(|current| {
                        if current.generation > snapshot.generation {
                            return false;
                        }
                        *current = snapshot.clone();
                        true
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, %event_id, "feed refresh failed; keeping stale view");
                for tx in senders.values() {
                    tx.send_if_modified(|current| !std::mem::replace(&mut current.stale, true));
                }
            }
        }
    }

    pub fn subscriber_count(&self, event_id: &str) -> usize {
        self.lock().get(event_id).map_or(0, HashMap::len)
    }

    /// Events with at least one live subscription.
    pub fn events(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn watchers(&self, event_id: &str, id: u64) -> usize {
        self.lock()
            .get(event_id)
            .and_then(|senders| senders.get(&id))
            .map_or(0, |tx| tx.receiver_count().saturating_sub(1))
    }

    async fn load(&self, event_id: &str) -> Result<FeedSnapshot, StoreError> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let records = self
            .inner
            .store
            .recent_attendance(event_id, self.inner.limit)
            .await?;
        Ok(FeedSnapshot {
            generation,
            records,
            stale: false,
        })
    }

    fn release(&self, event_id: &str, id: u64) {
        let mut subs = self.lock();
        if let Some(senders) = subs.get_mut(event_id) {
            senders.remove(&id);
            if senders.is_empty() {
                subs.remove(event_id);
            }
        }
        debug!(%event_id, subscription = id, "feed subscription released");
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }
}

/// One standing feed query. Dropping it releases the query and ends every
/// receiver handed out by [`FeedSubscription::watch`].
pub struct FeedSubscription {
    hub: LiveFeedHub,
    event_id: String,
    id: u64,
    receiver: watch::Receiver<FeedSnapshot>,
}

impl FeedSubscription {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn current(&self) -> FeedSnapshot {
        self.receiver.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<FeedSnapshot> {
        self.receiver.clone()
    }

    /// Receivers from [`FeedSubscription::watch`] that are still alive.
    pub fn watchers(&self) -> usize {
        self.hub.watchers(&self.event_id, self.id)
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.hub.release(&self.event_id, self.id);
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("event_id", &self.event_id)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::store::{MemoryStore, NewAttendance};

    fn att(user: &str, event: &str) -> NewAttendance {
        NewAttendance {
            user_id: user.into(),
            event_id: event.into(),
            student_name: "Asha Rao".into(),
            student_roll: "21CS01".into(),
            organizer_id: "o1".into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn refresh_pushes_full_top_n_to_subscribers_of_that_event() {
        let store = Arc::new(MemoryStore::new());
        let hub = LiveFeedHub::new(store.clone(), 20);
        let sub = hub.subscribe("e1").await;
        let other = hub.subscribe("e2").await;
        let mut rx = sub.watch();
        assert!(sub.current().records.is_empty());

        store.insert_attendance_if_absent(att("u1", "e1")).await.unwrap();
        hub.refresh("e1").await;

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().records.len(), 1);
        assert!(other.current().records.is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_records_and_marks_stale() {
        let store = Arc::new(MemoryStore::new());
        store.insert_attendance_if_absent(att("u1", "e1")).await.unwrap();
        let hub = LiveFeedHub::new(store.clone(), 20);
        let sub = hub.subscribe("e1").await;

        store.set_unavailable(true);
        hub.refresh("e1").await;

        let snap = sub.current();
        assert!(snap.stale);
        assert_eq!(snap.records.len(), 1);

        store.set_unavailable(false);
        hub.refresh("e1").await;
        assert!(!sub.current().stale);
    }

    #[tokio::test]
    async fn subscribe_on_failing_store_starts_empty_and_stale() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let hub = LiveFeedHub::new(store, 20);
        let snap = hub.subscribe("e1").await.current();
        assert!(snap.stale);
        assert!(snap.records.is_empty());
    }

    #[tokio::test]
    async fn watchers_count_only_handed_out_receivers() {
        let hub = LiveFeedHub::new(Arc::new(MemoryStore::new()), 20);
        let sub = hub.subscribe("e1").await;
        let _other = hub.subscribe("e2").await;
        assert_eq!(sub.watchers(), 0);

        let rx = sub.watch();
        assert_eq!(sub.watchers(), 1);
        drop(rx);
        assert_eq!(sub.watchers(), 0);

        let mut events = hub.events();
        events.sort();
        assert_eq!(events, ["e1", "e2"]);
    }

    #[tokio::test]
    async fn dropping_subscription_releases_query_and_closes_receivers() {
        let store = Arc::new(MemoryStore::new());
        let hub = LiveFeedHub::new(store.clone(), 20);
        let sub = hub.subscribe("e1").await;
        let mut rx = sub.watch();
        assert_eq!(hub.subscriber_count("e1"), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count("e1"), 0);
        assert!(rx.changed().await.is_err());

        // Nobody listening: refresh must not touch the store.
        let before = store.calls();
        hub.refresh("e1").await;
        assert_eq!(store.calls(), before);
    }
}
