use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use time::OffsetDateTime;
use tokio::{
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};
use tracing::{debug, info};
use uuid::Uuid;

use super::validator::{CheckInValidator, ScanSettings};
use crate::{
    feed::{FeedSubscription, LiveFeedHub},
    store::{Event, RecordStore},
};

/// One armed scanning device: an organizer, an event, a validator and the
/// feed subscription the device watches.
#[derive(Debug)]
pub struct ScanSession {
    pub id: Uuid,
    pub event: Event,
    pub organizer_id: String,
    pub opened_at: OffsetDateTime,
    validator: CheckInValidator,
    feed: FeedSubscription,
    last_seen: Mutex<Instant>,
}

impl ScanSession {
    pub async fn open(
        event: Event,
        organizer_id: &str,
        store: Arc<dyn RecordStore>,
        hub: &LiveFeedHub,
        settings: ScanSettings,
    ) -> Self {
        let feed = hub.subscribe(&event.id).await;
        let validator =
            CheckInValidator::new(&event.id, organizer_id, store, hub.clone(), settings);
        Self {
            id: Uuid::new_v4(),
            event,
            organizer_id: organizer_id.to_string(),
            opened_at: OffsetDateTime::now_utc(),
            validator,
            feed,
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Marks the session as used by its organizer.
    pub fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .elapsed()
    }

    /// Idle past `max_idle` with nobody watching its feed.
    fn is_abandoned(&self, max_idle: Duration) -> bool {
        self.idle_for() >= max_idle && self.feed.watchers() == 0
    }

    pub fn validator(&self) -> &CheckInValidator {
        &self.validator
    }

    pub fn feed(&self) -> &FeedSubscription {
        &self.feed
    }
}

/// Registry of open sessions. Removing a session drops its feed subscription
/// once the last in-flight request holding it finishes.
#[derive(Clone, Default)]
pub struct ScanSessions {
    inner: Arc<Mutex<HashMap<Uuid, Arc<ScanSession>>>>,
}

impl ScanSessions {
    pub fn insert(&self, session: ScanSession) -> Arc<ScanSession> {
        let session = Arc::new(session);
        self.lock().insert(session.id, session.clone());
        info!(session_id = %session.id, event_id = %session.event.id, organizer_id = %session.organizer_id, "scan session opened");
        session
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<ScanSession>> {
        self.lock().get(id).cloned()
    }

    pub fn close(&self, id: &Uuid) -> Option<Arc<ScanSession>> {
        let removed = self.lock().remove(id);
        if let Some(s) = &removed {
            info!(session_id = %s.id, event_id = %s.event.id, "scan session closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Closes every abandoned session and returns their ids.
    pub fn reap_idle(&self, max_idle: Duration) -> Vec<Uuid> {
        let open: Vec<Arc<ScanSession>> = self.lock().values().cloned().collect();
        open.into_iter()
            .filter(|s| s.is_abandoned(max_idle))
            .filter_map(|s| self.close(&s.id).map(|closed| closed.id))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<ScanSession>>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Periodically closes sessions idle for longer than `max_idle`.
pub fn spawn_reaper(sessions: ScanSessions, max_idle: Duration) -> JoinHandle<()> {
    let period = (max_idle / 2).clamp(Duration::from_secs(1), Duration::from_secs(30));
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let reaped = sessions.reap_idle(max_idle);
            if !reaped.is_empty() {
                debug!(count = reaped.len(), "idle scan sessions reaped");
            }
        }
    })
}
