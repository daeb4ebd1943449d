use std::time::Duration;

use sqlx::{postgres::PgListener, PgPool};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::LiveFeedHub;

/// Channel the `attendance_inserted_notify` trigger publishes event ids on.
pub const CHANNEL: &str = "attendance_inserted";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Refreshes the feed of every event whose attendance changes in the
/// database, whichever process wrote the row.
pub fn spawn_attendance_listener(pool: PgPool, hub: LiveFeedHub) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = listen(&pool, &hub).await {
                warn!(error = %e, "attendance listener lost its connection; reconnecting");
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    })
}

async fn listen(pool: &PgPool, hub: &LiveFeedHub) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANNEL).await?;
    info!(channel = CHANNEL, "listening for attendance inserts");

    // Inserts made while disconnected were never announced.
    resync(hub).await;

    loop {
        let notification = listener.recv().await?;
        let event_id = notification.payload();
        debug!(%event_id, "attendance insert notified");
        hub.refresh(event_id).await;
    }
}

/// Refreshes every event that currently has subscribers.
pub async fn resync(hub: &LiveFeedHub) {
    for event_id in hub.events() {
        hub.refresh(&event_id).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::OffsetDateTime;

    use super::*;
    use crate::store::{MemoryStore, NewAttendance, RecordStore};

    #[tokio::test]
    async fn resync_refreshes_only_watched_events() {
        let store = Arc::new(MemoryStore::new());
        let hub = LiveFeedHub::new(store.clone(), 20);
        let sub = hub.subscribe("e1").await;

        for event_id in ["e1", "e2"] {
            store
                .insert_attendance_if_absent(NewAttendance {
                    user_id: "u1".into(),
                    event_id: event_id.into(),
                    student_name: "Asha Rao".into(),
                    student_roll: "21CS01".into(),
                    organizer_id: "o1".into(),
                    timestamp: OffsetDateTime::now_utc(),
                })
                .await
                .unwrap();
        }
        assert!(sub.current().records.is_empty());

        let before = store.calls();
        resync(&hub).await;
        assert_eq!(sub.current().records.len(), 1);
        assert_eq!(store.calls(), before + 1);
    }
}
