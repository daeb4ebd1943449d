use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use crate::{
    checkin::{ScanSessions, ScanSettings},
    config::{AppConfig, StoreBackend},
    feed::LiveFeedHub,
    notify::{relay::RelayNotifier, LogNotifier, Notifier},
    store::{MemoryStore, PgStore, RecordStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub feed: LiveFeedHub,
    pub sessions: ScanSessions,
    pub notifier: Arc<dyn Notifier>,
    /// Present for the postgres backend; used for migrations.
    pub db: Option<PgPool>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (store, db) = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL not set")?;
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                (
                    Arc::new(PgStore::new(db.clone())) as Arc<dyn RecordStore>,
                    Some(db),
                )
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory record store; data is lost on restart");
                (Arc::new(MemoryStore::new()) as Arc<dyn RecordStore>, None)
            }
        };

        let notifier: Arc<dyn Notifier> = match config.notify_relay_url.as_deref() {
            Some(url) => Arc::new(RelayNotifier::new(url).context("build mail relay client")?),
            None => {
                tracing::info!("NOTIFY_RELAY_URL not set; confirmations are only logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::from_parts(config, store, notifier, db))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        db: Option<PgPool>,
    ) -> Self {
        let feed = LiveFeedHub::new(store.clone(), config.checkin.feed_limit);
        Self {
            config,
            store,
            feed,
            sessions: ScanSessions::default(),
            notifier,
            db,
        }
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            cooldown: self.config.checkin.cooldown,
            accept_legacy_codes: self.config.checkin.accept_legacy_codes,
        }
    }

    /// State over a fresh memory store with test JWT settings.
    #[cfg(test)]
    pub fn fake(store: Arc<MemoryStore>) -> Self {
        use crate::config::{CheckInConfig, JwtConfig};

        let config = Arc::new(AppConfig {
            store_backend: StoreBackend::Memory,
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
            },
            checkin: CheckInConfig::default(),
            notify_relay_url: None,
        });
        Self::from_parts(config, store, Arc::new(LogNotifier), None)
    }
}
