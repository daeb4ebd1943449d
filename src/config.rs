use std::time::Duration;

use time::UtcOffset;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct CheckInConfig {
    pub cooldown: Duration,
    pub feed_limit: usize,
    pub accept_legacy_codes: bool,
    /// Offset used to print check-in times on the feed.
    pub display_offset: UtcOffset,
    /// A session with no requests and no feed watcher for this long is closed.
    pub session_idle: Duration,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(2500),
            feed_limit: 20,
            accept_legacy_codes: false,
            display_offset: UtcOffset::UTC,
            session_idle: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub checkin: CheckInConfig,
    /// Mail relay for registration confirmations; unset means log only.
    pub notify_relay_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store_backend = match std::env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("postgres") | Err(_) => StoreBackend::Postgres,
            Ok(other) => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        };
        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required for the postgres store");
        }

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "campus-idp".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "campus-checkin".into()),
        };

        let defaults = CheckInConfig::default();
        let checkin = CheckInConfig {
            cooldown: std::env::var("SCAN_COOLDOWN_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.cooldown),
            feed_limit: std::env::var("FEED_LIMIT")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.feed_limit),
            accept_legacy_codes: std::env::var("SCAN_ACCEPT_LEGACY_CODES")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.accept_legacy_codes),
            display_offset: std::env::var("FEED_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i32>().ok())
                .and_then(offset_from_minutes)
                .unwrap_or(defaults.display_offset),
            session_idle: std::env::var("SESSION_IDLE_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_idle),
        };
        let notify_relay_url = std::env::var("NOTIFY_RELAY_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            store_backend,
            database_url,
            jwt,
            checkin,
            notify_relay_url,
        })
    }
}

/// `None` when the offset is outside what `UtcOffset` can hold.
fn offset_from_minutes(minutes: i32) -> Option<UtcOffset> {
    let seconds = minutes.checked_mul(60)?;
    UtcOffset::from_whole_seconds(seconds).ok()
}
