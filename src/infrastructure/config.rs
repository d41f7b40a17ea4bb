//! Service configuration.
//!
//! Every knob has a serde default so a partial configuration source
//! still yields a complete `AppConfig`. Values are read from
//! environment variables at startup; secrets (cron secret, webhook URL)
//! are only ever supplied through the environment.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::infrastructure::retry::RetryPolicy;

const DEFAULT_MARKETPLACE_URL: &str =
    "https://marketplace.visualstudio.com/_apis/public/gallery/extensionquery";

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,

    /// SQLite database URL.
    pub database_url: String,

    /// Production deployments never bypass the bearer check.
    pub production: bool,

    /// Shared secret for the `Authorization: Bearer` check on `/sync`.
    pub cron_secret: Option<String>,

    /// Webhook endpoint for degraded-run alerts. Unset disables alerts.
    pub alert_webhook_url: Option<String>,

    /// Marketplace gallery query endpoint.
    pub marketplace_url: String,

    /// Fixed UTC offset (in minutes) defining where the calendar day
    /// starts, for both idempotency gating and gap-day bucketing.
    /// Explicit so the day boundary is identical across deployments
    /// regardless of host time zone.
    pub day_boundary_offset_minutes: i32,

    pub sync: SyncConfig,
    pub retry: RetryPolicy,
    pub alert: AlertPolicy,
    pub watchdog: WatchdogConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://data/ext-pulse.db".to_string(),
            production: false,
            cron_secret: None,
            alert_webhook_url: None,
            marketplace_url: DEFAULT_MARKETPLACE_URL.to_string(),
            day_boundary_offset_minutes: 0,
            sync: SyncConfig::default(),
            retry: RetryPolicy::default(),
            alert: AlertPolicy::default(),
            watchdog: WatchdogConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Per-run throttling and upstream request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fixed delay between items in the sync loop, milliseconds.
    pub item_delay_ms: u64,

    /// Cap on marketplace request rate.
    pub max_requests_per_second: u32,

    /// Upstream request timeout in seconds.
    pub request_timeout_secs: u64,

    pub user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            item_delay_ms: 100,
            max_requests_per_second: 7,
            request_timeout_secs: 30,
            user_agent: "ext-pulse/0.3".to_string(),
        }
    }
}

/// When a degraded run fires the alert webhook.
///
/// The default rule (alert on `failed`, and on `partial` only when
/// failures outnumber successes) is expressed as named flags a test
/// suite can pin instead of a hard-coded condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    pub alert_on_failed: bool,
    pub partial_when_failures_exceed_successes: bool,
    /// At most this many error strings are included in the payload.
    pub max_errors_in_payload: usize,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            alert_on_failed: true,
            partial_when_failures_exceed_successes: true,
            max_errors_in_payload: 5,
        }
    }
}

/// Fallback watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 60,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: String,

    /// Emit JSON formatted logs.
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables over the
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("EXT_PULSE_BIND_ADDR") {
            config.bind_addr = value;
        }
        if let Ok(value) = std::env::var("DATABASE_URL") {
            config.database_url = value;
        }
        if let Ok(value) = std::env::var("EXT_PULSE_PRODUCTION") {
            config.production = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Ok(value) = std::env::var("CRON_SECRET") {
            if !value.is_empty() {
                config.cron_secret = Some(value);
            }
        }
        if let Ok(value) = std::env::var("SYNC_ALERT_WEBHOOK_URL") {
            if !value.is_empty() {
                config.alert_webhook_url = Some(value);
            }
        }
        if let Ok(value) = std::env::var("EXT_PULSE_MARKETPLACE_URL") {
            config.marketplace_url = value;
        }
        if let Ok(value) = std::env::var("EXT_PULSE_DAY_OFFSET_MINUTES") {
            if let Ok(minutes) = value.parse() {
                config.day_boundary_offset_minutes = minutes;
            }
        }
        if let Ok(value) = std::env::var("EXT_PULSE_ITEM_DELAY_MS") {
            if let Ok(ms) = value.parse() {
                config.sync.item_delay_ms = ms;
            }
        }
        if let Ok(value) = std::env::var("EXT_PULSE_LOG_LEVEL") {
            config.logging.level = value;
        }
        if let Ok(value) = std::env::var("EXT_PULSE_LOG_JSON") {
            config.logging.json_format = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Ok(value) = std::env::var("EXT_PULSE_WATCHDOG_ENABLED") {
            config.watchdog.enabled = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Ok(value) = std::env::var("EXT_PULSE_WATCHDOG_INTERVAL_SECS") {
            if let Ok(secs) = value.parse() {
                config.watchdog.poll_interval_secs = secs;
            }
        }

        config
    }

    /// The configured day-boundary offset. Falls back to UTC if the
    /// configured minutes are out of chrono's ±24h range (or overflow
    /// the seconds conversion).
    pub fn day_boundary_offset(&self) -> FixedOffset {
        self.day_boundary_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Start of the calendar day containing `now`, in the given fixed
/// offset, expressed back in UTC. This is the idempotency-gate window
/// boundary.
pub fn start_of_day(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    let midnight = local.date_naive().and_time(chrono::NaiveTime::MIN);
    match midnight.and_local_timezone(offset) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // Fixed offsets never produce ambiguous local times.
        _ => now,
    }
}
