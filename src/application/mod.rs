//! Application layer
//!
//! Orchestration of the sync pipeline: the per-item loop, run
//! classification and logging, gap detection, alerting, the derived
//! health snapshot, and the fallback watchdog.

pub mod alert_dispatcher;
pub mod gap_detector;
pub mod health;
pub mod sync_orchestrator;
pub mod watchdog;

pub use alert_dispatcher::AlertDispatcher;
pub use gap_detector::GapDetector;
pub use health::{HealthReport, HealthSnapshot, HealthSnapshotBuilder, HealthStatus};
pub use sync_orchestrator::{SyncOrchestrator, SyncOutcome};
pub use watchdog::{FallbackWatchdog, OneShotTrigger, WatchdogState};
