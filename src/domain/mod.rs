//! Domain layer
//!
//! Typed entities for everything that crosses the store boundary, the
//! sync error taxonomy, and the service traits the application layer
//! depends on.

pub mod entities;
pub mod errors;
pub mod services;

pub use entities::{
    DataGap, ExtensionMetrics, InstallStatPoint, SyncRun, SyncRunStatus, SyncTrigger,
    TrackedExtension,
};
pub use errors::{FetchError, Retryable, SyncError};
pub use services::MetricsProvider;
