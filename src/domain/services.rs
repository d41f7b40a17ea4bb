//! Service traits consumed by the application layer.

use async_trait::async_trait;

use crate::domain::entities::ExtensionMetrics;
use crate::domain::errors::FetchError;

/// Source of current metrics for a single extension.
///
/// The production implementation queries the marketplace gallery API
/// with retries; tests substitute a scripted provider.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Fetch the current metrics for `external_id` (`publisher.name`).
    ///
    /// Pure fetch, no side effects. `FetchError::NotFound` is terminal;
    /// `FetchError::Transient` covers network and server failures.
    async fn fetch_metrics(&self, external_id: &str) -> Result<ExtensionMetrics, FetchError>;
}
