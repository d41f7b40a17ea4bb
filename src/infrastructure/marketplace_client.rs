//! HTTP client for the VS Code Marketplace gallery API.
//!
//! One `extensionquery` POST per fetch; named statistics are extracted
//! by `statisticName`. A missing statistic is a `None` field, total
//! absence of the extension is `FetchError::NotFound`. Calls are rate
//! limited and wrapped in the exponential-backoff retry policy.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::Deserialize;

use crate::domain::entities::ExtensionMetrics;
use crate::domain::errors::FetchError;
use crate::domain::services::MetricsProvider;
use crate::infrastructure::retry::RetryPolicy;

const GALLERY_API_VERSION: &str = "application/json;api-version=3.0-preview.1";

/// Filter type for querying the gallery by extension name.
const FILTER_TYPE_EXTENSION_NAME: u32 = 7;

/// Response detail flags: versions, statistics, and asset URIs.
const QUERY_FLAGS: u32 = 914;

const STAT_INSTALL: &str = "install";
const STAT_AVERAGE_RATING: &str = "averagerating";
const STAT_RATING_COUNT: &str = "ratingcount";
const STAT_DOWNLOADS: &str = "onpremDownloads";

/// Marketplace client configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceClientConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
}

/// Gallery API client with rate limiting and retries.
pub struct MarketplaceClient {
    client: reqwest::Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    endpoint: String,
    retry: RetryPolicy,
}

impl MarketplaceClient {
    pub fn new(config: MarketplaceClientConfig, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(GALLERY_API_VERSION));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            endpoint: config.endpoint,
            retry,
        })
    }

    /// One gallery query, no retries.
    async fn query_once(&self, external_id: &str) -> Result<ExtensionMetrics, FetchError> {
        self.rate_limiter.until_ready().await;

        let body = serde_json::json!({
            "filters": [{
                "criteria": [{ "filterType": FILTER_TYPE_EXTENSION_NAME, "value": external_id }],
            }],
            "flags": QUERY_FLAGS,
        });

        tracing::debug!(extension = external_id, "querying marketplace gallery");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| FetchError::Transient(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transient(format!(
                "marketplace returned {status}"
            )));
        }

        let payload: QueryResponse = response
            .json()
            .await
            .map_err(|err| FetchError::Transient(format!("invalid response body: {err}")))?;

        let extension = payload
            .results
            .into_iter()
            .next()
            .and_then(|result| result.extensions.into_iter().next())
            .ok_or(FetchError::NotFound)?;

        Ok(metrics_from_extension(extension))
    }
}

#[async_trait]
impl MetricsProvider for MarketplaceClient {
    async fn fetch_metrics(&self, external_id: &str) -> Result<ExtensionMetrics, FetchError> {
        self.retry.run(|| self.query_once(external_id)).await
    }
}

// ===============================
// GALLERY RESPONSE SHAPES
// ===============================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    extensions: Vec<GalleryExtension>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GalleryExtension {
    #[serde(default)]
    statistics: Vec<GalleryStatistic>,
    #[serde(default)]
    versions: Vec<GalleryVersion>,
    last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GalleryStatistic {
    statistic_name: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct GalleryVersion {
    version: String,
}

fn statistic(stats: &[GalleryStatistic], name: &str) -> Option<f64> {
    stats
        .iter()
        .find(|stat| stat.statistic_name == name)
        .map(|stat| stat.value)
}

fn metrics_from_extension(extension: GalleryExtension) -> ExtensionMetrics {
    ExtensionMetrics {
        install_count: statistic(&extension.statistics, STAT_INSTALL).map(|v| v as i64),
        // Ratings are stored to two decimal places.
        average_rating: statistic(&extension.statistics, STAT_AVERAGE_RATING)
            .map(|v| (v * 100.0).round() / 100.0),
        rating_count: statistic(&extension.statistics, STAT_RATING_COUNT).map(|v| v as i64),
        download_count: statistic(&extension.statistics, STAT_DOWNLOADS).map(|v| v as i64),
        last_updated: extension.last_updated,
        current_version: extension.versions.first().map(|v| v.version.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_extension(json: serde_json::Value) -> GalleryExtension {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn extracts_named_statistics() {
        let extension = sample_extension(serde_json::json!({
            "statistics": [
                { "statisticName": "install", "value": 125000.0 },
                { "statisticName": "averagerating", "value": 4.5678 },
                { "statisticName": "ratingcount", "value": 321.0 },
                { "statisticName": "onpremDownloads", "value": 999.0 }
            ],
            "versions": [{ "version": "1.4.2" }],
            "lastUpdated": "2026-08-01T00:00:00Z"
        }));

        let metrics = metrics_from_extension(extension);
        assert_eq!(metrics.install_count, Some(125_000));
        assert_eq!(metrics.average_rating, Some(4.57));
        assert_eq!(metrics.rating_count, Some(321));
        assert_eq!(metrics.download_count, Some(999));
        assert_eq!(metrics.current_version.as_deref(), Some("1.4.2"));
        assert_eq!(metrics.last_updated.as_deref(), Some("2026-08-01T00:00:00Z"));
    }

    #[test]
    fn missing_statistics_become_none_not_errors() {
        let extension = sample_extension(serde_json::json!({
            "statistics": [{ "statisticName": "averagerating", "value": 3.0 }],
            "versions": []
        }));

        let metrics = metrics_from_extension(extension);
        assert_eq!(metrics.install_count, None);
        assert_eq!(metrics.average_rating, Some(3.0));
        assert_eq!(metrics.rating_count, None);
        assert_eq!(metrics.download_count, None);
        assert_eq!(metrics.current_version, None);
    }

    #[test]
    fn empty_results_deserialize_to_no_extension() {
        let payload: QueryResponse =
            serde_json::from_value(serde_json::json!({ "results": [{ "extensions": [] }] }))
                .unwrap();
        let found = payload
            .results
            .into_iter()
            .next()
            .and_then(|r| r.extensions.into_iter().next());
        assert!(found.is_none());
    }
}
