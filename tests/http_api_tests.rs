//! HTTP surface tests: bearer auth on the trigger endpoints, the run
//! summary responses, the health report, and end-to-end webhook alert
//! delivery against a local capture server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use ext_pulse::application::{
    AlertDispatcher, GapDetector, HealthSnapshotBuilder, SyncOrchestrator,
};
use ext_pulse::domain::{
    ExtensionMetrics, FetchError, MetricsProvider, SyncTrigger, TrackedExtension,
};
use ext_pulse::infrastructure::config::SyncConfig;
use ext_pulse::infrastructure::http_server::{router, AppState};
use ext_pulse::infrastructure::{AppConfig, DatabaseConnection, ExtensionRepository};

// ===============================
// HELPERS
// ===============================

#[derive(Default)]
struct ScriptedProvider {
    responses: Mutex<HashMap<String, Result<ExtensionMetrics, FetchError>>>,
}

impl ScriptedProvider {
    fn set(&self, external_id: &str, response: Result<ExtensionMetrics, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(external_id.to_string(), response);
    }
}

#[async_trait]
impl MetricsProvider for ScriptedProvider {
    async fn fetch_metrics(&self, external_id: &str) -> Result<ExtensionMetrics, FetchError> {
        self.responses
            .lock()
            .unwrap()
            .get(external_id)
            .cloned()
            .unwrap_or(Err(FetchError::NotFound))
    }
}

fn metrics(install: i64) -> ExtensionMetrics {
    ExtensionMetrics {
        install_count: Some(install),
        average_rating: Some(4.5),
        rating_count: Some(3),
        download_count: Some(install),
        last_updated: None,
        current_version: Some("2.1.0".to_string()),
    }
}

fn extension(external_id: &str) -> TrackedExtension {
    let now = Utc::now();
    let (publisher, name) = external_id.split_once('.').unwrap_or(("pub", external_id));
    TrackedExtension {
        id: Uuid::new_v4().to_string(),
        extension_id: external_id.to_string(),
        publisher_name: publisher.to_string(),
        extension_name: name.to_string(),
        display_name: name.to_string(),
        marketplace_url: format!("https://marketplace.visualstudio.com/items?itemName={external_id}"),
        icon_url: None,
        average_rating: None,
        rating_count: None,
        download_count: None,
        last_updated: None,
        current_version: None,
        created_at: now,
        updated_at: now,
    }
}

struct Harness {
    _temp: TempDir,
    database_url: String,
    repo: Arc<ExtensionRepository>,
    provider: Arc<ScriptedProvider>,
    state: AppState,
}

async fn harness(configure: impl FnOnce(&mut AppConfig)) -> Harness {
    let temp = TempDir::new().unwrap();
    let database_url = format!("sqlite:{}", temp.path().join("test.db").display());
    let db = DatabaseConnection::new(&database_url).await.unwrap();
    db.migrate().await.unwrap();

    let repo = Arc::new(ExtensionRepository::new(db.pool().clone()));
    let provider = Arc::new(ScriptedProvider::default());

    let mut config = AppConfig {
        sync: SyncConfig {
            item_delay_ms: 0,
            ..Default::default()
        },
        ..AppConfig::default()
    };
    configure(&mut config);

    let orchestrator = Arc::new(SyncOrchestrator::new(
        repo.clone(),
        provider.clone() as Arc<dyn MetricsProvider>,
        GapDetector::new(repo.clone(), config.day_boundary_offset_minutes),
        AlertDispatcher::new(config.alert_webhook_url.clone(), config.alert.clone()),
        &config,
    ));
    let health = Arc::new(HealthSnapshotBuilder::new(repo.clone()));

    let state = AppState {
        config: Arc::new(config),
        orchestrator,
        health,
    };

    Harness {
        _temp: temp,
        database_url,
        repo,
        provider,
        state,
    }
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

fn get_sync(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri("/sync");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_sync(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/sync");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

// ===============================
// AUTH
// ===============================

#[tokio::test]
async fn get_sync_without_token_is_unauthorized() {
    let h = harness(|config| config.cron_secret = Some("s3cret".to_string())).await;

    let (status, body) = send(&h.state, get_sync(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    // No run record was written.
    let runs = h
        .repo
        .runs_completed_since(Utc::now() - Duration::days(1))
        .await
        .unwrap();
    assert!(runs.is_empty());
}

#[tokio::test]
async fn get_sync_with_wrong_token_is_unauthorized() {
    let h = harness(|config| config.cron_secret = Some("s3cret".to_string())).await;

    let (status, _) = send(&h.state, get_sync(Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn get_sync_without_secret_in_production_is_unauthorized() {
    let h = harness(|config| {
        config.cron_secret = None;
        config.production = true;
    })
    .await;

    let (status, _) = send(&h.state, get_sync(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn get_sync_without_secret_outside_production_is_allowed() {
    let h = harness(|config| config.cron_secret = None).await;

    let (status, body) = send(&h.state, get_sync(None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn post_sync_bypasses_token_check_outside_production() {
    let h = harness(|config| config.cron_secret = Some("s3cret".to_string())).await;

    let (status, body) = send(&h.state, post_sync(None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let runs = h
        .repo
        .runs_completed_since(Utc::now() - Duration::days(1))
        .await
        .unwrap();
    assert_eq!(runs[0].triggered_by, SyncTrigger::Manual);
}

#[tokio::test]
async fn post_sync_requires_token_in_production() {
    let h = harness(|config| {
        config.cron_secret = Some("s3cret".to_string());
        config.production = true;
    })
    .await;

    let (status, _) = send(&h.state, post_sync(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&h.state, post_sync(Some("s3cret"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

// ===============================
// RUN SUMMARIES
// ===============================

#[tokio::test]
async fn authorized_trigger_returns_run_summary() {
    let h = harness(|config| config.cron_secret = Some("s3cret".to_string())).await;
    h.repo.insert_extension(&extension("acme.widget")).await.unwrap();
    h.provider.set("acme.widget", Ok(metrics(500)));

    let (status, body) = send(&h.state, get_sync(Some("s3cret"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Stats sync completed");
    assert_eq!(body["status"], "success");
    assert_eq!(body["synced"], 1);
    assert_eq!(body["failed"], 0);
    assert!(body.get("errors").is_none());
    assert!(body["duration"].is_i64());
}

#[tokio::test]
async fn top_level_abort_returns_500_failure_body() {
    let h = harness(|config| config.cron_secret = None).await;

    // Breaking the extensions table forces the universe fetch to fail.
    let db = DatabaseConnection::new(&h.database_url).await.unwrap();
    sqlx::query("DROP TABLE extensions")
        .execute(db.pool())
        .await
        .unwrap();

    let (status, body) = send(&h.state, get_sync(None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Stats sync failed");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("failed to load tracked extensions"));
    assert!(body["timestamp"].is_string());
    assert!(body["duration"].is_i64());
}

#[tokio::test]
async fn degraded_run_still_returns_200_with_errors() {
    let h = harness(|config| config.cron_secret = None).await;
    h.repo.insert_extension(&extension("acme.good")).await.unwrap();
    h.repo.insert_extension(&extension("acme.gone")).await.unwrap();
    h.provider.set("acme.good", Ok(metrics(100)));
    h.provider.set("acme.gone", Err(FetchError::NotFound));

    let (status, body) = send(&h.state, get_sync(None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "partial");
    assert_eq!(body["synced"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
}

// ===============================
// HEALTH
// ===============================

#[tokio::test]
async fn health_report_shape_and_status() {
    let h = harness(|config| config.cron_secret = None).await;
    h.repo.insert_extension(&extension("acme.widget")).await.unwrap();
    h.provider.set("acme.widget", Ok(metrics(500)));

    // Before any run: overdue warning.
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"]["status"], "warning");
    assert_eq!(body["health"]["syncOverdue"], true);
    assert!(body["health"]["lastSync"].is_null());

    let (status, _) = send(&h.state, get_sync(None)).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"]["status"], "healthy");
    assert_eq!(body["health"]["syncOverdue"], false);
    assert_eq!(body["health"]["lastSync"]["status"], "success");
    assert_eq!(body["health"]["metrics"]["totalSyncs"], 1);
    assert_eq!(body["health"]["metrics"]["successRate"], 100.0);
    assert_eq!(body["health"]["last24Hours"]["syncs"], 1);
    assert_eq!(body["gaps"]["total"], 0);
    assert_eq!(body["recentLogs"].as_array().unwrap().len(), 1);
}

// ===============================
// ALERT WEBHOOK DELIVERY
// ===============================

type CapturedAlerts = Arc<Mutex<Vec<serde_json::Value>>>;

/// Minimal webhook sink on an ephemeral port that records every
/// payload it receives.
async fn spawn_webhook_sink() -> (String, CapturedAlerts) {
    let received: CapturedAlerts = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();

    let app = Router::new().route(
        "/hook",
        post(move |Json(payload): Json<serde_json::Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(payload);
                StatusCode::OK
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/hook"), received)
}

#[tokio::test]
async fn degraded_run_delivers_one_capped_alert() {
    let (webhook_url, received) = spawn_webhook_sink().await;
    let h = harness(|config| config.alert_webhook_url = Some(webhook_url)).await;

    // One success, seven failures: partial with failures outnumbering
    // successes, and more errors than the payload cap.
    h.repo.insert_extension(&extension("acme.good")).await.unwrap();
    h.provider.set("acme.good", Ok(metrics(100)));
    for i in 0..7 {
        let ext = extension(&format!("acme.bad{i}"));
        h.repo.insert_extension(&ext).await.unwrap();
    }

    let (status, body) = send(&h.state, post_sync(None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "partial");

    // maybe_alert is awaited inside the run, so delivery has completed.
    let alerts = received.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["status"], "partial");
    assert_eq!(alerts[0]["title"], "Extension stats sync partially failed");
    assert_eq!(alerts[0]["details"]["successful"], 1);
    assert_eq!(alerts[0]["details"]["failed"], 7);
    assert_eq!(alerts[0]["details"]["errors"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn successful_run_sends_no_alert() {
    let (webhook_url, received) = spawn_webhook_sink().await;
    let h = harness(|config| config.alert_webhook_url = Some(webhook_url)).await;

    h.repo.insert_extension(&extension("acme.widget")).await.unwrap();
    h.provider.set("acme.widget", Ok(metrics(500)));

    let (status, body) = send(&h.state, post_sync(None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    assert!(received.lock().unwrap().is_empty());
}
