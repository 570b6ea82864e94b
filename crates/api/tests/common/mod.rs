use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use galley_api::config::ServerConfig;
use galley_api::router::build_app_router;
use galley_api::state::AppState;
use galley_core::clock::FixedClock;
use galley_engine::testing::{MemoryStore, RecordingAudit, RecordingNotifier};
use galley_engine::ImportService;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        import_max_bytes: 64 * 1024,
        default_actor: "system".to_string(),
        db_max_connections: 1,
    }
}

/// The application router over an in-memory store, plus handles on the
/// store and sinks for assertions.
pub struct TestApp {
    pub app: Router,
    pub store: MemoryStore,
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<RecordingAudit>,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

/// Mirrors the router construction in `main.rs` so tests exercise the same
/// middleware stack production uses.
pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()));
    let store = MemoryStore::with_clock(clock.clone());
    let notifier = Arc::new(RecordingNotifier::default());
    let audit = Arc::new(RecordingAudit::default());

    let service = ImportService::new(store.clone())
        .with_clock(clock)
        .with_notifier(notifier.clone())
        .with_audit(audit.clone())
        .with_max_bytes(config.import_max_bytes);

    TestApp {
        app: build_app_router(AppState::new(service, config)),
        store,
        notifier,
        audit,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a raw body with the given content type and optional `x-actor`.
pub async fn post_file(
    app: Router,
    uri: &str,
    content_type: &str,
    actor: Option<&str>,
    body: impl Into<Body>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", content_type);
    if let Some(actor) = actor {
        builder = builder.header("x-actor", actor);
    }
    app.oneshot(builder.body(body.into()).unwrap()).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
