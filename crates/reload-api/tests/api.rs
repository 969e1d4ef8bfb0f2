//! API integration tests for reload-api routes.
//!
//! Uses Axum's `tower::ServiceExt` to send requests directly to the app
//! without binding a TCP socket.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use reload_api::app::build_app;
use reload_api::state::AppState;
use reload_core::{
    HostError, KeepOpen, LoadMode, PlaybackHost, Playlist, ReloadReason, WatchdogConfig,
    WatchdogSession,
};

/// A host with a single live stream loaded that accepts every command.
struct LiveHost;

#[async_trait]
impl PlaybackHost for LiveHost {
    async fn cache_time(&self) -> Result<Option<f64>, HostError> {
        Ok(Some(12.0))
    }
    async fn paused_for_cache(&self) -> Result<bool, HostError> {
        Ok(false)
    }
    async fn eof_reached(&self) -> Result<bool, HostError> {
        Ok(false)
    }
    async fn time_pos(&self) -> Result<Option<f64>, HostError> {
        Ok(Some(40.0))
    }
    async fn duration(&self) -> Result<Option<f64>, HostError> {
        Ok(None)
    }
    async fn path(&self) -> Result<Option<String>, HostError> {
        Ok(Some("https://example.com/live.m3u8".into()))
    }
    async fn playlist(&self) -> Result<Playlist, HostError> {
        Ok(Playlist {
            entries: vec!["https://example.com/live.m3u8".into()],
            current: Some(0),
        })
    }
    async fn keep_open(&self) -> Result<Option<KeepOpen>, HostError> {
        Ok(Some(KeepOpen::No))
    }
    async fn load_file(&self, _: &str, _: LoadMode, _: Option<f64>) -> Result<(), HostError> {
        Ok(())
    }
    async fn playlist_move(&self, _: usize, _: usize) -> Result<(), HostError> {
        Ok(())
    }
    async fn set_keep_open(&self, _: KeepOpen) -> Result<(), HostError> {
        Ok(())
    }
    async fn set_keep_open_pause(&self, _: bool) -> Result<(), HostError> {
        Ok(())
    }
    async fn set_pause(&self, _: bool) -> Result<(), HostError> {
        Ok(())
    }
}

fn session() -> WatchdogSession {
    WatchdogSession::new(WatchdogConfig::default(), Arc::new(LiveHost), None)
}

fn app_with(session: &WatchdogSession) -> axum::Router {
    build_app(AppState::new().with_session(session.handle()))
}

async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = build_app(AppState::new());
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp.into_body()).await, "ok");
}

#[tokio::test]
async fn metrics_without_session_is_empty() {
    let app = build_app(AppState::new());
    let resp = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(ct.contains("openmetrics-text"));
    assert_eq!(body_text(resp.into_body()).await, "# EOF\n");
}

#[tokio::test]
async fn metrics_describe_session() {
    let mut session = session();
    session.reload(ReloadReason::Manual).await;
    let id = session.id();

    let resp = app_with(&session).oneshot(get("/metrics")).await.unwrap();
    let text = body_text(resp.into_body()).await;

    assert!(text.contains(&format!("mpv_reload_session_info{{session_id=\"{id}\"")));
    assert!(text.contains(&format!("mpv_reload_reloads_total{{session_id=\"{id}\"}} 1")));
    assert!(text.contains(&format!(
        "mpv_reload_cache_phase{{session_id=\"{id}\",phase=\"fetching\"}} 1"
    )));
    assert!(text.contains(&format!(
        "mpv_reload_cache_phase{{session_id=\"{id}\",phase=\"stuck\"}} 0"
    )));
    assert!(text.contains("mpv_reload_pause_elapsed_seconds"));
    assert!(text.contains("reason=\"manual\""));
    assert!(text.ends_with("# EOF\n"));
}

#[tokio::test]
async fn status_without_session_is_503() {
    let app = build_app(AppState::new());
    let resp = app.oneshot(get("/api/v1/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["error"], "service_unavailable");
}

#[tokio::test]
async fn status_returns_session_snapshot() {
    let session = session();
    let resp = app_with(&session).oneshot(get("/api/v1/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp.into_body()).await;
    assert_eq!(body["session_id"], session.id().to_string());
    assert_eq!(body["state"], "idle");
    assert_eq!(body["cache"]["phase"], "fetching");
    assert_eq!(body["cache"]["enabled"], true);
    assert_eq!(body["pause"]["active"], false);
    assert_eq!(body["reload_eof_enabled"], false);
    assert_eq!(body["reload_count"], 0);
    assert!(body["events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn events_are_newest_first_and_filterable() {
    let mut session = session();
    session
        .on_host_event(reload_core::HostEvent::PausedForCache(true))
        .await;
    session.reload(ReloadReason::Manual).await;

    let resp = app_with(&session).oneshot(get("/api/v1/events")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.into_body()).await;
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["kind"], "reloaded");
    assert_eq!(events[0]["reason"], "manual");
    assert_eq!(events[1]["kind"], "paused_for_cache");

    let resp = app_with(&session)
        .oneshot(get("/api/v1/events?kind=paused_for_cache"))
        .await
        .unwrap();
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 1);

    let resp = app_with(&session)
        .oneshot(get("/api/v1/events?limit=1"))
        .await
        .unwrap();
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["events"][0]["kind"], "reloaded");
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn events_rejects_zero_limit() {
    let session = session();
    let resp = app_with(&session)
        .oneshot(get("/api/v1/events?limit=0"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reload_is_accepted_while_session_lives() {
    let session = session();
    let resp = app_with(&session).oneshot(post("/api/v1/reload")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["session_id"], session.id().to_string());
}

#[tokio::test]
async fn reload_after_session_ended_is_503() {
    let session = session();
    let app = app_with(&session);
    drop(session);

    let resp = app.oneshot(post("/api/v1/reload")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp.into_body()).await;
    assert_eq!(body["message"], "Watchdog session is no longer running");
}

#[tokio::test]
async fn reload_rejects_get() {
    let session = session();
    let resp = app_with(&session).oneshot(get("/api/v1/reload")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}
