mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{discovery, listener, FakeInspector, FakeProber, Reply, APP_BODY};
use dev_scan_rs::server::{build_router, AppState};
use dev_scan_rs::types::{DiscoveryReport, DiscoverySource, ServerRecord};

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn app_state() -> AppState {
    let inspector = FakeInspector::with_listeners(vec![listener(4, "dart", "127.0.0.1", 5000)])
        .cwd(4, "/work/app");
    let prober = FakeProber::default().reply(5000, Reply::Body(APP_BODY.to_string()));
    let (d, _, _) = discovery(inspector, prober);
    AppState::new(d)
}

#[tokio::test]
async fn servers_empty_before_first_run() {
    let app = build_router(app_state());
    let (status, _) = get_json(&app, "/api/servers").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = get_json(&app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
}

#[tokio::test]
async fn seeded_report_is_served() {
    let report = DiscoveryReport {
        generated_at: "2024-01-01T00:00:00Z".into(),
        source: DiscoverySource::Enumeration,
        servers: vec![ServerRecord::new(5000, "app", "dart").with_address("::1")],
    };
    let app = build_router(app_state().with_report(report).await);

    let (status, body) = get_json(&app, "/api/servers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "enumeration");
    assert_eq!(body["servers"][0]["projectName"], "app");
    assert_eq!(body["servers"][0]["protocols"][0], "tcp6");
}

#[tokio::test]
async fn refresh_runs_discovery_in_background() {
    let app = build_router(app_state());

    let resp = app
        .clone()
        .oneshot(Request::post("/api/refresh").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let mut done = false;
    for _ in 0..100 {
        let (_, status) = get_json(&app, "/api/status").await;
        if status["state"] == "done" {
            assert_eq!(status["servers"], 1);
            assert_eq!(status["found"], 1);
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(done, "refresh never finished");

    let (status, body) = get_json(&app, "/api/servers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["servers"][0]["url"], "http://localhost:5000");
}
