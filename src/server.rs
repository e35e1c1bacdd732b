use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    discovery::Discovery,
    scanner::ScanProgress,
    types::DiscoveryReport,
};

/// Shared state behind the selection UI's API.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>,
    discovery: Discovery,
}

#[derive(Debug, Default)]
struct ServerState {
    state: RunState,
    report: Option<DiscoveryReport>,
    progress: Option<ScanProgress>,
    cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Done,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Status {
    pub state: RunState,
    pub probed: u64,
    pub found: u64,
    pub servers: usize,
}

impl AppState {
    pub fn new(discovery: Discovery) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ServerState::default())),
            discovery,
        }
    }

    /// Seed the state with a finished report, e.g. from the CLI's first run.
    pub async fn with_report(self, report: DiscoveryReport) -> Self {
        {
            let mut s = self.inner.write().await;
            s.state = RunState::Done;
            s.report = Some(report);
        }
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/servers", get(get_servers))
        .route("/refresh", post(post_refresh))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub async fn spawn_server(bind: &str, state: AppState) -> Result<()> {
    let app = build_router(state);
    info!("serving server list on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let (probed, found) = match s.progress.as_ref() {
        Some(p) => (
            p.probed.load(Ordering::Relaxed),
            p.found.load(Ordering::Relaxed),
        ),
        None => (0, 0),
    };
    let servers = s.report.as_ref().map(|r| r.servers.len()).unwrap_or(0);
    (
        StatusCode::OK,
        Json(Status {
            state: s.state,
            probed,
            found,
            servers,
        }),
    )
}

async fn get_servers(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.report.as_ref() {
        Some(report) => (StatusCode::OK, Json(report.clone())).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn post_refresh(State(app): State<AppState>) -> impl IntoResponse {
    let progress = ScanProgress::new();
    let cancel = CancellationToken::new();

    {
        let mut s = app.inner.write().await;
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.state = RunState::Running;
        s.progress = Some(progress.clone());
        s.cancel = Some(cancel.clone());
    }

    let discovery = app.discovery.clone().with_progress(progress);
    let inner = app.inner.clone();
    tokio::spawn(async move {
        let report = discovery.report_with_cancel(cancel.clone()).await;
        let mut s = inner.write().await;
        // A newer refresh replaced us; its result wins.
        if cancel.is_cancelled() {
            return;
        }
        s.state = RunState::Done;
        s.report = Some(report);
        s.cancel = None;
    });

    (
        StatusCode::ACCEPTED,
        Json(Status {
            state: RunState::Running,
            ..Status::default()
        }),
    )
}
