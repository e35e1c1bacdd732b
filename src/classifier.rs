//! Decides whether a candidate socket is a real app server, one that is
//! still booting, or noise such as a debugger endpoint.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::inspector::SystemInspector;
use crate::resolver::resolve_project_name;
use crate::types::{Candidate, ServerRecord};

/// Content evidence found in a probe response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub positive: bool,
    pub negative: bool,
}

/// The one place that decides what an app page or a tooling page looks like.
pub trait ContentPolicy: Send + Sync {
    fn assess(&self, body: &str) -> Signals;
}

/// Substring markers for a web app bootstrap (positive) and for debugger or
/// VM-service pages (negative).
#[derive(Debug, Clone)]
pub struct MarkerPolicy {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        let s = |v: &[&str]| -> Vec<String> { v.iter().map(|m| m.to_string()).collect() };
        Self {
            positive: s(&[
                "main.dart.js",
                "flutter_service_worker.js",
                "flutter_bootstrap.js",
                "flutter.js",
                "<!DOCTYPE html",
                "<!doctype html",
                "<html",
            ]),
            negative: s(&[
                "Dart VM Service",
                "DevTools",
                "devtools",
                "observatory",
                "vm-service",
            ]),
        }
    }
}

impl ContentPolicy for MarkerPolicy {
    fn assess(&self, body: &str) -> Signals {
        Signals {
            positive: self.positive.iter().any(|m| body.contains(m.as_str())),
            negative: self.negative.iter().any(|m| body.contains(m.as_str())),
        }
    }
}

/// What came back from an HTTP probe that got a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP transport used by the classifier.
#[async_trait]
pub trait Prober: Send + Sync {
    /// GET `http://localhost:{port}/`. Errors are `ProbeTimeout`,
    /// `ProbeRefused` or `Probe`.
    async fn probe(&self, port: u16) -> Result<ProbeResponse>;
}

/// `reqwest` prober with a hard deadline and a cap on body bytes read.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpProber {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(config.probe_timeout())
            .build()?;
        Ok(Self {
            client,
            timeout: config.probe_timeout(),
            max_body_bytes: config.max_body_bytes,
        })
    }

    async fn fetch(&self, port: u16) -> Result<ProbeResponse> {
        let url = format!("http://localhost:{port}/");
        let mut resp = self
            .client
            .get(&url)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| map_reqwest_error(port, e))?;
        let status = resp.status().as_u16();

        let mut body: Vec<u8> = Vec::new();
        loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    let room = self.max_body_bytes.saturating_sub(body.len());
                    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                    if body.len() >= self.max_body_bytes {
                        break;
                    }
                }
                Ok(None) => break,
                // Headers arrived, so the server answered; keep what we have.
                Err(e) => {
                    debug!(port, error = %e, "probe body truncated");
                    break;
                }
            }
        }
        Ok(ProbeResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, port: u16) -> Result<ProbeResponse> {
        match time::timeout(self.timeout, self.fetch(port)).await {
            Ok(res) => res,
            Err(_) => Err(DiscoveryError::ProbeTimeout { port }),
        }
    }
}

fn map_reqwest_error(port: u16, e: reqwest::Error) -> DiscoveryError {
    if e.is_timeout() {
        DiscoveryError::ProbeTimeout { port }
    } else if e.is_connect() {
        DiscoveryError::ProbeRefused {
            port,
            reason: e.to_string(),
        }
    } else {
        DiscoveryError::Probe {
            port,
            reason: e.to_string(),
        }
    }
}

/// Outcome of classifying one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept { starting_up: bool },
    Reject,
}

/// Pure decision over a probe result.
///
/// A response is accepted when it carries a positive signal and no negative
/// one. A response with neither is accepted only on ports at or above the
/// debug tooling threshold, and only while `accept_unmarked_high_ports` is
/// set. A probe that never got a response is kept as
/// "starting up" inside the dev-server port band and rejected elsewhere.
pub fn decide(
    port: u16,
    probe: &Result<ProbeResponse>,
    policy: &dyn ContentPolicy,
    config: &DiscoveryConfig,
) -> Verdict {
    match probe {
        Ok(resp) => {
            let signals = policy.assess(&resp.body);
            if signals.negative {
                Verdict::Reject
            } else if signals.positive
                || (config.accept_unmarked_high_ports && port >= config.debug_port_threshold)
            {
                Verdict::Accept { starting_up: false }
            } else {
                Verdict::Reject
            }
        }
        Err(e) if e.is_unreachable() && config.starting_up_range().contains(&port) => {
            Verdict::Accept { starting_up: true }
        }
        Err(_) => Verdict::Reject,
    }
}

/// Resolves, probes and judges candidates. Cheap to clone into tasks.
#[derive(Clone)]
pub struct Classifier {
    inspector: Arc<dyn SystemInspector>,
    prober: Arc<dyn Prober>,
    policy: Arc<dyn ContentPolicy>,
    config: Arc<DiscoveryConfig>,
}

impl Classifier {
    pub fn new(
        inspector: Arc<dyn SystemInspector>,
        prober: Arc<dyn Prober>,
        policy: Arc<dyn ContentPolicy>,
        config: Arc<DiscoveryConfig>,
    ) -> Self {
        Self {
            inspector,
            prober,
            policy,
            config,
        }
    }

    pub fn inspector(&self) -> &Arc<dyn SystemInspector> {
        &self.inspector
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub async fn classify(&self, candidate: &Candidate) -> Option<ServerRecord> {
        let project = resolve_project_name(self.inspector.as_ref(), candidate.pid, &self.config).await;
        let probe = self.prober.probe(candidate.port).await;
        if let Err(e) = &probe {
            debug!(port = candidate.port, error = %e, "probe did not get a response");
        }

        match decide(candidate.port, &probe, self.policy.as_ref(), &self.config) {
            Verdict::Reject => {
                debug!(port = candidate.port, project = %project, "candidate rejected");
                None
            }
            Verdict::Accept { starting_up } => {
                if starting_up {
                    info!(port = candidate.port, project = %project, "found dev server (starting up)");
                } else {
                    info!(port = candidate.port, project = %project, "found dev server");
                }
                Some(
                    ServerRecord::new(candidate.port, project, candidate.process_name.clone())
                        .with_address(candidate.address.clone())
                        .starting_up(starting_up),
                )
            }
        }
    }
}
