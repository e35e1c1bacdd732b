//! Discovery entry points: enumerate, classify, fall back, aggregate.

use std::future::Future;
use std::sync::Arc;
use ::time::{format_description::well_known, OffsetDateTime};
use tokio::runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::MergeMap;
use crate::classifier::{Classifier, ContentPolicy, HttpProber, MarkerPolicy, Prober};
use crate::config::DiscoveryConfig;
use crate::enumerator::enumerate;
use crate::inspector::{LsofInspector, SystemInspector};
use crate::scanner::{classify_candidates, fallback_scan, ScanProgress};
use crate::types::{DiscoveryReport, DiscoverySource, ServerRecord};

/// Find dev servers with the default configuration, `lsof` and `reqwest`.
///
/// Never fails; an empty list means nothing was found.
pub async fn discover_servers() -> Vec<ServerRecord> {
    let config = DiscoveryConfig::default();
    match Discovery::with_defaults(config) {
        Some(discovery) => discovery.run().await,
        None => Vec::new(),
    }
}

/// One configured discovery engine. Each run owns its own merge map.
#[derive(Clone)]
pub struct Discovery {
    classifier: Classifier,
    config: Arc<DiscoveryConfig>,
    progress: ScanProgress,
}

impl Discovery {
    pub fn new(
        config: DiscoveryConfig,
        inspector: Arc<dyn SystemInspector>,
        prober: Arc<dyn Prober>,
        policy: Arc<dyn ContentPolicy>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            classifier: Classifier::new(inspector, prober, policy, config.clone()),
            config,
            progress: ScanProgress::new(),
        }
    }

    /// Production wiring. Returns `None` if the HTTP client cannot be built.
    pub fn with_defaults(config: DiscoveryConfig) -> Option<Self> {
        let prober = match HttpProber::new(&config) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "cannot probe servers");
                return None;
            }
        };
        Some(Self::new(
            config,
            Arc::new(LsofInspector::new()),
            Arc::new(prober),
            Arc::new(MarkerPolicy::default()),
        ))
    }

    /// Attach shared counters that observers can read during a run.
    pub fn with_progress(mut self, progress: ScanProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub async fn run(&self) -> Vec<ServerRecord> {
        self.report_with_cancel(CancellationToken::new()).await.servers
    }

    /// Like [`run`](Self::run), but stops probing once `cancel` fires and
    /// returns whatever was confirmed by then.
    pub async fn run_with_cancel(&self, cancel: CancellationToken) -> Vec<ServerRecord> {
        self.report_with_cancel(cancel).await.servers
    }

    /// [`run`](Self::run) for synchronous callers, with or without an
    /// ambient runtime.
    pub fn run_blocking(&self) -> Vec<ServerRecord> {
        let this = self.clone();
        block_on_own_runtime(async move { this.run().await })
    }

    pub async fn report(&self) -> DiscoveryReport {
        self.report_with_cancel(CancellationToken::new()).await
    }

    pub async fn report_with_cancel(&self, cancel: CancellationToken) -> DiscoveryReport {
        let (source, servers) = self.discover(&cancel).await;
        DiscoveryReport {
            generated_at: now_rfc3339(),
            source,
            servers,
        }
    }

    async fn discover(&self, cancel: &CancellationToken) -> (DiscoverySource, Vec<ServerRecord>) {
        let inspector = self.classifier.inspector().clone();
        let candidates = tokio::select! {
            c = enumerate(inspector.as_ref(), &self.config) => c,
            _ = cancel.cancelled() => return (DiscoverySource::None, Vec::new()),
        };
        debug!(count = candidates.len(), "enumerated runtime listeners");

        let mut merged = MergeMap::new();
        let records = classify_candidates(
            &self.classifier,
            candidates,
            self.config.concurrency,
            cancel,
            &self.progress,
        )
        .await;
        for record in records {
            merged.merge(record);
        }

        let mut source = DiscoverySource::Enumeration;
        if merged.is_empty() && !cancel.is_cancelled() {
            info!("no runtime processes found, checking common ports");
            source = DiscoverySource::Fallback;
            let records =
                fallback_scan(&self.classifier, &self.config.fallback_ports, cancel, &self.progress)
                    .await;
            for record in records {
                merged.merge(record);
            }
        }

        let servers = merged.rank();
        if servers.is_empty() {
            source = DiscoverySource::None;
        }
        (source, servers)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

/// Blocking wrapper around [`discover_servers`] for synchronous callers.
///
/// Safe to call from inside a tokio runtime as well.
pub fn discover_servers_blocking() -> Vec<ServerRecord> {
    block_on_own_runtime(discover_servers())
}

/// Drive `fut` on a runtime of its own.
///
/// `block_on` panics on a thread that already runs async code, so in that
/// case the work moves to a plain thread and the caller waits for it.
fn block_on_own_runtime<F>(fut: F) -> Vec<ServerRecord>
where
    F: Future<Output = Vec<ServerRecord>> + Send + 'static,
{
    let run = move || match runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt.block_on(fut),
        Err(e) => {
            warn!(error = %e, "cannot start async runtime for discovery");
            Vec::new()
        }
    };

    if runtime::Handle::try_current().is_err() {
        return run();
    }
    match std::thread::Builder::new()
        .name("dev-scan-discovery".into())
        .spawn(run)
    {
        Ok(handle) => handle.join().unwrap_or_else(|_| {
            warn!("discovery thread panicked");
            Vec::new()
        }),
        Err(e) => {
            warn!(error = %e, "cannot spawn discovery thread");
            Vec::new()
        }
    }
}
