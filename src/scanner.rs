use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::classifier::Classifier;
use crate::enumerator::runtime_candidates;
use crate::types::{Candidate, ServerRecord};

/// Counters shared with observers (the HTTP API) while a run is in flight.
#[derive(Clone, Debug, Default)]
pub struct ScanProgress {
    pub probed: Arc<AtomicU64>,
    pub found: Arc<AtomicU64>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, found: bool) {
        self.probed.fetch_add(1, Ordering::Relaxed);
        if found {
            self.found.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Classify candidates concurrently, at most `concurrency` at a time.
///
/// Results come back in candidate order regardless of completion order, so
/// "first seen" is stable for the aggregator.
pub async fn classify_candidates(
    classifier: &Classifier,
    candidates: Vec<Candidate>,
    concurrency: usize,
    cancel: &CancellationToken,
    progress: &ScanProgress,
) -> Vec<ServerRecord> {
    let sem = Arc::new(Semaphore::new(concurrency.clamp(1, 256)));
    let mut set = JoinSet::new();

    for (idx, candidate) in candidates.into_iter().enumerate() {
        let permit = tokio::select! {
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            _ = cancel.cancelled() => break,
        };
        let classifier = classifier.clone();
        let cancel = cancel.clone();
        let progress = progress.clone();

        set.spawn(async move {
            let _permit = permit;
            let record = tokio::select! {
                r = classifier.classify(&candidate) => r,
                _ = cancel.cancelled() => return (idx, None),
            };
            progress.record(record.is_some());
            (idx, record)
        });
    }

    collect_ordered(set).await.into_iter().flatten().collect()
}

/// Probe the fallback port list in fixed-size batches.
///
/// For every port, some listener on it must belong to a runtime process
/// before the port is handed to the classifier. Batches run one after
/// another; ports within a batch run together.
pub async fn fallback_scan(
    classifier: &Classifier,
    ports: &[u16],
    cancel: &CancellationToken,
    progress: &ScanProgress,
) -> Vec<ServerRecord> {
    let batch_size = classifier.config().fallback_batch_size.max(1);
    let mut out = Vec::new();

    for (batch_no, batch) in ports.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let mut set = JoinSet::new();
        for (offset, &port) in batch.iter().enumerate() {
            let idx = batch_no * batch_size + offset;
            let classifier = classifier.clone();
            let cancel = cancel.clone();
            let progress = progress.clone();

            set.spawn(async move {
                let records = tokio::select! {
                    r = scan_port(&classifier, port, &progress) => r,
                    _ = cancel.cancelled() => Vec::new(),
                };
                (idx, records)
            });
        }
        out.extend(collect_ordered(set).await.into_iter().flatten());
    }
    out
}

async fn scan_port(classifier: &Classifier, port: u16, progress: &ScanProgress) -> Vec<ServerRecord> {
    let config = classifier.config();
    let inspector = classifier.inspector().as_ref();
    // The whole ownership check shares one process timeout.
    let deadline = Instant::now() + config.process_timeout();
    let listeners = match time::timeout_at(deadline, inspector.port_listeners(port)).await {
        Ok(Ok(listeners)) => listeners,
        Ok(Err(e)) => {
            debug!(port, error = %e, "port ownership check failed");
            return Vec::new();
        }
        Err(_) => {
            debug!(port, "port ownership check timed out");
            return Vec::new();
        }
    };

    let mut records = Vec::new();
    for candidate in runtime_candidates(inspector, listeners, config, deadline).await {
        let record = classifier.classify(&candidate).await;
        progress.record(record.is_some());
        records.extend(record);
    }
    records
}

/// Drain a join set and order its `(index, value)` results by index.
async fn collect_ordered<T: 'static>(mut set: JoinSet<(usize, T)>) -> Vec<T> {
    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(pair) => results.push(pair),
            Err(e) => debug!(error = %e, "classification task failed"),
        }
    }
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, v)| v).collect()
}
