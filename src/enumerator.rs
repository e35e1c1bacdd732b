use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use tokio::time::{self, Instant};
use tracing::debug;

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::inspector::SystemInspector;
use crate::types::{Candidate, Listener};

/// List runtime-owned listening sockets in the web port range.
///
/// Never fails and never outlives the enumeration timeout: a failed or slow
/// socket query yields an empty list, which sends discovery down the
/// fallback path.
pub async fn enumerate(inspector: &dyn SystemInspector, config: &DiscoveryConfig) -> Vec<Candidate> {
    let deadline = Instant::now() + config.enumerate_timeout();
    let listeners = match time::timeout_at(deadline, inspector.listening_sockets()).await {
        Ok(Ok(listeners)) => listeners,
        Ok(Err(e)) => {
            debug!(error = %e, "socket enumeration failed");
            return Vec::new();
        }
        Err(_) => {
            let e = DiscoveryError::EnumerationUnavailable("socket query timed out".to_string());
            debug!(error = %e, "socket enumeration failed");
            return Vec::new();
        }
    };

    let in_range: Vec<Listener> = listeners
        .into_iter()
        .filter(|l| config.web_port_range().contains(&u32::from(l.port)))
        .collect();
    runtime_candidates(inspector, in_range, config, deadline).await
}

/// Keep listeners whose process name, or failing that command line, names a
/// known runtime. Duplicate `(pid, port, address)` rows are dropped.
///
/// Command lines are looked up concurrently, once per pid, and must all
/// arrive within one process timeout and before `deadline`. If they do not,
/// only the name-matched listeners are kept.
pub async fn runtime_candidates(
    inspector: &dyn SystemInspector,
    listeners: Vec<Listener>,
    config: &DiscoveryConfig,
    deadline: Instant,
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let listeners: Vec<Listener> = listeners
        .into_iter()
        .filter(|l| seen.insert((l.pid, l.port, l.address.clone())))
        .collect();

    let mut owned: HashMap<u32, bool> = HashMap::new();
    let mut unmatched: Vec<u32> = Vec::new();
    for l in &listeners {
        if owned.contains_key(&l.pid) {
            continue;
        }
        let by_name = config.matches_runtime(&l.process_name);
        owned.insert(l.pid, by_name);
        if !by_name {
            unmatched.push(l.pid);
        }
    }

    if !unmatched.is_empty() {
        let lookup_deadline = deadline.min(Instant::now() + config.process_timeout());
        let lookups = join_all(unmatched.iter().map(|&pid| inspector.process_command(pid)));
        match time::timeout_at(lookup_deadline, lookups).await {
            Ok(commands) => {
                for (pid, cmd) in unmatched.iter().zip(commands) {
                    if let Ok(cmd) = cmd {
                        owned.insert(*pid, config.matches_runtime(&cmd));
                    }
                }
            }
            Err(_) => debug!(
                pending = unmatched.len(),
                "command line lookups timed out, keeping name matches only"
            ),
        }
    }

    listeners
        .into_iter()
        .filter(|l| owned.get(&l.pid).copied().unwrap_or(false))
        .map(Candidate::from)
        .collect()
}
