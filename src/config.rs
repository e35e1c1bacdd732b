use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::ports;

/// Tunables for one discovery run. `Default` carries the stock values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Substrings that mark a process as a dev-server runtime (matched case-insensitively).
    pub runtime_markers: Vec<String>,
    /// Lowest port considered a web server during enumeration.
    pub min_port: u32,
    /// Highest port considered a web server during enumeration.
    pub max_port: u32,
    /// Responding ports below this are treated as debug tooling unless the body proves otherwise.
    pub debug_port_threshold: u16,
    /// Accept responses with no marker either way on ports at or above the threshold.
    pub accept_unmarked_high_ports: bool,
    /// Unreachable ports in this range are reported as still starting up.
    pub starting_up_min_port: u16,
    pub starting_up_max_port: u16,
    /// Label used when the owning process' working directory cannot be read.
    pub placeholder_project_name: String,
    pub enumerate_timeout_ms: u64,
    pub process_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    /// Max bytes of a probe response body that are inspected.
    pub max_body_bytes: usize,
    /// Max concurrent classifications of enumerated candidates.
    pub concurrency: usize,
    /// Fallback ports probed per batch.
    pub fallback_batch_size: usize,
    pub fallback_ports: Vec<u16>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            runtime_markers: vec!["dart".to_string(), "flutter".to_string()],
            min_port: 3000,
            max_port: 70000,
            debug_port_threshold: 10000,
            accept_unmarked_high_ports: true,
            starting_up_min_port: 40000,
            starting_up_max_port: 65000,
            placeholder_project_name: "Flutter App".to_string(),
            enumerate_timeout_ms: 5000,
            process_timeout_ms: 1000,
            probe_timeout_ms: 1500,
            max_body_bytes: 256 * 1024,
            concurrency: 16,
            fallback_batch_size: 5,
            fallback_ports: ports::fallback_ports(),
        }
    }
}

impl DiscoveryConfig {
    pub fn enumerate_timeout(&self) -> Duration {
        Duration::from_millis(self.enumerate_timeout_ms)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn web_port_range(&self) -> RangeInclusive<u32> {
        self.min_port..=self.max_port
    }

    pub fn starting_up_range(&self) -> RangeInclusive<u16> {
        self.starting_up_min_port..=self.starting_up_max_port
    }

    /// True if `text` (a process name or command line) names a known runtime.
    pub fn matches_runtime(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.runtime_markers
            .iter()
            .any(|m| !m.is_empty() && lower.contains(&m.to_lowercase()))
    }
}
