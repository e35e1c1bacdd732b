use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Failures inside the discovery engine. None of these reach the caller of
/// `discover_servers`; each is recovered where it happens and logged.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("listening socket query unavailable: {0}")]
    EnumerationUnavailable(String),

    #[error("process info unavailable for pid {pid}: {reason}")]
    ProcessInfoUnavailable { pid: u32, reason: String },

    #[error("probe of port {port} timed out")]
    ProbeTimeout { port: u16 },

    #[error("probe of port {port} refused: {reason}")]
    ProbeRefused { port: u16, reason: String },

    #[error("probe of port {port} failed: {reason}")]
    Probe { port: u16, reason: String },

    #[error("http client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl DiscoveryError {
    /// Timeouts and refusals are the cases a booting server can produce.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            DiscoveryError::ProbeTimeout { .. }
                | DiscoveryError::ProbeRefused { .. }
                | DiscoveryError::Probe { .. }
        )
    }
}
