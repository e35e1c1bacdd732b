use std::path::Path;
use tokio::time;
use tracing::debug;

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::inspector::SystemInspector;

/// Derive a project name from the working directory of `pid`.
///
/// Returns the configured placeholder when the lookup fails, times out or
/// yields a path without a final segment.
pub async fn resolve_project_name(
    inspector: &dyn SystemInspector,
    pid: u32,
    config: &DiscoveryConfig,
) -> String {
    let lookup = time::timeout(config.process_timeout(), inspector.process_cwd(pid)).await;
    let cwd = match lookup {
        Ok(Ok(cwd)) => cwd,
        Ok(Err(e)) => {
            debug!(pid, error = %e, "using placeholder project name");
            return config.placeholder_project_name.clone();
        }
        Err(_) => {
            let e = DiscoveryError::ProcessInfoUnavailable {
                pid,
                reason: "cwd lookup timed out".to_string(),
            };
            debug!(pid, error = %e, "using placeholder project name");
            return config.placeholder_project_name.clone();
        }
    };
    project_name_from_path(&cwd).unwrap_or_else(|| config.placeholder_project_name.clone())
}

/// Final path segment, if there is a non-empty one.
pub fn project_name_from_path(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().trim().to_string())
        .filter(|n| !n.is_empty())
}
