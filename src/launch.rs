use serde::Serialize;

use crate::devices::DeviceProfile;
use crate::types::ServerRecord;

/// What the preview window should open first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchTarget {
    /// Load this URL straight away.
    Direct { url: String },
    /// Show the server picker. `servers` may be empty, in which case the
    /// picker asks for a URL by hand.
    Selection { servers: Vec<ServerRecord> },
}

/// Everything the shell needs to open a preview window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchPlan {
    pub target: LaunchTarget,
    pub device: DeviceProfile,
}

/// Choose a target: an explicit URL wins, a single server is opened
/// directly, anything else goes to the picker sorted by project and port.
pub fn plan_target(explicit_url: Option<&str>, mut servers: Vec<ServerRecord>) -> LaunchTarget {
    if let Some(url) = explicit_url.map(str::trim).filter(|u| !u.is_empty()) {
        return LaunchTarget::Direct {
            url: url.to_string(),
        };
    }
    if servers.len() == 1 {
        let only = servers.remove(0);
        return LaunchTarget::Direct { url: only.url };
    }
    sort_servers(&mut servers);
    LaunchTarget::Selection { servers }
}

/// Deterministic display order for discovered servers.
pub fn sort_servers(servers: &mut [ServerRecord]) {
    servers.sort_by(|a, b| {
        a.project_name
            .cmp(&b.project_name)
            .then(a.port.cmp(&b.port))
    });
}
