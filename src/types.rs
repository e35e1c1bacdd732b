use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Transport family of an observed listening address.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp4,
    Tcp6,
}

impl Protocol {
    /// Classify a raw address by shape: anything containing `:` is IPv6.
    pub fn from_address(address: &str) -> Self {
        if address.contains(':') {
            Protocol::Tcp6
        } else {
            Protocol::Tcp4
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp4 => f.write_str("tcp4"),
            Protocol::Tcp6 => f.write_str("tcp6"),
        }
    }
}

/// One listening TCP socket as reported by the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub pid: u32,
    pub process_name: String,
    /// Bound address without the port. Wildcards are `0.0.0.0` or `::`.
    pub address: String,
    pub port: u16,
}

/// An unverified `(process, port, address)` tuple awaiting classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub pid: u32,
    pub port: u16,
    pub address: String,
    pub process_name: String,
}

impl From<Listener> for Candidate {
    fn from(l: Listener) -> Self {
        Self {
            pid: l.pid,
            port: l.port,
            address: l.address,
            process_name: l.process_name,
        }
    }
}

/// A verified dev server, as handed to the selection UI.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub port: u16,
    pub url: String,
    pub project_name: String,
    #[serde(rename = "processName")]
    pub process_label: String,
    #[serde(default)]
    pub addresses: BTreeSet<String>,
    #[serde(default)]
    pub protocols: BTreeSet<Protocol>,
    #[serde(rename = "isStartingUp", default)]
    pub starting_up: bool,
}

impl ServerRecord {
    pub fn new(port: u16, project_name: impl Into<String>, process_label: impl Into<String>) -> Self {
        Self {
            port,
            url: format!("http://localhost:{port}"),
            project_name: project_name.into(),
            process_label: process_label.into(),
            addresses: BTreeSet::new(),
            protocols: BTreeSet::new(),
            starting_up: false,
        }
    }

    /// Record another source address and the protocol it implies.
    pub fn add_address(&mut self, address: impl Into<String>) {
        let address = address.into();
        self.protocols.insert(Protocol::from_address(&address));
        self.addresses.insert(address);
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.add_address(address);
        self
    }

    pub fn starting_up(mut self, starting_up: bool) -> Self {
        self.starting_up = starting_up;
        self
    }

    pub fn has_tcp6(&self) -> bool {
        self.protocols.contains(&Protocol::Tcp6)
    }
}

/// Where the servers of a report came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Enumeration,
    Fallback,
    #[default]
    None,
}

/// Result of one discovery run plus when it was produced.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub generated_at: String,
    pub source: DiscoverySource,
    pub servers: Vec<ServerRecord>,
}
