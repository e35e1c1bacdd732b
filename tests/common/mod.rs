#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dev_scan_rs::classifier::{MarkerPolicy, ProbeResponse, Prober};
use dev_scan_rs::config::DiscoveryConfig;
use dev_scan_rs::error::{DiscoveryError, Result};
use dev_scan_rs::inspector::SystemInspector;
use dev_scan_rs::types::Listener;
use dev_scan_rs::Discovery;

pub const APP_BODY: &str = r#"<!DOCTYPE html><html><head><script src="flutter_bootstrap.js" async></script></head><body></body></html>"#;
pub const DEVTOOLS_BODY: &str = "<html><head><title>Dart DevTools</title></head></html>";

pub fn listener(pid: u32, name: &str, address: &str, port: u16) -> Listener {
    Listener {
        pid,
        process_name: name.to_string(),
        address: address.to_string(),
        port,
    }
}

#[derive(Default)]
pub struct FakeInspector {
    pub enumeration_fails: bool,
    pub enumeration_hangs: bool,
    pub cwd_hangs: bool,
    pub command_delay: Option<Duration>,
    pub listeners: Vec<Listener>,
    pub cwds: HashMap<u32, PathBuf>,
    pub commands: HashMap<u32, String>,
    pub port_queries: AtomicUsize,
}

impl FakeInspector {
    pub fn with_listeners(listeners: Vec<Listener>) -> Self {
        Self {
            listeners,
            ..Self::default()
        }
    }

    pub fn cwd(mut self, pid: u32, path: &str) -> Self {
        self.cwds.insert(pid, PathBuf::from(path));
        self
    }

    pub fn command(mut self, pid: u32, cmd: &str) -> Self {
        self.commands.insert(pid, cmd.to_string());
        self
    }

    pub fn failing_enumeration(mut self) -> Self {
        self.enumeration_fails = true;
        self
    }

    /// The socket query never returns.
    pub fn hanging_enumeration(mut self) -> Self {
        self.enumeration_hangs = true;
        self
    }

    /// Working directory lookups never return.
    pub fn hanging_cwd(mut self) -> Self {
        self.cwd_hangs = true;
        self
    }

    /// Every command line lookup takes `delay` before answering.
    pub fn slow_commands(mut self, delay: Duration) -> Self {
        self.command_delay = Some(delay);
        self
    }
}

#[async_trait]
impl SystemInspector for FakeInspector {
    async fn listening_sockets(&self) -> Result<Vec<Listener>> {
        if self.enumeration_hangs {
            std::future::pending::<()>().await;
        }
        if self.enumeration_fails {
            return Err(DiscoveryError::EnumerationUnavailable("lsof not installed".into()));
        }
        Ok(self.listeners.clone())
    }

    async fn port_listeners(&self, port: u16) -> Result<Vec<Listener>> {
        self.port_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.listeners.iter().filter(|l| l.port == port).cloned().collect())
    }

    async fn process_cwd(&self, pid: u32) -> Result<PathBuf> {
        if self.cwd_hangs {
            std::future::pending::<()>().await;
        }
        self.cwds
            .get(&pid)
            .cloned()
            .ok_or_else(|| DiscoveryError::ProcessInfoUnavailable {
                pid,
                reason: "permission denied".into(),
            })
    }

    async fn process_command(&self, pid: u32) -> Result<String> {
        if let Some(delay) = self.command_delay {
            tokio::time::sleep(delay).await;
        }
        self.commands
            .get(&pid)
            .cloned()
            .ok_or_else(|| DiscoveryError::ProcessInfoUnavailable {
                pid,
                reason: "no such process".into(),
            })
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    Timeout,
    Refused,
    Hang,
}

/// Prober answering from a table; unknown ports are refused.
#[derive(Default)]
pub struct FakeProber {
    pub replies: HashMap<u16, Reply>,
    pub probed: Mutex<Vec<u16>>,
}

impl FakeProber {
    pub fn reply(mut self, port: u16, reply: Reply) -> Self {
        self.replies.insert(port, reply);
        self
    }

    pub fn probed_ports(&self) -> Vec<u16> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, port: u16) -> Result<ProbeResponse> {
        self.probed.lock().unwrap().push(port);
        match self.replies.get(&port).cloned() {
            Some(Reply::Body(body)) => Ok(ProbeResponse { status: 200, body }),
            Some(Reply::Timeout) => Err(DiscoveryError::ProbeTimeout { port }),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DiscoveryError::ProbeTimeout { port })
            }
            Some(Reply::Refused) | None => Err(DiscoveryError::ProbeRefused {
                port,
                reason: "connection refused".into(),
            }),
        }
    }
}

pub fn discovery(inspector: FakeInspector, prober: FakeProber) -> (Discovery, Arc<FakeInspector>, Arc<FakeProber>) {
    discovery_with(DiscoveryConfig::default(), inspector, prober)
}

pub fn discovery_with(
    config: DiscoveryConfig,
    inspector: FakeInspector,
    prober: FakeProber,
) -> (Discovery, Arc<FakeInspector>, Arc<FakeProber>) {
    let inspector = Arc::new(inspector);
    let prober = Arc::new(prober);
    let d = Discovery::new(
        config,
        inspector.clone(),
        prober.clone(),
        Arc::new(MarkerPolicy::default()),
    );
    (d, inspector, prober)
}
