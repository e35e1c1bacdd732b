//! Operating-system facade: which sockets are listening, and who owns them.
//!
//! The engine only talks to [`SystemInspector`], so tests swap in a fake and
//! other platforms can provide their own implementation.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{DiscoveryError, Result};
use crate::types::Listener;

#[async_trait]
pub trait SystemInspector: Send + Sync {
    /// All listening TCP sockets on the host with their owning process.
    async fn listening_sockets(&self) -> Result<Vec<Listener>>;

    /// Listening TCP sockets bound to `port`.
    async fn port_listeners(&self, port: u16) -> Result<Vec<Listener>> {
        let all = self.listening_sockets().await?;
        Ok(all.into_iter().filter(|l| l.port == port).collect())
    }

    /// Current working directory of `pid`.
    async fn process_cwd(&self, pid: u32) -> Result<PathBuf>;

    /// Full command line of `pid`.
    async fn process_command(&self, pid: u32) -> Result<String>;
}

/// POSIX inspector backed by `lsof` and `ps`. On Linux the working directory
/// is read from `/proc` before falling back to `lsof`.
#[derive(Debug, Clone, Default)]
pub struct LsofInspector;

impl LsofInspector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SystemInspector for LsofInspector {
    async fn listening_sockets(&self) -> Result<Vec<Listener>> {
        let out = run_capture("lsof", &["-nP", "-iTCP", "-sTCP:LISTEN", "-Fpctn"])
            .await
            .map_err(DiscoveryError::EnumerationUnavailable)?;
        Ok(parse_lsof_fields(&out))
    }

    async fn port_listeners(&self, port: u16) -> Result<Vec<Listener>> {
        let selector = format!("-iTCP:{port}");
        let out = run_capture("lsof", &["-nP", &selector, "-sTCP:LISTEN", "-Fpctn"])
            .await
            .map_err(DiscoveryError::EnumerationUnavailable)?;
        Ok(parse_lsof_fields(&out)
            .into_iter()
            .filter(|l| l.port == port)
            .collect())
    }

    async fn process_cwd(&self, pid: u32) -> Result<PathBuf> {
        if cfg!(target_os = "linux") {
            if let Ok(path) = tokio::fs::read_link(format!("/proc/{pid}/cwd")).await {
                return Ok(path);
            }
        }
        let pid_arg = pid.to_string();
        let out = run_capture("lsof", &["-a", "-p", &pid_arg, "-d", "cwd", "-Fn"])
            .await
            .map_err(|reason| DiscoveryError::ProcessInfoUnavailable { pid, reason })?;
        out.lines()
            .find_map(|line| line.strip_prefix('n'))
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| DiscoveryError::ProcessInfoUnavailable {
                pid,
                reason: "no cwd entry in lsof output".to_string(),
            })
    }

    async fn process_command(&self, pid: u32) -> Result<String> {
        let pid_arg = pid.to_string();
        let out = run_capture("ps", &["-p", &pid_arg, "-o", "command="])
            .await
            .map_err(|reason| DiscoveryError::ProcessInfoUnavailable { pid, reason })?;
        let cmd = out.trim();
        if cmd.is_empty() {
            return Err(DiscoveryError::ProcessInfoUnavailable {
                pid,
                reason: "empty command line".to_string(),
            });
        }
        Ok(cmd.to_string())
    }
}

/// Run a helper binary and return its stdout. `lsof` exits non-zero when
/// nothing matches, so a failing exit only counts when stdout is empty and
/// stderr is not.
async fn run_capture(program: &str, args: &[&str]) -> std::result::Result<String, String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run {program}: {e}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() && stdout.trim().is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            return Err(format!("{program} exited with {}: {stderr}", output.status));
        }
    }
    Ok(stdout)
}

/// Parse `lsof -F pctn` output into listeners.
///
/// Each line starts with a field tag: `p` opens a process set, `c` is its
/// command, `f` opens a file within it, `t` is the socket family and `n`
/// the `host:port` name. Unknown tags are skipped.
pub fn parse_lsof_fields(output: &str) -> Vec<Listener> {
    let mut listeners = Vec::new();
    let mut pid: Option<u32> = None;
    let mut command = String::new();
    let mut family: Option<String> = None;

    for line in output.lines() {
        let mut chars = line.chars();
        let Some(tag) = chars.next() else { continue };
        let value = chars.as_str();
        match tag {
            'p' => {
                pid = value.trim().parse().ok();
                command.clear();
                family = None;
            }
            'c' => command = value.to_string(),
            'f' => family = None,
            't' => family = Some(value.to_string()),
            'n' => {
                let Some(pid) = pid else { continue };
                if let Some((address, port)) = split_host_port(value, family.as_deref()) {
                    listeners.push(Listener {
                        pid,
                        process_name: command.clone(),
                        address,
                        port,
                    });
                }
            }
            _ => {}
        }
    }
    listeners
}

/// Split an lsof socket name like `127.0.0.1:5000`, `[::1]:5000` or `*:5000`.
/// The `*` wildcard becomes `::` for IPv6 sockets and `0.0.0.0` otherwise.
fn split_host_port(name: &str, family: Option<&str>) -> Option<(String, u16)> {
    // Connected sockets look like `a:1->b:2`; only the local side matters.
    let local = name.split("->").next()?.trim();
    let local = local.split_whitespace().next()?;
    let (host, port) = local.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let address = match host {
        "*" if family == Some("IPv6") => "::".to_string(),
        "*" => "0.0.0.0".to_string(),
        other => other.to_string(),
    };
    Some((address, port))
}
