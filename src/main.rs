use std::fs::File;
use std::path::PathBuf;

use dev_scan_rs::config::DiscoveryConfig;
use dev_scan_rs::devices::{DeviceCatalog, DeviceCategory};
use dev_scan_rs::launch::{plan_target, sort_servers, LaunchPlan, LaunchTarget};
use dev_scan_rs::types::{DiscoveryReport, ServerRecord};
use dev_scan_rs::{ports, server, Discovery};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// dev-scan-rs — find the local web dev server to open in a device preview window.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dev-scan-rs",
    version,
    about = "Find locally running web dev servers and plan a device-emulated preview.",
    long_about = None
)]
struct Cli {
    /// URL to open. Skips discovery when given.
    #[arg(short, long)]
    url: Option<String>,

    /// Device to emulate (exact or fuzzy name).
    #[arg(short, long, default_value = "iPhone 12")]
    device: String,

    /// List available devices and exit.
    #[arg(short = 'l', long = "list-devices", default_value_t = false)]
    list_devices: bool,

    /// JSON file with custom devices: { "devices": [ ... ] }.
    #[arg(long = "devices-file")]
    devices_file: Option<PathBuf>,

    /// Ports probed when no runtime process is found (one port or range per line).
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,

    /// Process name marker for dev-server runtimes. Repeatable; defaults to dart and flutter.
    #[arg(long = "runtime")]
    runtimes: Vec<String>,

    /// HTTP probe timeout in milliseconds.
    #[arg(long = "probe-timeout-ms", default_value_t = 1500)]
    probe_timeout_ms: u64,

    /// Only accept responses carrying an app bootstrap marker, on any port.
    #[arg(long = "require-app-marker", default_value_t = false)]
    require_app_marker: bool,

    /// Max concurrent candidate classifications.
    #[arg(long, default_value_t = 16)]
    concurrency: usize,

    /// Print the launch plan as JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Write the discovery report as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Serve the discovered servers over HTTP for the selection UI.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Bind address for --serve-ui.
    #[arg(long, default_value = "127.0.0.1:8765")]
    bind: String,

    /// Log engine decisions (same as RUST_LOG=debug).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Cli {
    fn discovery_config(&self) -> Result<DiscoveryConfig> {
        let mut config = DiscoveryConfig {
            probe_timeout_ms: self.probe_timeout_ms,
            concurrency: self.concurrency,
            accept_unmarked_high_ports: !self.require_app_marker,
            ..DiscoveryConfig::default()
        };
        if !self.runtimes.is_empty() {
            config.runtime_markers = self.runtimes.clone();
        }
        if let Some(path) = self.ports_file.as_deref() {
            config.fallback_ports = ports::load_ports_from_path(path)?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut catalog = DeviceCatalog::builtin();
    if let Some(path) = cli.devices_file.as_deref() {
        catalog.load_custom(path)?;
    }

    if cli.list_devices {
        print_devices(&catalog);
        return Ok(());
    }

    let device = catalog
        .find(&cli.device)
        .cloned()
        .ok_or_else(|| anyhow!("device \"{}\" not found, use --list-devices to see available devices", cli.device))?;

    let config = cli.discovery_config()?;
    let discovery = Discovery::with_defaults(config)
        .ok_or_else(|| anyhow!("failed to set up the HTTP prober"))?;

    let report = if cli.url.is_some() {
        DiscoveryReport::default()
    } else {
        discovery.report().await
    };

    if let Some(path) = cli.output.as_deref() {
        match write_report_json(path, &report) {
            Ok(()) => println!("Wrote discovery report to {}", path.display()),
            Err(e) => eprintln!("Failed to write JSON to {}: {e:#}", path.display()),
        }
    }

    let plan = LaunchPlan {
        target: plan_target(cli.url.as_deref(), report.servers.clone()),
        device,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        if cli.url.is_none() {
            let mut servers = report.servers.clone();
            sort_servers(&mut servers);
            print_servers_table(&servers);
        }
        print_plan(&plan);
    }

    if cli.serve_ui {
        let state = server::AppState::new(discovery).with_report(report).await;
        let bind = cli.bind.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, state).await {
                eprintln!("HTTP server error: {e}");
            }
        });
        println!("Server list available at http://{}/api/servers", cli.bind);
        println!("Press Ctrl+C to stop the server...");
        let _ = tokio::signal::ctrl_c().await;
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dev_scan_rs=debug" } else { "dev_scan_rs=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_devices(catalog: &DeviceCatalog) {
    let all = catalog.all();
    let mut names: Vec<&str> = all.keys().copied().collect();
    names.sort_by_key(|n| (all[n].category(), n.to_lowercase()));

    println!("\nAvailable devices:");
    let mut current: Option<DeviceCategory> = None;
    for name in names {
        let d = all[name];
        if current != Some(d.category()) {
            current = Some(d.category());
            println!("\n{}:", d.category().label());
        }
        let ua = d.user_agent_preview(40);
        let custom = if catalog.is_custom(name) { " (custom)" } else { "" };
        println!("  {name}{custom}");
        println!("    {}x{} • {ua}...", d.viewport.width, d.viewport.height);
    }
    println!();
}

fn print_servers_table(servers: &[ServerRecord]) {
    let mut name_w = "project".len();
    let mut proc_w = "process".len();
    let mut addr_w = "addresses".len();
    let rows: Vec<(String, String)> = servers
        .iter()
        .map(|s| {
            let addrs = s.addresses.iter().cloned().collect::<Vec<_>>().join(",");
            let protos = s.protocols.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",");
            (addrs, protos)
        })
        .collect();
    for (s, (addrs, _)) in servers.iter().zip(&rows) {
        name_w = name_w.max(s.project_name.len());
        proc_w = proc_w.max(s.process_label.len());
        addr_w = addr_w.max(addrs.len());
    }

    println!("\nDev servers found: {}", servers.len());
    if servers.is_empty() {
        return;
    }
    println!(
        "{:<name_w$}  {:>5}  {:<proc_w$}  {:<addr_w$}  {:<9}  status",
        "project", "port", "process", "addresses", "protocols",
    );
    println!(
        "{:-<name_w$}  {:-<5}  {:-<proc_w$}  {:-<addr_w$}  {:-<9}  {:-<8}",
        "", "", "", "", "", "",
    );
    for (s, (addrs, protos)) in servers.iter().zip(&rows) {
        let status = if s.starting_up { "starting" } else { "ready" };
        println!(
            "{:<name_w$}  {:>5}  {:<proc_w$}  {:<addr_w$}  {:<9}  {status}",
            s.project_name, s.port, s.process_label, addrs, protos,
        );
    }
}

fn print_plan(plan: &LaunchPlan) {
    println!(
        "\nDevice: {} ({}x{} @{}x)",
        plan.device.name,
        plan.device.viewport.width,
        plan.device.viewport.height,
        plan.device.device_scale_factor
    );
    match &plan.target {
        LaunchTarget::Direct { url } => println!("Open: {url}"),
        LaunchTarget::Selection { servers } if servers.is_empty() => {
            println!("No dev servers found; enter a URL in the selection page or pass --url.")
        }
        LaunchTarget::Selection { servers } => {
            println!("Found {} dev servers; choose one in the selection page.", servers.len())
        }
    }
}

fn write_report_json(path: &std::path::Path, report: &DiscoveryReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
