use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use net_health_rs::config::{self, DiagConfig};
use net_health_rs::probes::Diagnostics;
use net_health_rs::types::PortScanReport;
use net_health_rs::{health, logging, server};

/// net-health: network probes and a composite ISP health report.
#[derive(Debug, Parser)]
#[command(
    name = "net-health",
    version,
    about = "Network diagnostics: port scans, OS detection, speed tests, pings and an ISP health report.",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    probe: ProbeArgs,

    /// Write the report as pretty JSON to this path (optional).
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long = "log-json", global = true, default_value_t = false)]
    log_json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Scan ports on one target.
    Ports {
        target: String,
        /// Port specification, e.g. `22-1024` or `22,80,443`.
        #[arg(long, default_value = config::DEFAULT_PORT_SPEC)]
        ports: String,
    },
    /// Guess the operating system of one target.
    Os { target: String },
    /// Measure bandwidth against the best nearby server.
    Speedtest,
    /// Ping one host.
    Ping { host: String },
    /// Composite ISP / network health report.
    Health {
        /// Skip default gateway detection.
        #[arg(long = "no-gateway", default_value_t = false)]
        no_gateway: bool,
    },
}

#[derive(Debug, Clone, Args)]
struct ProbeArgs {
    /// Max blocking probe operations in flight.
    #[arg(long, global = true, default_value_t = config::DEFAULT_WORKERS)]
    workers: usize,

    /// Echo requests per ping.
    #[arg(long = "ping-count", global = true, default_value_t = config::DEFAULT_PING_COUNT)]
    ping_count: u32,

    /// Per-echo ping timeout in seconds.
    #[arg(long = "ping-timeout-s", global = true, default_value_t = config::DEFAULT_PING_TIMEOUT_S)]
    ping_timeout_s: u64,

    /// Scanner deadline in seconds.
    #[arg(long = "scan-timeout-s", global = true, default_value_t = config::DEFAULT_SCAN_TIMEOUT_S)]
    scan_timeout_s: u64,

    /// Deadline for each speed-test step in seconds.
    #[arg(long = "speedtest-timeout-s", global = true, default_value_t = config::DEFAULT_SPEEDTEST_STEP_TIMEOUT_S)]
    speedtest_timeout_s: u64,

    /// Public resolvers pinged by the health report (repeatable).
    #[arg(long = "resolver", global = true)]
    resolvers: Vec<String>,

    #[arg(long = "nmap", global = true, default_value = config::DEFAULT_NMAP_BIN)]
    nmap_bin: String,

    #[arg(long = "speedtest-cli", global = true, default_value = config::DEFAULT_SPEEDTEST_BIN)]
    speedtest_bin: String,

    #[arg(long = "ping-bin", global = true, default_value = config::DEFAULT_PING_BIN)]
    ping_bin: String,
}

impl ProbeArgs {
    fn into_config(self) -> DiagConfig {
        let defaults = DiagConfig::default();
        DiagConfig {
            workers: self.workers,
            ping_count: self.ping_count,
            ping_timeout_s: self.ping_timeout_s,
            scan_timeout: Duration::from_secs(self.scan_timeout_s),
            speedtest_step_timeout: Duration::from_secs(self.speedtest_timeout_s),
            public_resolvers: if self.resolvers.is_empty() {
                defaults.public_resolvers
            } else {
                self.resolvers
            },
            nmap_bin: self.nmap_bin,
            speedtest_bin: self.speedtest_bin,
            ping_bin: self.ping_bin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    let diag = Arc::new(Diagnostics::system(cli.probe.clone().into_config()));

    // Ctrl-C cancels a one-shot probe and kills its child process.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let output = cli.output.as_deref();
    match cli.command {
        Command::Serve { bind } => server::spawn_server(&bind, diag).await?,
        Command::Ports { target, ports } => {
            let report = diag.port_scan(&target, Some(&ports), &cancel).await?;
            print_port_table(&report);
            emit(output, &report, false)?;
        }
        Command::Os { target } => {
            let report = diag.os_detect(&target, &cancel).await?;
            emit(output, &report, true)?;
        }
        Command::Speedtest => {
            let report = diag.speed_test(&cancel).await?;
            emit(output, &report, true)?;
        }
        Command::Ping { host } => {
            let report = diag.ping(&host, &cancel).await?;
            emit(output, &report, true)?;
        }
        Command::Health { no_gateway } => {
            let report = health::run_health(&diag, !no_gateway, &cancel).await;
            emit(output, &report, true)?;
        }
    }

    Ok(())
}

fn print_port_table(report: &PortScanReport) {
    let port_w = 5usize.max("port".len());
    let proto_w = 5usize;
    let state_w = 8usize.max("state".len());
    let mut name_w = "service".len();
    for p in &report.ports {
        name_w = name_w.max(p.service_name.as_deref().map_or(0, str::len).min(24));
    }

    println!("\n{}: {} port(s) reported", report.target, report.ports.len());
    println!(
        "{:>port_w$}  {:<proto_w$}  {:<state_w$}  {:<name_w$}  {}",
        "port", "proto", "state", "service", "product/version",
    );
    println!(
        "{:->port_w$}  {:-<proto_w$}  {:-<state_w$}  {:-<name_w$}  {:-<15}",
        "", "", "", "", "",
    );
    for p in &report.ports {
        let state = serde_json::to_value(p.state)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        let product = [p.product.as_deref(), p.version.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:>port_w$}  {:<proto_w$}  {:<state_w$}  {:<name_w$}  {}",
            p.port,
            p.protocol,
            state,
            p.service_name.as_deref().unwrap_or(""),
            product,
        );
    }
}

/// Print `report` as JSON (when `to_stdout`) and write it to `path` if given.
fn emit<T: Serialize>(path: Option<&Path>, report: &T, to_stdout: bool) -> Result<()> {
    if to_stdout {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    if let Some(path) = path {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, report)?;
        eprintln!("Wrote JSON report to {}", path.display());
    }
    Ok(())
}
