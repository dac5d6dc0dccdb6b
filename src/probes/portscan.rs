use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{checked_target, Diagnostics};
use crate::config::DEFAULT_PORT_SPEC;
use crate::error::{ProbeError, Result};
use crate::parser::nmap::{parse_listing, Host, ScanListing};
use crate::parser::ping::AddressFamily;
use crate::ports;
use crate::runner::CommandSpec;
use crate::types::PortScanReport;

pub(crate) const FACILITY: &str = "nmap";

/// SYN scan technique.
const SYN_SCAN: &str = "-sS";

impl Diagnostics {
    /// Scan `target` on `port_spec` (default `22-1024`).
    ///
    /// An unreachable host or one with no open ports gives an empty list.
    pub async fn port_scan(
        &self,
        target: &str,
        port_spec: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PortScanReport> {
        let target = checked_target(target)?;
        let spec = ports::normalize_port_spec(port_spec.unwrap_or(DEFAULT_PORT_SPEC))
            .map_err(|e| ProbeError::InvalidInput(format!("{e:#}")))?;

        let listing = self.scan_listing(&target, &spec, &[SYN_SCAN], cancel).await?;
        let ports = listing.port_records(&target);
        let host_up = listing.for_target(&target).is_some_and(Host::is_up);
        info!(target = %target, ports = %spec, host_up, found = ports.len(), "port scan finished");

        Ok(PortScanReport { target, ports })
    }

    /// Run the scanner on the pool and turn its XML into a listing.
    pub(crate) async fn scan_listing(
        &self,
        target: &str,
        port_spec: &str,
        technique: &[&str],
        cancel: &CancellationToken,
    ) -> Result<ScanListing> {
        let mut cmd = CommandSpec::new(&self.config.nmap_bin).args(["-oX", "-"]);
        if AddressFamily::of_target(target) == AddressFamily::V6 {
            cmd = cmd.arg("-6");
        }
        let cmd = cmd
            .args(technique.iter().copied())
            .args(["-p", port_spec])
            .arg(target);
        let timeout = self.config.scan_timeout;
        let runner = self.runner.clone();
        let job_cancel = cancel.clone();

        self.pool
            .run(cancel, move || {
                let out = runner
                    .run(&cmd, timeout, &job_cancel)
                    .map_err(|e| e.into_probe_error(FACILITY))?;

                if out.timed_out {
                    return Err(ProbeError::DeadlineExceeded {
                        facility: FACILITY,
                        timeout,
                    });
                }

                let combined = out.combined();
                if let Some(line) = combined.lines().find(|l| l.contains("requires root privileges")) {
                    return Err(ProbeError::unavailable(FACILITY, line.trim()));
                }

                let success = out.exit_code == Some(0);
                match parse_listing(&out.stdout) {
                    Ok(listing) if success || !listing.hosts.is_empty() => Ok(listing),
                    Err(e) if success => {
                        warn!(command = %cmd, error = %e, "scanner output unparseable, treating as empty");
                        Ok(ScanListing::default())
                    }
                    _ => Err(ProbeError::unavailable(
                        FACILITY,
                        failure_reason(&out.stderr, out.exit_code),
                    )),
                }
            })
            .await
    }
}

fn failure_reason(stderr: &str, exit_code: Option<i32>) -> String {
    match stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => line.to_string(),
        None => match exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        },
    }
}
