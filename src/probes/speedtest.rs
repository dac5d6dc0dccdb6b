use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Diagnostics;
use crate::error::{ProbeError, Result};
use crate::parser::speedtest::{host_without_port, parse_summary, SpeedtestSummary};
use crate::runner::{CommandRunner, CommandSpec};
use crate::types::SpeedTestReport;

pub(crate) const FACILITY: &str = "speedtest";

impl Diagnostics {
    /// Select the best server, measure download, then try upload.
    ///
    /// An upload failure leaves `upload_bps` unset; it does not fail the probe.
    pub async fn speed_test(&self, cancel: &CancellationToken) -> Result<SpeedTestReport> {
        let meter = Meter {
            runner: self.runner.clone(),
            program: self.config.speedtest_bin.clone(),
            timeout: self.config.speedtest_step_timeout,
            cancel: cancel.clone(),
        };
        let report = self.pool.run(cancel, move || meter.measure()).await?;
        info!(
            isp = ?report.isp,
            download_bps = ?report.download_bps,
            upload_bps = ?report.upload_bps,
            "speed test finished"
        );
        Ok(report)
    }
}

/// Pingable host of the server a speed test used.
pub fn server_host(report: &SpeedTestReport) -> Option<String> {
    let host = report.server.as_ref()?.get("host")?.as_str()?;
    host_without_port(host).map(String::from)
}

struct Meter {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Meter {
    fn measure(&self) -> Result<SpeedTestReport> {
        let selected = self.step(&["--no-download", "--no-upload"], None)?;
        let server_id = selected.server_id();

        let download = self.step(&["--no-upload"], server_id.as_deref())?;

        let upload_bps = match self.step(&["--no-download"], server_id.as_deref()) {
            Ok(up) => up.upload_bps(),
            Err(ProbeError::Cancelled) => return Err(ProbeError::Cancelled),
            Err(e) => {
                warn!(error = %e, "upload measurement failed, leaving it unset");
                None
            }
        };

        let client = download.client.as_ref().or(selected.client.as_ref());
        Ok(SpeedTestReport {
            isp: client.and_then(|c| c.isp.clone()),
            client_ip: client.and_then(|c| c.ip.clone()),
            server: download.server.clone().or_else(|| selected.server.clone()),
            ping_ms: download.ping_ms().or_else(|| selected.ping_ms()),
            download_bps: download.download_bps(),
            upload_bps,
            measured_at: download.measured_at().or_else(|| selected.measured_at()),
        })
    }

    fn step(&self, flags: &[&str], server_id: Option<&str>) -> Result<SpeedtestSummary> {
        let mut cmd = CommandSpec::new(&self.program)
            .arg("--json")
            .args(flags.iter().copied());
        if let Some(id) = server_id {
            cmd = cmd.args(["--server", id]);
        }

        let out = self
            .runner
            .run(&cmd, self.timeout, &self.cancel)
            .map_err(|e| e.into_probe_error(FACILITY))?;

        if out.timed_out {
            return Err(ProbeError::DeadlineExceeded {
                facility: FACILITY,
                timeout: self.timeout,
            });
        }
        if out.exit_code != Some(0) {
            let combined = out.combined();
            let reason = combined
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("measurement failed");
            return Err(ProbeError::unavailable(FACILITY, reason));
        }

        parse_summary(&out.stdout)
            .map_err(|e| ProbeError::unavailable(FACILITY, format!("unreadable summary: {e}")))
    }
}
