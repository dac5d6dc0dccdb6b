use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{checked_target, Diagnostics};
use crate::config::DEFAULT_PING_BIN;
use crate::error::Result;
use crate::parser::ping::{parse_ping_output, AddressFamily};
use crate::runner::CommandSpec;
use crate::types::PingReport;

pub(crate) const FACILITY: &str = "ping";

/// Command-line dialect of the host ping utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingDialect {
    Windows,
    Posix,
    /// macOS and the BSDs: IPv6 goes through a separate `ping6` binary.
    Bsd,
}

impl PingDialect {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(any(
            target_os = "macos",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd"
        )) {
            Self::Bsd
        } else {
            Self::Posix
        }
    }

    pub fn command(self, program: &str, host: &str, count: u32, timeout_s: u64) -> CommandSpec {
        let cmd = CommandSpec::new(program);
        match self {
            Self::Windows => cmd
                .args(["-n".to_string(), count.to_string()])
                .args(["-w".to_string(), (timeout_s * 1000).to_string()])
                .arg(host),
            Self::Posix => {
                let cmd = match AddressFamily::of_target(host) {
                    AddressFamily::V6 => cmd.arg("-6"),
                    AddressFamily::V4 => cmd,
                };
                cmd.args(["-c".to_string(), count.to_string()]).arg(host)
            }
            Self::Bsd => {
                let cmd = match AddressFamily::of_target(host) {
                    AddressFamily::V6 if program == DEFAULT_PING_BIN => CommandSpec::new("ping6"),
                    AddressFamily::V6 => cmd.arg("-6"),
                    AddressFamily::V4 => cmd,
                };
                cmd.args(["-c".to_string(), count.to_string()]).arg(host)
            }
        }
    }
}

impl Diagnostics {
    /// Ping `target` with the host utility.
    ///
    /// Hitting the deadline is a diagnostic result (every echo lost), not an error.
    pub async fn ping(&self, target: &str, cancel: &CancellationToken) -> Result<PingReport> {
        let target = checked_target(target)?;
        let count = self.config.ping_count;
        let deadline = self.config.ping_deadline();
        let cmd = PingDialect::current().command(
            &self.config.ping_bin,
            &target,
            count,
            self.config.ping_timeout_s,
        );
        let runner = self.runner.clone();
        let job_cancel = cancel.clone();

        self.pool
            .run(cancel, move || {
                let out = runner
                    .run(&cmd, deadline, &job_cancel)
                    .map_err(|e| e.into_probe_error(FACILITY))?;

                if out.timed_out {
                    debug!(target = %target, "ping timed out");
                    let raw = format!(
                        "timeout: no summary within {}s\n{}",
                        deadline.as_secs(),
                        out.combined()
                    );
                    return Ok(PingReport::total_loss(target, count, raw));
                }

                let report = parse_ping_output(&target, &out.combined());
                debug!(
                    target = %report.target,
                    loss = ?report.packet_loss_pct,
                    avg_rtt_ms = ?report.avg_rtt_ms,
                    "ping finished"
                );
                Ok(report)
            })
            .await
    }
}
