use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{checked_target, Diagnostics};
use crate::config::DEFAULT_PORT_SPEC;
use crate::error::Result;
use crate::types::OsDetectReport;

/// OS fingerprinting on top of a SYN scan.
const OS_SCAN: &[&str] = &["-O", "-sS"];

impl Diagnostics {
    /// Best OS guess for `target`. No match leaves both fields unset.
    pub async fn os_detect(&self, target: &str, cancel: &CancellationToken) -> Result<OsDetectReport> {
        let target = checked_target(target)?;
        let listing = self
            .scan_listing(&target, DEFAULT_PORT_SPEC, OS_SCAN, cancel)
            .await?;

        let (os_name, accuracy) = match listing.best_os_match(&target) {
            Some((name, acc)) => (Some(name), acc),
            None => (None, None),
        };
        info!(target = %target, os = ?os_name, accuracy = ?accuracy, "os detection finished");

        Ok(OsDetectReport {
            target,
            os_name,
            accuracy,
        })
    }
}
