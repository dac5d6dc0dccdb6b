//! Composite ISP / network health report.
//!
//! Speed test and gateway lookup run side by side; once both are settled the
//! pings fan out, and the results are merged in a fixed order. Sub-probe
//! failures end up as unset fields and notes, never as an error.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::gateway::GatewayLookup;
use crate::probes::speedtest::server_host;
use crate::probes::Diagnostics;
use crate::types::{HealthReport, PingReport};

pub const NOTE_GATEWAY_UNSUPPORTED: &str = "gateway detection unsupported on this platform.";
pub const NOTE_GATEWAY_MISSING: &str = "default gateway not detected.";
pub const NOTE_GATEWAY_SKIPPED: &str = "gateway detection skipped by request.";

/// Build the health report. Infallible by construction.
pub async fn run_health(
    diag: &Arc<Diagnostics>,
    check_gateway: bool,
    cancel: &CancellationToken,
) -> HealthReport {
    let gateway_lookup = async {
        if !check_gateway {
            return None;
        }
        match diag.resolve_gateway(cancel).await {
            Ok(lookup) => Some(lookup),
            Err(e) => {
                debug!(error = %e, "gateway lookup did not run");
                Some(GatewayLookup::NotFound)
            }
        }
    };
    let (speed, gateway) = tokio::join!(diag.speed_test(cancel), gateway_lookup);

    let (speedtest, speedtest_error) = match speed {
        Ok(report) => (Some(report), None),
        Err(e) => {
            warn!(error = %e, "speed test failed, continuing without it");
            (None, Some(format!("speed test failed: {e}")))
        }
    };

    let targets = ping_targets(
        gateway.and_then(|g| g.address()),
        speedtest.as_ref().and_then(server_host),
        &diag.config().public_resolvers,
    );
    let pings = ping_all(diag, &targets, cancel).await;

    let report = HealthReport {
        isp: speedtest.as_ref().and_then(|s| s.isp.clone()),
        speedtest,
        speedtest_error,
        pings,
        notes: compose_notes(check_gateway, gateway),
    };
    info!(
        isp = ?report.isp,
        pings = report.pings.len(),
        notes = ?report.notes,
        "health report assembled"
    );
    report
}

/// Gateway first, then the speed-test server, then the public resolvers.
pub fn ping_targets(
    gateway: Option<IpAddr>,
    server_host: Option<String>,
    resolvers: &[String],
) -> Vec<String> {
    gateway
        .map(|g| g.to_string())
        .into_iter()
        .chain(server_host)
        .chain(resolvers.iter().cloned())
        .collect()
}

/// Ping every target concurrently and return reports in `targets` order.
///
/// A failed ping is kept as an error-annotated report; a cancelled one is dropped.
async fn ping_all(
    diag: &Arc<Diagnostics>,
    targets: &[String],
    cancel: &CancellationToken,
) -> Vec<PingReport> {
    let mut set = JoinSet::new();
    for (slot, target) in targets.iter().enumerate() {
        let diag = diag.clone();
        let target = target.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let res = diag.ping(&target, &cancel).await;
            (slot, target, res)
        });
    }

    let mut slots: Vec<Option<PingReport>> = vec![None; targets.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((slot, _, Ok(report))) => slots[slot] = Some(report),
            Ok((_, target, Err(ProbeError::Cancelled))) => {
                debug!(target = %target, "ping cancelled, omitted from report");
            }
            Ok((slot, target, Err(e))) => {
                warn!(target = %target, error = %e, "ping failed");
                slots[slot] = Some(PingReport::failed(target, &e));
            }
            Err(e) => warn!(error = %e, "ping task aborted"),
        }
    }
    slots.into_iter().flatten().collect()
}

/// Space-joined caveats about the gateway lookup, `None` when there are none.
pub fn compose_notes(check_gateway: bool, gateway: Option<GatewayLookup>) -> Option<String> {
    let mut notes: Vec<&str> = Vec::new();
    if !check_gateway {
        notes.push(NOTE_GATEWAY_SKIPPED);
    } else {
        match gateway {
            Some(GatewayLookup::Found(_)) => {}
            Some(GatewayLookup::Unsupported) => {
                notes.push(NOTE_GATEWAY_UNSUPPORTED);
                notes.push(NOTE_GATEWAY_MISSING);
            }
            Some(GatewayLookup::NotFound) | None => notes.push(NOTE_GATEWAY_MISSING),
        }
    }
    if notes.is_empty() {
        None
    } else {
        Some(notes.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_order_is_fixed() {
        let resolvers = vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()];
        let targets = ping_targets(
            Some("192.168.1.1".parse().unwrap()),
            Some("speed.example".into()),
            &resolvers,
        );
        assert_eq!(targets, vec!["192.168.1.1", "speed.example", "8.8.8.8", "1.1.1.1"]);

        let targets = ping_targets(None, None, &resolvers);
        assert_eq!(targets, vec!["8.8.8.8", "1.1.1.1"]);
    }

    #[test]
    fn notes_per_lookup_outcome() {
        let found = GatewayLookup::Found("10.0.0.1".parse().unwrap());
        assert_eq!(compose_notes(true, Some(found)), None);
        assert_eq!(
            compose_notes(true, Some(GatewayLookup::NotFound)).as_deref(),
            Some(NOTE_GATEWAY_MISSING)
        );
        let unsupported = compose_notes(true, Some(GatewayLookup::Unsupported)).unwrap();
        assert!(unsupported.starts_with(NOTE_GATEWAY_UNSUPPORTED));
        assert!(unsupported.ends_with(NOTE_GATEWAY_MISSING));
        assert_eq!(
            compose_notes(false, None).as_deref(),
            Some(NOTE_GATEWAY_SKIPPED)
        );
    }
}
