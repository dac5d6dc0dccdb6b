//! Best-effort default gateway lookup.
//!
//! Absence is a normal outcome, never an error.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runner::{CommandRunner, CommandSpec};

const ROUTE_CMD_TIMEOUT: Duration = Duration::from_secs(5);
const RTF_GATEWAY: u32 = 0x2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayLookup {
    Found(IpAddr),
    /// Lookup ran but no default route exists.
    NotFound,
    /// No way to read the routing table here.
    Unsupported,
}

impl GatewayLookup {
    pub fn address(&self) -> Option<IpAddr> {
        match self {
            Self::Found(ip) => Some(*ip),
            _ => None,
        }
    }
}
/// Blocking; run it on the worker pool. A cancelled route command counts as `Unsupported`.
/// Blocking; run it on the worker pool. A cancelled lookup reports `Unsupported`.
pub trait GatewayResolver: Send + Sync {
    fn resolve(&self, cancel: &CancellationToken) -> GatewayLookup;
}

/// Reads the host routing table.
pub struct SystemGateway {
    #[cfg_attr(target_os = "linux", allow(dead_code))]
    runner: Arc<dyn CommandRunner>,
}

impl SystemGateway {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    #[cfg_attr(target_os = "linux", allow(dead_code))]
    fn route_output(&self, cmd: CommandSpec, cancel: &CancellationToken) -> Option<String> {
        self.runner
            .run(&cmd, ROUTE_CMD_TIMEOUT, cancel)
            .ok()
            .map(|out| out.stdout)
    }
}

impl GatewayResolver for SystemGateway {
    fn resolve(&self, cancel: &CancellationToken) -> GatewayLookup {
        let lookup = self.resolve_platform(cancel);
        if let GatewayLookup::Found(gw) = lookup {
            debug!(gateway = %gw, interface = ?interface_for(gw), "default gateway");
        }
        lookup
    }
}

impl SystemGateway {
    #[cfg(target_os = "linux")]
    fn resolve_platform(&self, _cancel: &CancellationToken) -> GatewayLookup {
        match std::fs::read_to_string("/proc/net/route") {
            Ok(table) => found_or_not(parse_proc_net_route(&table).map(IpAddr::V4)),
            Err(e) => {
                debug!(error = %e, "routing table unreadable");
                GatewayLookup::Unsupported
            }
        }
    }

    #[cfg(target_os = "macos")]
    fn resolve_platform(&self, cancel: &CancellationToken) -> GatewayLookup {
        match self.route_output(CommandSpec::new("route").args(["-n", "get", "default"]), cancel) {
            Some(out) => found_or_not(parse_bsd_route_get(&out)),
            None => GatewayLookup::Unsupported,
        }
    }

    #[cfg(windows)]
    fn resolve_platform(&self, cancel: &CancellationToken) -> GatewayLookup {
        match self.route_output(CommandSpec::new("route").args(["print", "0.0.0.0"]), cancel) {
            Some(out) => found_or_not(parse_windows_route_print(&out)),
            None => GatewayLookup::Unsupported,
        }
    }

    #[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
    fn resolve_platform(&self, _cancel: &CancellationToken) -> GatewayLookup {
        GatewayLookup::Unsupported
    }
}

#[cfg_attr(not(any(windows, target_os = "linux", target_os = "macos")), allow(dead_code))]
fn found_or_not(ip: Option<IpAddr>) -> GatewayLookup {
    ip.map(GatewayLookup::Found).unwrap_or(GatewayLookup::NotFound)
}

/// Default gateway from the Linux `/proc/net/route` table, lowest metric first.
///
/// Addresses in the table are little-endian hex: `0101A8C0` is `192.168.1.1`.
pub fn parse_proc_net_route(table: &str) -> Option<Ipv4Addr> {
    let mut best: Option<(u32, Ipv4Addr)> = None;
    for line in table.lines().skip(1) {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 8 {
            continue;
        }
        let (Ok(dest), Ok(gw), Ok(flags), Ok(metric)) = (
            u32::from_str_radix(cols[1], 16),
            u32::from_str_radix(cols[2], 16),
            u32::from_str_radix(cols[3], 16),
            cols[6].parse::<u32>(),
        ) else {
            continue;
        };
        if dest != 0 || gw == 0 || flags & RTF_GATEWAY == 0 {
            continue;
        }
        let addr = Ipv4Addr::from(gw.to_le_bytes());
        if best.map_or(true, |(m, _)| metric < m) {
            best = Some((metric, addr));
        }
    }
    best.map(|(_, a)| a)
}

/// `route -n get default` (macOS / BSD): the `gateway:` line.
pub fn parse_bsd_route_get(out: &str) -> Option<IpAddr> {
    out.lines()
        .filter_map(|l| l.trim().strip_prefix("gateway:"))
        .find_map(|rest| rest.trim().parse().ok())
}

/// `route print 0.0.0.0` (Windows): first `0.0.0.0 0.0.0.0 <gateway>` row.
pub fn parse_windows_route_print(out: &str) -> Option<IpAddr> {
    out.lines().find_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["0.0.0.0", "0.0.0.0", gw, _, ..] if *gw != "0.0.0.0" => gw.parse().ok(),
            _ => None,
        }
    })
}

/// Local non-loopback IPv4 networks, paired with their interface name.
pub fn local_networks() -> Vec<(String, Ipv4Net)> {
    let Ok(ifaces) = get_if_addrs() else {
        return Vec::new();
    };
    let mut nets = Vec::new();
    for iface in ifaces {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            if let Ok(net) = Ipv4Net::with_netmask(v4.ip, v4.netmask) {
                nets.push((iface.name, net.trunc()));
            }
        }
    }
    // Sort for stable output
    nets.sort_by_key(|(name, n)| (u32::from(n.network()), n.prefix_len(), name.clone()));
    nets
}

/// Name of the local interface whose network contains `gateway`.
pub fn interface_for(gateway: IpAddr) -> Option<String> {
    network_containing(&local_networks(), gateway)
}

pub fn network_containing(nets: &[(String, Ipv4Net)], ip: IpAddr) -> Option<String> {
    let IpAddr::V4(v4) = ip else {
        return None;
    };
    nets.iter()
        .filter(|(_, n)| n.contains(&v4))
        .max_by_key(|(_, n)| n.prefix_len())
        .map(|(name, _)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{RunError, RunOutput};

    /// Answers like `route -n get default` unless the caller's token is cancelled.
    struct RouteTable;

    impl CommandRunner for RouteTable {
        fn run(
            &self,
            _cmd: &CommandSpec,
            _timeout: Duration,
            cancel: &CancellationToken,
        ) -> Result<RunOutput, RunError> {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            Ok(RunOutput {
                stdout: "    gateway: 10.0.0.1\n".into(),
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    #[test]
    fn route_command_sees_caller_cancellation() {
        let gw = SystemGateway::new(Arc::new(RouteTable));
        let cmd = CommandSpec::new("route").args(["-n", "get", "default"]);

        let out = gw.route_output(cmd.clone(), &CancellationToken::new());
        assert_eq!(out.as_deref().and_then(parse_bsd_route_get), Some("10.0.0.1".parse().unwrap()));

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(gw.route_output(cmd, &cancel), None);
    }

    const ROUTE_TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
wlan0\t00000000\t0102A8C0\t0003\t0\t0\t600\t00000000\t0\t0\t0
eth0\t00000000\t0101A8C0\t0003\t0\t0\t100\t00000000\t0\t0\t0
eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
";

    #[test]
    fn lowest_metric_default_route_wins() {
        assert_eq!(
            parse_proc_net_route(ROUTE_TABLE),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
    }

    #[test]
    fn no_default_route() {
        let table = "Iface\tDestination\tGateway\tFlags\tRefCnt\tUse\tMetric\tMask\n\
                     eth0\t0001A8C0\t00000000\t0001\t0\t0\t100\t00FFFFFF\n";
        assert_eq!(parse_proc_net_route(table), None);
    }

    #[test]
    fn bsd_route_get() {
        let out = "   route to: default\ndestination: default\n       mask: default\n    gateway: 10.0.0.1\n  interface: en0\n";
        assert_eq!(parse_bsd_route_get(out), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(parse_bsd_route_get("gateway: link#5\n"), None);
    }

    #[test]
    fn windows_route_print() {
        let out = "Active Routes:\nNetwork Destination        Netmask          Gateway       Interface  Metric\n          0.0.0.0          0.0.0.0      192.168.0.1    192.168.0.23     25\n";
        assert_eq!(
            parse_windows_route_print(out),
            Some("192.168.0.1".parse().unwrap())
        );
    }

    #[test]
    fn most_specific_network_names_interface() {
        let nets = vec![
            ("wide".to_string(), "10.0.0.0/8".parse().unwrap()),
            ("eth0".to_string(), "10.1.2.0/24".parse().unwrap()),
        ];
        assert_eq!(
            network_containing(&nets, "10.1.2.1".parse().unwrap()),
            Some("eth0".to_string())
        );
        assert_eq!(network_containing(&nets, "192.0.2.1".parse().unwrap()), None);
    }
}
