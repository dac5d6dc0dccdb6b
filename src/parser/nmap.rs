//! Scanner XML listing (`nmap -oX -`) into typed records.
//!
//! Only the parts the probes use are modelled; everything else in the
//! document is ignored.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Deserialize;

use crate::types::{PortRecord, PortState};

#[derive(Debug, Deserialize, Default)]
pub struct ScanListing {
    #[serde(rename = "host", default)]
    pub hosts: Vec<Host>,
}

#[derive(Debug, Deserialize)]
pub struct Host {
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
    pub os: Option<Os>,
}

#[derive(Debug, Deserialize)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
}

#[derive(Debug, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub names: Vec<Hostname>,
}

#[derive(Debug, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<Port>,
}

#[derive(Debug, Deserialize)]
pub struct Port {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub portid: u16,
    pub state: Option<PortStateElem>,
    pub service: Option<Service>,
}

#[derive(Debug, Deserialize)]
pub struct PortStateElem {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct Service {
    #[serde(rename = "@name")]
    pub name: Option<String>,
    #[serde(rename = "@product")]
    pub product: Option<String>,
    #[serde(rename = "@version")]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Os {
    #[serde(rename = "osmatch", default)]
    pub matches: Vec<OsMatch>,
}

#[derive(Debug, Deserialize)]
pub struct OsMatch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@accuracy")]
    pub accuracy: String,
}

/// Parse a full XML document from the scanner.
pub fn parse_listing(xml: &str) -> Result<ScanListing, quick_xml::DeError> {
    quick_xml::de::from_str(xml)
}

impl Host {
    fn matches(&self, target: &str) -> bool {
        let target_ip = target.parse::<IpAddr>().ok();
        self.addresses
            .iter()
            .any(|a| match (target_ip, a.addr.parse::<IpAddr>()) {
                (Some(t), Ok(addr)) => t == addr,
                _ => a.addr.eq_ignore_ascii_case(target),
            })
            || self
                .hostnames
                .iter()
                .flat_map(|h| &h.names)
                .any(|h| h.name.eq_ignore_ascii_case(target))
    }

    /// Whether the scanner saw the host answer at all.
    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// Ports grouped by protocol (sorted), in reported order within a protocol.
    pub fn port_records(&self) -> Vec<PortRecord> {
        let mut by_proto: BTreeMap<&str, Vec<&Port>> = BTreeMap::new();
        for p in self.ports.iter().flat_map(|ps| &ps.ports) {
            if p.portid == 0 {
                continue;
            }
            by_proto.entry(p.protocol.as_str()).or_default().push(p);
        }

        by_proto
            .into_values()
            .flatten()
            .map(|p| {
                let svc = p.service.as_ref();
                PortRecord {
                    port: p.portid,
                    protocol: p.protocol.clone(),
                    state: p
                        .state
                        .as_ref()
                        .map(|s| PortState::from_scanner(&s.state))
                        .unwrap_or(PortState::Unknown),
                    service_name: non_empty(svc.and_then(|s| s.name.as_deref())),
                    product: non_empty(svc.and_then(|s| s.product.as_deref())),
                    version: non_empty(svc.and_then(|s| s.version.as_deref())),
                }
            })
            .collect()
    }

    /// Highest-accuracy OS match; the first one wins a tie.
    pub fn best_os_match(&self) -> Option<(String, Option<u8>)> {
        let matches = &self.os.as_ref()?.matches;
        let mut best: Option<(&OsMatch, Option<u8>)> = None;
        for m in matches {
            let acc = m.accuracy.trim().parse::<u8>().ok().filter(|a| *a <= 100);
            match best {
                Some((_, best_acc)) if acc.unwrap_or(0) <= best_acc.unwrap_or(0) => {}
                _ => best = Some((m, acc)),
            }
        }
        best.map(|(m, acc)| (m.name.clone(), acc))
    }
}

impl ScanListing {
    /// The host entry for `target`.
    ///
    /// A hostname target is reported under its resolved address, so a
    /// listing with exactly one host is accepted for non-IP targets.
    pub fn for_target(&self, target: &str) -> Option<&Host> {
        if let Some(h) = self.hosts.iter().find(|h| h.matches(target)) {
            return Some(h);
        }
        let is_ip = target.parse::<IpAddr>().is_ok();
        match self.hosts.as_slice() {
            [only] if !is_ip => Some(only),
            _ => None,
        }
    }

    /// Port records for `target`; empty when the host is not in the listing.
    pub fn port_records(&self, target: &str) -> Vec<PortRecord> {
        self.for_target(target)
            .map(Host::port_records)
            .unwrap_or_default()
    }

    pub fn best_os_match(&self, target: &str) -> Option<(String, Option<u8>)> {
        self.for_target(target)?.best_os_match()
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
