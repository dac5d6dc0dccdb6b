//! Ping output parsing.
//!
//! Each address family has its own ordered list of named patterns. Within a
//! list the first matching pattern wins. The patterns below are the contract
//! with the host ping utilities:
//!
//! Summary (transmitted / received / loss):
//! - `posix`: `4 packets transmitted, 3 received, 25% packet loss`
//!   (also `3 packets received`, `25.0% packet loss`)
//! - `windows`: `Sent = 4, Received = 4, Lost = 0 (0% loss)`
//! - `loss-only`: `100% packet loss`
//!
//! Round trip (average):
//! - `posix-rtt`: `rtt min/avg/max/mdev = 1.1/2.2/3.3/0.4 ms` and the BSD
//!   `round-trip min/avg/max/stddev = …` / busybox `round-trip min/avg/max = …`
//! - `windows-average`: `Average = 12ms`
//!
//! Nothing here fails: unmatched fields are left unset and the raw text is
//! kept verbatim in the report.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::types::PingReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// IPv6 literals use the IPv6 pattern set; addresses and hostnames otherwise use IPv4.
    pub fn of_target(target: &str) -> Self {
        match target.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => Self::V6,
            _ => Self::V4,
        }
    }
}

/// Numbers pulled out of one ping run, plus which patterns produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingStats {
    pub transmitted: Option<u32>,
    pub received: Option<u32>,
    pub packet_loss_pct: Option<f64>,
    pub avg_rtt_ms: Option<f64>,
    pub summary_pattern: Option<&'static str>,
    pub rtt_pattern: Option<&'static str>,
}

#[derive(Clone, Copy)]
enum SummaryKind {
    Full,
    LossOnly,
}

struct SummaryPattern {
    name: &'static str,
    kind: SummaryKind,
    re: Regex,
    /// Capture group indexes for (transmitted, received, loss).
    groups: (usize, usize, usize),
}

struct RttPattern {
    name: &'static str,
    re: Regex,
    avg_group: usize,
}

fn summary(name: &'static str, kind: SummaryKind, pattern: &str, groups: (usize, usize, usize)) -> SummaryPattern {
    SummaryPattern {
        name,
        kind,
        re: Regex::new(pattern).expect("static ping pattern"),
        groups,
    }
}

fn rtt(name: &'static str, pattern: &str, avg_group: usize) -> RttPattern {
    RttPattern {
        name,
        re: Regex::new(pattern).expect("static ping pattern"),
        avg_group,
    }
}

static V4_SUMMARY: LazyLock<Vec<SummaryPattern>> = LazyLock::new(|| {
    vec![
        summary(
            "posix",
            SummaryKind::Full,
            r"(\d+) packets transmitted, (\d+) (?:packets )?received,[^\n]*?(\d+(?:\.\d+)?)% packet loss",
            (1, 2, 3),
        ),
        summary(
            "windows",
            SummaryKind::Full,
            r"Sent\s*=\s*(\d+),\s*Received\s*=\s*(\d+),\s*Lost\s*=\s*\d+,?\s*\((\d+)%\s*loss\)",
            (1, 2, 3),
        ),
        summary("loss-only", SummaryKind::LossOnly, r"(\d+(?:\.\d+)?)%\s*packet loss", (0, 0, 1)),
    ]
});

static V4_RTT: LazyLock<Vec<RttPattern>> = LazyLock::new(|| {
    vec![
        rtt(
            "posix-rtt",
            r"(?:rtt|round-trip) min/avg/max(?:/(?:mdev|stddev|std-dev))? = ([0-9.]+)/([0-9.]+)/([0-9.]+)",
            2,
        ),
        rtt("windows-average", r"Average\s*=\s*(\d+(?:\.\d+)?)\s*ms", 1),
    ]
});

// ping -6 / ping6 output. Kept apart from the IPv4 list so each dialect is
// tested on its own; BSD ping6 is tried first since it differs most.
static V6_SUMMARY: LazyLock<Vec<SummaryPattern>> = LazyLock::new(|| {
    vec![
        summary(
            "bsd-ping6",
            SummaryKind::Full,
            r"(\d+) packets transmitted, (\d+) packets received,[^\n]*?(\d+(?:\.\d+)?)% packet loss",
            (1, 2, 3),
        ),
        summary(
            "posix-ping6",
            SummaryKind::Full,
            r"(\d+) packets transmitted, (\d+) received,[^\n]*?(\d+(?:\.\d+)?)% packet loss",
            (1, 2, 3),
        ),
        summary(
            "windows-ping6",
            SummaryKind::Full,
            r"Sent\s*=\s*(\d+),\s*Received\s*=\s*(\d+),\s*Lost\s*=\s*\d+,?\s*\((\d+)%\s*loss\)",
            (1, 2, 3),
        ),
        summary("loss-only", SummaryKind::LossOnly, r"(\d+(?:\.\d+)?)%\s*packet loss", (0, 0, 1)),
    ]
});

static V6_RTT: LazyLock<Vec<RttPattern>> = LazyLock::new(|| {
    vec![
        rtt(
            "bsd-ping6-rtt",
            r"round-trip min/avg/max/std-dev = ([0-9.]+)/([0-9.]+)/([0-9.]+)",
            2,
        ),
        rtt(
            "posix-ping6-rtt",
            r"rtt min/avg/max/mdev = ([0-9.]+)/([0-9.]+)/([0-9.]+)",
            2,
        ),
        rtt(
            "busybox-ping6-rtt",
            r"round-trip min/avg/max = ([0-9.]+)/([0-9.]+)/([0-9.]+)",
            2,
        ),
        rtt("windows-average", r"Average\s*=\s*(\d+(?:\.\d+)?)\s*ms", 1),
    ]
});

/// Parse raw ping output for `target` into a report. Never fails.
pub fn parse_ping_output(target: &str, raw: &str) -> PingReport {
    let stats = parse_stats(AddressFamily::of_target(target), raw);
    PingReport::new(
        target,
        stats.transmitted,
        stats.received,
        stats.packet_loss_pct,
        stats.avg_rtt_ms,
        raw,
    )
}

/// Run the pattern list for `family` over `raw`.
pub fn parse_stats(family: AddressFamily, raw: &str) -> PingStats {
    let (summaries, rtts) = match family {
        AddressFamily::V4 => (&*V4_SUMMARY, &*V4_RTT),
        AddressFamily::V6 => (&*V6_SUMMARY, &*V6_RTT),
    };

    let mut stats = PingStats::default();

    for p in summaries {
        let Some(caps) = p.re.captures(raw) else {
            continue;
        };
        let (t, r, l) = p.groups;
        if let SummaryKind::Full = p.kind {
            stats.transmitted = number(&caps, t);
            stats.received = number(&caps, r);
        }
        stats.packet_loss_pct = number(&caps, l);
        stats.summary_pattern = Some(p.name);
        break;
    }

    for p in rtts {
        let Some(caps) = p.re.captures(raw) else {
            continue;
        };
        stats.avg_rtt_ms = number(&caps, p.avg_group);
        stats.rtt_pattern = Some(p.name);
        break;
    }

    stats
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, group: usize) -> Option<T> {
    caps.get(group)?.as_str().parse().ok()
}
