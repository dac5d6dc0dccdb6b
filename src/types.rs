use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// State of a scanned port, collapsed from the scanner's vocabulary.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    Unknown,
}

impl PortState {
    pub fn from_scanner(state: &str) -> Self {
        match state.trim() {
            "open" => Self::Open,
            "closed" => Self::Closed,
            "filtered" | "open|filtered" | "closed|filtered" => Self::Filtered,
            _ => Self::Unknown,
        }
    }
}

/// One scanned port on one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortRecord {
    pub port: u16,
    pub protocol: String,
    pub state: PortState,
    #[serde(rename = "name")]
    pub service_name: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortScanReport {
    #[serde(rename = "ip")]
    pub target: String,
    pub ports: Vec<PortRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OsDetectReport {
    #[serde(rename = "ip")]
    pub target: String,
    #[serde(rename = "os")]
    pub os_name: Option<String>,
    /// Match confidence in percent.
    pub accuracy: Option<u8>,
}

/// Bandwidth measurement summary. Any field may be missing on a partial run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SpeedTestReport {
    pub isp: Option<String>,
    pub client_ip: Option<String>,
    /// Server metadata exactly as the measurement facility reported it.
    pub server: Option<serde_json::Map<String, serde_json::Value>>,
    pub ping_ms: Option<f64>,
    pub download_bps: Option<f64>,
    pub upload_bps: Option<f64>,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339::option", default)]
    pub measured_at: Option<OffsetDateTime>,
}

/// Outcome of one ping run. `raw_text` is kept even when nothing parsed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PingReport {
    pub target: String,
    pub transmitted: Option<u32>,
    pub received: Option<u32>,
    pub packet_loss_pct: Option<f64>,
    pub avg_rtt_ms: Option<f64>,
    pub raw_text: String,
}

impl PingReport {
    /// Build a report, dropping any field that breaks the report invariants.
    pub fn new(
        target: impl Into<String>,
        transmitted: Option<u32>,
        received: Option<u32>,
        packet_loss_pct: Option<f64>,
        avg_rtt_ms: Option<f64>,
        raw_text: impl Into<String>,
    ) -> Self {
        let received = match (transmitted, received) {
            (Some(t), Some(r)) if r > t => None,
            (_, r) => r,
        };
        Self {
            target: target.into(),
            transmitted,
            received,
            packet_loss_pct: packet_loss_pct.filter(|p| (0.0..=100.0).contains(p)),
            avg_rtt_ms: avg_rtt_ms.filter(|v| v.is_finite() && *v >= 0.0),
            raw_text: raw_text.into(),
        }
    }

    /// Every echo counted as lost.
    pub fn total_loss(target: impl Into<String>, count: u32, raw_text: impl Into<String>) -> Self {
        Self::new(target, Some(count), Some(0), Some(100.0), None, raw_text)
    }

    /// The probe could not run at all; only the error text survives.
    pub fn failed(target: impl Into<String>, error: &dyn std::fmt::Display) -> Self {
        Self::new(target, None, None, None, None, format!("error: {error}"))
    }
}

/// Composite ISP / network health report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HealthReport {
    pub isp: Option<String>,
    pub speedtest: Option<SpeedTestReport>,
    /// Why `speedtest` is missing, when it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speedtest_error: Option<String>,
    pub pings: Vec<PingReport>,
    pub notes: Option<String>,
}
