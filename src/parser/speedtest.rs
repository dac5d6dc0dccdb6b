//! `speedtest-cli --json` summaries.

use serde::Deserialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SpeedtestSummary {
    #[serde(default)]
    pub download: Option<f64>,
    #[serde(default)]
    pub upload: Option<f64>,
    #[serde(default)]
    pub ping: Option<f64>,
    #[serde(default)]
    pub server: Option<Map<String, Value>>,
    #[serde(default)]
    pub client: Option<ClientInfo>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClientInfo {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
}

pub fn parse_summary(json: &str) -> Result<SpeedtestSummary, serde_json::Error> {
    serde_json::from_str(json.trim())
}

impl SpeedtestSummary {
    /// Server id as passed back to `--server`. Numeric ids are accepted too.
    pub fn server_id(&self) -> Option<String> {
        match self.server.as_ref()?.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn measured_at(&self) -> Option<OffsetDateTime> {
        let ts = self.timestamp.as_deref()?;
        OffsetDateTime::parse(ts, &Rfc3339).ok()
    }

    /// Throughput values outside the valid range are treated as missing.
    pub fn download_bps(&self) -> Option<f64> {
        self.download.filter(|v| v.is_finite() && *v >= 0.0)
    }

    pub fn upload_bps(&self) -> Option<f64> {
        self.upload.filter(|v| v.is_finite() && *v >= 0.0)
    }

    pub fn ping_ms(&self) -> Option<f64> {
        self.ping.filter(|v| v.is_finite() && *v >= 0.0)
    }
}

/// `host:port`, `[v6]:port`, bare host or bare IPv6 literal to just the host.
pub fn host_without_port(host: &str) -> Option<&str> {
    let host = host.trim();
    if host.is_empty() {
        return None;
    }
    // [v6]:port
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().filter(|h| !h.is_empty());
    }
    // Bare IPv6 literal has several colons and no port.
    if host.matches(':').count() > 1 {
        return Some(host);
    }
    match host.rsplit_once(':') {
        Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => Some(h),
        _ => Some(host),
    }
}
