//! Defaults and runtime configuration for the diagnostics core.

use std::time::Duration;

/// Port range scanned when the caller gives none.
pub const DEFAULT_PORT_SPEC: &str = "22-1024";

/// Echo requests sent per ping probe.
pub const DEFAULT_PING_COUNT: u32 = 4;

/// Per-echo timeout in seconds. The whole ping run gets `timeout * (count + 1)`.
pub const DEFAULT_PING_TIMEOUT_S: u64 = 5;

/// Upper bound for a single scanner run.
pub const DEFAULT_SCAN_TIMEOUT_S: u64 = 300;

/// Upper bound for each speed-test step (server selection, download, upload).
pub const DEFAULT_SPEEDTEST_STEP_TIMEOUT_S: u64 = 120;

/// One speed test, one gateway lookup and up to four pings.
pub const DEFAULT_WORKERS: usize = 6;

/// Public resolvers always pinged by the health report, in this order.
pub const DEFAULT_PUBLIC_RESOLVERS: &[&str] = &["8.8.8.8", "1.1.1.1"];

pub const DEFAULT_NMAP_BIN: &str = "nmap";
pub const DEFAULT_SPEEDTEST_BIN: &str = "speedtest-cli";
pub const DEFAULT_PING_BIN: &str = "ping";

#[derive(Debug, Clone)]
pub struct DiagConfig {
    pub workers: usize,
    pub ping_count: u32,
    pub ping_timeout_s: u64,
    pub scan_timeout: Duration,
    pub speedtest_step_timeout: Duration,
    pub public_resolvers: Vec<String>,
    pub nmap_bin: String,
    pub speedtest_bin: String,
    pub ping_bin: String,
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            ping_count: DEFAULT_PING_COUNT,
            ping_timeout_s: DEFAULT_PING_TIMEOUT_S,
            scan_timeout: Duration::from_secs(DEFAULT_SCAN_TIMEOUT_S),
            speedtest_step_timeout: Duration::from_secs(DEFAULT_SPEEDTEST_STEP_TIMEOUT_S),
            public_resolvers: DEFAULT_PUBLIC_RESOLVERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            nmap_bin: DEFAULT_NMAP_BIN.to_string(),
            speedtest_bin: DEFAULT_SPEEDTEST_BIN.to_string(),
            ping_bin: DEFAULT_PING_BIN.to_string(),
        }
    }
}

impl DiagConfig {
    /// Overall deadline for one ping run, leaving room for the summary line
    /// printed after the last lost echo.
    pub fn ping_deadline(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_s * (u64::from(self.ping_count) + 1))
    }
}
