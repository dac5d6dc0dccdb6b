//! Probe executors.
//!
//! Every executor is an async method on [`Diagnostics`]. The blocking part
//! (process execution, routing-table reads) is handed to the worker pool so
//! the caller's task only awaits.

pub mod osdetect;
pub mod ping;
pub mod portscan;
pub mod speedtest;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::DiagConfig;
use crate::error::{ProbeError, Result};
use crate::gateway::{GatewayLookup, GatewayResolver, SystemGateway};
use crate::pool::WorkerPool;
use crate::ports;
use crate::runner::{CommandRunner, SystemRunner};

/// Process-wide probe context: configuration, facility handles and the
/// worker pool. Build once at startup and share it behind an `Arc`.
pub struct Diagnostics {
    config: DiagConfig,
    runner: Arc<dyn CommandRunner>,
    gateway: Arc<dyn GatewayResolver>,
    pool: WorkerPool,
}

impl Diagnostics {
    pub fn new(
        config: DiagConfig,
        runner: Arc<dyn CommandRunner>,
        gateway: Arc<dyn GatewayResolver>,
    ) -> Self {
        let pool = WorkerPool::new(config.workers);
        Self {
            config,
            runner,
            gateway,
            pool,
        }
    }

    /// Real processes and the host routing table.
    pub fn system(config: DiagConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let gateway = Arc::new(SystemGateway::new(runner.clone()));
        Self::new(config, runner, gateway)
    }

    pub fn config(&self) -> &DiagConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Look up the default gateway on the pool. Cancellation is the only error.
    pub async fn resolve_gateway(&self, cancel: &CancellationToken) -> Result<GatewayLookup> {
        let gateway = self.gateway.clone();
        let job_cancel = cancel.clone();
        self.pool
            .run(cancel, move || Ok(gateway.resolve(&job_cancel)))
            .await
    }

    /// Teardown hook: stop accepting probe work.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

fn checked_target(target: &str) -> Result<String> {
    ports::validate_target(target)
        .map(str::to_string)
        .map_err(|e| ProbeError::InvalidInput(e.to_string()))
}
