use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::ProbeError;

/// Bounded pool for blocking probe work.
///
/// Jobs run on tokio's blocking threads, at most `size` at a time. The pool is
/// built once at startup and shared by every request.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.clamp(1, 64);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` off the async executor once a slot is free.
    ///
    /// Fails with `Cancelled` if the token fires before the job starts.
    pub async fn run<F, T>(&self, cancel: &CancellationToken, job: F) -> Result<T, ProbeError>
    where
        F: FnOnce() -> Result<T, ProbeError> + Send + 'static,
        T: Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            p = self.permits.clone().acquire_owned() => {
                p.map_err(|_| ProbeError::Worker("pool is shut down".into()))?
            }
        };

        if cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }

        tokio::task::spawn_blocking(move || {
            let _permit = permit; // held until the job returns
            job()
        })
        .await
        .map_err(|e| ProbeError::Worker(e.to_string()))?
    }

    /// Teardown hook: refuse new jobs. Running jobs finish normally.
    pub fn shutdown(&self) {
        self.permits.close();
    }
}
