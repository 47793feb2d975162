use crate::error::StoreError;

/// Runtime configuration for the work-scheduling facility behind
/// [`crate::executor::Scheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Async worker threads driving completion forwarding.
    pub worker_threads: usize,
    /// Upper bound on threads running backend calls concurrently.
    pub max_blocking_threads: usize,
    pub thread_name: String,
    /// How long an owned runtime waits for in-flight backend calls on drop.
    pub shutdown_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get().max(2))
                .unwrap_or(4),
            max_blocking_threads: 64,
            thread_name: "storebridge-worker".into(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ExecutorConfig {
    /// Small pool for tests and local tooling.
    pub fn development() -> Self {
        Self {
            worker_threads: 2,
            max_blocking_threads: 4,
            shutdown_timeout_ms: 1_000,
            ..Self::default()
        }
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_max_blocking_threads(mut self, max_blocking_threads: usize) -> Self {
        self.max_blocking_threads = max_blocking_threads;
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.worker_threads == 0 {
            return Err(StoreError::InvalidConfig {
                message: "worker_threads must be at least 1".into(),
            });
        }
        if self.max_blocking_threads == 0 {
            return Err(StoreError::InvalidConfig {
                message: "max_blocking_threads must be at least 1".into(),
            });
        }
        if self.thread_name.trim().is_empty() {
            return Err(StoreError::InvalidConfig {
                message: "thread_name must not be empty".into(),
            });
        }
        Ok(())
    }
}
