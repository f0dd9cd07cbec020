use std::io;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// A dedicated multi-threaded tokio runtime with a fixed number of worker
/// threads.
///
/// Work spawned here never runs on the caller's runtime, and a saturated pool
/// cannot take threads from any other pool.
pub struct WorkerPool {
    name: String,
    workers: usize,
    runtime: Option<Runtime>,
    handle: Handle,
}

impl WorkerPool {
    pub fn new(name: &str, workers: usize) -> io::Result<Self> {
        let workers = workers.max(1);

        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name(name)
            .enable_all()
            .build()?;

        debug!(pool = name, workers, "Worker pool started");

        Ok(Self {
            name: name.to_string(),
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            workers,
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Blocking shutdown would panic when the last owner is dropped from
        // inside an async context.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!(pool = %self.name, "Worker pool stopped");
        }
    }
}
