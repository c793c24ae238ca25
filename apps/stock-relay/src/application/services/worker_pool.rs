//! Worker Pool
//!
//! A fixed set of tokio tasks running the same loop. The pool tracks how
//! many are still alive; a worker that returns or panics is counted out
//! and is not restarted.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::JoinHandle;

use crate::infrastructure::metrics;

/// Running workers of one pool.
#[derive(Debug)]
pub struct WorkerPool {
    name: &'static str,
    size: usize,
    active: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn one task per future.
    pub fn spawn<I, F>(name: &'static str, workers: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = ()> + Send + 'static,
    {
        let active = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = workers
            .into_iter()
            .map(|worker| {
                active.fetch_add(1, Ordering::SeqCst);
                let guard = ActiveGuard {
                    pool: name,
                    active: Arc::clone(&active),
                };
                tokio::spawn(async move {
                    let _guard = guard;
                    worker.await;
                })
            })
            .collect();

        let size = handles.len();
        metrics::set_active_workers(name, size);
        tracing::info!(pool = name, workers = size, "Worker pool started");

        Self {
            name,
            size,
            active,
            handles,
        }
    }

    /// Pool label used in logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Number of workers spawned.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of workers still running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Shared live-worker counter, for status reporting.
    #[must_use]
    pub fn active_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active)
    }

    /// Wait for every worker to finish.
    ///
    /// Cancel-safe: if this future is dropped, workers not yet joined stay
    /// tracked and a later call resumes waiting on them.
    pub async fn join(&mut self) {
        while let Some(handle) = self.handles.last_mut() {
            if let Err(e) = handle.await {
                tracing::error!(pool = self.name, error = %e, "Worker terminated abnormally");
            }
            self.handles.pop();
        }
        tracing::info!(pool = self.name, "Worker pool stopped");
    }
}

struct ActiveGuard {
    pool: &'static str,
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_active_workers(self.pool, remaining);
    }
}
