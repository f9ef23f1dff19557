use diffusive_common::protocol::error::{DiffusiveError, Result};
use diffusive_common::protocol::InvocationResult;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::handle::{self, Completer, InvocationHandle};

tokio::task_local! {
    static WORKER_PERMIT: RefCell<Option<OwnedSemaphorePermit>>;
}

/// Takes the permit of the worker running the current task.
///
/// Work that outlives its task (a blocking call abandoned on timeout) keeps
/// the permit until it really ends, so the pool never runs more than
/// `threads` computations. `None` outside a pool task.
pub(crate) fn detach_worker_permit() -> Option<OwnedSemaphorePermit> {
    WORKER_PERMIT
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
}

/// Bounded pool running accepted invocations.
///
/// Every invocation (local execution or remote dispatch) becomes a task on
/// the tokio runtime captured at construction; at most `threads` of them run
/// at once, the rest wait for a permit. Spawning never blocks the caller.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    threads: usize,
    runtime: Handle,
}

impl WorkerPool {
    /// Creates a pool of `threads` concurrent workers.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// `Config` if `threads` is zero or no runtime is available.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(DiffusiveError::Config("Worker pool needs at least one thread".to_string()));
        }
        let runtime = Handle::try_current()
            .map_err(|e| DiffusiveError::Config(format!("No tokio runtime for the worker pool: {}", e)))?;

        Ok(Self {
            permits: Arc::new(Semaphore::new(threads)),
            threads,
            runtime,
        })
    }

    /// Pool sized to the machine's available parallelism.
    pub fn with_available_parallelism() -> Result<Self> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(threads)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Workers not currently running a task.
    pub fn idle(&self) -> usize {
        self.permits.available_permits()
    }

    /// Enqueues `task` and returns a handle to its result.
    pub fn spawn<F>(&self, request_id: &str, task: F) -> InvocationHandle
    where
        F: Future<Output = InvocationResult> + Send + 'static,
    {
        let (completer, handle) = handle::pending(request_id);
        self.spawn_completing(completer, task);
        handle
    }

    /// Enqueues `task`, delivering its result through `completer`.
    ///
    /// For callers that hand out the handle before the task is spawned.
    pub fn spawn_completing<F>(&self, completer: Completer, task: F)
    where
        F: Future<Output = InvocationResult> + Send + 'static,
    {
        let permits = self.permits.clone();

        self.runtime.spawn(async move {
            // the semaphore is never closed
            let permit = permits.acquire_owned().await.ok();
            debug!("Worker started {}", completer.request_id());
            // the permit is released before the result is published
            let result = WORKER_PERMIT.scope(RefCell::new(permit), task).await;
            completer.complete(result);
        });
    }
}
