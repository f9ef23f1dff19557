//! Async handles to invocation results
//!
//! An [`InvocationHandle`] is the future a caller gets back from
//! `Diffuser::submit`. It is backed by a `tokio::sync::watch` channel, so any
//! number of clones (the caller's, the results cache's, an HTTP poller's)
//! observe the same completion without a second source of truth.

use diffusive_common::protocol::{InvocationResult, RequestId, UNIT_TYPE};
use std::sync::Arc;
use tokio::sync::watch;

type Slot = Option<Arc<InvocationResult>>;

/// Read side of an invocation's result.
#[derive(Debug, Clone)]
pub struct InvocationHandle {
    request_id: RequestId,
    rx: watch::Receiver<Slot>,
}

/// Write side; consumed by completing it.
#[derive(Debug)]
pub struct Completer {
    request_id: RequestId,
    tx: watch::Sender<Slot>,
}

/// Creates a pending handle and the completer that resolves it.
pub fn pending(request_id: impl Into<RequestId>) -> (Completer, InvocationHandle) {
    let request_id = request_id.into();
    let (tx, rx) = watch::channel(None);
    (
        Completer {
            request_id: request_id.clone(),
            tx,
        },
        InvocationHandle { request_id, rx },
    )
}

impl Completer {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn complete(self, result: InvocationResult) {
        // the value stays readable by later subscribers even with no receiver alive
        self.tx.send_replace(Some(Arc::new(result)));
    }
}

impl InvocationHandle {
    /// A handle that is already complete.
    pub fn completed(result: InvocationResult) -> Self {
        let request_id = result.request_id().to_string();
        let (tx, rx) = watch::channel(Some(Arc::new(result)));
        drop(tx);
        Self { request_id, rx }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// `true` once a result is available or the producer is gone.
    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_some() || self.rx.has_changed().is_err()
    }

    /// The result if the invocation has finished, without waiting.
    pub fn try_result(&self) -> Option<Arc<InvocationResult>> {
        if let Some(result) = self.rx.borrow().as_ref() {
            return Some(result.clone());
        }
        if self.rx.has_changed().is_err() {
            return Some(self.abandoned());
        }
        None
    }

    /// Waits for the result.
    ///
    /// Suspends only the calling task. If the producing task died without
    /// completing, an `Error` result is returned instead of hanging.
    pub async fn wait(&self) -> Arc<InvocationResult> {
        let mut rx = self.rx.clone();
        let outcome = rx.wait_for(|slot| slot.is_some()).await.map(|slot| (*slot).clone());
        match outcome {
            Ok(Some(result)) => result,
            _ => self.abandoned(),
        }
    }

    fn abandoned(&self) -> Arc<InvocationResult> {
        Arc::new(InvocationResult::error(
            self.request_id.clone(),
            UNIT_TYPE,
            "Invocation was abandoned before producing a result",
        ))
    }
}
