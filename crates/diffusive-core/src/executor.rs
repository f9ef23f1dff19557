use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use diffusive_common::protocol::error::{DiffusiveError, Result};
use diffusive_common::protocol::{InvocationRequest, InvocationResult};

use crate::code_source::RemoteCodeSource;
use crate::pool;
use crate::registry::{Invocation, MethodRegistry, ModuleLoader};

/// Upper bound on a single local execution.
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs invocations in this process.
///
/// Type names the registry does not know are loaded first, through the
/// code source and the module loader. The callable itself runs on tokio's
/// blocking pool so a long computation never stalls the runtime.
///
/// A call that exceeds the timeout is reported as failed at once. When it
/// runs on a [`WorkerPool`](crate::pool::WorkerPool) worker, that worker
/// stays occupied until the abandoned call actually returns.
#[derive(Clone)]
pub struct LocalExecutor {
    registry: Arc<MethodRegistry>,
    code_source: Option<RemoteCodeSource>,
    loader: Option<Arc<dyn ModuleLoader>>,
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(registry: Arc<MethodRegistry>) -> Self {
        Self {
            registry,
            code_source: None,
            loader: None,
            timeout: DEFAULT_LOCAL_TIMEOUT,
        }
    }

    pub fn with_code_source(mut self, code_source: RemoteCodeSource) -> Self {
        self.code_source = Some(code_source);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// Executes `request` and captures any failure in the result.
    pub async fn execute(&self, request: InvocationRequest) -> InvocationResult {
        let request_id = request.request_id().to_string();
        let return_type = request.return_type().to_string();

        match self.run(request).await {
            Ok(bytes) => InvocationResult::ok(request_id, return_type, bytes),
            Err(e) => {
                warn!("Local execution of {} failed: {}", request_id, e);
                InvocationResult::error(request_id, return_type, e.to_string())
            }
        }
    }

    async fn run(&self, request: InvocationRequest) -> Result<Vec<u8>> {
        let signature = request.signature();
        debug!("Executing {} locally as {}", request.request_id(), signature);

        let types = std::iter::once(request.target_type()).chain(request.argument_types().iter().map(String::as_str));
        for type_name in types {
            self.ensure_type(type_name).await?;
        }

        let method = self
            .registry
            .lookup(&signature)
            .ok_or_else(|| DiffusiveError::CodeNotFound(format!("No method registered for {}", signature)))?;

        let mut task = tokio::task::spawn_blocking(move || method(&Invocation::new(&request)));

        match tokio::time::timeout(self.timeout, &mut task).await {
            Err(_) => {
                // a blocking call cannot be cancelled; it keeps its worker until it returns
                if let Some(permit) = pool::detach_worker_permit() {
                    tokio::spawn(async move {
                        let _ = task.await;
                        drop(permit);
                    });
                }
                Err(DiffusiveError::Timeout(self.timeout.as_millis() as u64))
            }
            Ok(Err(join_error)) if join_error.is_panic() => Err(DiffusiveError::TargetExecution(format!(
                "panicked: {}",
                panic_message(join_error.into_panic())
            ))),
            Ok(Err(join_error)) => Err(DiffusiveError::TargetExecution(join_error.to_string())),
            Ok(Ok(outcome)) => outcome.map_err(|e| match e.downcast::<DiffusiveError>() {
                Ok(diffusive) => diffusive,
                Err(other) => DiffusiveError::TargetExecution(format!("{:#}", other)),
            }),
        }
    }

    async fn ensure_type(&self, type_name: &str) -> Result<()> {
        let missing = self.registry.missing_types(type_name);
        if missing.is_empty() {
            return Ok(());
        }

        let (code_source, loader) = match (&self.code_source, &self.loader) {
            (Some(code_source), Some(loader)) => (code_source, loader),
            _ => {
                return Err(DiffusiveError::CodeNotFound(format!(
                    "Type {} is unknown and no code loader is configured",
                    missing.join(", ")
                )))
            }
        };

        for name in missing {
            // an earlier load may have registered it
            if self.registry.knows_type(&name) {
                continue;
            }
            let code = code_source.get_bytes(&name).await?;
            loader
                .load(&name, &code, &self.registry)
                .map_err(|e| DiffusiveError::CodeNotFound(format!("Loading {} failed: {:#}", name, e)))?;

            if !self.registry.knows_type(&name) {
                return Err(DiffusiveError::CodeNotFound(format!(
                    "Code for {} loaded but did not register the type",
                    name
                )));
            }
            info!("Loaded code for {} ({} bytes)", name, code.len());
        }
        Ok(())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
