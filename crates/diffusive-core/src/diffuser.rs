//! The diffuser: where an invocation runs
//!
//! Each [`Diffuser`] serves one signature. On submission it reads the
//! current load and either executes the invocation in this process or sends
//! it to the endpoints chosen by the strategy, falling back to local
//! execution when every remote candidate fails. Either way the invocation
//! runs on the worker pool and its handle is registered in the results cache
//! before `submit` returns.

use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use diffusive_common::protocol::error::{DiffusiveError, Result};
use diffusive_common::protocol::{InvocationRequest, InvocationResult, Signature};
use diffusive_common::serializer::SerializerKind;
use diffusive_common::transport::InvocationTransport;

use crate::cache::{CacheEntry, ResultsCache};
use crate::code_source::RemoteCodeSource;
use crate::executor::{LocalExecutor, DEFAULT_LOCAL_TIMEOUT};
use crate::handle::{self, InvocationHandle};
use crate::load::{LoadCalculator, TaskThreadLoad};
use crate::pool::WorkerPool;
use crate::registry::{MethodRegistry, ModuleLoader};
use crate::strategy::{shared, EndpointSet, RandomStrategy, SharedStrategy, DEFAULT_SEED};

/// Dispatch tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Loads at or below this run locally
    pub load_threshold: f64,
    /// Maximum remote endpoints tried per invocation
    pub max_candidates: usize,
    /// Upper bound on one local execution
    pub local_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            load_threshold: 0.75,
            max_candidates: 3,
            local_timeout: DEFAULT_LOCAL_TIMEOUT,
        }
    }
}

/// Everything the diffusers of one repository share.
#[derive(Clone)]
pub struct DiffusionContext {
    pub strategy: SharedStrategy,
    pub load: Arc<dyn LoadCalculator>,
    /// `None` keeps every invocation local
    pub transport: Option<Arc<dyn InvocationTransport>>,
    pub registry: Arc<MethodRegistry>,
    pub loader: Option<Arc<dyn ModuleLoader>>,
    pub cache: Arc<ResultsCache>,
    pub pool: WorkerPool,
    pub config: DispatchConfig,
}

impl DiffusionContext {
    /// A local-only context: no endpoints, no transport, task/thread load.
    pub fn new(registry: Arc<MethodRegistry>, pool: WorkerPool, cache: Arc<ResultsCache>) -> Result<Self> {
        let load = TaskThreadLoad::new(cache.clone(), pool.threads())?;
        Ok(Self {
            strategy: shared(RandomStrategy::new(EndpointSet::default(), DEFAULT_SEED)),
            load: Arc::new(load),
            transport: None,
            registry,
            loader: None,
            cache,
            pool,
            config: DispatchConfig::default(),
        })
    }

    pub fn with_strategy(mut self, strategy: SharedStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_load(mut self, load: Arc<dyn LoadCalculator>) -> Self {
        self.load = load;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn InvocationTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }
}

/// Dispatcher for a single signature.
pub struct Diffuser {
    signature: Signature,
    key: String,
    class_paths: Vec<String>,
    serializer: SerializerKind,
    context: DiffusionContext,
    executor: LocalExecutor,
}

impl Diffuser {
    /// Creates a diffuser for `signature`.
    ///
    /// # Arguments
    ///
    /// * `signature` - The method this diffuser accepts invocations for
    /// * `context` - Strategy, load, transport, registry, cache and pool
    /// * `code_source` - Where unknown types are loaded from, if anywhere
    /// * `class_paths` - Extra classpath endpoints searched for this diffuser's code
    /// * `serializer` - Codec advertised for this diffuser
    pub fn new(
        signature: Signature,
        context: DiffusionContext,
        code_source: Option<&RemoteCodeSource>,
        class_paths: Vec<String>,
        serializer: SerializerKind,
    ) -> Self {
        let mut executor =
            LocalExecutor::new(context.registry.clone()).with_timeout(context.config.local_timeout);
        if let Some(code_source) = code_source {
            executor = executor.with_code_source(code_source.with_extra_class_paths(&class_paths));
        }
        if let Some(loader) = &context.loader {
            executor = executor.with_loader(loader.clone());
        }

        Self {
            key: signature.key(),
            signature,
            class_paths,
            serializer,
            context,
            executor,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Textual signature key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn class_paths(&self) -> &[String] {
        &self.class_paths
    }

    pub fn serializer(&self) -> SerializerKind {
        self.serializer
    }

    pub fn cache(&self) -> &Arc<ResultsCache> {
        &self.context.cache
    }

    /// Accepts `request` and returns a handle to its result without waiting.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the request names another signature or reuses the
    /// id of a cached invocation. Nothing is submitted in that case. Every
    /// failure after acceptance is reported through the result instead.
    pub fn submit(&self, request: InvocationRequest) -> Result<InvocationHandle> {
        let signature = request.signature();
        if signature != self.signature {
            return Err(DiffusiveError::InvalidRequest(format!(
                "Request for {} submitted to diffuser {}",
                signature, self.key
            )));
        }
        let request_id = request.request_id().to_string();
        let candidates = self.candidates(&request);

        // the id is reserved before anything runs
        let (completer, handle) = handle::pending(request_id.as_str());
        let entry = CacheEntry::new(handle.clone(), request.serializer(), self.key.clone());
        if !self.context.cache.add_if_absent(request_id.as_str(), entry) {
            return Err(DiffusiveError::InvalidRequest(format!(
                "Request id {} is already in use",
                request_id
            )));
        }

        let executor = self.executor.clone();
        let transport = self.context.transport.clone();
        let own_key = self.key.clone();

        self.context.pool.spawn_completing(completer, async move {
            if let (Some(transport), false) = (transport, candidates.is_empty()) {
                if let Some(result) = dispatch_remote(transport.as_ref(), &candidates, &request, &own_key).await {
                    return result;
                }
                warn!(
                    "All {} remote candidates failed for {}, executing locally",
                    candidates.len(),
                    request.request_id()
                );
            }
            executor.execute(request).await
        });

        Ok(handle)
    }

    /// Submits `request` and waits for its result.
    pub async fn call(&self, request: InvocationRequest) -> Result<Arc<InvocationResult>> {
        Ok(self.submit(request)?.wait().await)
    }

    /// Remote endpoints to try for `request`; empty means run locally.
    fn candidates(&self, request: &InvocationRequest) -> Vec<String> {
        let id = request.request_id();

        if request.base_signature() == Some(self.key.as_str()) {
            debug!("{} was diffused here for {}, running locally", id, self.key);
            return Vec::new();
        }
        if self.context.transport.is_none() {
            return Vec::new();
        }

        // read before locking; some calculators refresh system statistics
        let load = self.context.load.load();
        let mut strategy = self
            .context
            .strategy
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if strategy.is_empty() {
            debug!("No endpoints configured, running {} locally", id);
            return Vec::new();
        }

        if load <= self.context.config.load_threshold {
            debug!(
                "Load {:.3} <= threshold {:.3}, running {} locally",
                load, self.context.config.load_threshold, id
            );
            return Vec::new();
        }

        let mut candidates = strategy.select_endpoints();
        candidates.truncate(self.context.config.max_candidates.max(1));
        info!(
            "Load {:.3} > threshold {:.3}, diffusing {} to {:?}",
            load, self.context.config.load_threshold, id, candidates
        );
        candidates
    }
}

/// Tries `candidates` in order and returns the first delivered result.
///
/// A remote `Error` result is delivered as-is. Only failures to obtain a
/// result move on to the next candidate.
async fn dispatch_remote(
    transport: &dyn InvocationTransport,
    candidates: &[String],
    request: &InvocationRequest,
    own_key: &str,
) -> Option<InvocationResult> {
    let outgoing = request.with_base_signature(own_key);

    for endpoint in candidates {
        match transport.invoke(endpoint, &outgoing).await {
            Ok(result) if result.request_id() == request.request_id() => {
                debug!("{} completed on {}", request.request_id(), endpoint);
                return Some(result);
            }
            Ok(result) => warn!(
                "{} answered {} with a result for {}, skipping it",
                endpoint,
                request.request_id(),
                result.request_id()
            ),
            Err(e) if e.is_dispatch_failure() => {
                warn!("Dispatch of {} to {} failed: {}", request.request_id(), endpoint, e)
            }
            Err(e) => {
                warn!("Cannot dispatch {}: {}", request.request_id(), e);
                return None;
            }
        }
    }
    None
}
