//! Peer assembly
//!
//! A [`Peer`] is one diffusive process: the diffuser repository with its
//! strategy, load calculator, worker pool and results cache, the code
//! source serving `/classpath`, and the HTTP client used to reach other
//! peers. It is built once from a [`ServerConfig`] and shared by the HTTP
//! surface and any in-process callers.

use std::sync::Arc;
use tracing::info;

use diffusive_client::DiffuserClient;
use diffusive_common::protocol::error::Result;
use diffusive_common::transport::HttpTransport;
use diffusive_core::strategy::shared;
use diffusive_core::{
    DiffuserRepository, DiffusionContext, EndpointResolver, LoadCalculator, MethodRegistry, ModuleLoader, RandomStrategy,
    RemoteCodeSource, ResultsCache, SharedStrategy, WeightedRandomStrategy, WorkerPool,
};

use crate::config::{ServerConfig, StrategyKind};

/// A running diffusive process.
pub struct Peer {
    config: ServerConfig,
    base_uri: String,
    repository: Arc<DiffuserRepository>,
    code_source: RemoteCodeSource,
    client: DiffuserClient,
}

impl Peer {
    /// Builds a peer with the configured load calculator and no module loader.
    ///
    /// Only types with methods in `registry` can run here.
    pub fn new(config: ServerConfig, registry: Arc<MethodRegistry>) -> Result<Self> {
        Self::builder(config, registry).build()
    }

    pub fn builder(config: ServerConfig, registry: Arc<MethodRegistry>) -> PeerBuilder {
        PeerBuilder {
            config,
            registry,
            loader: None,
            load: None,
        }
    }

    /// Resolves the configured endpoints and builds the selection strategy.
    fn strategy(config: &ServerConfig) -> Result<SharedStrategy> {
        let resolver = if config.endpoint_mapping.is_empty() {
            EndpointResolver::identity()
        } else {
            EndpointResolver::mapped(config.endpoint_mapping.clone())
        };
        let endpoints = resolver.resolve_set(&config.endpoint_set()?);
        let candidates = config.strategy.candidates;
        let seed = config.strategy.seed;

        Ok(match config.strategy.kind {
            StrategyKind::Random => shared(RandomStrategy::new(endpoints, seed).with_candidates(candidates)),
            StrategyKind::Weighted => {
                shared(WeightedRandomStrategy::new(endpoints, seed).with_candidates(candidates))
            }
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Base URI other peers reach this one at.
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn repository(&self) -> &Arc<DiffuserRepository> {
        &self.repository
    }

    pub fn code_source(&self) -> &RemoteCodeSource {
        &self.code_source
    }

    pub fn results(&self) -> &Arc<ResultsCache> {
        &self.repository.context().cache
    }

    /// Client configured with this peer's timeouts and classpath.
    pub fn client(&self) -> &DiffuserClient {
        &self.client
    }
}

/// Builder for [`Peer`], for embedders that supply their own module loader
/// or load calculator.
pub struct PeerBuilder {
    config: ServerConfig,
    registry: Arc<MethodRegistry>,
    loader: Option<Arc<dyn ModuleLoader>>,
    load: Option<Arc<dyn LoadCalculator>>,
}

impl PeerBuilder {
    /// Installs methods of types fetched through the code source.
    pub fn loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Replaces the configured load calculator.
    pub fn load(mut self, load: Arc<dyn LoadCalculator>) -> Self {
        self.load = Some(load);
        self
    }

    /// Builds the peer.
    ///
    /// Must be called from within a tokio runtime. The configuration is
    /// validated before anything is built.
    pub fn build(self) -> Result<Peer> {
        let PeerBuilder {
            config,
            registry,
            loader,
            load,
        } = self;
        config.validate()?;

        let base_uri = config.advertised_uri();
        let own_classpath = HttpTransport::classpath_of(&base_uri)?;
        let client = DiffuserClient::with_config(config.client_config()).with_class_paths(vec![own_classpath]);

        let pool = WorkerPool::new(config.threads)?;
        let cache = Arc::new(ResultsCache::new(config.results_cache_size));
        let load = match load {
            Some(load) => load,
            None => config.load_calculator.build(cache.clone(), config.threads)?,
        };

        let mut context = DiffusionContext::new(registry, pool, cache)?
            .with_strategy(Peer::strategy(&config)?)
            .with_load(load)
            .with_transport(Arc::new(client.clone()))
            .with_config(config.dispatch_config());
        if let Some(loader) = loader {
            context = context.with_loader(loader);
        }

        let code_source = RemoteCodeSource::new()
            .with_local_paths(config.code_paths.iter().cloned())
            .with_aux_paths(config.aux_code_paths.iter().cloned())
            .with_class_paths(config.class_paths.iter().cloned())
            .with_transport(Arc::new(client.clone()))
            .with_hops(config.hops);

        let repository = Arc::new(DiffuserRepository::new(context).with_code_source(code_source.clone()));

        info!(
            "Peer {} ready: {} threads, threshold {}, {} endpoints",
            base_uri,
            config.threads,
            config.load_threshold,
            config.strategy.endpoints.len()
        );

        Ok(Peer {
            config,
            base_uri,
            repository,
            code_source,
            client,
        })
    }
}
