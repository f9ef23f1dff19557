//! Peer configuration
//!
//! A peer is configured from a TOML file. Every field has a default, so an
//! empty file runs a local-only peer on `0.0.0.0:8182`.
//!
//! ```toml
//! bind = "0.0.0.0:8182"
//! advertised_uri = "http://10.0.0.4:8182"
//! threads = 8
//! results_cache_size = 100
//! load_threshold = 0.75
//! load_calculator = "task-thread"
//! code_paths = ["/opt/app/code"]
//! class_paths = ["http://10.0.0.1:8182/classpath"]
//!
//! [strategy]
//! kind = "weighted"
//! seed = 314
//! endpoints = [
//!     { uri = "blue", weight = 2.0 },
//!     { uri = "green" },
//! ]
//!
//! [endpoint_mapping]
//! blue = "http://10.0.0.5:8182"
//! green = "http://10.0.0.6:8182"
//!
//! [dispatch]
//! max_candidates = 3
//! request_timeout_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use diffusive_client::ClientConfig;
use diffusive_common::protocol::error::{DiffusiveError, Result};
use diffusive_core::cache::DEFAULT_CAPACITY;
use diffusive_core::code_source::DEFAULT_HOPS;
use diffusive_core::strategy::DEFAULT_SEED;
use diffusive_core::{DispatchConfig, EndpointSet, LoadCalculatorKind, WeightedEndpoint};

/// Port peers listen on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8182;

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_cache_size() -> usize {
    DEFAULT_CAPACITY
}

fn default_threshold() -> f64 {
    DispatchConfig::default().load_threshold
}

fn default_hops() -> u32 {
    DEFAULT_HOPS
}

/// Top-level peer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind: SocketAddr,
    /// Base URI other peers reach this one at; derived from `bind` if unset
    pub advertised_uri: Option<String>,
    /// Worker pool size
    pub threads: usize,
    /// Capacity of the results cache
    pub results_cache_size: usize,
    /// Loads above this are diffused; must be within [0, 1]
    pub load_threshold: f64,
    pub load_calculator: LoadCalculatorKind,
    /// Directories holding code this peer has locally
    pub code_paths: Vec<PathBuf>,
    /// Directories searched after `code_paths`; hits are memoized
    pub aux_code_paths: Vec<PathBuf>,
    /// Classpath URIs of peers to fetch missing code from
    pub class_paths: Vec<String>,
    /// Hop budget for code fetches starting here
    pub hops: u32,
    pub strategy: StrategyConfig,
    /// Logical endpoint name to physical base URI
    pub endpoint_mapping: HashMap<String, String>,
    pub dispatch: DispatchTimeouts,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            advertised_uri: None,
            threads: default_threads(),
            results_cache_size: default_cache_size(),
            load_threshold: default_threshold(),
            load_calculator: LoadCalculatorKind::default(),
            code_paths: Vec::new(),
            aux_code_paths: Vec::new(),
            class_paths: Vec::new(),
            hops: default_hops(),
            strategy: StrategyConfig::default(),
            endpoint_mapping: HashMap::new(),
            dispatch: DispatchTimeouts::default(),
        }
    }
}

/// Endpoint selection algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Random,
    Weighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    pub seed: u64,
    /// Endpoints returned per selection, fallbacks included. Defaults to
    /// `dispatch.max_candidates` so a failed endpoint falls back to the next.
    pub candidates: usize,
    /// Logical endpoints, resolved through `endpoint_mapping`
    pub endpoints: Vec<WeightedEndpoint>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            seed: DEFAULT_SEED,
            candidates: DispatchConfig::default().max_candidates,
            endpoints: Vec::new(),
        }
    }
}

/// Dispatch limits, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchTimeouts {
    pub max_candidates: usize,
    pub local_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub result_timeout_ms: u64,
}

impl Default for DispatchTimeouts {
    fn default() -> Self {
        let dispatch = DispatchConfig::default();
        let client = ClientConfig::default();
        Self {
            max_candidates: dispatch.max_candidates,
            local_timeout_ms: dispatch.local_timeout.as_millis() as u64,
            connect_timeout_ms: client.connect_timeout.as_millis() as u64,
            request_timeout_ms: client.request_timeout.as_millis() as u64,
            poll_interval_ms: client.poll_interval.as_millis() as u64,
            result_timeout_ms: client.result_timeout.as_millis() as u64,
        }
    }
}

impl ServerConfig {
    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DiffusiveError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no peer can run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.load_threshold) {
            return Err(DiffusiveError::Config(format!(
                "load_threshold must be within [0.0, 1.0], got {}",
                self.load_threshold
            )));
        }
        if self.threads == 0 {
            return Err(DiffusiveError::Config("threads must be at least 1".to_string()));
        }
        if self.results_cache_size == 0 {
            return Err(DiffusiveError::Config("results_cache_size must be at least 1".to_string()));
        }
        if self.dispatch.max_candidates == 0 {
            return Err(DiffusiveError::Config("dispatch.max_candidates must be at least 1".to_string()));
        }
        for uri in self.advertised_uri.iter().chain(&self.class_paths) {
            url::Url::parse(uri).map_err(|e| DiffusiveError::Config(format!("Invalid URI '{}': {}", uri, e)))?;
        }
        self.endpoint_set().map(|_| ())
    }

    /// Base URI other peers reach this one at.
    pub fn advertised_uri(&self) -> String {
        match &self.advertised_uri {
            Some(uri) => uri.trim_end_matches('/').to_string(),
            None if self.bind.ip().is_unspecified() => format!("http://127.0.0.1:{}", self.bind.port()),
            None => format!("http://{}", self.bind),
        }
    }

    /// Logical endpoints as configured, before resolution.
    pub fn endpoint_set(&self) -> Result<EndpointSet> {
        EndpointSet::new(self.strategy.endpoints.clone())
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            load_threshold: self.load_threshold,
            max_candidates: self.dispatch.max_candidates,
            local_timeout: Duration::from_millis(self.dispatch.local_timeout_ms),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(self.dispatch.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.dispatch.request_timeout_ms),
            poll_interval: Duration::from_millis(self.dispatch.poll_interval_ms),
            result_timeout: Duration::from_millis(self.dispatch.result_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind.port(), DEFAULT_PORT);
        assert_eq!(config.results_cache_size, 100);
        assert_eq!(config.load_threshold, 0.75);
        assert_eq!(config.strategy.seed, DEFAULT_SEED);
        assert!(config.endpoint_set().unwrap().is_empty());
    }

    #[test]
    fn test_full_file() {
        let config = ServerConfig::from_toml_str(
            r#"
            bind = "127.0.0.1:9000"
            threads = 4
            load_threshold = 0.5
            load_calculator = "system-cpu"
            code_paths = ["/opt/code"]

            [strategy]
            kind = "weighted"
            seed = 314
            candidates = 2
            endpoints = [
                { uri = "blue", weight = 2.0 },
                { uri = "green" },
            ]

            [endpoint_mapping]
            blue = "http://10.0.0.5:8182"

            [dispatch]
            request_timeout_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.threads, 4);
        assert_eq!(config.load_calculator, LoadCalculatorKind::SystemCpu);
        assert_eq!(config.strategy.kind, StrategyKind::Weighted);
        assert_eq!(config.strategy.endpoints[1].weight, 1.0);
        assert_eq!(config.endpoint_mapping["blue"], "http://10.0.0.5:8182");
        assert_eq!(config.client_config().request_timeout, Duration::from_secs(1));
        assert_eq!(config.client_config().poll_interval, Duration::from_millis(50));
        assert_eq!(config.dispatch_config().load_threshold, 0.5);
        assert_eq!(config.advertised_uri(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_default_candidates_match_dispatch_cap() {
        let config = ServerConfig::default();
        assert_eq!(config.strategy.candidates, config.dispatch.max_candidates);
        assert!(config.strategy.candidates > 1);
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        for text in ["load_threshold = 1.5", "load_threshold = -0.1"] {
            let err = ServerConfig::from_toml_str(text).unwrap_err();
            assert!(matches!(err, DiffusiveError::Config(_)), "{}", text);
        }
        assert!(ServerConfig::from_toml_str("load_threshold = 0.0").is_ok());
        assert!(ServerConfig::from_toml_str("load_threshold = 1.0").is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = ServerConfig::from_toml_str(
            r#"
            [strategy]
            endpoints = [{ uri = "http://a", weight = -1.0 }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, DiffusiveError::Config(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(ServerConfig::from_toml_str("treads = 4").is_err());
    }

    #[test]
    fn test_advertised_uri() {
        let mut config = ServerConfig::default();
        assert_eq!(config.advertised_uri(), "http://127.0.0.1:8182");

        config.advertised_uri = Some("http://peer.example:8182/".to_string());
        assert_eq!(config.advertised_uri(), "http://peer.example:8182");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peer.toml");
        std::fs::write(&path, "threads = 2\n").unwrap();
        assert_eq!(ServerConfig::load(&path).unwrap().threads, 2);

        assert!(ServerConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
