//! Endpoint selection strategies
//!
//! A strategy owns an [`EndpointSet`] and a seeded random generator and,
//! each time the diffuser decides to go remote, returns the endpoints to try
//! in priority order. The first entry is the drawn endpoint; when the
//! strategy is configured for more than one candidate, the following
//! endpoints of the set (cyclically, skipping weight-0 entries) come after
//! it as fallbacks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use diffusive_common::protocol::error::{DiffusiveError, Result};

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 1;

fn default_weight() -> f64 {
    1.0
}

/// One candidate endpoint and its selection weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedEndpoint {
    pub uri: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl WeightedEndpoint {
    pub fn new(uri: impl Into<String>, weight: f64) -> Self {
        Self {
            uri: uri.into(),
            weight,
        }
    }
}

/// Ordered candidate endpoints with non-negative weights.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EndpointSet {
    endpoints: Vec<WeightedEndpoint>,
}

impl EndpointSet {
    /// Creates a set, rejecting negative or non-finite weights.
    pub fn new(endpoints: Vec<WeightedEndpoint>) -> Result<Self> {
        if let Some(bad) = endpoints.iter().find(|e| !e.weight.is_finite() || e.weight < 0.0) {
            return Err(DiffusiveError::Config(format!(
                "Endpoint {} has invalid weight {}",
                bad.uri, bad.weight
            )));
        }
        Ok(Self { endpoints })
    }

    /// Creates a set where every endpoint has weight 1.0.
    pub fn unweighted<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: uris
                .into_iter()
                .map(|uri| WeightedEndpoint::new(uri, default_weight()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeightedEndpoint> {
        self.endpoints.iter()
    }

    pub fn uris(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.uri.clone()).collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.endpoints.iter().map(|e| e.weight).sum()
    }

    fn get(&self, index: usize) -> &WeightedEndpoint {
        &self.endpoints[index]
    }

    /// Indices starting at `first` and wrapping around, filtered by `keep`,
    /// truncated to `count`.
    fn cyclic_from(&self, first: usize, count: usize, keep: impl Fn(&WeightedEndpoint) -> bool) -> Vec<String> {
        let n = self.endpoints.len();
        (0..n)
            .map(|offset| (first + offset) % n)
            .filter(|&i| keep(&self.endpoints[i]))
            .take(count)
            .map(|i| self.endpoints[i].uri.clone())
            .collect()
    }
}

/// Selects the endpoint(s) a diffused invocation is sent to.
pub trait DiffuserStrategy: Send {
    /// Endpoints to try, in priority order. Empty iff [`Self::is_empty`].
    fn select_endpoints(&mut self) -> Vec<String>;

    /// `true` when no endpoint can ever be selected.
    fn is_empty(&self) -> bool;

    fn endpoints(&self) -> &EndpointSet;
}

/// Strategy shared by every diffuser of a repository.
pub type SharedStrategy = Arc<Mutex<Box<dyn DiffuserStrategy>>>;

/// Wraps a strategy for sharing between diffusers.
pub fn shared(strategy: impl DiffuserStrategy + 'static) -> SharedStrategy {
    Arc::new(Mutex::new(Box::new(strategy)))
}

/// Uniform random selection: every endpoint is equally likely.
pub struct RandomStrategy {
    endpoints: EndpointSet,
    rng: StdRng,
    candidates: usize,
}

impl RandomStrategy {
    /// Create a strategy drawing from `endpoints` with a fixed seed
    pub fn new(endpoints: EndpointSet, seed: u64) -> Self {
        Self {
            endpoints,
            rng: StdRng::seed_from_u64(seed),
            candidates: 1,
        }
    }

    /// Number of endpoints returned per selection (at least 1)
    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates.max(1);
        self
    }

    fn draw_index(&mut self) -> usize {
        let n = self.endpoints.len();
        let value: f64 = self.rng.gen();
        // value < 1.0, but guard the boundary anyway
        ((value * n as f64).floor() as usize).min(n - 1)
    }
}

impl DiffuserStrategy for RandomStrategy {
    fn select_endpoints(&mut self) -> Vec<String> {
        if self.endpoints.is_empty() {
            return Vec::new();
        }
        let first = self.draw_index();
        self.endpoints.cyclic_from(first, self.candidates, |_| true)
    }

    fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }
}

/// Weighted random selection: an endpoint is chosen with probability
/// proportional to its weight. Weight-0 endpoints are never chosen.
pub struct WeightedRandomStrategy {
    endpoints: EndpointSet,
    rng: StdRng,
    candidates: usize,
    total_weight: f64,
}

impl WeightedRandomStrategy {
    pub fn new(endpoints: EndpointSet, seed: u64) -> Self {
        let total_weight = endpoints.total_weight();
        Self {
            endpoints,
            rng: StdRng::seed_from_u64(seed),
            candidates: 1,
            total_weight,
        }
    }

    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates.max(1);
        self
    }

    /// Walks the half-open intervals `[lower, lower + weight)` and returns
    /// the index whose interval contains the draw.
    fn draw_index(&mut self) -> usize {
        let value = self.rng.gen::<f64>() * self.total_weight;

        let mut lower = 0.0;
        let mut last_positive = 0;
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.weight <= 0.0 {
                continue;
            }
            if value >= lower && value < lower + endpoint.weight {
                return i;
            }
            lower += endpoint.weight;
            last_positive = i;
        }

        // rounding left the draw past the last interval
        last_positive
    }
}

impl DiffuserStrategy for WeightedRandomStrategy {
    fn select_endpoints(&mut self) -> Vec<String> {
        if self.is_empty() {
            return Vec::new();
        }
        let first = self.draw_index();
        debug_assert!(self.endpoints.get(first).weight > 0.0);
        self.endpoints
            .cyclic_from(first, self.candidates, |e| e.weight > 0.0)
    }

    fn is_empty(&self) -> bool {
        self.total_weight <= 0.0
    }

    fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three() -> EndpointSet {
        EndpointSet::unweighted(["http://a", "http://b", "http://c"])
    }

    #[test]
    fn test_empty_set_selects_nothing() {
        let mut random = RandomStrategy::new(EndpointSet::default(), DEFAULT_SEED);
        assert!(random.is_empty());
        assert!(random.select_endpoints().is_empty());

        let mut weighted = WeightedRandomStrategy::new(EndpointSet::default(), DEFAULT_SEED);
        assert!(weighted.is_empty());
        assert!(weighted.select_endpoints().is_empty());
    }

    #[test]
    fn test_single_endpoint() {
        let mut random = RandomStrategy::new(EndpointSet::unweighted(["http://only"]), 7);
        for _ in 0..10 {
            assert_eq!(random.select_endpoints(), vec!["http://only".to_string()]);
        }
    }

    #[test]
    fn test_uniform_sequence_is_reproducible() {
        let mut first = RandomStrategy::new(three(), 314);
        let mut second = RandomStrategy::new(three(), 314);

        let a: Vec<_> = (0..200).map(|_| first.select_endpoints()).collect();
        let b: Vec<_> = (0..200).map(|_| second.select_endpoints()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut first = RandomStrategy::new(three(), 1);
        let mut second = RandomStrategy::new(three(), 2);

        let a: Vec<_> = (0..200).map(|_| first.select_endpoints()).collect();
        let b: Vec<_> = (0..200).map(|_| second.select_endpoints()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_uniform_covers_every_endpoint() {
        let mut strategy = RandomStrategy::new(three(), DEFAULT_SEED);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            seen.extend(strategy.select_endpoints());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_fallback_candidates_follow_cyclically() {
        let mut strategy = RandomStrategy::new(three(), DEFAULT_SEED).with_candidates(3);
        for _ in 0..50 {
            let picked = strategy.select_endpoints();
            assert_eq!(picked.len(), 3);
            let uris = three().uris();
            let first = uris.iter().position(|u| *u == picked[0]).unwrap();
            assert_eq!(picked[1], uris[(first + 1) % 3]);
            assert_eq!(picked[2], uris[(first + 2) % 3]);
        }
    }

    #[test]
    fn test_candidates_capped_by_set_size() {
        let mut strategy = RandomStrategy::new(three(), DEFAULT_SEED).with_candidates(10);
        assert_eq!(strategy.select_endpoints().len(), 3);
    }

    #[test]
    fn test_weighted_frequencies_converge() {
        let endpoints = EndpointSet::new(vec![
            WeightedEndpoint::new("http://a", 1.0),
            WeightedEndpoint::new("http://b", 2.0),
            WeightedEndpoint::new("http://c", 3.0),
        ])
        .unwrap();
        let mut strategy = WeightedRandomStrategy::new(endpoints, 314);

        let draws = 1_000_000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            match strategy.select_endpoints()[0].as_str() {
                "http://a" => counts[0] += 1,
                "http://b" => counts[1] += 1,
                "http://c" => counts[2] += 1,
                other => panic!("unexpected endpoint {}", other),
            }
        }

        let expected = [1.0 / 6.0, 2.0 / 6.0, 3.0 / 6.0];
        for (count, expected) in counts.iter().zip(expected) {
            let observed = *count as f64 / draws as f64;
            assert!(
                (observed - expected).abs() < 0.01,
                "observed {} expected {}",
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let endpoints = EndpointSet::new(vec![
            WeightedEndpoint::new("http://zero", 0.0),
            WeightedEndpoint::new("http://one", 1.0),
            WeightedEndpoint::new("http://also-zero", 0.0),
        ])
        .unwrap();
        let mut strategy = WeightedRandomStrategy::new(endpoints, DEFAULT_SEED).with_candidates(3);

        for _ in 0..10_000 {
            assert_eq!(strategy.select_endpoints(), vec!["http://one".to_string()]);
        }
    }

    #[test]
    fn test_all_zero_weights_is_empty() {
        let endpoints = EndpointSet::new(vec![WeightedEndpoint::new("http://zero", 0.0)]).unwrap();
        let mut strategy = WeightedRandomStrategy::new(endpoints, DEFAULT_SEED);
        assert!(strategy.is_empty());
        assert!(strategy.select_endpoints().is_empty());
    }

    #[test]
    fn test_weighted_sequence_is_reproducible() {
        let endpoints = EndpointSet::new(vec![
            WeightedEndpoint::new("http://a", 0.5),
            WeightedEndpoint::new("http://b", 4.0),
        ])
        .unwrap();
        let mut first = WeightedRandomStrategy::new(endpoints.clone(), 99);
        let mut second = WeightedRandomStrategy::new(endpoints, 99);
        for _ in 0..500 {
            assert_eq!(first.select_endpoints(), second.select_endpoints());
        }
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(EndpointSet::new(vec![WeightedEndpoint::new("http://a", -1.0)]).is_err());
        assert!(EndpointSet::new(vec![WeightedEndpoint::new("http://a", f64::NAN)]).is_err());
        assert!(EndpointSet::new(vec![WeightedEndpoint::new("http://a", f64::INFINITY)]).is_err());
    }

    #[test]
    fn test_shared_strategy() {
        let strategy = shared(RandomStrategy::new(three(), DEFAULT_SEED));
        let picked = strategy.lock().unwrap().select_endpoints();
        assert_eq!(picked.len(), 1);
        assert_eq!(strategy.lock().unwrap().endpoints().len(), 3);
    }
}
