use std::collections::HashMap;
use tracing::warn;

use crate::strategy::{EndpointSet, WeightedEndpoint};

/// Maps logical endpoint names to physical base URIs.
///
/// With no mapping configured the resolver is the identity. Once a mapping
/// exists, only mapped names resolve; anything else is dropped with a
/// warning so a typo in the configuration never sends traffic to an alias.
#[derive(Debug, Clone, Default)]
pub struct EndpointResolver {
    mapping: HashMap<String, String>,
}

impl EndpointResolver {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn mapped(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }

    pub fn is_identity(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Physical URI for `logical`, or `None` if it is not mapped.
    pub fn resolve(&self, logical: &str) -> Option<String> {
        if self.is_identity() {
            return Some(logical.to_string());
        }
        self.mapping.get(logical).cloned()
    }

    /// Resolves every endpoint of a set, keeping weights and order.
    pub fn resolve_set(&self, endpoints: &EndpointSet) -> EndpointSet {
        let resolved: Vec<WeightedEndpoint> = endpoints
            .iter()
            .filter_map(|endpoint| match self.resolve(&endpoint.uri) {
                Some(uri) => Some(WeightedEndpoint::new(uri, endpoint.weight)),
                None => {
                    warn!("Endpoint {} has no physical mapping, ignoring it", endpoint.uri);
                    None
                }
            })
            .collect();

        // weights were validated when `endpoints` was built
        EndpointSet::new(resolved).unwrap_or_default()
    }
}
