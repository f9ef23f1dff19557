//! Diffusive Transport Layer
//!
//! The diffusion engine talks to peers through two narrow traits so it can be
//! driven by the HTTP client in production and by in-memory fakes in tests:
//!
//! - **[`InvocationTransport`]**: run an invocation on a peer and wait for
//!   its result
//! - **[`ClassTransport`]**: fetch code bytes from a peer's classpath
//!
//! [`HttpTransport`] holds the resource layout both sides of the HTTP
//! implementation agree on.

use async_trait::async_trait;

use crate::protocol::error::Result;
use crate::protocol::{InvocationRequest, InvocationResult};

pub mod http;

pub use http::{HttpTransport, HyperResponse, HOPS_HEADER};

/// Carries invocations to remote peers.
#[async_trait]
pub trait InvocationTransport: Send + Sync {
    /// Executes `request` on the peer at `endpoint` and waits for the result.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Physical base URI of the peer
    /// * `request` - The invocation, with its base signature already set
    ///
    /// # Returns
    ///
    /// - `Ok(result)` - The peer ran the invocation; the result may itself
    ///   carry an `Error` status
    /// - `Err(e)` - The peer could not be reached or did not answer in time;
    ///   `e.is_dispatch_failure()` is true for these
    async fn invoke(&self, endpoint: &str, request: &InvocationRequest) -> Result<InvocationResult>;
}

/// Fetches code bytes from remote classpath resources.
#[async_trait]
pub trait ClassTransport: Send + Sync {
    /// Fetches `class_name` from the classpath resource at `class_path`.
    ///
    /// # Arguments
    ///
    /// * `class_path` - Full classpath URI of a peer
    /// * `class_name` - Fully-qualified class name
    /// * `hops` - Remaining hop budget the peer may spend resolving the class
    ///   from its own upstream classpaths
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` - The peer resolved the class
    /// - `Ok(None)` - The peer answered but does not have it
    /// - `Err(e)` - Transport failure
    async fn fetch_class(&self, class_path: &str, class_name: &str, hops: u32) -> Result<Option<Vec<u8>>>;
}
