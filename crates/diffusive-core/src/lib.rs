//! Diffusive engine
//!
//! Decides where each invocation runs and makes the answer look like an
//! ordinary future:
//!
//! - [`Diffuser`] compares the current load against a threshold and either
//!   executes locally or dispatches to endpoints picked by a
//!   [`DiffuserStrategy`], degrading to local execution when they all fail
//! - [`ResultsCache`] keeps a bounded, FIFO-evicted map of invocation handles
//! - [`RemoteCodeSource`] finds the code of types this process does not know,
//!   asking peers with a hop budget
//! - [`DiffuserRepository`] holds the diffusers of a process by signature

pub mod cache;
pub mod code_source;
pub mod diffuser;
pub mod executor;
pub mod handle;
pub mod load;
pub mod pool;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod strategy;

pub use cache::{CacheEntry, ResultsCache};
pub use code_source::{ClassByteCache, RemoteCodeSource, DEFAULT_HOPS};
pub use diffuser::{Diffuser, DiffusionContext, DispatchConfig};
pub use executor::LocalExecutor;
pub use handle::InvocationHandle;
pub use load::{LoadCalculator, LoadCalculatorKind};
pub use pool::WorkerPool;
pub use registry::{Invocation, MethodRegistry, ModuleLoader};
pub use repository::DiffuserRepository;
pub use resolver::EndpointResolver;
pub use strategy::{
    DiffuserStrategy, EndpointSet, RandomStrategy, SharedStrategy, WeightedEndpoint, WeightedRandomStrategy,
};
