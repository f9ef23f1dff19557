//! Diffusive Peer Server
//!
//! This crate runs a diffusive peer: it assembles the engine from a TOML
//! [`ServerConfig`] and exposes its diffusers, their results and the code
//! bytes it can serve over HTTP.

pub mod config;
pub mod http_router;
pub mod http_server;
pub mod peer;

pub use config::ServerConfig;
pub use http_router::PeerRouter;
pub use http_server::HttpServer;
pub use peer::{Peer, PeerBuilder};
