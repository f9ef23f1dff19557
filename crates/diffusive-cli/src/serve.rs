//! `diffusive serve`
//!
//! Loads the peer configuration, applies command line overrides, binds the
//! listener and runs the peer until the shutdown future resolves.

use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

use diffusive_core::MethodRegistry;
use diffusive_server::{HttpServer, Peer, ServerConfig};

use crate::validate_http_url;

/// Reads the configuration and applies the command line overrides.
///
/// Without a file every setting takes its default.
pub fn resolve_config(
    path: Option<&Path>,
    bind: Option<SocketAddr>,
    advertised_uri: Option<String>,
) -> Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = bind {
        config.bind = bind;
    }
    if let Some(uri) = advertised_uri {
        validate_http_url(&uri, "advertised URI")?;
        config.advertised_uri = Some(uri);
    }
    config.validate()?;
    Ok(config)
}

/// Binds the configured address.
///
/// When no URI is advertised and the port was left to the OS, the bound
/// port is written back so other peers are told where to reach this one.
pub async fn bind(mut config: ServerConfig) -> Result<(TcpListener, ServerConfig)> {
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;
    let local = listener.local_addr()?;
    if config.bind.port() == 0 {
        config.bind = SocketAddr::new(config.bind.ip(), local.port());
    }
    Ok((listener, config))
}

/// Runs a peer on `listener` until `shutdown` resolves.
///
/// The standalone peer has no compiled-in methods: it serves code from its
/// code paths and relays or rejects invocations it cannot run. Embedders
/// with their own methods build a [`Peer`] with a populated registry.
pub async fn run_serve<F>(listener: TcpListener, config: ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let code_paths = config.code_paths.len();
    let peer = Peer::new(config, Arc::new(MethodRegistry::new()))?;
    tracing::info!("Advertising {} ({} code paths)", peer.base_uri(), code_paths);

    HttpServer::new(Arc::new(peer)).serve(listener, shutdown).await?;
    Ok(())
}
