//! HTTP Server for diffusive peers
//!
//! This module wires the peer resources into an axum application. Handlers
//! only extract the path, headers and body, and delegate to [`PeerRouter`].
//!
//! # Example
//!
//! ```no_run
//! use diffusive_core::MethodRegistry;
//! use diffusive_server::{HttpServer, Peer, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let addr = config.bind;
//!     let peer = Arc::new(Peer::new(config, Arc::new(MethodRegistry::new())).unwrap());
//!     HttpServer::new(peer).run(addr).await.unwrap();
//! }
//! ```

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use hyper::body::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use diffusive_common::protocol::error::{DiffusiveError, Result};
use diffusive_common::transport::{HyperResponse, HOPS_HEADER};

use crate::http_router::PeerRouter;
use crate::peer::Peer;

/// HTTP server for a peer.
///
/// Routes:
/// - `PUT`/`GET` `/diffusers`
/// - `GET`/`DELETE`/`POST` `/diffusers/:signature`
/// - `GET`/`HEAD` `/diffusers/:signature/:request_id`
/// - `GET` `/classpath/:class_name`
/// - `GET` `/__health`
pub struct HttpServer {
    router: Arc<PeerRouter>,
}

impl HttpServer {
    /// Creates a new HTTP server.
    ///
    /// # Arguments
    /// * `peer` - Arc-wrapped peer instance
    pub fn new(peer: Arc<Peer>) -> Self {
        Self {
            router: Arc::new(PeerRouter::new(peer)),
        }
    }

    /// The axum application serving this peer.
    pub fn app(&self) -> axum::Router {
        axum::Router::new()
            .route("/diffusers", get(list_diffusers).put(create_diffuser))
            .route(
                "/diffusers/:signature",
                get(get_diffuser).delete(delete_diffuser).post(execute),
            )
            .route(
                "/diffusers/:signature/:request_id",
                get(result).head(result_status),
            )
            .route("/classpath/:class_name", get(class_bytes))
            .route("/__health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.router.clone())
    }

    /// Runs the HTTP server.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "0.0.0.0:8182")
    ///
    /// # Returns
    /// - `Ok(())` - Server ran successfully
    /// - `Err(DiffusiveError)` - Server failed to start or run
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DiffusiveError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener, std::future::pending()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            "Peer HTTP server listening on {}",
            listener
                .local_addr()
                .map_err(|e| DiffusiveError::Transport(format!("Failed to get local addr: {}", e)))?
        );

        axum::serve(listener, self.app())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| DiffusiveError::Transport(format!("Server error: {}", e)))?;

        info!("Peer HTTP server stopped");
        Ok(())
    }
}

type PeerState = State<Arc<PeerRouter>>;

async fn create_diffuser(State(router): PeerState, body: Bytes) -> HyperResponse {
    router.create_diffuser(&body)
}

async fn list_diffusers(State(router): PeerState) -> HyperResponse {
    router.list_diffusers()
}

async fn get_diffuser(State(router): PeerState, Path(signature): Path<String>) -> HyperResponse {
    router.get_diffuser(&signature)
}

async fn delete_diffuser(State(router): PeerState, Path(signature): Path<String>) -> HyperResponse {
    router.delete_diffuser(&signature)
}

async fn execute(State(router): PeerState, Path(signature): Path<String>, body: Bytes) -> HyperResponse {
    router.execute(&signature, &body)
}

async fn result(State(router): PeerState, Path((signature, request_id)): Path<(String, String)>) -> HyperResponse {
    router.result(&signature, &request_id)
}

async fn result_status(
    State(router): PeerState,
    Path((signature, request_id)): Path<(String, String)>,
) -> HyperResponse {
    router.result_status(&signature, &request_id)
}

async fn class_bytes(State(router): PeerState, Path(class_name): Path<String>, headers: HeaderMap) -> HyperResponse {
    let hops = headers.get(HOPS_HEADER).map(|value| value.to_str().unwrap_or("invalid"));
    router.class_bytes(&class_name, hops).await
}

/// Handles health check GET requests.
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
