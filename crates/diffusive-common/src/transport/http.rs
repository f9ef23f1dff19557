//! HTTP Transport Utilities
//!
//! Resource paths and message conversions shared by the peer client and the
//! peer server.
//!
//! # Resources
//!
//! | Method | Path                                    | Purpose                  |
//! |--------|-----------------------------------------|--------------------------|
//! | PUT    | `/diffusers`                            | create a diffuser        |
//! | GET    | `/diffusers`                            | list diffusers           |
//! | GET    | `/diffusers/{signature}`                | describe a diffuser      |
//! | DELETE | `/diffusers/{signature}`                | delete a diffuser        |
//! | POST   | `/diffusers/{signature}`                | execute an invocation    |
//! | GET    | `/diffusers/{signature}/{request_id}`   | poll a result            |
//! | HEAD   | `/diffusers/{signature}/{request_id}`   | check a result's status  |
//! | GET    | `/classpath/{class_name}`               | fetch code bytes         |
//!
//! Signature keys contain characters that are not legal in a URI path
//! (`<`, `>`, spaces), so every segment is percent-encoded when a URL is
//! built here.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use url::Url;

use crate::protocol::error::{DiffusiveError, Result};
use crate::protocol::InvocationRequest;

/// Type alias for Hyper responses with full body
pub type HyperResponse = Response<Full<Bytes>>;

/// Header carrying the remaining hop budget of a code fetch.
pub const HOPS_HEADER: &str = "x-diffusive-hops";

pub const DIFFUSERS_SEGMENT: &str = "diffusers";
pub const CLASSPATH_SEGMENT: &str = "classpath";

/// HTTP transport utility functions
pub struct HttpTransport;

impl HttpTransport {
    /// Parse an invocation request from an HTTP body
    ///
    /// # Arguments
    ///
    /// * `body` - Raw HTTP body bytes
    ///
    /// # Returns
    ///
    /// The decoded request, or an error if the JSON is malformed or the
    /// request violates its invariants
    pub fn parse_invocation(body: &Bytes) -> Result<InvocationRequest> {
        serde_json::from_slice(body).map_err(DiffusiveError::JsonSerialization)
    }

    /// Create a JSON HTTP response
    ///
    /// # Arguments
    ///
    /// * `status` - HTTP status code
    /// * `value` - Body, serialized as JSON
    pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HyperResponse {
        match serde_json::to_vec(value) {
            Ok(body) => Self::response(status, "application/json", Bytes::from(body)),
            Err(e) => Self::text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode response: {}", e),
            ),
        }
    }

    /// Create a plain-text HTTP response, used for error details
    pub fn text_response(status: StatusCode, text: impl Into<String>) -> HyperResponse {
        Self::response(status, "text/plain; charset=utf-8", Bytes::from(text.into()))
    }

    /// Create a response carrying raw code bytes
    pub fn bytes_response(bytes: Bytes) -> HyperResponse {
        Self::response(StatusCode::OK, "application/octet-stream", bytes)
    }

    /// Create a response without a body
    pub fn empty_response(status: StatusCode) -> HyperResponse {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> HyperResponse {
        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static(content_type),
        );
        response
    }

    /// URL of the diffuser collection on a peer.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Peer base URI (e.g., "http://10.0.0.5:8182")
    pub fn diffusers_url(endpoint: &str) -> Result<Url> {
        Self::join(endpoint, &[DIFFUSERS_SEGMENT])
    }

    /// URL of one diffuser on a peer.
    pub fn diffuser_url(endpoint: &str, signature: &str) -> Result<Url> {
        Self::join(endpoint, &[DIFFUSERS_SEGMENT, signature])
    }

    /// URL of one result on a peer.
    pub fn result_url(endpoint: &str, signature: &str, request_id: &str) -> Result<Url> {
        Self::join(endpoint, &[DIFFUSERS_SEGMENT, signature, request_id])
    }

    /// URL of a class under a classpath resource.
    ///
    /// # Arguments
    ///
    /// * `class_path` - Full classpath URI (e.g., "http://10.0.0.5:8182/classpath")
    /// * `class_name` - Fully-qualified class name
    pub fn class_url(class_path: &str, class_name: &str) -> Result<Url> {
        Self::join(class_path, &[class_name])
    }

    /// Classpath URI served by a peer with the given base URI.
    pub fn classpath_of(endpoint: &str) -> Result<String> {
        Ok(Self::join(endpoint, &[CLASSPATH_SEGMENT])?.to_string())
    }

    /// Path of a diffuser resource relative to the peer's base URI.
    pub fn diffuser_location(signature: &str) -> Result<String> {
        Ok(Self::join("http://localhost/", &[DIFFUSERS_SEGMENT, signature])?
            .path()
            .to_string())
    }

    /// Path of a result resource relative to the peer's base URI.
    pub fn result_location(signature: &str, request_id: &str) -> Result<String> {
        Ok(Self::join("http://localhost/", &[DIFFUSERS_SEGMENT, signature, request_id])?
            .path()
            .to_string())
    }

    fn join(base: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(base)?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                DiffusiveError::InvalidRequest(format!("'{}' cannot be used as a base URI", base))
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }
}
