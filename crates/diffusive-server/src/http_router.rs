//! Request handling for the peer HTTP surface
//!
//! [`PeerRouter`] holds the logic of every resource; the axum layer in
//! `http_server` only extracts path, headers and body and forwards here.
//! Every handler answers with a complete response, error details as plain
//! text, so a malformed request never escapes as a panic or a dropped
//! connection.

use hyper::body::Bytes;
use hyper::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

use diffusive_common::protocol::error::DiffusiveError;
use diffusive_common::protocol::{CreateDiffuserRequest, DiffuserInfo, ExecuteResponse, Signature};
use diffusive_common::transport::{HttpTransport, HyperResponse};
use diffusive_core::Diffuser;

use crate::peer::Peer;

/// Peer request router.
pub struct PeerRouter {
    peer: Arc<Peer>,
}

impl PeerRouter {
    pub fn new(peer: Arc<Peer>) -> Self {
        Self { peer }
    }

    pub fn peer(&self) -> &Arc<Peer> {
        &self.peer
    }

    /// `PUT /diffusers`
    pub fn create_diffuser(&self, body: &Bytes) -> HyperResponse {
        let create: CreateDiffuserRequest = match serde_json::from_slice(body) {
            Ok(create) => create,
            Err(e) => return bad_request(format!("Malformed diffuser request: {}", e)),
        };
        let signature = match Signature::parse(&create.signature) {
            Ok(signature) => signature,
            Err(e) => return bad_request(e.to_string()),
        };

        let diffuser = self
            .peer
            .repository()
            .create(signature, create.class_paths, create.serializer);
        match info(&diffuser) {
            Ok(info) => HttpTransport::json_response(StatusCode::CREATED, &info),
            Err(e) => error_response(e),
        }
    }

    /// `GET /diffusers`
    pub fn list_diffusers(&self) -> HyperResponse {
        let infos: Result<Vec<DiffuserInfo>, DiffusiveError> =
            self.peer.repository().list().iter().map(|d| info(d)).collect();
        match infos {
            Ok(infos) => HttpTransport::json_response(StatusCode::OK, &infos),
            Err(e) => error_response(e),
        }
    }

    /// `GET /diffusers/{signature}`
    pub fn get_diffuser(&self, signature: &str) -> HyperResponse {
        match self.find(signature) {
            Ok(diffuser) => match info(&diffuser) {
                Ok(info) => HttpTransport::json_response(StatusCode::OK, &info),
                Err(e) => error_response(e),
            },
            Err(response) => response,
        }
    }

    /// `DELETE /diffusers/{signature}`
    pub fn delete_diffuser(&self, signature: &str) -> HyperResponse {
        let parsed = match Signature::parse(signature) {
            Ok(parsed) => parsed,
            Err(e) => return bad_request(e.to_string()),
        };
        match self.peer.repository().remove(&parsed) {
            Some(_) => HttpTransport::empty_response(StatusCode::NO_CONTENT),
            None => not_found(format!("No diffuser for {}", signature)),
        }
    }

    /// `POST /diffusers/{signature}`
    ///
    /// Accepts the invocation and answers immediately with the location of
    /// its result.
    pub fn execute(&self, signature: &str, body: &Bytes) -> HyperResponse {
        let diffuser = match self.find(signature) {
            Ok(diffuser) => diffuser,
            Err(response) => return response,
        };
        let request = match HttpTransport::parse_invocation(body) {
            Ok(request) => request,
            Err(e) => return bad_request(format!("Malformed invocation: {}", e)),
        };
        let request_id = request.request_id().to_string();
        debug!("Received {} for {}", request_id, diffuser.key());

        if let Err(e) = diffuser.submit(request) {
            return error_response(e);
        }

        match HttpTransport::result_location(diffuser.key(), &request_id) {
            Ok(result_location) => HttpTransport::json_response(
                StatusCode::ACCEPTED,
                &ExecuteResponse {
                    signature: diffuser.key().to_string(),
                    request_id,
                    result_location,
                },
            ),
            Err(e) => error_response(e),
        }
    }

    /// `GET /diffusers/{signature}/{request_id}`
    ///
    /// 200 with the result once done, 202 while running, 404 if unknown.
    pub fn result(&self, signature: &str, request_id: &str) -> HyperResponse {
        match self.entry(signature, request_id) {
            Some(handle) => match handle.try_result() {
                Some(result) => HttpTransport::json_response(StatusCode::OK, &*result),
                None => HttpTransport::empty_response(StatusCode::ACCEPTED),
            },
            None => not_found(format!("No result {} for {}", request_id, signature)),
        }
    }

    /// `HEAD /diffusers/{signature}/{request_id}`
    ///
    /// 200 once done, 204 while running, 404 if unknown.
    pub fn result_status(&self, signature: &str, request_id: &str) -> HyperResponse {
        match self.entry(signature, request_id) {
            Some(handle) if handle.is_done() => HttpTransport::empty_response(StatusCode::OK),
            Some(_) => HttpTransport::empty_response(StatusCode::NO_CONTENT),
            None => HttpTransport::empty_response(StatusCode::NOT_FOUND),
        }
    }

    /// `GET /classpath/{class_name}`
    ///
    /// # Arguments
    ///
    /// * `class_name` - Fully-qualified name of the requested code
    /// * `hops` - Raw hop header, if the caller sent one; absent means this
    ///   peer's own budget. A caller can lower the budget but never raise it
    ///   above this peer's own.
    pub async fn class_bytes(&self, class_name: &str, hops: Option<&str>) -> HyperResponse {
        let code_source = self.peer.code_source();
        let hops = match hops {
            None => code_source.hops(),
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(hops) => hops.min(code_source.hops()),
                Err(_) => return bad_request(format!("Invalid hop count '{}'", raw)),
            },
        };

        match code_source.get_bytes_with_hops(class_name, hops).await {
            Ok(bytes) => HttpTransport::bytes_response(Bytes::copy_from_slice(&bytes)),
            Err(e) => error_response(e),
        }
    }

    fn find(&self, signature: &str) -> Result<Arc<Diffuser>, HyperResponse> {
        let parsed = Signature::parse(signature).map_err(|e| bad_request(e.to_string()))?;
        self.peer
            .repository()
            .get(&parsed)
            .ok_or_else(|| not_found(format!("No diffuser for {}", signature)))
    }

    /// Cached handle for `request_id`, if it was accepted by `signature`.
    fn entry(&self, signature: &str, request_id: &str) -> Option<diffusive_core::InvocationHandle> {
        let key = Signature::parse(signature).ok()?.key();
        self.peer
            .results()
            .get(request_id)
            .filter(|entry| entry.signature == key)
            .map(|entry| entry.handle)
    }
}

fn info(diffuser: &Diffuser) -> Result<DiffuserInfo, DiffusiveError> {
    Ok(DiffuserInfo {
        signature: diffuser.key().to_string(),
        class_paths: diffuser.class_paths().to_vec(),
        serializer: diffuser.serializer(),
        location: HttpTransport::diffuser_location(diffuser.key())?,
    })
}

fn bad_request(detail: impl Into<String>) -> HyperResponse {
    HttpTransport::text_response(StatusCode::BAD_REQUEST, detail)
}

fn not_found(detail: impl Into<String>) -> HyperResponse {
    HttpTransport::text_response(StatusCode::NOT_FOUND, detail)
}

fn error_response(error: DiffusiveError) -> HyperResponse {
    match error {
        DiffusiveError::InvalidRequest(_) => bad_request(error.to_string()),
        DiffusiveError::CodeNotFound(_) => not_found(error.to_string()),
        other => {
            warn!("Request failed: {}", other);
            HttpTransport::text_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}
