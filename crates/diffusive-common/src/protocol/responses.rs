//! Invocation results and HTTP message bodies
//!
//! This module defines the outcome of an invocation, [`InvocationResult`],
//! and the small JSON documents exchanged by the diffuser resources.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::blob;
use super::error::{DiffusiveError, Result};
use super::requests::RequestId;
use crate::serializer::SerializerKind;

/// Whether an invocation produced a value or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Ok,
    Error,
}

/// The outcome of an invocation, local or remote.
///
/// `result_value` is present iff the status is `Ok` and `error_detail` is
/// present iff the status is `Error`. Both constructors and the wire
/// decoder enforce this.
///
/// # Example
///
/// ```
/// use diffusive_common::protocol::InvocationResult;
///
/// let ok = InvocationResult::ok("req-1", "i64", b"15".to_vec());
/// assert!(ok.is_ok());
///
/// let failed = InvocationResult::error("req-2", "i64", "division by zero");
/// assert_eq!(failed.error_detail(), Some("division by zero"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireInvocationResult")]
pub struct InvocationResult {
    request_id: RequestId,
    status: InvocationStatus,
    result_type: String,
    #[serde(with = "blob::option_bytes", skip_serializing_if = "Option::is_none", default)]
    result_value: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    error_detail: Option<String>,
}

#[derive(Deserialize)]
struct WireInvocationResult {
    request_id: RequestId,
    status: InvocationStatus,
    result_type: String,
    #[serde(with = "blob::option_bytes", default)]
    result_value: Option<Vec<u8>>,
    #[serde(default)]
    error_detail: Option<String>,
}

impl TryFrom<WireInvocationResult> for InvocationResult {
    type Error = DiffusiveError;

    fn try_from(wire: WireInvocationResult) -> Result<Self> {
        match (wire.status, wire.result_value, wire.error_detail) {
            (InvocationStatus::Ok, Some(value), None) => {
                Ok(Self::ok(wire.request_id, wire.result_type, value))
            }
            (InvocationStatus::Error, None, Some(detail)) => {
                Ok(Self::error(wire.request_id, wire.result_type, detail))
            }
            (status, value, detail) => Err(DiffusiveError::InvalidResponse(format!(
                "Result {} has status {:?} with value present: {}, error present: {}",
                wire.request_id,
                status,
                value.is_some(),
                detail.is_some()
            ))),
        }
    }
}

impl InvocationResult {
    /// A successful result carrying an encoded value.
    pub fn ok(request_id: impl Into<RequestId>, result_type: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            request_id: request_id.into(),
            status: InvocationStatus::Ok,
            result_type: result_type.into(),
            result_value: Some(value),
            error_detail: None,
        }
    }

    /// A failed result carrying a textual detail.
    pub fn error(
        request_id: impl Into<RequestId>,
        result_type: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            status: InvocationStatus::Error,
            result_type: result_type.into(),
            result_value: None,
            error_detail: Some(detail.into()),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn status(&self) -> InvocationStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == InvocationStatus::Ok
    }

    pub fn result_type(&self) -> &str {
        &self.result_type
    }

    pub fn result_value(&self) -> Option<&[u8]> {
        self.result_value.as_deref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Decodes the result value with the serializer the request used.
    ///
    /// # Errors
    ///
    /// `TargetExecution` carrying the error detail when the invocation
    /// failed, or the codec error when the value does not decode as `T`.
    pub fn decode<T: DeserializeOwned>(&self, serializer: SerializerKind) -> Result<T> {
        match (&self.result_value, &self.error_detail) {
            (Some(value), _) => serializer.decode(value),
            (None, detail) => Err(DiffusiveError::TargetExecution(
                detail.clone().unwrap_or_default(),
            )),
        }
    }
}

/// Body of `PUT /diffusers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDiffuserRequest {
    /// Signature key, `Type:method(A,B)`
    pub signature: String,
    /// Classpath URIs the peer may fetch missing code from
    #[serde(default)]
    pub class_paths: Vec<String>,
    #[serde(default)]
    pub serializer: SerializerKind,
}

/// Description of a diffuser hosted by a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffuserInfo {
    pub signature: String,
    pub class_paths: Vec<String>,
    pub serializer: SerializerKind,
    /// Path of the diffuser resource relative to the peer's base URI
    pub location: String,
}

/// Body returned by `POST /diffusers/{signature}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub signature: String,
    pub request_id: RequestId,
    /// Path the result can be polled at, relative to the peer's base URI
    pub result_location: String,
}
