//! Invocation requests
//!
//! An [`InvocationRequest`] is the marshaled form of one call: which method
//! on which receiver, with which arguments, encoded by which serializer. It
//! is built once per call site invocation and never mutated afterwards;
//! dispatching to a peer derives a new request through
//! [`InvocationRequest::with_base_signature`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blob;
use super::error::{DiffusiveError, Result};
use super::signature::Signature;
use crate::serializer::SerializerKind;

/// Opaque request identifier, unique per call and safe to embed in a URL path.
pub type RequestId = String;

/// Type name used for methods that return nothing.
pub const UNIT_TYPE: &str = "()";

/// A single method invocation, ready to run locally or to ship to a peer.
///
/// The argument types and argument values are index-aligned. That invariant
/// is checked when the request is built and again when it is decoded from
/// the wire, so an `InvocationRequest` value is always well-formed.
///
/// # Example
///
/// ```
/// use diffusive_common::protocol::InvocationRequest;
/// use diffusive_common::serializer::SerializerKind;
///
/// let request = InvocationRequest::builder(SerializerKind::Json, "Counter", "add")
///     .target(&10i64)
///     .argument("i64", &5i64)
///     .returns("i64")
///     .build()
///     .unwrap();
///
/// assert_eq!(request.signature().key(), "Counter:add(i64)");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireInvocationRequest")]
pub struct InvocationRequest {
    request_id: RequestId,
    base_signature: Option<String>,
    target_type: String,
    method_name: String,
    return_type: String,
    #[serde(with = "blob::bytes")]
    target_value: Vec<u8>,
    argument_types: Vec<String>,
    #[serde(with = "blob::bytes_vec")]
    argument_values: Vec<Vec<u8>>,
    serializer: SerializerKind,
}

/// Unvalidated wire shape; converted through [`InvocationRequest::validate`].
#[derive(Deserialize)]
struct WireInvocationRequest {
    request_id: RequestId,
    #[serde(default)]
    base_signature: Option<String>,
    target_type: String,
    method_name: String,
    return_type: String,
    #[serde(with = "blob::bytes")]
    target_value: Vec<u8>,
    argument_types: Vec<String>,
    #[serde(with = "blob::bytes_vec")]
    argument_values: Vec<Vec<u8>>,
    serializer: SerializerKind,
}

impl TryFrom<WireInvocationRequest> for InvocationRequest {
    type Error = DiffusiveError;

    fn try_from(wire: WireInvocationRequest) -> Result<Self> {
        let request = InvocationRequest {
            request_id: wire.request_id,
            base_signature: wire.base_signature,
            target_type: wire.target_type,
            method_name: wire.method_name,
            return_type: wire.return_type,
            target_value: wire.target_value,
            argument_types: wire.argument_types,
            argument_values: wire.argument_values,
            serializer: wire.serializer,
        };
        request.validate()?;
        Ok(request)
    }
}

impl InvocationRequest {
    /// Starts building a request for `target_type::method_name`.
    ///
    /// The serializer is fixed up front because typed values handed to the
    /// builder are encoded immediately.
    pub fn builder(
        serializer: SerializerKind,
        target_type: impl Into<String>,
        method_name: impl Into<String>,
    ) -> InvocationRequestBuilder {
        InvocationRequestBuilder {
            request_id: None,
            base_signature: None,
            target_type: target_type.into(),
            method_name: method_name.into(),
            return_type: UNIT_TYPE.to_string(),
            target_value: Vec::new(),
            argument_types: Vec::new(),
            argument_values: Vec::new(),
            serializer,
            error: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.argument_types.len() != self.argument_values.len() {
            return Err(DiffusiveError::InvalidRequest(format!(
                "{} argument types but {} argument values",
                self.argument_types.len(),
                self.argument_values.len()
            )));
        }
        if self.request_id.is_empty() {
            return Err(DiffusiveError::InvalidRequest("Empty request id".to_string()));
        }
        if self.target_type.is_empty() || self.method_name.is_empty() {
            return Err(DiffusiveError::InvalidRequest(
                "Target type and method name are required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn base_signature(&self) -> Option<&str> {
        self.base_signature.as_deref()
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn target_value(&self) -> &[u8] {
        &self.target_value
    }

    pub fn argument_types(&self) -> &[String] {
        &self.argument_types
    }

    pub fn argument_values(&self) -> &[Vec<u8>] {
        &self.argument_values
    }

    pub fn serializer(&self) -> SerializerKind {
        self.serializer
    }

    /// Signature of the invoked method.
    pub fn signature(&self) -> Signature {
        Signature::new(
            self.target_type.clone(),
            self.method_name.clone(),
            self.argument_types.iter().cloned(),
        )
    }

    /// Copy of this request carrying `signature` as its base signature.
    ///
    /// The request id is kept so the caller and the peer agree on it.
    pub fn with_base_signature(&self, signature: impl Into<String>) -> Self {
        Self {
            base_signature: Some(signature.into()),
            ..self.clone()
        }
    }

    /// Decodes the receiver object.
    pub fn decode_target<T: DeserializeOwned>(&self) -> Result<T> {
        self.serializer.decode(&self.target_value)
    }

    /// Decodes the argument at `index`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when `index` is out of range, or the codec error when
    /// the blob does not decode as `T`.
    pub fn decode_argument<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let bytes = self.argument_values.get(index).ok_or_else(|| {
            DiffusiveError::InvalidRequest(format!(
                "Argument index {} out of range ({} arguments)",
                index,
                self.argument_values.len()
            ))
        })?;
        self.serializer.decode(bytes)
    }
}

/// Builder for [`InvocationRequest`].
///
/// Encoding errors raised while adding typed values are held back and
/// reported by [`InvocationRequestBuilder::build`].
#[derive(Debug)]
pub struct InvocationRequestBuilder {
    request_id: Option<RequestId>,
    base_signature: Option<String>,
    target_type: String,
    method_name: String,
    return_type: String,
    target_value: Vec<u8>,
    argument_types: Vec<String>,
    argument_values: Vec<Vec<u8>>,
    serializer: SerializerKind,
    error: Option<DiffusiveError>,
}

impl InvocationRequestBuilder {
    /// Use a caller-chosen id instead of a generated one.
    pub fn request_id(mut self, id: impl Into<RequestId>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn base_signature(mut self, signature: impl Into<String>) -> Self {
        self.base_signature = Some(signature.into());
        self
    }

    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    /// Encodes the receiver object with the request's serializer.
    pub fn target<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match self.serializer.encode(value) {
            Ok(bytes) => self.target_value = bytes,
            Err(e) => self.record(e),
        }
        self
    }

    pub fn target_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.target_value = bytes;
        self
    }

    /// Appends one argument, encoded with the request's serializer.
    pub fn argument<T: Serialize + ?Sized>(mut self, type_name: impl Into<String>, value: &T) -> Self {
        match self.serializer.encode(value) {
            Ok(bytes) => {
                self.argument_types.push(type_name.into());
                self.argument_values.push(bytes);
            }
            Err(e) => self.record(e),
        }
        self
    }

    /// Appends already-encoded argument types and values.
    ///
    /// The two lists are not required to match here; a mismatch is
    /// reported by `build`.
    pub fn arguments(mut self, types: Vec<String>, values: Vec<Vec<u8>>) -> Self {
        self.argument_types.extend(types);
        self.argument_values.extend(values);
        self
    }

    fn record(&mut self, error: DiffusiveError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Finishes the request.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if argument types and values differ in length or a
    /// required name is empty; otherwise the first encoding error recorded
    /// while building.
    pub fn build(self) -> Result<InvocationRequest> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let request = InvocationRequest {
            request_id: self.request_id.unwrap_or_else(generate_request_id),
            base_signature: self.base_signature,
            target_type: self.target_type,
            method_name: self.method_name,
            return_type: self.return_type,
            target_value: self.target_value,
            argument_types: self.argument_types,
            argument_values: self.argument_values,
            serializer: self.serializer,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Generates a fresh request id.
pub fn generate_request_id() -> RequestId {
    Uuid::new_v4().simple().to_string()
}
