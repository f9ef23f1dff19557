//! Value serializers
//!
//! Target objects, arguments and results travel between peers as opaque
//! byte blobs. Which codec produced a blob is recorded next to it as a
//! [`SerializerKind`], so a peer decodes with the same codec the caller used.
//!
//! Three codecs are available:
//! - **binary**: compact `postcard` encoding
//! - **json**: structured text via `serde_json`
//! - **key-value**: a TOML table; scalars are wrapped as `value = ...` since
//!   a TOML document must be a table at the top level
//!
//! # Example
//!
//! ```
//! use diffusive_common::serializer::SerializerKind;
//!
//! let kind = SerializerKind::Json;
//! let bytes = kind.encode(&vec![1, 2, 3]).unwrap();
//! let decoded: Vec<i32> = kind.decode(&bytes).unwrap();
//! assert_eq!(decoded, vec![1, 2, 3]);
//! ```

use serde::de::value::UnitDeserializer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::protocol::error::{DiffusiveError, Result};

/// Tag selecting the codec that encoded a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SerializerKind {
    /// `postcard` binary encoding
    Binary,
    /// JSON text
    #[default]
    Json,
    /// TOML key-value table
    KeyValue,
}

impl SerializerKind {
    /// Encode a value with this codec.
    ///
    /// # Arguments
    ///
    /// * `value` - Any serde-serializable value
    ///
    /// # Returns
    ///
    /// The encoded bytes
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializerKind::Binary => BinarySerializer::encode(value),
            SerializerKind::Json => JsonSerializer::encode(value),
            SerializerKind::KeyValue => KeyValueSerializer::encode(value),
        }
    }

    /// Decode a value with this codec.
    ///
    /// # Arguments
    ///
    /// * `data` - Bytes previously produced by [`SerializerKind::encode`]
    ///   with the same kind
    ///
    /// # Returns
    ///
    /// The decoded value
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            SerializerKind::Binary => BinarySerializer::decode(data),
            SerializerKind::Json => JsonSerializer::decode(data),
            SerializerKind::KeyValue => KeyValueSerializer::decode(data),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SerializerKind::Binary => "binary",
            SerializerKind::Json => "json",
            SerializerKind::KeyValue => "key-value",
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SerializerKind {
    type Err = DiffusiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binary" => Ok(SerializerKind::Binary),
            "json" => Ok(SerializerKind::Json),
            "key-value" | "key_value" | "keyvalue" => Ok(SerializerKind::KeyValue),
            other => Err(DiffusiveError::InvalidRequest(format!("Unknown serializer '{}'", other))),
        }
    }
}

/// Binary codec backed by `postcard`.
///
/// Not self-describing: the reader must know the exact type, which the
/// type names carried in every request provide.
pub struct BinarySerializer;

impl BinarySerializer {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(postcard::from_bytes(data)?)
    }
}

/// Structured-text codec backed by `serde_json`.
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Key-value codec backed by `toml`.
///
/// Every value is stored under a single `value` key so that scalars and
/// sequences encode as well as structs do.
pub struct KeyValueSerializer;

#[derive(Serialize)]
struct Wrapped<'a, T: ?Sized> {
    value: &'a T,
}

#[derive(Deserialize)]
struct Unwrapped<T> {
    value: T,
}

impl KeyValueSerializer {
    /// Encodes `value` under the `value` key.
    ///
    /// TOML has no null, so unit and `None` encode as an empty document.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        match toml::to_string(&Wrapped { value }) {
            Ok(text) => Ok(text.into_bytes()),
            Err(e) => match serde_json::to_value(value) {
                Ok(serde_json::Value::Null) => Ok(Vec::new()),
                _ => Err(e.into()),
            },
        }
    }

    /// Decodes a document produced by [`KeyValueSerializer::encode`].
    ///
    /// A document without a `value` key decodes as unit, or as `None`.
    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        let text = std::str::from_utf8(data)
            .map_err(|e| DiffusiveError::KeyValueSerialization(format!("Not UTF-8: {}", e)))?;
        let table: toml::Table = toml::from_str(text)?;
        if !table.contains_key("value") {
            let unit = UnitDeserializer::<serde::de::value::Error>::new();
            return T::deserialize(unit).map_err(|e| DiffusiveError::KeyValueSerialization(e.to_string()));
        }
        let wrapped: Unwrapped<T> = toml::from_str(text)?;
        Ok(wrapped.value)
    }
}
