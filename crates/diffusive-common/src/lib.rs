//! Diffusive Common Types and Transport
//!
//! This crate provides the wire protocol, value serializers and transport
//! seams shared by every diffusive peer.
//!
//! # Overview
//!
//! Diffusive lets a caller invoke a method and have it run either in-process
//! or on a remote peer, chosen by current load. Everything that crosses a
//! process boundary is defined here:
//!
//! - **Protocol Layer**: [`InvocationRequest`], [`InvocationResult`],
//!   [`Signature`] and the error type
//! - **Serializers**: binary, JSON and key-value codecs for target objects,
//!   arguments and results
//! - **Transport Layer**: the traits the engine dispatches through, and the
//!   HTTP resource layout
//!
//! # Example
//!
//! ```
//! use diffusive_common::{InvocationRequest, InvocationResult, SerializerKind};
//!
//! let request = InvocationRequest::builder(SerializerKind::Json, "Counter", "add")
//!     .target(&10i64)
//!     .argument("i64", &5i64)
//!     .returns("i64")
//!     .build()
//!     .unwrap();
//!
//! let value = SerializerKind::Json.encode(&15i64).unwrap();
//! let result = InvocationResult::ok(request.request_id(), "i64", value);
//! assert_eq!(result.decode::<i64>(request.serializer()).unwrap(), 15);
//! ```

pub mod protocol;
pub mod serializer;
pub mod transport;

pub use protocol::*;
pub use serializer::SerializerKind;
