//! Diffusive peer client
//!
//! [`DiffuserClient`] speaks the peer HTTP protocol: it creates and manages
//! diffusers on remote peers, submits invocations, polls their results and
//! fetches code bytes from classpath resources. It implements both transport
//! traits from `diffusive_common`, so the diffusion engine can dispatch
//! through it directly.

pub mod client;

pub use client::{ClientConfig, DiffuserClient, ResultPoll};
