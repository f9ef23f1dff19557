pub mod blob;
pub mod error;
pub mod requests;
pub mod responses;
pub mod signature;

#[cfg(test)]
mod tests;

pub use error::{DiffusiveError, Result};
pub use requests::{generate_request_id, InvocationRequest, InvocationRequestBuilder, RequestId, UNIT_TYPE};
pub use responses::{
    CreateDiffuserRequest, DiffuserInfo, ExecuteResponse, InvocationResult, InvocationStatus,
};
pub use signature::Signature;
