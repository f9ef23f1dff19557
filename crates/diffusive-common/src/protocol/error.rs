use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffusiveError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Code not found: {0}")]
    CodeNotFound(String),

    #[error("Target execution error: {0}")]
    TargetExecution(String),

    #[error("Dispatch to {endpoint} failed: {reason}")]
    Dispatch { endpoint: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Key-value serialization error: {0}")]
    KeyValueSerialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiffusiveError {
    /// Returns `true` for failures reaching a remote candidate.
    ///
    /// These errors move dispatch on to the next candidate endpoint and,
    /// once every candidate has failed, to local execution. Everything else
    /// (a malformed request, a decode failure of our own values) would fail
    /// the same way on any peer.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            DiffusiveError::Dispatch { .. }
                | DiffusiveError::Transport(_)
                | DiffusiveError::Timeout(_)
                | DiffusiveError::InvalidResponse(_)
                | DiffusiveError::Io(_)
        )
    }
}

impl From<toml::ser::Error> for DiffusiveError {
    fn from(err: toml::ser::Error) -> Self {
        DiffusiveError::KeyValueSerialization(err.to_string())
    }
}

impl From<toml::de::Error> for DiffusiveError {
    fn from(err: toml::de::Error) -> Self {
        DiffusiveError::KeyValueSerialization(err.to_string())
    }
}

impl From<url::ParseError> for DiffusiveError {
    fn from(err: url::ParseError) -> Self {
        DiffusiveError::InvalidRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiffusiveError>;
