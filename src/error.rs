use thiserror::Error;

/// Success sentinel carried in the `code` field of every proxy envelope.
pub const PROXY_OK: i64 = 200;

#[derive(Debug, Error)]
pub enum DbProxyError {
    /// The proxy answered with a non-success code; `msg` is its reason, verbatim.
    #[error("Remote error ({code}): {msg}")]
    RemoteError { code: i64, msg: String },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Row shape mismatch: expected {expected} columns, got {actual}")]
    ShapeError { expected: usize, actual: usize },

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DbProxyError {
    pub(crate) fn remote(code: i64, msg: impl Into<String>) -> Self {
        DbProxyError::RemoteError {
            code,
            msg: msg.into(),
        }
    }

    /// `true` when the proxy itself rejected the action, as opposed to a local or transport failure.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, DbProxyError::RemoteError { .. })
    }
}

impl From<serde_json::Error> for DbProxyError {
    fn from(err: serde_json::Error) -> Self {
        DbProxyError::DecodeError(err.to_string())
    }
}
