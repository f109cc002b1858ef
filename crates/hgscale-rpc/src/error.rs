//! RPC error types.

use thiserror::Error;

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The endpoint could not be reached. The pool fails over on this.
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("{method} on {endpoint} timed out")]
    Timeout { endpoint: String, method: String },

    #[error("http error: {0}")]
    Http(String),

    /// The control plane answered with a JSON-RPC error object.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("no cluster endpoints left in the pool")]
    NoEndpoints,
}

impl RpcError {
    /// Whether the endpoint itself is unreachable.
    pub fn is_connect(&self) -> bool {
        matches!(self, RpcError::Connect { .. })
    }
}
