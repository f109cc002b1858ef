//! Cloud API error types.

use thiserror::Error;

pub type CloudResult<T> = Result<T, CloudError>;

#[derive(Debug, Clone, Error)]
pub enum CloudError {
    #[error("instance group not found: {0}")]
    GroupNotFound(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("{operation} failed: {message}")]
    Api { operation: String, message: String },
}

impl CloudError {
    pub fn api(operation: &str, message: impl Into<String>) -> Self {
        CloudError::Api {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}
