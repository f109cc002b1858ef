use hgscale_cloud::CloudError;
use hgscale_rpc::RpcError;
use hgscale_store::StoreError;

/// Fatal pipeline failures.
///
/// Per-item failures are never returned as errors; they travel as
/// strings in `TransientErrors` until the Transient stage turns them
/// into [`PipelineError::Transient`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("cloud error: {0}")]
    Cloud(CloudError),

    #[error("cluster rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("instance group not found: {0}")]
    GroupNotFound(String),

    #[error("{0}")]
    Transient(String),
}

impl From<CloudError> for PipelineError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::GroupNotFound(name) => PipelineError::GroupNotFound(name),
            other => PipelineError::Cloud(other),
        }
    }
}

impl PipelineError {
    /// Whether this is the aggregated soft-failure signal rather than a
    /// hard stage failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Transient(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
