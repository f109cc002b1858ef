//! Transport-agnostic RPC client seam.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RpcResult;

/// Control-plane methods used by the scale-down pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterMethod {
    UserLogin,
    HostsList,
    DrivesList,
    RemoveHost,
    RemoveDrives,
    DeactivateDrives,
    DeactivateHosts,
}

impl ClusterMethod {
    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterMethod::UserLogin => "user_login",
            ClusterMethod::HostsList => "hosts_list",
            ClusterMethod::DrivesList => "disks_list",
            ClusterMethod::RemoveHost => "cluster-remove-host",
            ClusterMethod::RemoveDrives => "cluster-remove-drives",
            ClusterMethod::DeactivateDrives => "cluster-deactivate-drives",
            ClusterMethod::DeactivateHosts => "cluster-deactivate-hosts",
        }
    }
}

impl fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client bound to a single cluster endpoint.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Invoke `method` with JSON `params` and return the raw JSON result.
    async fn call(&self, method: ClusterMethod, params: Value) -> RpcResult<Value>;
}

/// Builds clients for endpoints picked by the pool.
pub trait ClientFactory: Send + Sync {
    fn build(&self, endpoint: &str) -> Arc<dyn RpcClient>;
}
