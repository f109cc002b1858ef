//! Typed control-plane calls on top of [`RpcPool`].

use serde_json::json;

use crate::client::ClusterMethod;
use crate::error::{RpcError, RpcResult};
use crate::inventory::{DriveList, HostId, HostList};
use crate::pool::RpcPool;

impl RpcPool {
    pub async fn hosts_list(&self) -> RpcResult<HostList> {
        let value = self.call(ClusterMethod::HostsList, json!({})).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
    }

    pub async fn drives_list(&self) -> RpcResult<DriveList> {
        let value = self.call(ClusterMethod::DrivesList, json!({})).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
    }

    pub async fn remove_host(&self, host_id: &HostId) -> RpcResult<()> {
        self.call(
            ClusterMethod::RemoveHost,
            json!({ "host_id": host_id.value() }),
        )
        .await?;
        Ok(())
    }

    pub async fn deactivate_drives(&self, drive_uuids: &[&str]) -> RpcResult<()> {
        self.call(
            ClusterMethod::DeactivateDrives,
            json!({ "drive_uuids": drive_uuids }),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_drives(&self, drive_uuids: &[&str]) -> RpcResult<()> {
        self.call(
            ClusterMethod::RemoveDrives,
            json!({ "drive_uuids": drive_uuids }),
        )
        .await?;
        Ok(())
    }

    pub async fn deactivate_hosts(
        &self,
        host_ids: &[&HostId],
        skip_resource_validation: bool,
    ) -> RpcResult<()> {
        let ids: Vec<&str> = host_ids.iter().map(|id| id.as_str()).collect();
        self.call(
            ClusterMethod::DeactivateHosts,
            json!({
                "host_ids": ids,
                "skip_resource_validation": skip_resource_validation,
            }),
        )
        .await?;
        Ok(())
    }
}
