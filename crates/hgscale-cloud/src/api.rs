//! Cloud API traits consumed by the pipeline stages.

use async_trait::async_trait;

use crate::error::CloudResult;
use crate::types::{GroupDescription, InstanceDetails, InstanceId};

/// The elastic instance group.
#[async_trait]
pub trait InstanceGroupApi: Send + Sync {
    /// Membership, desired capacity and per-instance health.
    async fn describe_group(&self, name: &str) -> CloudResult<GroupDescription>;

    /// Set or clear the group's scale-in protection flag on `instance_ids`.
    async fn set_scale_in_protection(
        &self,
        name: &str,
        instance_ids: &[InstanceId],
        protected: bool,
    ) -> CloudResult<()>;

    /// Remove `instance_ids` from the group without terminating them.
    async fn detach_instances(
        &self,
        name: &str,
        instance_ids: &[InstanceId],
        decrement_desired_capacity: bool,
    ) -> CloudResult<()>;
}

/// The compute service behind the group.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Describe instances. Unknown ids are absent from the result.
    async fn describe_instances(&self, instance_ids: &[InstanceId])
    -> CloudResult<Vec<InstanceDetails>>;

    /// Enable or disable termination protection on one instance.
    async fn set_termination_protection(&self, instance_id: &str, enabled: bool)
    -> CloudResult<()>;

    async fn terminate_instances(&self, instance_ids: &[InstanceId]) -> CloudResult<()>;
}
