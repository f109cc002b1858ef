//! Fetch stage: snapshot the instance group and read cluster credentials.
//!
//! Every read here is required. Any failure aborts the stage; the next
//! cadence retries from scratch.

use tracing::{debug, info};

use hgscale_cloud::{CloudClients, InstanceState};
use hgscale_protocol::HostGroupSnapshot;
use hgscale_store::CredentialStore;

use crate::config::GroupConfig;
use crate::error::PipelineResult;

pub async fn fetch(
    cloud: &CloudClients,
    store: &CredentialStore,
    group: &GroupConfig,
) -> PipelineResult<HostGroupSnapshot> {
    let description = cloud.groups.describe_group(&group.name).await?;
    let instance_ids = description.instance_ids();

    info!(
        group = %group.name,
        desired = description.desired_capacity,
        members = instance_ids.len(),
        instance_type = description.instance_type().unwrap_or("unknown"),
        "described instance group"
    );

    let private_ips = if instance_ids.is_empty() {
        Vec::new()
    } else {
        cloud
            .compute
            .describe_instances(&instance_ids)
            .await?
            .into_iter()
            .filter(|i| i.state == InstanceState::Running)
            .filter_map(|i| i.private_ip)
            .collect()
    };
    debug!(?private_ips, "member addresses");

    let creds = store.get_credentials()?;

    Ok(HostGroupSnapshot {
        username: creds.username,
        password: creds.password,
        private_ips,
        desired_capacity: description.desired_capacity,
        instance_ids,
        role: group.role,
    })
}
