//! Scale stage: decide which cluster hosts to evacuate.
//!
//! # Decision
//!
//! ```text
//! hosts_list (+ disks_list for backends)
//!   → join drives onto hosts
//!   → inactive = state INACTIVE            (membership irrelevant)
//!     members  = not INACTIVE ∧ instance in group
//!   → order members
//!   → overflow = |members| − desired
//!   → first `overflow` members: deactivate drives, then the host
//!   → every inactive host: remove host, then its drives
//!   → orphan drives (no host, INACTIVE): remove
//! ```
//!
//! Only the two inventory reads are fatal. Every evacuation call that
//! fails is recorded as a transient error and the stage moves on.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use hgscale_protocol::{
    ExplicitRemoval, HostGroupSnapshot, Role, ScaleDecision, ScaleHost, TransientErrors,
};
use hgscale_rpc::{ClientFactory, Drive, DriveId, DriveList, Host, HostId, HostList, RpcPool};

use crate::error::PipelineResult;

const INACTIVE: &str = "INACTIVE";
const FAILED: &str = "FAILED";

/// A cluster host with its drives attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterHost {
    pub id: HostId,
    pub host: Host,
    /// Ordered by drive id.
    pub drives: Vec<(DriveId, Drive)>,
}

impl ClusterHost {
    pub fn instance_id(&self) -> &str {
        self.host.instance_id()
    }

    pub fn is_inactive(&self) -> bool {
        self.host.state == INACTIVE
    }

    /// Some drive is already being phased out.
    pub fn is_mid_eviction(&self) -> bool {
        self.drives.iter().any(|(_, d)| !d.should_be_active)
    }

    pub fn not_yet_active_drives(&self) -> usize {
        self.drives
            .iter()
            .filter(|(_, d)| d.status == INACTIVE || d.status == FAILED)
            .count()
    }

    /// True for hosts without drives.
    pub fn all_drives_inactive(&self) -> bool {
        self.drives.iter().all(|(_, d)| d.status == INACTIVE)
    }
}

/// Attach every drive to its host. Drives whose host is not listed are
/// left out; hosts come back ordered by id.
pub fn join_inventory(hosts: HostList, drives: &DriveList) -> Vec<ClusterHost> {
    let mut joined: Vec<ClusterHost> = hosts
        .into_iter()
        .map(|(id, host)| {
            let mut host_drives: Vec<(DriveId, Drive)> = drives
                .iter()
                .filter(|(_, d)| d.host_id == id)
                .map(|(drive_id, d)| (drive_id.clone(), d.clone()))
                .collect();
            host_drives.sort_by(|(a, _), (b, _)| {
                a.value().cmp(&b.value()).then_with(|| a.to_string().cmp(&b.to_string()))
            });
            ClusterHost {
                id,
                host,
                drives: host_drives,
            }
        })
        .collect();
    joined.sort_by(|a, b| by_host_id(&a.id, &b.id));
    joined
}

fn by_host_id(a: &HostId, b: &HostId) -> Ordering {
    a.value()
        .cmp(&b.value())
        .then_with(|| a.as_str().cmp(b.as_str()))
}

/// Split hosts into `(inactive, members)`. Hosts that are neither are
/// foreign or still joining and are ignored.
pub fn partition(
    hosts: Vec<ClusterHost>,
    snapshot: &HostGroupSnapshot,
) -> (Vec<ClusterHost>, Vec<ClusterHost>) {
    let mut inactive = Vec::new();
    let mut members = Vec::new();
    for host in hosts {
        if host.is_inactive() {
            inactive.push(host);
        } else if snapshot.contains_instance(host.instance_id()) {
            members.push(host);
        } else {
            debug!(host_id = %host.id, instance_id = host.instance_id(), "ignoring host outside the group");
        }
    }
    (inactive, members)
}

/// Eviction order: hosts with no drive being phased out first, then
/// fewer INACTIVE/FAILED drives, then oldest.
pub fn order_members(members: &mut [ClusterHost]) {
    members.sort_by(|a, b| {
        a.is_mid_eviction()
            .cmp(&b.is_mid_eviction())
            .then_with(|| a.not_yet_active_drives().cmp(&b.not_yet_active_drives()))
            .then_with(|| a.host.added_time.cmp(&b.host.added_time))
            .then_with(|| by_host_id(&a.id, &b.id))
    });
}

/// Number of members above the desired capacity.
pub fn overflow(members: usize, desired_capacity: u32) -> usize {
    members.saturating_sub(desired_capacity as usize)
}

pub async fn scale(
    snapshot: &HostGroupSnapshot,
    factory: Arc<dyn ClientFactory>,
) -> PipelineResult<ScaleDecision> {
    let pool = RpcPool::new(snapshot.private_ips.clone(), factory);

    let hosts = pool.hosts_list().await?;
    let drives = match snapshot.role {
        Role::Backend => pool.drives_list().await?,
        Role::Client => DriveList::new(),
    };
    debug!(hosts = hosts.len(), drives = drives.len(), "cluster inventory");

    let (inactive, mut members) = partition(join_inventory(hosts, &drives), snapshot);
    order_members(&mut members);

    let to_deactivate = overflow(members.len(), snapshot.desired_capacity);
    info!(
        members = members.len(),
        desired = snapshot.desired_capacity,
        inactive = inactive.len(),
        "{to_deactivate} hosts set to deactivate"
    );

    let mut errors = TransientErrors::new();
    for host in &members[..to_deactivate] {
        deactivate_host(&pool, host, &mut errors).await;
    }

    let mut to_terminate = Vec::new();
    for host in &inactive {
        if remove_host(&pool, host, &mut errors).await
            && snapshot.contains_instance(host.instance_id())
        {
            to_terminate.push(ExplicitRemoval {
                instance_id: host.instance_id().to_string(),
                private_ip: host.host.host_ip.clone(),
            });
        }
    }
    remove_orphan_drives(&pool, &drives, &mut errors).await;

    let hosts = members
        .iter()
        .map(|h| ScaleHost {
            instance_id: h.instance_id().to_string(),
            state: h.host.state.clone(),
            added_time: h.host.added_time,
            host_id: h.id.to_string(),
        })
        .collect();

    Ok(ScaleDecision {
        hosts,
        to_terminate,
        transient_errors: errors,
    })
}

/// Phase out the host's drives; once they are all inactive, deactivate
/// the host itself.
async fn deactivate_host(pool: &RpcPool, host: &ClusterHost, errors: &mut TransientErrors) {
    info!(host_id = %host.id, instance_id = host.instance_id(), "deactivating host");

    for (drive_id, drive) in host.drives.iter().filter(|(_, d)| d.should_be_active) {
        if let Err(e) = pool.deactivate_drives(&[drive.uuid.as_str()]).await {
            warn!(host_id = %host.id, %drive_id, error = %e, "failed to deactivate drive");
            errors.push("deactivate-drive", format!("{} {drive_id}: {e}", host.id));
        }
    }

    if !host.all_drives_inactive() {
        debug!(host_id = %host.id, "drives still active, host deactivation deferred");
        return;
    }

    pool.drop_endpoint(&host.host.host_ip).await;
    if let Err(e) = pool.deactivate_hosts(&[&host.id], false).await {
        warn!(host_id = %host.id, error = %e, "failed to deactivate host");
        errors.push("deactivate-host", format!("{}: {e}", host.id));
    }
}

/// Remove an INACTIVE host and then its drives. Returns whether the
/// host itself was removed.
async fn remove_host(pool: &RpcPool, host: &ClusterHost, errors: &mut TransientErrors) -> bool {
    info!(host_id = %host.id, instance_id = host.instance_id(), "removing inactive host");

    pool.drop_endpoint(&host.host.host_ip).await;
    if let Err(e) = pool.remove_host(&host.id).await {
        warn!(host_id = %host.id, error = %e, "failed to remove host");
        errors.push("remove-host", format!("{}: {e}", host.id));
        return false;
    }

    for (drive_id, drive) in &host.drives {
        remove_drive(pool, drive_id, drive, errors).await;
    }
    true
}

/// Drives left behind by hosts that no longer exist.
async fn remove_orphan_drives(pool: &RpcPool, drives: &DriveList, errors: &mut TransientErrors) {
    let mut orphans: Vec<(&DriveId, &Drive)> = drives
        .iter()
        .filter(|(_, d)| !d.host_id.is_valid() && d.status == INACTIVE)
        .collect();
    orphans.sort_by_key(|(id, _)| id.value());

    for (drive_id, drive) in orphans {
        remove_drive(pool, drive_id, drive, errors).await;
    }
}

async fn remove_drive(
    pool: &RpcPool,
    drive_id: &DriveId,
    drive: &Drive,
    errors: &mut TransientErrors,
) {
    if let Err(e) = pool.remove_drives(&[drive.uuid.as_str()]).await {
        warn!(%drive_id, error = %e, "failed to remove drive");
        errors.push("remove-drive", format!("{drive_id}: {e}"));
    }
}
