//! In-memory cloud backend.
//!
//! Holds a fleet description (groups and instances) and applies the
//! same rules the real services enforce where the pipeline depends on
//! them: terminating a termination-protected instance fails, unknown
//! instance ids are absent from describe results, detaching removes the
//! instance from the group. Faults can be injected per operation.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ComputeApi, InstanceGroupApi};
use crate::error::{CloudError, CloudResult};
use crate::types::*;

/// A member of an instance group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub instance_id: InstanceId,
    #[serde(default)]
    pub health_status: HealthStatus,
    #[serde(default)]
    pub protected_from_scale_in: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    pub desired_capacity: u32,
    #[serde(default)]
    pub members: Vec<GroupMember>,
}

/// Serializable fleet description (the `--cloud-state` file format).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetState {
    #[serde(default)]
    pub groups: BTreeMap<String, GroupState>,
    #[serde(default)]
    pub instances: BTreeMap<InstanceId, InstanceDetails>,
}

#[derive(Debug, Default)]
struct Faults {
    describe_group: Option<String>,
    describe_instances: Option<String>,
    scale_in: Option<String>,
    detach: Option<String>,
    terminate: Option<String>,
    protection: HashSet<InstanceId>,
}

/// Both cloud APIs over an in-process fleet.
#[derive(Debug, Default)]
pub struct MemoryCloud {
    fleet: Mutex<FleetState>,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fault(slot: &Option<String>, operation: &str) -> CloudResult<()> {
    match slot {
        Some(message) => Err(CloudError::api(operation, message.clone())),
        None => Ok(()),
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: FleetState) -> Self {
        Self {
            fleet: Mutex::new(state),
            ..Default::default()
        }
    }

    /// Load a fleet description from a JSON file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: FleetState = serde_json::from_str(&content).map_err(std::io::Error::other)?;
        Ok(Self::from_state(state))
    }

    /// Write the current fleet description back to a JSON file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&*lock(&self.fleet))
            .map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    // ── Fleet setup ───────────────────────────────────────────────

    pub fn add_group(&self, name: &str, desired_capacity: u32) {
        lock(&self.fleet).groups.insert(
            name.to_string(),
            GroupState {
                desired_capacity,
                members: Vec::new(),
            },
        );
    }

    pub fn set_desired_capacity(&self, group: &str, desired_capacity: u32) {
        if let Some(g) = lock(&self.fleet).groups.get_mut(group) {
            g.desired_capacity = desired_capacity;
        }
    }

    /// Launch a running, fully protected instance into `group`.
    pub fn launch(
        &self,
        group: &str,
        instance_id: &str,
        private_ip: &str,
        launch_time: DateTime<Utc>,
    ) {
        let mut fleet = lock(&self.fleet);
        fleet.instances.insert(
            instance_id.to_string(),
            InstanceDetails {
                instance_id: instance_id.to_string(),
                state: InstanceState::Running,
                launch_time,
                private_ip: Some(private_ip.to_string()),
                instance_type: "i3en.2xlarge".to_string(),
                termination_protected: true,
            },
        );
        if let Some(g) = fleet.groups.get_mut(group) {
            g.members.push(GroupMember {
                instance_id: instance_id.to_string(),
                health_status: HealthStatus::Healthy,
                protected_from_scale_in: true,
            });
        }
    }

    pub fn set_health(&self, instance_id: &str, health: HealthStatus) {
        for group in lock(&self.fleet).groups.values_mut() {
            for member in group.members.iter_mut().filter(|m| m.instance_id == instance_id) {
                member.health_status = health;
            }
        }
    }

    pub fn set_scale_in_protected(&self, instance_id: &str, protected: bool) {
        for group in lock(&self.fleet).groups.values_mut() {
            for member in group.members.iter_mut().filter(|m| m.instance_id == instance_id) {
                member.protected_from_scale_in = protected;
            }
        }
    }

    pub fn set_state(&self, instance_id: &str, state: InstanceState) {
        if let Some(i) = lock(&self.fleet).instances.get_mut(instance_id) {
            i.state = state;
        }
    }

    /// Drop the compute record while leaving group membership intact.
    pub fn forget_instance(&self, instance_id: &str) {
        lock(&self.fleet).instances.remove(instance_id);
    }

    // ── Fault injection ───────────────────────────────────────────

    pub fn fail_describe_group(&self, message: &str) {
        lock(&self.faults).describe_group = Some(message.to_string());
    }

    pub fn fail_describe_instances(&self, message: &str) {
        lock(&self.faults).describe_instances = Some(message.to_string());
    }

    pub fn fail_scale_in_protection(&self, message: &str) {
        lock(&self.faults).scale_in = Some(message.to_string());
    }

    pub fn fail_detach(&self, message: &str) {
        lock(&self.faults).detach = Some(message.to_string());
    }

    pub fn fail_terminate(&self, message: &str) {
        lock(&self.faults).terminate = Some(message.to_string());
    }

    pub fn fail_termination_protection(&self, instance_id: &str) {
        lock(&self.faults).protection.insert(instance_id.to_string());
    }

    // ── Inspection ────────────────────────────────────────────────

    pub fn snapshot(&self) -> FleetState {
        lock(&self.fleet).clone()
    }

    pub fn instance(&self, instance_id: &str) -> Option<InstanceDetails> {
        lock(&self.fleet).instances.get(instance_id).cloned()
    }

    pub fn members(&self, group: &str) -> Vec<InstanceId> {
        lock(&self.fleet)
            .groups
            .get(group)
            .map(|g| g.members.iter().map(|m| m.instance_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Every API call made so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: String) {
        debug!(%call, "memory cloud call");
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl InstanceGroupApi for MemoryCloud {
    async fn describe_group(&self, name: &str) -> CloudResult<GroupDescription> {
        self.record(format!("describe_group {name}"));
        fault(&lock(&self.faults).describe_group, "DescribeAutoScalingGroups")?;

        let fleet = lock(&self.fleet);
        let group = fleet
            .groups
            .get(name)
            .ok_or_else(|| CloudError::GroupNotFound(name.to_string()))?;

        let instances = group
            .members
            .iter()
            .map(|m| GroupInstance {
                instance_id: m.instance_id.clone(),
                health_status: m.health_status,
                protected_from_scale_in: m.protected_from_scale_in,
                instance_type: fleet
                    .instances
                    .get(&m.instance_id)
                    .map(|i| i.instance_type.clone())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(GroupDescription {
            name: name.to_string(),
            desired_capacity: group.desired_capacity,
            instances,
        })
    }

    async fn set_scale_in_protection(
        &self,
        name: &str,
        instance_ids: &[InstanceId],
        protected: bool,
    ) -> CloudResult<()> {
        self.record(format!(
            "set_scale_in_protection {}={protected}",
            instance_ids.join(",")
        ));
        fault(&lock(&self.faults).scale_in, "SetInstanceProtection")?;

        let mut fleet = lock(&self.fleet);
        let group = fleet
            .groups
            .get_mut(name)
            .ok_or_else(|| CloudError::GroupNotFound(name.to_string()))?;

        if let Some(missing) = instance_ids
            .iter()
            .find(|id| !group.members.iter().any(|m| &m.instance_id == *id))
        {
            return Err(CloudError::api(
                "SetInstanceProtection",
                format!("instance {missing} is not part of {name}"),
            ));
        }
        for member in group
            .members
            .iter_mut()
            .filter(|m| instance_ids.contains(&m.instance_id))
        {
            member.protected_from_scale_in = protected;
        }
        Ok(())
    }

    async fn detach_instances(
        &self,
        name: &str,
        instance_ids: &[InstanceId],
        decrement_desired_capacity: bool,
    ) -> CloudResult<()> {
        self.record(format!("detach {}", instance_ids.join(",")));
        fault(&lock(&self.faults).detach, "DetachInstances")?;

        let mut fleet = lock(&self.fleet);
        let group = fleet
            .groups
            .get_mut(name)
            .ok_or_else(|| CloudError::GroupNotFound(name.to_string()))?;

        let before = group.members.len();
        group.members.retain(|m| !instance_ids.contains(&m.instance_id));
        let detached = (before - group.members.len()) as u32;
        if decrement_desired_capacity {
            group.desired_capacity = group.desired_capacity.saturating_sub(detached);
        }
        Ok(())
    }
}

#[async_trait]
impl ComputeApi for MemoryCloud {
    async fn describe_instances(
        &self,
        instance_ids: &[InstanceId],
    ) -> CloudResult<Vec<InstanceDetails>> {
        self.record(format!("describe_instances {}", instance_ids.join(",")));
        fault(&lock(&self.faults).describe_instances, "DescribeInstances")?;

        let fleet = lock(&self.fleet);
        Ok(instance_ids
            .iter()
            .filter_map(|id| fleet.instances.get(id).cloned())
            .collect())
    }

    async fn set_termination_protection(
        &self,
        instance_id: &str,
        enabled: bool,
    ) -> CloudResult<()> {
        self.record(format!("set_termination_protection {instance_id}={enabled}"));
        if lock(&self.faults).protection.contains(instance_id) {
            return Err(CloudError::api(
                "ModifyInstanceAttribute",
                format!("injected failure for {instance_id}"),
            ));
        }

        let mut fleet = lock(&self.fleet);
        let instance = fleet
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| CloudError::InstanceNotFound(instance_id.to_string()))?;
        instance.termination_protected = enabled;
        Ok(())
    }

    async fn terminate_instances(&self, instance_ids: &[InstanceId]) -> CloudResult<()> {
        self.record(format!("terminate {}", instance_ids.join(",")));
        fault(&lock(&self.faults).terminate, "TerminateInstances")?;

        let mut fleet = lock(&self.fleet);
        for id in instance_ids {
            match fleet.instances.get(id) {
                None => return Err(CloudError::InstanceNotFound(id.clone())),
                Some(i) if i.termination_protected => {
                    return Err(CloudError::api(
                        "TerminateInstances",
                        format!("OperationNotPermitted: {id} has termination protection"),
                    ));
                }
                Some(_) => {}
            }
        }
        for id in instance_ids {
            if let Some(i) = fleet.instances.get_mut(id) {
                i.state = InstanceState::Terminated;
            }
        }
        Ok(())
    }
}
