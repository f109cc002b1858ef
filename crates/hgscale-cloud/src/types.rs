//! Instance group and instance descriptions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type InstanceId = String;

/// Health as reported by the instance group's own health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HealthStatus {
    #[default]
    Healthy,
    Unhealthy,
}

/// Compute-level lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    #[default]
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    /// Already on its way out; terminating again is pointless.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceState::ShuttingDown | InstanceState::Terminated)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// An instance as seen from the instance group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInstance {
    pub instance_id: InstanceId,
    pub health_status: HealthStatus,
    pub protected_from_scale_in: bool,
    #[serde(default)]
    pub instance_type: String,
}

/// Membership and capacity of an instance group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescription {
    pub name: String,
    pub desired_capacity: u32,
    pub instances: Vec<GroupInstance>,
}

impl GroupDescription {
    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|i| i.instance_id.clone()).collect()
    }

    /// Instance type of the group's members (first member wins).
    pub fn instance_type(&self) -> Option<&str> {
        self.instances
            .first()
            .map(|i| i.instance_type.as_str())
            .filter(|t| !t.is_empty())
    }
}

/// An instance as seen from the compute service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDetails {
    pub instance_id: InstanceId,
    pub state: InstanceState,
    pub launch_time: DateTime<Utc>,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub instance_type: String,
    /// Termination protection (`DisableApiTermination`).
    #[serde(default)]
    pub termination_protected: bool,
}
