//! Stage input/output types.
//!
//! These are produced fresh on every pipeline invocation and never
//! persisted beyond it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::TransientErrors;

/// Cloud instance identifier (e.g. `i-0abc...`).
pub type InstanceId = String;

/// Deserialize `null` as `T::default()`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Role ──────────────────────────────────────────────────────────

/// What kind of cluster hosts the instance group runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Storage hosts that own drives.
    #[default]
    Backend,
    /// Compute-only clients with no drives.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Backend => write!(f, "backend"),
            Role::Client => write!(f, "client"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backend" => Ok(Role::Backend),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// ── Fetch ─────────────────────────────────────────────────────────

/// Fleet membership, desired capacity and cluster credentials, as read
/// by the Fetch stage.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostGroupSnapshot {
    #[serde(alias = "username")]
    pub username: String,
    #[serde(alias = "password")]
    pub password: String,
    #[serde(alias = "private_ips", default, deserialize_with = "null_as_default")]
    pub private_ips: Vec<String>,
    #[serde(alias = "desired_capacity")]
    pub desired_capacity: u32,
    #[serde(alias = "instance_ids", default, deserialize_with = "null_as_default")]
    pub instance_ids: Vec<InstanceId>,
    #[serde(alias = "role", default)]
    pub role: Role,
}

impl HostGroupSnapshot {
    /// Whether `instance_id` is currently part of the instance group.
    pub fn contains_instance(&self, instance_id: &str) -> bool {
        self.instance_ids.iter().any(|id| id == instance_id)
    }
}

impl fmt::Debug for HostGroupSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostGroupSnapshot")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("private_ips", &self.private_ips)
            .field("desired_capacity", &self.desired_capacity)
            .field("instance_ids", &self.instance_ids)
            .field("role", &self.role)
            .finish()
    }
}

// ── Scale ─────────────────────────────────────────────────────────

/// A fleet member as reported back by the Scale stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScaleHost {
    #[serde(alias = "instance_id")]
    pub instance_id: InstanceId,
    /// Cluster-side host state (`ACTIVE`, `DEACTIVATING`, ...).
    #[serde(alias = "status")]
    pub state: String,
    #[serde(alias = "added_time")]
    pub added_time: DateTime<Utc>,
    /// Textual cluster host id, e.g. `HostId<3>`.
    #[serde(alias = "host_id")]
    pub host_id: String,
}

/// An instance whose cluster host was removed during Scale and which
/// Terminate may reap regardless of its age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExplicitRemoval {
    #[serde(alias = "instance_id", alias = "id")]
    pub instance_id: InstanceId,
    #[serde(alias = "private_ip", default)]
    pub private_ip: String,
}

/// Who currently belongs to the fleet after the Scale decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScaleDecision {
    #[serde(alias = "hosts", default, deserialize_with = "null_as_default")]
    pub hosts: Vec<ScaleHost>,
    #[serde(alias = "to_terminate", default, deserialize_with = "null_as_default")]
    pub to_terminate: Vec<ExplicitRemoval>,
    #[serde(default)]
    pub transient_errors: TransientErrors,
}

impl ScaleDecision {
    /// Whether `instance_id` was explicitly handed over for removal.
    pub fn is_explicit_removal(&self, instance_id: &str) -> bool {
        self.to_terminate.iter().any(|r| r.instance_id == instance_id)
    }
}

// ── Terminate ─────────────────────────────────────────────────────

/// An instance the Terminate stage successfully terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TerminatedInstance {
    #[serde(alias = "instance_id")]
    pub instance_id: InstanceId,
    #[serde(alias = "creation_date", alias = "creation")]
    pub launch_time: DateTime<Utc>,
}

/// Result of the Terminate stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TerminationOutcome {
    #[serde(
        alias = "set_to_terminate_instances",
        alias = "instances",
        default,
        deserialize_with = "null_as_default"
    )]
    pub instances: Vec<TerminatedInstance>,
    #[serde(default)]
    pub transient_errors: TransientErrors,
}
