//! Host and drive inventory as reported by the cluster.
//!
//! Identifiers travel as prefixed strings (`HostId<3>`, `DiskId<17>`).
//! The numeric part is needed by calls such as remove-host; `INVALID`
//! or anything unparsable maps to `-1`, which the cluster itself uses
//! for "no host".

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HOST_ID_PREFIX: &str = "HostId<";
const DRIVE_ID_PREFIX: &str = "DiskId<";

fn parse_prefixed(prefix: &str, text: &str) -> i64 {
    text.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix('>'))
        .and_then(|val| val.parse::<i64>().ok())
        .unwrap_or(-1)
}

/// Cluster host identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct HostId {
    raw: String,
    value: i64,
}

impl HostId {
    pub fn new(value: i64) -> Self {
        Self {
            raw: format!("{HOST_ID_PREFIX}{value}>"),
            value,
        }
    }

    /// Numeric id, `-1` when the cluster reports no host.
    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.value >= 0
    }
}

impl From<String> for HostId {
    fn from(raw: String) -> Self {
        let value = parse_prefixed(HOST_ID_PREFIX, &raw);
        Self { raw, value }
    }
}

impl From<HostId> for String {
    fn from(id: HostId) -> Self {
        id.raw
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Cluster drive identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DriveId {
    raw: String,
    value: i64,
}

impl DriveId {
    pub fn new(value: i64) -> Self {
        Self {
            raw: format!("{DRIVE_ID_PREFIX}{value}>"),
            value,
        }
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

impl From<String> for DriveId {
    fn from(raw: String) -> Self {
        let value = parse_prefixed(DRIVE_ID_PREFIX, &raw);
        Self { raw, value }
    }
}

impl From<DriveId> for String {
    fn from(id: DriveId) -> Self {
        id.raw
    }
}

impl fmt::Display for DriveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Cloud-side identity of a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsInfo {
    #[serde(default)]
    pub instance_id: String,
}

/// One entry of `hosts_list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub added_time: DateTime<Utc>,
    /// Membership state: `ACTIVE`, `DEACTIVATING`, `REMOVING`, `INACTIVE`.
    pub state: String,
    /// Liveness: `UP`, `DOWN`, ...
    pub status: String,
    pub host_ip: String,
    pub aws: AwsInfo,
}

impl Host {
    pub fn instance_id(&self) -> &str {
        &self.aws.instance_id
    }
}

/// One entry of `disks_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drive {
    pub host_id: HostId,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub should_be_active: bool,
}

pub type HostList = HashMap<HostId, Host>;
pub type DriveList = HashMap<DriveId, Drive>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_id_parses_numeric_part() {
        let id = HostId::from("HostId<42>".to_string());
        assert_eq!(id.value(), 42);
        assert!(id.is_valid());
        assert_eq!(id.to_string(), "HostId<42>");
    }

    #[test]
    fn invalid_host_id_maps_to_minus_one() {
        assert_eq!(HostId::from("HostId<INVALID>".to_string()).value(), -1);
        assert_eq!(HostId::from("garbage".to_string()).value(), -1);
        assert!(!HostId::from("HostId<-1>".to_string()).is_valid());
    }

    #[test]
    fn host_list_decodes_from_cluster_json() {
        let json = r#"{
            "HostId<0>": {
                "added_time": "2024-03-01T10:00:00Z",
                "state": "ACTIVE",
                "status": "UP",
                "host_ip": "10.0.0.5",
                "aws": {"instance_id": "i-abc"}
            }
        }"#;

        let hosts: HostList = serde_json::from_str(json).unwrap();
        let host = &hosts[&HostId::new(0)];
        assert_eq!(host.state, "ACTIVE");
        assert_eq!(host.instance_id(), "i-abc");
        assert_eq!(host.host_ip, "10.0.0.5");
    }

    #[test]
    fn drive_list_decodes_from_cluster_json() {
        let json = r#"{
            "DiskId<7>": {
                "host_id": "HostId<0>",
                "status": "ACTIVE",
                "uuid": "5f0e8f2c-0000-4000-8000-000000000007",
                "should_be_active": true
            }
        }"#;

        let drives: DriveList = serde_json::from_str(json).unwrap();
        let drive = &drives[&DriveId::new(7)];
        assert_eq!(drive.host_id.value(), 0);
        assert!(drive.should_be_active);
    }
}
