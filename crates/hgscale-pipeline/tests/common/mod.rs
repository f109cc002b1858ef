//! Scripted in-process cluster for pipeline tests.
//!
//! `FakeCluster` answers the control-plane methods from an inventory it
//! mutates the way the real cluster would (deactivating a drive clears
//! `should_be_active`, removing a host drops it from the list). Calls
//! are recorded with the endpoint that served them.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use hgscale_cloud::{CloudClients, MemoryCloud};
use hgscale_pipeline::{ClusterConnector, GroupConfig, Pipeline, PipelineConfig};
use hgscale_protocol::{HostGroupSnapshot, Role};
use hgscale_rpc::inventory::AwsInfo;
use hgscale_rpc::{
    ClientFactory, ClusterMethod, Drive, DriveId, DriveList, Host, HostId, HostList, RpcClient,
    RpcError, RpcResult,
};
use hgscale_store::{ClusterCredentials, CredentialStore};

pub const GROUP: &str = "hg-test";

#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint: String,
    pub method: ClusterMethod,
    pub params: Value,
}

#[derive(Default)]
struct ClusterState {
    hosts: HostList,
    drives: DriveList,
    calls: Vec<Call>,
    down: HashSet<String>,
    failing: Vec<(ClusterMethod, Option<Value>)>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_host(
        &self,
        id: i64,
        instance_id: &str,
        ip: &str,
        state: &str,
        added_time: DateTime<Utc>,
    ) {
        self.state.lock().unwrap().hosts.insert(
            HostId::new(id),
            Host {
                added_time,
                state: state.to_string(),
                status: "UP".to_string(),
                host_ip: ip.to_string(),
                aws: AwsInfo {
                    instance_id: instance_id.to_string(),
                },
            },
        );
    }

    pub fn add_drive(&self, id: i64, host_id: i64, status: &str, should_be_active: bool) {
        self.state.lock().unwrap().drives.insert(
            DriveId::new(id),
            Drive {
                host_id: HostId::new(host_id),
                status: status.to_string(),
                uuid: format!("drive-uuid-{id}"),
                should_be_active,
            },
        );
    }

    pub fn set_down(&self, endpoint: &str) {
        self.state.lock().unwrap().down.insert(endpoint.to_string());
    }

    /// Fail every call of `method`.
    pub fn fail_method(&self, method: ClusterMethod) {
        self.state.lock().unwrap().failing.push((method, None));
    }

    /// Fail calls of `method` whose params equal `params`.
    pub fn fail_call(&self, method: ClusterMethod, params: Value) {
        self.state.lock().unwrap().failing.push((method, Some(params)));
    }

    /// Let pending transitions complete: phased-out drives become
    /// INACTIVE and deactivating hosts become INACTIVE.
    pub fn settle(&self) {
        let mut state = self.state.lock().unwrap();
        for drive in state.drives.values_mut().filter(|d| !d.should_be_active) {
            drive.status = "INACTIVE".to_string();
        }
        for host in state.hosts.values_mut().filter(|h| h.state == "DEACTIVATING") {
            host.state = "INACTIVE".to_string();
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, method: ClusterMethod) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.method == method).collect()
    }

    pub fn host_state(&self, id: i64) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .hosts
            .get(&HostId::new(id))
            .map(|h| h.state.clone())
    }

    pub fn drive(&self, id: i64) -> Option<Drive> {
        self.state.lock().unwrap().drives.get(&DriveId::new(id)).cloned()
    }

    fn handle(&self, endpoint: &str, method: ClusterMethod, params: Value) -> RpcResult<Value> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            endpoint: endpoint.to_string(),
            method,
            params: params.clone(),
        });

        if state.down.contains(endpoint) {
            return Err(RpcError::Connect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let fails = state
            .failing
            .iter()
            .any(|(m, p)| *m == method && p.as_ref().is_none_or(|p| *p == params));
        if fails {
            return Err(RpcError::Remote {
                code: -32000,
                message: format!("{method} rejected"),
            });
        }

        match method {
            ClusterMethod::UserLogin => Ok(json!({ "access_token": "token" })),
            ClusterMethod::HostsList => Ok(serde_json::to_value(&state.hosts).unwrap()),
            ClusterMethod::DrivesList => Ok(serde_json::to_value(&state.drives).unwrap()),
            ClusterMethod::RemoveHost => {
                let id = HostId::new(params["host_id"].as_i64().unwrap());
                match state.hosts.remove(&id) {
                    Some(_) => Ok(Value::Null),
                    None => Err(RpcError::Remote {
                        code: -32602,
                        message: format!("{id} not found"),
                    }),
                }
            }
            ClusterMethod::DeactivateDrives => {
                let uuids = uuids(&params);
                for drive in state.drives.values_mut().filter(|d| uuids.contains(&d.uuid)) {
                    drive.should_be_active = false;
                }
                Ok(Value::Null)
            }
            ClusterMethod::RemoveDrives => {
                let uuids = uuids(&params);
                state.drives.retain(|_, d| !uuids.contains(&d.uuid));
                Ok(Value::Null)
            }
            ClusterMethod::DeactivateHosts => {
                let ids: Vec<HostId> = params["host_ids"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|v| HostId::from(v.as_str().unwrap().to_string()))
                    .collect();
                for id in ids {
                    if let Some(host) = state.hosts.get_mut(&id) {
                        host.state = "DEACTIVATING".to_string();
                    }
                }
                Ok(Value::Null)
            }
        }
    }
}

fn uuids(params: &Value) -> Vec<String> {
    params["drive_uuids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

struct FakeClient {
    endpoint: String,
    cluster: Arc<FakeCluster>,
}

#[async_trait]
impl RpcClient for FakeClient {
    async fn call(&self, method: ClusterMethod, params: Value) -> RpcResult<Value> {
        self.cluster.handle(&self.endpoint, method, params)
    }
}

pub struct FakeFactory(pub Arc<FakeCluster>);

impl ClientFactory for FakeFactory {
    fn build(&self, endpoint: &str) -> Arc<dyn RpcClient> {
        Arc::new(FakeClient {
            endpoint: endpoint.to_string(),
            cluster: Arc::clone(&self.0),
        })
    }
}

pub struct FakeConnector(pub Arc<FakeCluster>);

impl ClusterConnector for FakeConnector {
    fn connect(&self, _username: &str, _password: &str) -> Arc<dyn ClientFactory> {
        Arc::new(FakeFactory(Arc::clone(&self.0)))
    }
}

// ── Fleet builders ─────────────────────────────────────────────

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

pub fn ip(n: i64) -> String {
    format!("10.0.0.{n}")
}

pub fn instance(n: i64) -> String {
    format!("i-{n:04}")
}

/// A fleet of `n` backend hosts, each a group member with one active
/// drive. Host `k` joined `k` minutes after host 0.
pub fn backend_fleet(n: i64, desired: u32) -> (Arc<FakeCluster>, Arc<MemoryCloud>) {
    let cluster = FakeCluster::new();
    let cloud = Arc::new(MemoryCloud::new());
    cloud.add_group(GROUP, desired);

    for k in 0..n {
        cluster.add_host(k, &instance(k), &ip(k), "ACTIVE", minutes_ago(600 - k));
        cluster.add_drive(100 + k, k, "ACTIVE", true);
        cloud.launch(GROUP, &instance(k), &ip(k), minutes_ago(600 - k));
    }
    (cluster, cloud)
}

pub fn snapshot(cloud: &MemoryCloud, desired: u32, role: Role) -> HostGroupSnapshot {
    let instance_ids = cloud.members(GROUP);
    let private_ips = instance_ids
        .iter()
        .filter_map(|id| cloud.instance(id).and_then(|i| i.private_ip))
        .collect();
    HostGroupSnapshot {
        username: "admin".to_string(),
        password: "pw".to_string(),
        private_ips,
        desired_capacity: desired,
        instance_ids,
        role,
    }
}

pub fn pipeline(cluster: &Arc<FakeCluster>, cloud: &Arc<MemoryCloud>, role: Role) -> Pipeline {
    let store = CredentialStore::open_in_memory().unwrap();
    store
        .put_credentials(&ClusterCredentials::new("admin", "pw"))
        .unwrap();

    let config = PipelineConfig {
        group: GroupConfig {
            name: GROUP.to_string(),
            role,
        },
        ..Default::default()
    };

    Pipeline::new(config, CloudClients::from_memory(Arc::clone(cloud)), store)
        .with_connector(Arc::new(FakeConnector(Arc::clone(cluster))))
}
