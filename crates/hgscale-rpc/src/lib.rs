//! hgscale-rpc — client side of the cluster's JSON-RPC control plane.
//!
//! # Architecture
//!
//! ```text
//! RpcPool (one per Scale invocation)
//!   ├── candidates: member IPs from the HostGroupSnapshot
//!   ├── active: lazily chosen on first call, reused until dropped
//!   ├── clients: endpoint → Arc<dyn RpcClient>
//!   └── ClientFactory (HttpClientFactory in production)
//!
//! HttpRpcClient
//!   ├── user_login once per endpoint → bearer token
//!   └── POST http://{ip}:{port}/api/v1  (JSON-RPC 2.0)
//! ```
//!
//! A call that fails to reach its endpoint drops that endpoint from the
//! pool and is retried on the next candidate. Any other failure is
//! returned to the caller unchanged.

pub mod client;
pub mod cluster;
pub mod error;
pub mod inventory;
pub mod pool;
pub mod transport;

pub use client::{ClientFactory, ClusterMethod, RpcClient};
pub use error::{RpcError, RpcResult};
pub use inventory::{Drive, DriveId, DriveList, Host, HostId, HostList};
pub use pool::RpcPool;
pub use transport::{HttpClientFactory, HttpRpcClient};

/// Default port of the cluster management JSON-RPC interface.
pub const DEFAULT_RPC_PORT: u16 = 14000;
