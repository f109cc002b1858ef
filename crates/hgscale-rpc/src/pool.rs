//! Lazy single-active-endpoint pool with failover.
//!
//! No client is built until the first call. Once an endpoint is chosen
//! every call goes to it until it is dropped, either explicitly (its
//! host is being evacuated) or because it could not be reached. The
//! next call then picks the first remaining candidate.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::client::{ClientFactory, ClusterMethod, RpcClient};
use crate::error::{RpcError, RpcResult};

struct PoolState {
    /// Endpoints still eligible to serve calls, in preference order.
    candidates: Vec<String>,
    /// Endpoint currently serving calls.
    active: Option<String>,
    /// Clients built so far, keyed by endpoint.
    clients: HashMap<String, Arc<dyn RpcClient>>,
}

/// Per-invocation connection pool over the fleet's member IPs.
pub struct RpcPool {
    state: RwLock<PoolState>,
    factory: Arc<dyn ClientFactory>,
}

impl RpcPool {
    pub fn new(endpoints: Vec<String>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            state: RwLock::new(PoolState {
                candidates: endpoints,
                active: None,
                clients: HashMap::new(),
            }),
            factory,
        }
    }

    /// Call `method` on the active endpoint, failing over on connect errors.
    pub async fn call(&self, method: ClusterMethod, params: Value) -> RpcResult<Value> {
        loop {
            let (endpoint, client) = self.active_client().await?;
            match client.call(method, params.clone()).await {
                Err(e) if e.is_connect() => {
                    warn!(%endpoint, %method, error = %e, "endpoint unreachable, failing over");
                    self.drop_endpoint(&endpoint).await;
                }
                result => return result,
            }
        }
    }

    /// Remove `endpoint` from the pool. Returns true if it was a candidate.
    pub async fn drop_endpoint(&self, endpoint: &str) -> bool {
        let mut state = self.state.write().await;
        if state.active.as_deref() == Some(endpoint) {
            state.active = None;
        }
        state.clients.remove(endpoint);
        let before = state.candidates.len();
        state.candidates.retain(|c| c != endpoint);
        let dropped = state.candidates.len() != before;
        if dropped {
            debug!(%endpoint, remaining = state.candidates.len(), "endpoint dropped from pool");
        }
        dropped
    }

    /// Endpoint currently serving calls, if one has been chosen.
    pub async fn active_endpoint(&self) -> Option<String> {
        self.state.read().await.active.clone()
    }

    pub async fn candidates(&self) -> Vec<String> {
        self.state.read().await.candidates.clone()
    }

    async fn active_client(&self) -> RpcResult<(String, Arc<dyn RpcClient>)> {
        {
            let state = self.state.read().await;
            if let Some(active) = &state.active
                && let Some(client) = state.clients.get(active)
            {
                return Ok((active.clone(), Arc::clone(client)));
            }
        }

        let mut state = self.state.write().await;
        // Another caller may have picked an endpoint while we waited.
        if let Some(active) = state.active.clone()
            && let Some(client) = state.clients.get(&active)
        {
            return Ok((active, Arc::clone(client)));
        }

        let endpoint = state
            .candidates
            .first()
            .cloned()
            .ok_or(RpcError::NoEndpoints)?;
        let client = Arc::clone(
            state
                .clients
                .entry(endpoint.clone())
                .or_insert_with(|| self.factory.build(&endpoint)),
        );
        state.active = Some(endpoint.clone());
        debug!(%endpoint, "selected active cluster endpoint");
        Ok((endpoint, client))
    }
}
