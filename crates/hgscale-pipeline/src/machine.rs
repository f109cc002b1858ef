//! Driver-level state machine.
//!
//! ```text
//! Fetch → Scale → Terminate → ErrorCheck → { Success | Transient }
//! ```
//!
//! A fatal error in any stage ends the run right there. There is no
//! retry inside the machine; the next cadence runs it again from
//! scratch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use hgscale_cloud::CloudClients;
use hgscale_protocol::{HostGroupSnapshot, ScaleDecision, TerminationOutcome};
use hgscale_rpc::{ClientFactory, HttpClientFactory};
use hgscale_store::CredentialStore;

use crate::config::{PipelineConfig, RpcConfig};
use crate::error::PipelineResult;
use crate::{fetch, scale, terminate, transient};

/// Builds the cluster RPC client factory once credentials are known.
pub trait ClusterConnector: Send + Sync {
    fn connect(&self, username: &str, password: &str) -> Arc<dyn ClientFactory>;
}

/// JSON-RPC over HTTP to the members' management port.
pub struct HttpConnector {
    port: u16,
    timeout: Duration,
    connect_timeout: Duration,
}

impl HttpConnector {
    pub fn new(rpc: &RpcConfig) -> Self {
        Self {
            port: rpc.port,
            timeout: rpc.timeout(),
            connect_timeout: rpc.connect_timeout(),
        }
    }
}

impl ClusterConnector for HttpConnector {
    fn connect(&self, username: &str, password: &str) -> Arc<dyn ClientFactory> {
        Arc::new(
            HttpClientFactory::new(self.port, username, password, self.timeout)
                .with_connect_timeout(self.connect_timeout),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Scale,
    Terminate,
    ErrorCheck,
    Success,
    Transient,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Scale => "scale",
            Stage::Terminate => "terminate",
            Stage::ErrorCheck => "error-check",
            Stage::Success => "success",
            Stage::Transient => "transient",
        };
        f.write_str(s)
    }
}

/// Everything a run needs, built by the driver and injected here.
pub struct Pipeline {
    config: PipelineConfig,
    cloud: CloudClients,
    store: CredentialStore,
    connector: Arc<dyn ClusterConnector>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, cloud: CloudClients, store: CredentialStore) -> Self {
        let connector: Arc<dyn ClusterConnector> = Arc::new(HttpConnector::new(&config.rpc));
        Self {
            config,
            cloud,
            store,
            connector,
        }
    }

    /// Replace the cluster connector (tests use a scripted cluster).
    pub fn with_connector(mut self, connector: Arc<dyn ClusterConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn fetch(&self) -> PipelineResult<HostGroupSnapshot> {
        fetch::fetch(&self.cloud, &self.store, &self.config.group).await
    }

    pub async fn scale(&self, snapshot: &HostGroupSnapshot) -> PipelineResult<ScaleDecision> {
        let factory = self.connector.connect(&snapshot.username, &snapshot.password);
        scale::scale(snapshot, factory).await
    }

    pub async fn terminate(&self, decision: &ScaleDecision) -> PipelineResult<TerminationOutcome> {
        terminate::terminate(
            decision,
            &self.cloud,
            &self.config.group.name,
            &self.config.terminate,
        )
        .await
    }

    /// Run every stage once. `Ok` carries the Terminate output of a clean
    /// run; transient failures come back as `PipelineError::Transient`.
    pub async fn run_once(&self) -> PipelineResult<TerminationOutcome> {
        let mut state = State::Fetch;
        loop {
            let stage = state.stage();
            info!(%stage, group = %self.config.group.name, "entering stage");

            let next = match state {
                State::Fetch => self.fetch().await.map(State::Scale),
                State::Scale(snapshot) => self.scale(&snapshot).await.map(State::Terminate),
                State::Terminate(decision) => {
                    self.terminate(&decision).await.map(State::ErrorCheck)
                }
                State::ErrorCheck(outcome) if outcome.transient_errors.is_empty() => {
                    Ok(State::Success(outcome))
                }
                State::ErrorCheck(outcome) => Ok(State::Transient(outcome)),
                State::Success(outcome) => return Ok(outcome),
                State::Transient(outcome) => {
                    return transient::check(&outcome).map(|()| outcome);
                }
            };

            state = next.inspect_err(|e| error!(%stage, error = %e, "stage failed"))?;
        }
    }
}

/// Machine state together with the input of the stage it names.
enum State {
    Fetch,
    Scale(HostGroupSnapshot),
    Terminate(ScaleDecision),
    ErrorCheck(TerminationOutcome),
    Success(TerminationOutcome),
    Transient(TerminationOutcome),
}

impl State {
    fn stage(&self) -> Stage {
        match self {
            State::Fetch => Stage::Fetch,
            State::Scale(_) => Stage::Scale,
            State::Terminate(_) => Stage::Terminate,
            State::ErrorCheck(_) => Stage::ErrorCheck,
            State::Success(_) => Stage::Success,
            State::Transient(_) => Stage::Transient,
        }
    }
}
