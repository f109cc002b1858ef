//! hgscale-pipeline — the scale-down control loop.
//!
//! # Stages
//!
//! ```text
//! Fetch      instance group + credentials  → HostGroupSnapshot
//! Scale      cluster inventory + snapshot  → ScaleDecision
//! Terminate  decision + instance group     → TerminationOutcome
//! Transient  outcome                       → success | aggregated failure
//! ```
//!
//! Each stage is a plain async function over explicitly passed
//! dependencies and can be invoked on its own (the `hgscaled` stage
//! subcommands do exactly that). [`Pipeline::run_once`] chains them as
//! the driver would for one cadence.
//!
//! Fatal errors abort the current stage. Per-item failures are appended
//! to `TransientErrors`, carried forward unchanged, and only turned into
//! a failure by the Transient stage.

pub mod config;
pub mod error;
pub mod fetch;
pub mod machine;
pub mod scale;
pub mod terminate;
pub mod transient;

pub use config::{CredentialsConfig, GroupConfig, PipelineConfig, RpcConfig, TerminateConfig};
pub use error::{PipelineError, PipelineResult};
pub use machine::{ClusterConnector, HttpConnector, Pipeline, Stage};
