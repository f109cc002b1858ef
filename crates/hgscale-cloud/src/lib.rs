//! hgscale-cloud — the cloud side of the scale-down pipeline.
//!
//! The pipeline talks to the elastic instance group and the compute
//! service only through [`InstanceGroupApi`] and [`ComputeApi`]. The
//! driver builds a [`CloudClients`] once and hands it to each stage.
//!
//! [`MemoryCloud`] implements both traits over an in-process fleet
//! description. Tests use it directly; `hgscaled --cloud-state` loads
//! one from a JSON file to run the pipeline against a described fleet.

pub mod api;
pub mod error;
pub mod memory;
pub mod protection;
pub mod types;

use std::sync::Arc;

pub use api::{ComputeApi, InstanceGroupApi};
pub use error::{CloudError, CloudResult};
pub use memory::MemoryCloud;
pub use protection::{ProtectionOutcome, set_termination_protection};
pub use types::*;

/// Cloud API handles owned by the driver and passed into each stage.
#[derive(Clone)]
pub struct CloudClients {
    pub groups: Arc<dyn InstanceGroupApi>,
    pub compute: Arc<dyn ComputeApi>,
}

impl CloudClients {
    pub fn new(groups: Arc<dyn InstanceGroupApi>, compute: Arc<dyn ComputeApi>) -> Self {
        Self { groups, compute }
    }

    /// Both APIs served by one in-memory fleet.
    pub fn from_memory(cloud: Arc<MemoryCloud>) -> Self {
        Self {
            groups: cloud.clone(),
            compute: cloud,
        }
    }
}
