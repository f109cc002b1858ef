//! hgscale.toml configuration.
//!
//! Every field has a default, so an empty file (or no file) is valid
//! apart from the instance-group name, which must come from the file
//! or from `ASG_NAME`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hgscale_protocol::Role;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub group: GroupConfig,
    pub credentials: CredentialsConfig,
    pub rpc: RpcConfig,
    pub terminate: TerminateConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Instance-group name (`ASG_NAME`).
    pub name: String,
    /// `ROLE`
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Credential database path (`TABLE_NAME`).
    pub path: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("hgscale-creds.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub port: u16,
    pub timeout_secs: u64,
    /// TCP connect plus handshake. An endpoint that misses it is
    /// treated as unreachable and the pool fails over.
    pub connect_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            port: hgscale_rpc::DEFAULT_RPC_PORT,
            timeout_secs: 10,
            connect_timeout_secs: 3,
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminateConfig {
    /// Instances younger than this are never reaped unless explicitly
    /// handed over by Scale.
    pub min_age_secs: u64,
    /// Instances per protection/terminate round.
    pub batch_size: usize,
    /// In-flight termination-protection calls.
    pub protection_concurrency: usize,
    pub detach_batch_size: usize,
}

impl Default for TerminateConfig {
    fn default() -> Self {
        Self {
            min_age_secs: 30 * 60,
            batch_size: 50,
            protection_concurrency: 20,
            detach_batch_size: 20,
        }
    }
}

impl TerminateConfig {
    /// Longest accepted `min_age_secs`.
    pub const MAX_MIN_AGE_SECS: u64 = 10 * 365 * 24 * 60 * 60;

    /// Out-of-range values clamp to [`Self::MAX_MIN_AGE_SECS`], never below
    /// zero; [`PipelineConfig::validate`] rejects them up front.
    pub fn min_age(&self) -> chrono::Duration {
        let secs = self.min_age_secs.min(Self::MAX_MIN_AGE_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> PipelineResult<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> PipelineResult<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Load the optional file and apply process environment overrides.
    /// Stages that address the instance group call [`validate`] on top.
    ///
    /// [`validate`]: PipelineConfig::validate
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `ASG_NAME`, `ROLE` and `TABLE_NAME` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> PipelineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("ASG_NAME").filter(|v| !v.is_empty()) {
            self.group.name = name;
        }
        if let Some(role) = lookup("ROLE").filter(|v| !v.is_empty()) {
            self.group.role = role.parse().map_err(PipelineError::Config)?;
        }
        if let Some(path) = lookup("TABLE_NAME").filter(|v| !v.is_empty()) {
            self.credentials.path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.group.name.trim().is_empty() {
            return Err(PipelineError::Config(
                "instance group name is mandatory (set [group].name or ASG_NAME)".to_string(),
            ));
        }
        if self.terminate.batch_size == 0 || self.terminate.detach_batch_size == 0 {
            return Err(PipelineError::Config(
                "terminate batch sizes must be positive".to_string(),
            ));
        }
        if self.terminate.min_age_secs > TerminateConfig::MAX_MIN_AGE_SECS {
            return Err(PipelineError::Config(format!(
                "terminate.min_age_secs must be at most {}",
                TerminateConfig::MAX_MIN_AGE_SECS
            )));
        }
        if self.rpc.connect_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "rpc.connect_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
