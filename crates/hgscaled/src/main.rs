//! hgscaled — drives the hgscale scale-down pipeline.
//!
//! Each stage is a subcommand reading the previous stage's JSON output
//! on stdin and writing its own on stdout, so an external orchestrator
//! can chain them. `run` executes the whole machine once.
//!
//! # Usage
//!
//! ```text
//! hgscaled --cloud-state fleet.json fetch \
//!   | hgscaled scale \
//!   | hgscaled --cloud-state fleet.json terminate \
//!   | hgscaled transient
//!
//! hgscaled --config hgscale.toml --cloud-state fleet.json run
//! hgscaled creds set --username admin --password secret
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use hgscale_cloud::{CloudClients, MemoryCloud};
use hgscale_pipeline::{ClusterConnector, HttpConnector, Pipeline, PipelineConfig, scale, transient};
use hgscale_protocol::{HostGroupSnapshot, ScaleDecision, TerminationOutcome};
use hgscale_store::{ClusterCredentials, CredentialStore};

#[derive(Parser)]
#[command(name = "hgscaled", about = "Storage fleet scale-down driver")]
struct Cli {
    /// Configuration file (hgscale.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON fleet description backing the cloud APIs. Written back after
    /// stages that change the fleet.
    #[arg(long, global = true)]
    cloud_state: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Snapshot the instance group and credentials.
    Fetch,

    /// Decide and issue cluster evacuations for a snapshot.
    Scale {
        /// Read the snapshot from a file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Reconcile a scale decision against the instance group.
    Terminate {
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Fail if the termination outcome carries transient errors.
    Transient {
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Run Fetch, Scale, Terminate and Transient once.
    Run,

    /// Manage stored cluster credentials.
    Creds {
        #[command(subcommand)]
        action: CredsAction,
    },
}

#[derive(Subcommand)]
enum CredsAction {
    /// Store the cluster admin username and password.
    Set {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Fetch => {
            let (pipeline, _) = build_pipeline(config, cli.cloud_state.as_deref())?;
            let snapshot = pipeline.fetch().await?;
            write_output(&snapshot)
        }
        Command::Scale { input } => {
            let snapshot: HostGroupSnapshot = read_input(input.as_deref())?;
            let connector = HttpConnector::new(&config.rpc);
            let factory = connector.connect(&snapshot.username, &snapshot.password);
            let decision = scale::scale(&snapshot, factory).await?;
            write_output(&decision)
        }
        Command::Terminate { input } => {
            let decision: ScaleDecision = read_input(input.as_deref())?;
            let (pipeline, cloud) = build_pipeline(config, cli.cloud_state.as_deref())?;
            let outcome = pipeline.terminate(&decision).await?;
            save_cloud(&cloud, cli.cloud_state.as_deref())?;
            write_output(&outcome)
        }
        Command::Transient { input } => {
            let outcome: TerminationOutcome = read_input(input.as_deref())?;
            transient::check(&outcome)?;
            Ok(())
        }
        Command::Run => {
            let (pipeline, cloud) = build_pipeline(config, cli.cloud_state.as_deref())?;
            let result = pipeline.run_once().await;
            save_cloud(&cloud, cli.cloud_state.as_deref())?;
            let outcome = result?;
            write_output(&outcome)
        }
        Command::Creds {
            action: CredsAction::Set { username, password },
        } => {
            let store = open_store(&config)?;
            store.put_credentials(&ClusterCredentials::new(&username, &password))?;
            info!(path = ?config.credentials.path, %username, "cluster credentials stored");
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hgscale=debug"));

    // stdout carries stage output; logs go to stderr.
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn open_store(config: &PipelineConfig) -> anyhow::Result<CredentialStore> {
    let path = &config.credentials.path;
    CredentialStore::open(path)
        .with_context(|| format!("opening credential store {}", path.display()))
}

fn load_cloud(path: Option<&Path>) -> anyhow::Result<Arc<MemoryCloud>> {
    let path = path.context("no cloud backend configured; pass --cloud-state <fleet.json>")?;
    let cloud = MemoryCloud::load(path)
        .with_context(|| format!("loading cloud state {}", path.display()))?;
    Ok(Arc::new(cloud))
}

fn save_cloud(cloud: &MemoryCloud, path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = path {
        cloud
            .save(path)
            .with_context(|| format!("saving cloud state {}", path.display()))?;
    }
    Ok(())
}

fn build_pipeline(
    config: PipelineConfig,
    cloud_state: Option<&Path>,
) -> anyhow::Result<(Pipeline, Arc<MemoryCloud>)> {
    config.validate()?;
    let cloud = load_cloud(cloud_state)?;
    let store = open_store(&config)?;
    info!(group = %config.group.name, role = %config.group.role, "pipeline configured");
    let pipeline = Pipeline::new(config, CloudClients::from_memory(cloud.clone()), store);
    Ok((pipeline, cloud))
}

fn read_input<T: DeserializeOwned>(path: Option<&Path>) -> anyhow::Result<T> {
    let text = match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };
    serde_json::from_str(&text).context("decoding stage input")
}

fn write_output<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stage_subcommands() {
        let cli = Cli::try_parse_from(["hgscaled", "--cloud-state", "fleet.json", "run"]).unwrap();
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.cloud_state, Some(PathBuf::from("fleet.json")));

        let cli =
            Cli::try_parse_from(["hgscaled", "scale", "--input", "snap.json", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Scale { input: Some(_) }));
    }

    #[test]
    fn parses_creds_set() {
        let cli = Cli::try_parse_from([
            "hgscaled", "creds", "set", "--username", "admin", "--password", "pw",
        ])
        .unwrap();
        match cli.command {
            Command::Creds {
                action: CredsAction::Set { username, password },
            } => {
                assert_eq!(username, "admin");
                assert_eq!(password, "pw");
            }
            _ => panic!("expected creds set"),
        }
    }

    #[test]
    fn stage_input_accepts_pipeline_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decision.json");
        std::fs::write(&path, r#"{"Hosts": [], "TransientErrors": ["scale: x"]}"#).unwrap();

        let decision: ScaleDecision = read_input(Some(&path)).unwrap();
        assert_eq!(decision.transient_errors.len(), 1);
    }
}
