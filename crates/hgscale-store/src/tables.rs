//! redb table definitions for the credential store.

use redb::TableDefinition;

/// Cluster-level records keyed by model name (`cluster-creds`, ...).
pub const CLUSTER: TableDefinition<&str, &[u8]> = TableDefinition::new("cluster");

/// Key of the credentials record in [`CLUSTER`].
pub const CLUSTER_CREDS_KEY: &str = "cluster-creds";
