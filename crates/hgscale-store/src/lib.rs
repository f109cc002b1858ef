//! hgscale-store — cluster credential store.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the username/password
//! of the cluster's administrative RPC interface under a single fixed
//! key. The pipeline only ever reads it; `hgscaled creds set` writes it.
//!
//! Values are JSON-serialized into redb's `&[u8]` value column, so the
//! record shape matches what the provisioning side stores.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use store::{ClusterCredentials, CredentialStore};
