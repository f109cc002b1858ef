//! hgscale-protocol — the typed hand-off between pipeline stages.
//!
//! Each stage of the scale-down machine consumes the previous stage's
//! output and produces its own:
//!
//! ```text
//! Fetch      → HostGroupSnapshot
//! Scale      → ScaleDecision        (Hosts, ToTerminate, TransientErrors)
//! Terminate  → TerminationOutcome   (Instances, TransientErrors)
//! Transient  → Ok(()) | Err(aggregated transient errors)
//! ```
//!
//! All types serialize with the PascalCase attribute names the driver
//! expects and also accept the snake_case names older drivers emit.
//! `null` lists (as produced by drivers that marshal empty slices as
//! null) deserialize as empty.

pub mod errors;
pub mod types;

pub use errors::TransientErrors;
pub use types::*;
