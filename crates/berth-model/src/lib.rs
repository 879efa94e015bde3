//! Plain data shared by the berth crates.
//!
//! Nothing here talks to a container runtime or touches the filesystem:
//! these are the descriptors read from the runtime, the specs callers hand
//! to the orchestrator, and the snapshots it hands back.

mod domain;
pub use domain::*;

mod kind;
pub use kind::*;

mod error;
pub use error::ModelError;
