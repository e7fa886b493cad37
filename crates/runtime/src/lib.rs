//! The vactor virtual-actor runtime.
//!
//! A node assembles five cooperating pieces: the deterministic placement
//! function that maps `(type, id)` to a home node; the launcher that owns the
//! local registry of resident instances; one instance loop per resident actor
//! that runs user callbacks and drives the persistence contract; the stopper
//! that tracks recency and evicts under memory pressure; and the router that
//! owns the cluster view and ships each send to the chosen node.
//!
//! [`ActorNode`] wires them together per configuration and is the public
//! entry point for embedding the runtime in a process.

mod error;
mod instance;
mod launcher;
mod node;
pub mod placement;
mod router;
mod stopper;

pub use error::{RuntimeError, RuntimeResult};
pub use instance::{InstanceHandle, InstanceId};
pub use launcher::Launcher;
pub use node::{ActorNode, NodeOptions};
pub use router::{ClusterView, Router};
pub use stopper::{MemoryProbe, MemorySample, SysinfoProbe, LOW_MEMORY_WATERMARK};

/// Fallback idle lifetime when neither the behaviour nor the configuration
/// supplies one: ten minutes.
pub const DEFAULT_TIME_TO_LIVE: std::time::Duration = std::time::Duration::from_secs(600);
