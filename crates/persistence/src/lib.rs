//! Persistence contract and bundled providers.
//!
//! The runtime persists actor state through a three-operation key-value
//! contract keyed by [`ActorAddress`]. Durability semantics belong to the
//! provider; the runtime never retries, so a failed write simply means the
//! update is not durable and the last successfully-persisted state wins on
//! the next materialisation.
//!
//! Two providers ship with the runtime: a concurrent in-memory map (optionally
//! bounded, with eviction notifications) and a sled-backed disk store. Both
//! are toy-quality conveniences for development and single-process clusters;
//! production deployments supply their own provider, typically backed by a
//! store every node can reach.

mod disk;
mod error;
mod memory;

pub use disk::DiskStore;
pub use error::{PersistenceError, PersistenceResult};
pub use memory::{EvictionListener, MemoryStore, RemovedFromStorage};

use async_trait::async_trait;
use vactor_core::{ActorAddress, ActorState};

/// Durable key-value backend for actor state.
///
/// All operations must be safe to call concurrently from many instance loops.
#[async_trait]
pub trait Persister: Send + Sync + 'static {
    /// Fetches the persisted state for an address, if any.
    async fn get(&self, address: &ActorAddress) -> PersistenceResult<Option<ActorState>>;

    /// Stores the state for an address, replacing any previous value.
    async fn put(&self, address: &ActorAddress, state: ActorState) -> PersistenceResult<()>;

    /// Removes the persisted state for an address. Removing an absent key
    /// succeeds.
    async fn delete(&self, address: &ActorAddress) -> PersistenceResult<()>;
}
