//! In-memory storage provider.

use crate::{PersistenceResult, Persister};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::debug;
use vactor_core::{ActorAddress, ActorState};

/// Notification emitted when a bounded store drops an entry to make room.
///
/// The runtime core does not consume these; they exist so application-level
/// tiered-storage policies can react to spill.
#[derive(Debug, Clone)]
pub struct RemovedFromStorage {
    /// Name of the provider that dropped the entry.
    pub provider: String,
    pub address: ActorAddress,
    pub state: ActorState,
}

/// Receiver half for [`RemovedFromStorage`] notifications.
pub type EvictionListener = mpsc::UnboundedReceiver<RemovedFromStorage>;

/// Concurrent in-memory persister.
///
/// Unbounded by default. With a capacity bound, inserting beyond the bound
/// drops the oldest-inserted entry and notifies the configured listener.
pub struct MemoryStore {
    name: String,
    entries: DashMap<ActorAddress, ActorState>,
    insertion_order: Mutex<VecDeque<ActorAddress>>,
    capacity: Option<usize>,
    listener: Mutex<Option<mpsc::UnboundedSender<RemovedFromStorage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            entries: DashMap::new(),
            insertion_order: Mutex::new(VecDeque::new()),
            capacity: None,
            listener: Mutex::new(None),
        }
    }

    /// A store that never holds more than `capacity` entries.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attaches a listener for capacity evictions, returning its receiver.
    pub fn eviction_listener(&self) -> EvictionListener {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.listener.lock() = Some(tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn enforce_capacity(&self) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.entries.len() > capacity {
            let oldest = {
                let mut order = self.insertion_order.lock();
                order.pop_front()
            };
            let Some(address) = oldest else {
                break;
            };
            // Entries deleted since insertion leave stale order slots; skip them.
            let Some((address, state)) = self.entries.remove(&address) else {
                continue;
            };
            debug!(provider = %self.name, %address, "capacity eviction");
            if let Some(listener) = self.listener.lock().as_ref() {
                let _ = listener.send(RemovedFromStorage {
                    provider: self.name.clone(),
                    address,
                    state,
                });
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Persister for MemoryStore {
    async fn get(&self, address: &ActorAddress) -> PersistenceResult<Option<ActorState>> {
        Ok(self.entries.get(address).map(|entry| entry.value().clone()))
    }

    async fn put(&self, address: &ActorAddress, state: ActorState) -> PersistenceResult<()> {
        if self.entries.insert(address.clone(), state).is_none() {
            self.insertion_order.lock().push_back(address.clone());
        }
        self.enforce_capacity();
        Ok(())
    }

    async fn delete(&self, address: &ActorAddress) -> PersistenceResult<()> {
        self.entries.remove(address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(id: &str) -> ActorAddress {
        ActorAddress::new("counter", id)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        store.put(&address("a"), ActorState::from(&b"1"[..])).await.unwrap();

        let fetched = store.get(&address("a")).await.unwrap();
        assert_eq!(fetched, Some(ActorState::from(&b"1"[..])));
        assert_eq!(store.get(&address("b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put(&address("a"), ActorState::from(&b"1"[..])).await.unwrap();

        store.delete(&address("a")).await.unwrap();
        store.delete(&address("a")).await.unwrap();
        assert_eq!(store.get(&address("a")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_replaces_existing_state() {
        let store = MemoryStore::new();
        store.put(&address("a"), ActorState::from(&b"1"[..])).await.unwrap();
        store.put(&address("a"), ActorState::from(&b"2"[..])).await.unwrap();

        assert_eq!(
            store.get(&address("a")).await.unwrap(),
            Some(ActorState::from(&b"2"[..]))
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn bounded_store_drops_oldest_and_notifies() {
        let store = MemoryStore::bounded(2).with_name("spill");
        let mut evictions = store.eviction_listener();

        store.put(&address("a"), ActorState::from(&b"1"[..])).await.unwrap();
        store.put(&address("b"), ActorState::from(&b"2"[..])).await.unwrap();
        store.put(&address("c"), ActorState::from(&b"3"[..])).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&address("a")).await.unwrap(), None);

        let removed = evictions.recv().await.unwrap();
        assert_eq!(removed.provider, "spill");
        assert_eq!(removed.address, address("a"));
        assert_eq!(removed.state, ActorState::from(&b"1"[..]));
    }

    #[tokio::test]
    async fn deleted_entries_do_not_count_against_capacity() {
        let store = MemoryStore::bounded(2);

        store.put(&address("a"), ActorState::from(&b"1"[..])).await.unwrap();
        store.put(&address("b"), ActorState::from(&b"2"[..])).await.unwrap();
        store.delete(&address("a")).await.unwrap();
        store.put(&address("c"), ActorState::from(&b"3"[..])).await.unwrap();

        assert_eq!(store.get(&address("b")).await.unwrap(), Some(ActorState::from(&b"2"[..])));
        assert_eq!(store.get(&address("c")).await.unwrap(), Some(ActorState::from(&b"3"[..])));
    }
}
