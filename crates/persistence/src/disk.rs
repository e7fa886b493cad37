//! Disk-resident storage provider.

use crate::{PersistenceError, PersistenceResult, Persister};
use async_trait::async_trait;
use std::path::Path;
use vactor_core::{ActorAddress, ActorState};

/// Sled-backed persister bundled with the runtime.
///
/// Suitable for development and small single-node deployments; it is not
/// tuned, replicated, or reachable from other nodes. Keys are the bincode
/// serialisation of `(type, id)`, which is stable across restarts.
pub struct DiskStore {
    db: sled::Db,
}

impl DiskStore {
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let db = sled::open(path).map_err(PersistenceError::backend)?;
        Ok(Self { db })
    }

    fn encode_key(address: &ActorAddress) -> PersistenceResult<Vec<u8>> {
        bincode::serialize(&(address.type_name(), address.id())).map_err(PersistenceError::codec)
    }
}

#[async_trait]
impl Persister for DiskStore {
    async fn get(&self, address: &ActorAddress) -> PersistenceResult<Option<ActorState>> {
        let key = Self::encode_key(address)?;
        let value = self.db.get(key).map_err(PersistenceError::backend)?;
        Ok(value.map(|bytes| ActorState::from(bytes.to_vec())))
    }

    async fn put(&self, address: &ActorAddress, state: ActorState) -> PersistenceResult<()> {
        let key = Self::encode_key(address)?;
        self.db
            .insert(key, state.as_slice().to_vec())
            .map_err(PersistenceError::backend)?;
        Ok(())
    }

    async fn delete(&self, address: &ActorAddress) -> PersistenceResult<()> {
        let key = Self::encode_key(address)?;
        self.db.remove(key).map_err(PersistenceError::backend)?;
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
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store.put(&address("a"), ActorState::from(&b"5"[..])).await.unwrap();
        assert_eq!(
            store.get(&address("a")).await.unwrap(),
            Some(ActorState::from(&b"5"[..]))
        );
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskStore::open(dir.path()).unwrap();
            store.put(&address("a"), ActorState::from(&b"7"[..])).await.unwrap();
        }

        let store = DiskStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get(&address("a")).await.unwrap(),
            Some(ActorState::from(&b"7"[..]))
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store.put(&address("a"), ActorState::from(&b"5"[..])).await.unwrap();
        store.delete(&address("a")).await.unwrap();
        store.delete(&address("a")).await.unwrap();
        assert_eq!(store.get(&address("a")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn distinct_types_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store
            .put(&ActorAddress::new("counter", "x"), ActorState::from(&b"1"[..]))
            .await
            .unwrap();
        store
            .put(&ActorAddress::new("session", "x"), ActorState::from(&b"2"[..]))
            .await
            .unwrap();

        assert_eq!(
            store.get(&ActorAddress::new("counter", "x")).await.unwrap(),
            Some(ActorState::from(&b"1"[..]))
        );
        assert_eq!(
            store.get(&ActorAddress::new("session", "x")).await.unwrap(),
            Some(ActorState::from(&b"2"[..]))
        );
    }
}
