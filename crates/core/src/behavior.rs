//! The behaviour contract and the verdicts that drive an instance.
//!
//! A behaviour is the user-supplied half of an actor type: three callbacks
//! invoked by the instance loop, all executed on the instance's own task so a
//! given `(type, id)` never observes concurrent invocations. Messages and
//! state are opaque byte payloads; the runtime carries them without
//! introspection and applications bring their own codec.

use crate::address::{ActorId, TypeName};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Opaque message payload routed through the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message(Bytes);

impl Message {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(Bytes::copy_from_slice(text.as_bytes()))
    }
}

/// Opaque in-memory state of a resident instance.
///
/// An empty state is what a brand-new instance sees in the default `init`
/// path; behaviours decide what emptiness means for their own encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorState(Bytes);

impl ActorState {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ActorState {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for ActorState {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

/// Outcome of a behaviour callback.
///
/// Tells the instance loop how to update in-memory state, whether to mirror
/// it to the persister, and whether the instance keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Adopt the state and mirror it to the persister.
    Ok(ActorState),
    /// Adopt the state in memory only; the persister is left untouched.
    OkNoPersist(ActorState),
    /// Keep the current state; nothing is persisted.
    NoUpdate,
    /// Terminate and delete any persisted state.
    Stop,
    /// Terminate after persisting the state.
    StopPersist(ActorState),
    /// Terminate leaving the persister untouched.
    StopNoPersist,
    /// Terminate and delete any persisted state.
    StopDelete,
}

impl Verdict {
    /// Whether this verdict terminates the instance.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Verdict::Stop | Verdict::StopPersist(_) | Verdict::StopNoPersist | Verdict::StopDelete
        )
    }
}

/// User-defined actor behaviour: the three callbacks of an actor type.
///
/// All callbacks run on the instance's own task, one message at a time. A
/// behaviour value is shared by every local instance of its type, so any
/// interior state must be its own concern; per-instance state lives in the
/// [`ActorState`] the callbacks return.
#[async_trait]
pub trait ActorBehavior: Send + Sync + 'static {
    /// Stable type name used for placement and wire identity.
    fn type_name(&self) -> &str;

    /// Handles the first message of an instance with no persisted state.
    ///
    /// Defaults to processing the message against an empty state.
    async fn init(&self, id: &ActorId, message: &Message) -> Verdict {
        self.process(&ActorState::empty(), id, message).await
    }

    /// Handles one message against the current state.
    async fn process(&self, _state: &ActorState, _id: &ActorId, _message: &Message) -> Verdict {
        Verdict::NoUpdate
    }

    /// Idle lifetime before the instance is unloaded.
    ///
    /// Recomputed after every message. `None` selects the node-wide default.
    fn time_to_live(&self, _state: &ActorState, _id: &ActorId) -> Option<Duration> {
        None
    }
}

/// Maps wire-level type names to registered behaviours.
///
/// Incoming deliveries (local or remote) resolve their behaviour here before
/// an instance can be launched.
pub struct TypeRegistry {
    behaviors: RwLock<HashMap<TypeName, Arc<dyn ActorBehavior>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            behaviors: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a behaviour under its own type name, replacing any previous
    /// registration. Returns the behaviour it replaced, if any.
    pub fn register(&self, behavior: Arc<dyn ActorBehavior>) -> Option<Arc<dyn ActorBehavior>> {
        let name = TypeName::new(behavior.type_name());
        self.behaviors.write().insert(name, behavior)
    }

    pub fn lookup(&self, name: &TypeName) -> Option<Arc<dyn ActorBehavior>> {
        self.behaviors.read().get(name).cloned()
    }

    pub fn contains(&self, name: &TypeName) -> bool {
        self.behaviors.read().contains_key(name)
    }

    /// Names of every registered type, in no particular order.
    pub fn type_names(&self) -> Vec<TypeName> {
        self.behaviors.read().keys().cloned().collect()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
