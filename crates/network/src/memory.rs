//! In-process transport: many nodes inside one process.
//!
//! Peer invocations dispatch directly into the target node's [`RuntimeHook`],
//! and join/leave synthesise the peer events a real fabric would produce.
//! This is the multi-node fixture the runtime's cluster tests run on.

use crate::{NetworkError, NetworkResult, PeerEvent, RuntimeHook, Transport};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use vactor_core::{ActorId, Message, NodeId, TypeName};

struct HubSlot {
    hook: RwLock<Option<Arc<dyn RuntimeHook>>>,
    events: mpsc::UnboundedSender<PeerEvent>,
}

/// Shared fabric connecting every in-process node.
pub struct InProcessHub {
    nodes: DashMap<NodeId, Arc<HubSlot>>,
}

impl InProcessHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nodes: DashMap::new(),
        })
    }

    /// Adds a node to the fabric and returns its transport.
    ///
    /// Existing nodes observe the newcomer as a peer-up; the newcomer observes
    /// each existing node the same way.
    pub fn join(self: &Arc<Self>, node: NodeId) -> InProcessTransport {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let slot = Arc::new(HubSlot {
            hook: RwLock::new(None),
            events: events_tx,
        });

        for existing in self.nodes.iter() {
            let _ = existing.value().events.send(PeerEvent::Up(node.clone()));
            let _ = slot.events.send(PeerEvent::Up(existing.key().clone()));
        }
        self.nodes.insert(node.clone(), slot);

        InProcessTransport {
            hub: Arc::clone(self),
            local: node,
            events: Mutex::new(Some(events_rx)),
        }
    }

    /// Removes a node; the rest of the fabric observes a peer-down.
    pub fn leave(&self, node: &NodeId) {
        if self.nodes.remove(node).is_none() {
            return;
        }
        for remaining in self.nodes.iter() {
            let _ = remaining.value().events.send(PeerEvent::Down(node.clone()));
        }
    }

    fn slot(&self, node: &NodeId) -> Option<Arc<HubSlot>> {
        self.nodes.get(node).map(|entry| Arc::clone(entry.value()))
    }
}

/// One node's handle onto an [`InProcessHub`].
pub struct InProcessTransport {
    hub: Arc<InProcessHub>,
    local: NodeId,
    events: Mutex<Option<mpsc::UnboundedReceiver<PeerEvent>>>,
}

#[async_trait]
impl Transport for InProcessTransport {
    fn local_node(&self) -> &NodeId {
        &self.local
    }

    fn peers(&self) -> Vec<NodeId> {
        self.hub
            .nodes
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|node| *node != self.local)
            .collect()
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PeerEvent>> {
        self.events.lock().take()
    }

    fn bind(&self, hook: Arc<dyn RuntimeHook>) {
        if let Some(slot) = self.hub.slot(&self.local) {
            *slot.hook.write() = Some(hook);
        }
    }

    async fn deliver(
        &self,
        target: &NodeId,
        type_name: &TypeName,
        id: &ActorId,
        payload: Message,
    ) -> NetworkResult<()> {
        let slot = self
            .hub
            .slot(target)
            .ok_or_else(|| NetworkError::PeerUnreachable(target.clone()))?;
        let hook = slot.hook.read().clone();
        match hook {
            Some(hook) => {
                hook.deliver(type_name.clone(), id.clone(), payload).await;
                Ok(())
            }
            None => Err(NetworkError::PeerUnreachable(target.clone())),
        }
    }

    async fn is_runtime_present(&self, target: &NodeId) -> NetworkResult<bool> {
        let slot = self
            .hub
            .slot(target)
            .ok_or_else(|| NetworkError::PeerUnreachable(target.clone()))?;
        let hook = slot.hook.read().clone();
        Ok(hook.map(|hook| hook.hosting()).unwrap_or(false))
    }

    async fn announce(&self, target: &NodeId) -> NetworkResult<()> {
        let slot = self
            .hub
            .slot(target)
            .ok_or_else(|| NetworkError::PeerUnreachable(target.clone()))?;
        let _ = slot.events.send(PeerEvent::Announced(self.local.clone()));
        Ok(())
    }
}
