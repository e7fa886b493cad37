//! The transport contract between the runtime and the cluster fabric.

use crate::NetworkResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use vactor_core::{ActorId, Message, NodeId, TypeName};

/// Membership-level change observed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A peer became reachable.
    Up(NodeId),
    /// A peer became unreachable.
    Down(NodeId),
    /// A peer explicitly introduced itself.
    Announced(NodeId),
}

/// Inbound half of the transport, implemented by the runtime node.
///
/// The transport calls these for traffic arriving from peers; binding happens
/// once during node assembly, before the router starts consuming events.
#[async_trait]
pub trait RuntimeHook: Send + Sync + 'static {
    /// Dispatches an inbound message submission to the local launcher.
    async fn deliver(&self, type_name: TypeName, id: ActorId, payload: Message);

    /// Whether this node hosts a live launcher.
    fn hosting(&self) -> bool;
}

/// Reliable pairwise invocation against named peers.
///
/// Deliveries are fire-and-forget: an `Ok` return means the invocation was
/// handed to the peer, not that any actor processed it.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Identity of the local node.
    fn local_node(&self) -> &NodeId;

    /// Peers currently believed reachable, excluding the local node.
    fn peers(&self) -> Vec<NodeId>;

    /// Hands over the event stream. Yields `None` after the first call; the
    /// router is the single consumer.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PeerEvent>>;

    /// Binds the inbound dispatch hook.
    fn bind(&self, hook: Arc<dyn RuntimeHook>);

    /// Submits a message to the launcher on `target`.
    async fn deliver(
        &self,
        target: &NodeId,
        type_name: &TypeName,
        id: &ActorId,
        payload: Message,
    ) -> NetworkResult<()>;

    /// Asks `target` whether it hosts a live launcher.
    async fn is_runtime_present(&self, target: &NodeId) -> NetworkResult<bool>;

    /// Introduces the local node to `target`.
    async fn announce(&self, target: &NodeId) -> NetworkResult<()>;
}
