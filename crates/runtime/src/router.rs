//! The router: cluster view ownership, membership refresh, and send routing.
//!
//! The router owns the node's view of which peers are running the runtime.
//! It rebuilds the view whenever the transport reports a peer change by
//! asking every reachable peer whether it hosts a live launcher, and it is
//! the component that reacts to a newly-up peer: announce ourselves so the
//! peer rebuilds its view including us, then sweep our own registry for
//! instances whose placement has moved to the newcomer.

use crate::error::{RuntimeError, RuntimeResult};
use crate::launcher::Launcher;
use crate::placement;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use vactor_core::{ActorAddress, Message, NodeId};
use vactor_network::{PeerEvent, Transport};

const PRESENCE_TIMEOUT: Duration = Duration::from_secs(2);

/// Snapshot of the peers currently running the runtime in server mode.
///
/// Sorted and deduplicated so every holder iterates candidates in the same
/// order. Views are eventually consistent across nodes, never instantly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterView {
    nodes: Vec<NodeId>,
}

impl ClusterView {
    pub fn new(mut nodes: Vec<NodeId>) -> Self {
        nodes.sort();
        nodes.dedup();
        Self { nodes }
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

struct RouterShared {
    transport: Arc<dyn Transport>,
    launcher: Option<Launcher>,
    local: NodeId,
    view: RwLock<ClusterView>,
    /// One shipper queue per destination so deliveries to a given peer keep
    /// this sender's submission order.
    outbound: DashMap<NodeId, mpsc::UnboundedSender<(ActorAddress, Message)>>,
}

impl RouterShared {
    fn ship(self: &Arc<Self>, home: NodeId, address: ActorAddress, message: Message) {
        let tx = self
            .outbound
            .entry(home.clone())
            .or_insert_with(|| {
                let (tx, mut rx) = mpsc::unbounded_channel::<(ActorAddress, Message)>();
                let transport = Arc::clone(&self.transport);
                let peer = home;
                tokio::spawn(async move {
                    while let Some((address, message)) = rx.recv().await {
                        if let Err(err) = transport
                            .deliver(&peer, address.type_name(), address.id(), message)
                            .await
                        {
                            warn!(%address, node = %peer, %err, "remote delivery failed");
                        }
                    }
                });
                tx
            })
            .clone();
        let _ = tx.send((address, message));
    }
}

/// Handle to the per-node router.
#[derive(Clone)]
pub struct Router {
    shared: Arc<RouterShared>,
}

impl Router {
    /// Starts the router. `launcher` is `None` on a client-only node, which
    /// keeps the local identity out of the view it computes.
    pub(crate) fn start(transport: Arc<dyn Transport>, launcher: Option<Launcher>) -> Self {
        let local = transport.local_node().clone();
        let initial = if launcher.is_some() {
            ClusterView::new(vec![local.clone()])
        } else {
            ClusterView::default()
        };
        let shared = Arc::new(RouterShared {
            transport,
            launcher,
            local,
            view: RwLock::new(initial),
            outbound: DashMap::new(),
        });

        if let Some(events) = shared.transport.take_events() {
            let inner = Arc::clone(&shared);
            tokio::spawn(run_events(inner, events));
        }
        let inner = Arc::clone(&shared);
        tokio::spawn(async move {
            refresh_view(&inner).await;
        });

        Self { shared }
    }

    /// Computes the home node for `address` and submits `message` to it.
    ///
    /// Fire-and-forget: an `Ok` means the submission was accepted locally,
    /// nothing more. Remote deliveries are shipped in the background and
    /// failures only logged.
    pub fn send(&self, address: ActorAddress, message: Message) -> RuntimeResult<()> {
        let view = self.shared.view.read().clone();
        let Some(home) = placement::home_node(view.nodes(), &address) else {
            return Err(RuntimeError::NoHomeNode);
        };

        if *home == self.shared.local {
            match &self.shared.launcher {
                Some(launcher) => launcher.deliver(address, message),
                // A client-only node never appears in its own view; this arm
                // is unreachable unless the view was corrupted externally.
                None => return Err(RuntimeError::NoHomeNode),
            }
            return Ok(());
        }

        self.shared.ship(home.clone(), address, message);
        Ok(())
    }

    /// The current view snapshot.
    pub fn view(&self) -> ClusterView {
        self.shared.view.read().clone()
    }
}

async fn run_events(shared: Arc<RouterShared>, mut events: mpsc::UnboundedReceiver<PeerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PeerEvent::Up(peer) => {
                info!(local = %shared.local, %peer, "peer up");
                refresh_view(&shared).await;
                if let Some(launcher) = &shared.launcher {
                    if let Err(err) = shared.transport.announce(&peer).await {
                        warn!(%peer, %err, "announce failed");
                    }
                    // Only a hosting peer can take addresses over; a peer
                    // that is not in the refreshed view (client-only, or not
                    // serving yet) gets its sweep when it announces.
                    if shared.view.read().contains(&peer) {
                        launcher.evict_for_peer(peer);
                    }
                }
            }
            PeerEvent::Announced(peer) => {
                info!(local = %shared.local, %peer, "peer announced");
                refresh_view(&shared).await;
                // The announce already proves the peer knows about us; only
                // the rebalance sweep is owed, answering back would ping-pong.
                if let Some(launcher) = &shared.launcher {
                    launcher.evict_for_peer(peer);
                }
            }
            PeerEvent::Down(peer) => {
                info!(local = %shared.local, %peer, "peer down");
                refresh_view(&shared).await;
            }
        }
    }
}

/// Rebuilds the view: every reachable peer that answers the presence query
/// affirmatively, plus the local node when it hosts.
async fn refresh_view(shared: &Arc<RouterShared>) {
    let peers = shared.transport.peers();
    let checks = peers.into_iter().map(|peer| {
        let transport = Arc::clone(&shared.transport);
        async move {
            match timeout(PRESENCE_TIMEOUT, transport.is_runtime_present(&peer)).await {
                Ok(Ok(true)) => Some(peer),
                Ok(Ok(false)) => None,
                Ok(Err(err)) => {
                    debug!(%peer, %err, "presence query failed");
                    None
                }
                Err(_) => {
                    debug!(%peer, "presence query timed out");
                    None
                }
            }
        }
    });

    let mut nodes: Vec<NodeId> = join_all(checks).await.into_iter().flatten().collect();
    if shared.launcher.is_some() {
        nodes.push(shared.local.clone());
    }
    let view = ClusterView::new(nodes);
    debug!(local = %shared.local, nodes = view.len(), "view refreshed");
    *shared.view.write() = view;
}
