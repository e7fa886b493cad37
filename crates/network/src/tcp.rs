//! TCP transport.
//!
//! Invocations open a transient connection to the target's listen address,
//! write one frame, and read one reply frame when the invocation has one. A
//! probe task polls the configured seed peers (plus any peer learned through
//! an announce) and synthesises peer-up / peer-down events from probe
//! transitions. Node identity is the listen address.

use crate::{
    read_frame, write_frame, NetworkError, NetworkResult, PeerEvent, RuntimeHook, Transport,
    WireMessage,
};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tracing::{debug, warn};
use vactor_core::{ActorId, Message, NodeId, TypeName};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Transport over plain TCP with transient per-invocation connections.
pub struct TcpTransport {
    local: NodeId,
    hook: RwLock<Option<Arc<dyn RuntimeHook>>>,
    reachable: DashMap<NodeId, ()>,
    probe_targets: DashMap<NodeId, ()>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<PeerEvent>>>,
}

impl TcpTransport {
    /// Binds the listener and starts the accept and probe loops.
    pub async fn bind(listen: SocketAddr, seeds: &[SocketAddr]) -> NetworkResult<Arc<Self>> {
        let listener = TcpListener::bind(listen).await?;
        let local = NodeId::new(listener.local_addr()?.to_string());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let transport = Arc::new(Self {
            local: local.clone(),
            hook: RwLock::new(None),
            reachable: DashMap::new(),
            probe_targets: DashMap::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        });

        for seed in seeds {
            let node = NodeId::new(seed.to_string());
            if node != local {
                transport.probe_targets.insert(node, ());
            }
        }

        let accept = Arc::clone(&transport);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let this = Arc::clone(&accept);
                        tokio::spawn(async move {
                            this.serve_connection(stream).await;
                        });
                    }
                    Err(err) => {
                        warn!(node = %accept.local, %err, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });

        let probe = Arc::clone(&transport);
        tokio::spawn(async move {
            probe.probe_loop().await;
        });

        Ok(transport)
    }

    async fn serve_connection(&self, mut stream: TcpStream) {
        loop {
            let message = match read_frame(&mut stream).await {
                Ok(message) => message,
                Err(_) => return,
            };
            match message {
                WireMessage::Deliver {
                    type_name,
                    id,
                    payload,
                } => {
                    let hook = self.hook.read().clone();
                    match hook {
                        Some(hook) => hook.deliver(type_name, id, Message::from(payload)).await,
                        None => warn!(node = %self.local, "delivery before hook bound dropped"),
                    }
                }
                WireMessage::PresenceQuery => {
                    let hosting = self
                        .hook
                        .read()
                        .as_ref()
                        .map(|hook| hook.hosting())
                        .unwrap_or(false);
                    if write_frame(&mut stream, &WireMessage::PresenceReply { hosting })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                WireMessage::Announce { node } => {
                    debug!(local = %self.local, peer = %node, "announce received");
                    self.probe_targets.insert(node.clone(), ());
                    self.reachable.insert(node.clone(), ());
                    let _ = self.events_tx.send(PeerEvent::Announced(node));
                }
                WireMessage::PresenceReply { .. } => {
                    warn!(node = %self.local, "stray presence reply ignored");
                }
            }
        }
    }

    async fn probe_loop(self: Arc<Self>) {
        let mut ticks = interval(PROBE_INTERVAL);
        loop {
            ticks.tick().await;
            let targets: Vec<NodeId> = self
                .probe_targets
                .iter()
                .map(|entry| entry.key().clone())
                .collect();
            for target in targets {
                let up = self.probe(&target).await;
                if up {
                    if self.reachable.insert(target.clone(), ()).is_none() {
                        debug!(local = %self.local, peer = %target, "peer reachable");
                        let _ = self.events_tx.send(PeerEvent::Up(target));
                    }
                } else if self.reachable.remove(&target).is_some() {
                    debug!(local = %self.local, peer = %target, "peer lost");
                    let _ = self.events_tx.send(PeerEvent::Down(target));
                }
            }
        }
    }

    async fn probe(&self, target: &NodeId) -> bool {
        matches!(
            self.call(target, WireMessage::PresenceQuery, true).await,
            Ok(Some(WireMessage::PresenceReply { .. }))
        )
    }

    /// Opens a transient connection, writes one frame, and reads one reply
    /// frame when the invocation has one.
    async fn call(
        &self,
        target: &NodeId,
        message: WireMessage,
        expect_reply: bool,
    ) -> NetworkResult<Option<WireMessage>> {
        let addr: SocketAddr = target
            .as_str()
            .parse()
            .map_err(|_| NetworkError::BadPeerAddress(target.clone()))?;
        let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| NetworkError::Timeout(target.clone()))??;
        write_frame(&mut stream, &message).await?;
        if !expect_reply {
            return Ok(None);
        }
        let reply = timeout(REPLY_TIMEOUT, read_frame(&mut stream))
            .await
            .map_err(|_| NetworkError::Timeout(target.clone()))??;
        Ok(Some(reply))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_node(&self) -> &NodeId {
        &self.local
    }

    fn peers(&self) -> Vec<NodeId> {
        self.reachable
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|node| *node != self.local)
            .collect()
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<PeerEvent>> {
        self.events_rx.lock().take()
    }

    fn bind(&self, hook: Arc<dyn RuntimeHook>) {
        *self.hook.write() = Some(hook);
    }

    async fn deliver(
        &self,
        target: &NodeId,
        type_name: &TypeName,
        id: &ActorId,
        payload: Message,
    ) -> NetworkResult<()> {
        self.call(
            target,
            WireMessage::Deliver {
                type_name: type_name.clone(),
                id: id.clone(),
                payload: payload.as_slice().to_vec(),
            },
            false,
        )
        .await?;
        Ok(())
    }

    async fn is_runtime_present(&self, target: &NodeId) -> NetworkResult<bool> {
        match self.call(target, WireMessage::PresenceQuery, true).await? {
            Some(WireMessage::PresenceReply { hosting }) => Ok(hosting),
            _ => Err(NetworkError::UnexpectedReply(target.clone())),
        }
    }

    async fn announce(&self, target: &NodeId) -> NetworkResult<()> {
        self.call(
            target,
            WireMessage::Announce {
                node: self.local.clone(),
            },
            false,
        )
        .await?;
        Ok(())
    }
}
