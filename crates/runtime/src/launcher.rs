//! The per-node launcher: local registry and instance lifecycle.
//!
//! The launcher is a single-writer task. Its forward registry is readable by
//! any task (the send fast path checks residence without entering the
//! mailbox), but every mutation happens on the launcher task, which is what
//! keeps the forward and reverse maps mutually consistent and guarantees at
//! most one live instance per address on this node.

use crate::instance::{spawn_instance, InstanceEnv, InstanceHandle, InstanceId};
use crate::placement;
use crate::stopper::StopperHandle;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use vactor_core::{ActorAddress, Message, NodeId, TypeRegistry};
use vactor_persistence::Persister;

pub(crate) enum LauncherMsg {
    Launch { address: ActorAddress, first: Message },
    Reap { instance: InstanceId },
    EvictForPeer { peer: NodeId },
    StopAll,
    /// Answers whether the forward and reverse maps are mutually inverse,
    /// evaluated on the launcher task so no mutation can interleave.
    #[cfg(test)]
    AuditRegistry {
        reply: tokio::sync::oneshot::Sender<bool>,
    },
}

struct LauncherShared {
    local: NodeId,
    registry: DashMap<ActorAddress, InstanceHandle>,
    tx: mpsc::UnboundedSender<LauncherMsg>,
}

/// Handle to the per-node launcher.
#[derive(Clone)]
pub struct Launcher {
    shared: Arc<LauncherShared>,
}

impl Launcher {
    pub(crate) fn start(
        local: NodeId,
        behaviors: Arc<TypeRegistry>,
        persister: Arc<dyn Persister>,
        stopper: StopperHandle,
        default_ttl: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(LauncherShared {
            local,
            registry: DashMap::new(),
            tx,
        });
        let task = LauncherTask {
            shared: Arc::clone(&shared),
            behaviors,
            persister,
            stopper,
            default_ttl,
            reverse: HashMap::new(),
        };
        tokio::spawn(task.run(rx));
        Self { shared }
    }

    /// Routes a message to the resident instance, or schedules a launch.
    ///
    /// The fast path reads the registry without entering the launcher task.
    /// A handle observed alive that terminates before the enqueue lands
    /// loses the message; relaunching here would race the slow path's
    /// idempotent launch.
    pub fn deliver(&self, address: ActorAddress, message: Message) {
        if let Some(entry) = self.shared.registry.get(&address) {
            let handle = entry.value().clone();
            drop(entry);
            if handle.is_alive() {
                if !handle.enqueue(message) {
                    warn!(%address, "message raced a terminating instance, dropped");
                }
                return;
            }
        }
        let _ = self.shared.tx.send(LauncherMsg::Launch {
            address,
            first: message,
        });
    }

    /// Asks every instance whose two-node placement prefers `peer` to stop.
    pub fn evict_for_peer(&self, peer: NodeId) {
        let _ = self.shared.tx.send(LauncherMsg::EvictForPeer { peer });
    }

    /// Asks every resident instance to stop.
    pub fn stop_all(&self) {
        let _ = self.shared.tx.send(LauncherMsg::StopAll);
    }

    /// Whether the forward and reverse maps are mutually inverse, checked on
    /// the launcher task after everything queued ahead has been applied.
    #[cfg(test)]
    pub(crate) async fn audit_registry(&self) -> bool {
        let (reply, answer) = tokio::sync::oneshot::channel();
        if self
            .shared
            .tx
            .send(LauncherMsg::AuditRegistry { reply })
            .is_err()
        {
            return false;
        }
        answer.await.unwrap_or(false)
    }

    /// Number of live resident instances.
    pub fn resident_count(&self) -> usize {
        self.shared
            .registry
            .iter()
            .filter(|entry| entry.value().is_alive())
            .count()
    }

    /// Whether `address` is resident and alive on this node.
    pub fn is_resident(&self, address: &ActorAddress) -> bool {
        self.shared
            .registry
            .get(address)
            .map(|entry| entry.value().is_alive())
            .unwrap_or(false)
    }

    /// Addresses of every live resident instance.
    pub fn resident_addresses(&self) -> Vec<ActorAddress> {
        self.shared
            .registry
            .iter()
            .filter(|entry| entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

struct LauncherTask {
    shared: Arc<LauncherShared>,
    behaviors: Arc<TypeRegistry>,
    persister: Arc<dyn Persister>,
    stopper: StopperHandle,
    default_ttl: Duration,
    reverse: HashMap<InstanceId, ActorAddress>,
}

impl LauncherTask {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LauncherMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                LauncherMsg::Launch { address, first } => self.launch(address, first),
                LauncherMsg::Reap { instance } => self.reap(instance),
                LauncherMsg::EvictForPeer { peer } => self.evict_for_peer(peer),
                LauncherMsg::StopAll => self.stop_all(),
                #[cfg(test)]
                LauncherMsg::AuditRegistry { reply } => {
                    let _ = reply.send(self.registry_is_consistent());
                }
            }
        }
    }

    fn launch(&mut self, address: ActorAddress, first: Message) {
        // Another message may have launched the instance while this request
        // sat in the mailbox; hand it the message instead.
        if let Some(existing) = self.shared.registry.get(&address) {
            if existing.value().is_alive() {
                let _ = existing.value().enqueue(first);
                return;
            }
        }

        let Some(behavior) = self.behaviors.lookup(address.type_name()) else {
            warn!(%address, "no behaviour registered for type, message dropped");
            return;
        };

        let env = InstanceEnv {
            behavior,
            persister: Arc::clone(&self.persister),
            stopper: self.stopper.clone(),
            launcher: self.shared.tx.clone(),
            default_ttl: self.default_ttl,
        };
        let handle = spawn_instance(env, address.clone(), first);
        debug!(%address, instance = %handle.id(), "instance launched");
        self.reverse.insert(handle.id(), address.clone());
        self.shared.registry.insert(address, handle);
    }

    fn reap(&mut self, instance: InstanceId) {
        // Absent entries are tolerated; a relaunch may already own the
        // address, in which case only the reverse entry is ours to clear.
        let Some(address) = self.reverse.remove(&instance) else {
            return;
        };
        self.shared
            .registry
            .remove_if(&address, |_, handle| handle.id() == instance);
    }

    fn evict_for_peer(&mut self, peer: NodeId) {
        // Two-node placement: this instance must vacate exactly when the new
        // peer outranks us for its key, regardless of the rest of the view.
        let pair = [peer.clone(), self.shared.local.clone()];
        let mut stopped = 0usize;
        for entry in self.shared.registry.iter() {
            if placement::home_node(&pair, entry.key()) == Some(&peer) {
                entry.value().request_stop();
                stopped += 1;
            }
        }
        debug!(%peer, stopped, "rebalance sweep");
    }

    fn stop_all(&mut self) {
        for entry in self.shared.registry.iter() {
            entry.value().request_stop();
        }
    }

    /// Both directions of the inverse-map invariant: every reverse entry
    /// points at the registry entry carrying its instance id, and every
    /// registry entry is named by exactly its instance's reverse entry.
    #[cfg(test)]
    fn registry_is_consistent(&self) -> bool {
        if self.reverse.len() != self.shared.registry.len() {
            return false;
        }
        let reverse_ok = self.reverse.iter().all(|(instance, address)| {
            self.shared
                .registry
                .get(address)
                .map(|entry| entry.value().id() == *instance)
                .unwrap_or(false)
        });
        let forward_ok = self.shared.registry.iter().all(|entry| {
            self.reverse.get(&entry.value().id()) == Some(entry.key())
        });
        reverse_ok && forward_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stopper::{MemoryProbe, MemorySample, Stopper, LOW_MEMORY_WATERMARK};
    use async_trait::async_trait;
    use tokio::time;
    use vactor_core::{ActorBehavior, ActorId, ActorState, Verdict};
    use vactor_persistence::MemoryStore;

    struct IdleProbe;

    impl MemoryProbe for IdleProbe {
        fn sample(&mut self) -> MemorySample {
            MemorySample {
                available: 80,
                total: 100,
            }
        }
    }

    fn decode(state: &ActorState) -> u64 {
        if state.is_empty() {
            0
        } else {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(state.as_slice());
            u64::from_le_bytes(bytes)
        }
    }

    struct Counter;

    #[async_trait]
    impl ActorBehavior for Counter {
        fn type_name(&self) -> &str {
            "counter"
        }

        async fn process(&self, state: &ActorState, _id: &ActorId, message: &Message) -> Verdict {
            match message.as_slice() {
                b"inc" => Verdict::Ok(ActorState::from(
                    (decode(state) + 1).to_le_bytes().to_vec(),
                )),
                b"drop" => Verdict::Stop,
                _ => Verdict::NoUpdate,
            }
        }
    }

    struct Fixture {
        launcher: Launcher,
        persister: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let behaviors = Arc::new(TypeRegistry::new());
        behaviors.register(Arc::new(Counter));
        let persister = Arc::new(MemoryStore::new());
        let launcher = Launcher::start(
            NodeId::new("local"),
            behaviors,
            persister.clone(),
            Stopper::spawn(Box::new(IdleProbe), LOW_MEMORY_WATERMARK),
            Duration::from_secs(60),
        );
        Fixture { launcher, persister }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        time::timeout(Duration::from_secs(2), async {
            loop {
                if check() {
                    return;
                }
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition should hold before the deadline");
    }

    async fn wait_for_value(persister: &MemoryStore, address: &ActorAddress, value: u64) {
        time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(state) = persister.get(address).await.unwrap() {
                    if decode(&state) == value {
                        return;
                    }
                }
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("state should reach the persister");
    }

    #[tokio::test]
    async fn deliver_launches_once_and_processes_everything() {
        let f = fixture();
        let address = ActorAddress::new("counter", "a");

        for _ in 0..25 {
            f.launcher.deliver(address.clone(), Message::from("inc"));
        }

        wait_for_value(&f.persister, &address, 25).await;
        assert_eq!(f.launcher.resident_count(), 1);
        assert!(f.launcher.is_resident(&address));
        assert!(f.launcher.audit_registry().await);
    }

    #[tokio::test]
    async fn terminated_instances_are_reaped() {
        let f = fixture();
        let address = ActorAddress::new("counter", "b");

        f.launcher.deliver(address.clone(), Message::from("inc"));
        let launcher = f.launcher.clone();
        let probe = address.clone();
        wait_until(move || launcher.is_resident(&probe)).await;

        f.launcher.deliver(address.clone(), Message::from("drop"));
        let launcher = f.launcher.clone();
        let probe = address.clone();
        wait_until(move || !launcher.is_resident(&probe)).await;
        let launcher = f.launcher.clone();
        wait_until(move || launcher.resident_count() == 0).await;
        assert!(f.launcher.audit_registry().await);
    }

    #[tokio::test]
    async fn forward_and_reverse_maps_stay_mutually_inverse() {
        let f = fixture();
        let addresses: Vec<ActorAddress> = (0..10)
            .map(|i| ActorAddress::new("counter", format!("m-{i}")))
            .collect();

        for address in &addresses {
            f.launcher.deliver(address.clone(), Message::from("inc"));
        }
        let launcher = f.launcher.clone();
        wait_until(move || launcher.resident_count() == 10).await;
        assert!(f.launcher.audit_registry().await);

        // Reaping half of them must shrink both maps in lockstep.
        for address in addresses.iter().take(5) {
            f.launcher.deliver(address.clone(), Message::from("drop"));
        }
        let launcher = f.launcher.clone();
        wait_until(move || launcher.resident_count() == 5).await;
        assert!(f.launcher.audit_registry().await);

        // Relaunching a reaped address installs a fresh instance id under
        // the same key; the maps must agree on the replacement.
        for address in addresses.iter().take(5) {
            f.launcher.deliver(address.clone(), Message::from("inc"));
        }
        let launcher = f.launcher.clone();
        wait_until(move || launcher.resident_count() == 10).await;
        assert!(f.launcher.audit_registry().await);

        f.launcher.stop_all();
        let launcher = f.launcher.clone();
        wait_until(move || launcher.resident_count() == 0).await;
        assert!(f.launcher.audit_registry().await);
    }

    #[tokio::test]
    async fn reaped_addresses_relaunch_on_demand() {
        let f = fixture();
        let address = ActorAddress::new("counter", "c");

        f.launcher.deliver(address.clone(), Message::from("inc"));
        wait_for_value(&f.persister, &address, 1).await;

        f.launcher.deliver(address.clone(), Message::from("drop"));
        let launcher = f.launcher.clone();
        let probe = address.clone();
        wait_until(move || !launcher.is_resident(&probe)).await;

        f.launcher.deliver(address.clone(), Message::from("inc"));
        let launcher = f.launcher.clone();
        let probe = address.clone();
        wait_until(move || launcher.is_resident(&probe)).await;
    }

    #[tokio::test]
    async fn unregistered_types_are_dropped() {
        let f = fixture();
        let address = ActorAddress::new("unknown", "x");

        f.launcher.deliver(address.clone(), Message::from("inc"));
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.launcher.resident_count(), 0);
        assert!(!f.launcher.is_resident(&address));
    }

    #[tokio::test]
    async fn evict_for_peer_stops_exactly_the_relocated() {
        let f = fixture();
        let local = NodeId::new("local");
        let peer = NodeId::new("peer");

        let addresses: Vec<ActorAddress> = (0..40)
            .map(|i| ActorAddress::new("counter", format!("id-{i}")))
            .collect();
        for address in &addresses {
            f.launcher.deliver(address.clone(), Message::from("inc"));
        }
        let launcher = f.launcher.clone();
        wait_until(move || launcher.resident_count() == 40).await;

        let pair = [peer.clone(), local.clone()];
        let relocated: Vec<ActorAddress> = addresses
            .iter()
            .filter(|address| placement::home_node(&pair, address) == Some(&peer))
            .cloned()
            .collect();
        assert!(!relocated.is_empty());
        assert!(relocated.len() < addresses.len());

        f.launcher.evict_for_peer(peer);
        let launcher = f.launcher.clone();
        let staying = addresses.len() - relocated.len();
        wait_until(move || launcher.resident_count() == staying).await;
        for address in &relocated {
            assert!(!f.launcher.is_resident(address));
        }
    }

    #[tokio::test]
    async fn stop_all_clears_the_registry() {
        let f = fixture();
        for i in 0..5 {
            f.launcher
                .deliver(ActorAddress::new("counter", format!("s-{i}")), Message::from("inc"));
        }
        let launcher = f.launcher.clone();
        wait_until(move || launcher.resident_count() == 5).await;

        f.launcher.stop_all();
        let launcher = f.launcher.clone();
        wait_until(move || launcher.resident_count() == 0).await;
    }
}
