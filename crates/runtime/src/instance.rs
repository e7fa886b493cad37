//! The per-instance actor loop.
//!
//! One tokio task per resident instance, sole owner and mutator of its
//! in-memory state. The loop materialises the instance from the persister,
//! feeds user callbacks one message at a time, applies the resulting
//! verdicts, and terminates on a stop verdict, a stop signal, or the idle
//! timeout. User callbacks never observe concurrency for a given address.

use crate::launcher::LauncherMsg;
use crate::stopper::StopperHandle;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};
use vactor_core::{ActorAddress, ActorBehavior, ActorId, ActorState, Message, Verdict};
use vactor_persistence::Persister;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one residence of an actor.
///
/// Distinct from the address: the same `(type, id)` gets a fresh instance id
/// every time it is materialised, which is what lets the launcher tell a
/// stale registry entry from its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mailbox traffic for one resident instance.
#[derive(Debug)]
pub(crate) enum InstanceMsg {
    Process(Message),
    Stop,
}

/// Cheap-clone handle to a resident instance.
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    id: InstanceId,
    address: ActorAddress,
    mailbox: mpsc::UnboundedSender<InstanceMsg>,
    alive: Arc<AtomicBool>,
}

impl InstanceHandle {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn address(&self) -> &ActorAddress {
        &self.address
    }

    /// Whether the instance loop is still running. Cleared before the
    /// launcher is told to reap, so a false here is authoritative.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Enqueues a message; false means the mailbox is gone.
    pub(crate) fn enqueue(&self, message: Message) -> bool {
        self.mailbox.send(InstanceMsg::Process(message)).is_ok()
    }

    /// Asks the instance to stop after the message it is currently
    /// processing, if any.
    pub(crate) fn request_stop(&self) {
        let _ = self.mailbox.send(InstanceMsg::Stop);
    }
}

/// Everything an instance loop needs from its node.
pub(crate) struct InstanceEnv {
    pub behavior: Arc<dyn ActorBehavior>,
    pub persister: Arc<dyn Persister>,
    pub stopper: StopperHandle,
    pub launcher: mpsc::UnboundedSender<LauncherMsg>,
    pub default_ttl: Duration,
}

/// Spawns the loop for `address`, handing it `first` as its first message.
pub(crate) fn spawn_instance(
    env: InstanceEnv,
    address: ActorAddress,
    first: Message,
) -> InstanceHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = InstanceHandle {
        id: InstanceId::next(),
        address,
        mailbox: tx,
        alive: Arc::new(AtomicBool::new(true)),
    };
    tokio::spawn(run_instance(env, handle.clone(), rx, first));
    handle
}

async fn run_instance(
    env: InstanceEnv,
    handle: InstanceHandle,
    mut mailbox: mpsc::UnboundedReceiver<InstanceMsg>,
    first: Message,
) {
    env.stopper.touch(handle.clone());
    let address = handle.address().clone();
    debug!(%address, instance = %handle.id(), "instance starting");

    let started = match env.persister.get(&address).await {
        Err(err) => {
            warn!(%address, %err, "state fetch failed, dropping first message");
            None
        }
        Ok(Some(state)) => {
            let verdict = invoke_process(&env, &state, address.id(), &first).await;
            apply_verdict(&env, &address, verdict, Some(state)).await
        }
        Ok(None) => {
            let mut verdict = invoke_init(&env, address.id(), &first).await;
            // A brand-new instance that declined to produce state has
            // nothing worth keeping resident.
            if verdict == Verdict::NoUpdate {
                verdict = Verdict::StopNoPersist;
            }
            apply_verdict(&env, &address, verdict, None).await
        }
    };

    if let Some(mut state) = started {
        loop {
            let ttl = env
                .behavior
                .time_to_live(&state, address.id())
                .unwrap_or(env.default_ttl);
            tokio::select! {
                received = mailbox.recv() => match received {
                    Some(InstanceMsg::Process(message)) => {
                        env.stopper.touch(handle.clone());
                        let verdict = invoke_process(&env, &state, address.id(), &message).await;
                        match apply_verdict(&env, &address, verdict, Some(state)).await {
                            Some(next) => state = next,
                            None => break,
                        }
                    }
                    Some(InstanceMsg::Stop) | None => break,
                },
                _ = time::sleep(ttl) => {
                    debug!(%address, instance = %handle.id(), "idle timeout");
                    break;
                }
            }
        }
    }

    handle.alive.store(false, Ordering::SeqCst);
    env.stopper.mark_done(handle.id());
    let _ = env.launcher.send(LauncherMsg::Reap {
        instance: handle.id(),
    });
    debug!(%address, instance = %handle.id(), "instance terminated");
}

async fn invoke_init(env: &InstanceEnv, id: &ActorId, message: &Message) -> Verdict {
    match AssertUnwindSafe(env.behavior.init(id, message))
        .catch_unwind()
        .await
    {
        Ok(verdict) => verdict,
        Err(_) => {
            warn!(%id, "init callback panicked");
            Verdict::StopNoPersist
        }
    }
}

async fn invoke_process(
    env: &InstanceEnv,
    state: &ActorState,
    id: &ActorId,
    message: &Message,
) -> Verdict {
    match AssertUnwindSafe(env.behavior.process(state, id, message))
        .catch_unwind()
        .await
    {
        Ok(verdict) => verdict,
        Err(_) => {
            warn!(%id, "process callback panicked");
            Verdict::StopNoPersist
        }
    }
}

/// Applies one row of the verdict table. Returns the state to continue with,
/// or `None` when the instance terminates.
async fn apply_verdict(
    env: &InstanceEnv,
    address: &ActorAddress,
    verdict: Verdict,
    prior: Option<ActorState>,
) -> Option<ActorState> {
    match verdict {
        Verdict::Ok(state) => {
            persist_put(env, address, &state).await;
            Some(state)
        }
        Verdict::OkNoPersist(state) => Some(state),
        Verdict::NoUpdate => prior,
        Verdict::StopPersist(state) => {
            persist_put(env, address, &state).await;
            None
        }
        Verdict::Stop | Verdict::StopDelete => {
            if let Err(err) = env.persister.delete(address).await {
                warn!(%address, %err, "state delete failed");
            }
            None
        }
        Verdict::StopNoPersist => None,
    }
}

async fn persist_put(env: &InstanceEnv, address: &ActorAddress, state: &ActorState) {
    if let Err(err) = env.persister.put(address, state.clone()).await {
        warn!(%address, %err, "state write failed");
    }
}

#[cfg(test)]
pub(crate) fn test_handle(
    address: ActorAddress,
) -> (InstanceHandle, mpsc::UnboundedReceiver<InstanceMsg>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        InstanceHandle {
            id: InstanceId::next(),
            address,
            mailbox: tx,
            alive: Arc::new(AtomicBool::new(true)),
        },
        rx,
    )
}
