//! Node assembly: wiring the runtime's pieces together per configuration.

use crate::error::{RuntimeError, RuntimeResult};
use crate::launcher::Launcher;
use crate::router::{ClusterView, Router};
use crate::stopper::{MemoryProbe, Stopper, SysinfoProbe, LOW_MEMORY_WATERMARK};
use crate::DEFAULT_TIME_TO_LIVE;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vactor_core::{ActorAddress, ActorBehavior, ActorId, Message, NodeId, TypeName, TypeRegistry};
use vactor_network::{RuntimeHook, Transport};
use vactor_persistence::Persister;

/// Assembly options for one node.
pub struct NodeOptions {
    /// A client-only node routes sends but never hosts; it starts no
    /// launcher, stopper, or persister.
    pub client_only: bool,
    /// Fallback idle lifetime for behaviours that do not supply their own.
    pub default_time_to_live: Duration,
    /// Free-memory fraction below which the stopper evicts.
    pub low_memory_watermark: f64,
    /// Override for the memory probe; tests inject scripted pressure here.
    pub memory_probe: Option<Box<dyn MemoryProbe>>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            client_only: false,
            default_time_to_live: DEFAULT_TIME_TO_LIVE,
            low_memory_watermark: LOW_MEMORY_WATERMARK,
            memory_probe: None,
        }
    }
}

struct InboundDispatch {
    local: NodeId,
    launcher: Option<Launcher>,
}

#[async_trait]
impl RuntimeHook for InboundDispatch {
    async fn deliver(&self, type_name: TypeName, id: ActorId, payload: Message) {
        match &self.launcher {
            Some(launcher) => launcher.deliver(ActorAddress::new(type_name, id), payload),
            None => warn!(node = %self.local, "delivery to a client-only node dropped"),
        }
    }

    fn hosting(&self) -> bool {
        self.launcher.is_some()
    }
}

/// One process's participation in the cluster.
///
/// Owns the router and, unless client-only, the launcher and stopper. All
/// message submission goes through [`ActorNode::send`].
pub struct ActorNode {
    local: NodeId,
    behaviors: Arc<TypeRegistry>,
    router: Router,
    launcher: Option<Launcher>,
}

impl ActorNode {
    /// Assembles and starts a node on `transport`.
    ///
    /// A hosting node requires a persister; a client-only node ignores it.
    pub fn start(
        transport: Arc<dyn Transport>,
        persister: Option<Arc<dyn Persister>>,
        options: NodeOptions,
    ) -> RuntimeResult<Self> {
        let local = transport.local_node().clone();
        let behaviors = Arc::new(TypeRegistry::new());

        let launcher = if options.client_only {
            None
        } else {
            let persister = persister.ok_or(RuntimeError::MissingPersister)?;
            let probe = options
                .memory_probe
                .unwrap_or_else(|| Box::new(SysinfoProbe::new()));
            let stopper = Stopper::spawn(probe, options.low_memory_watermark);
            Some(Launcher::start(
                local.clone(),
                Arc::clone(&behaviors),
                persister,
                stopper,
                options.default_time_to_live,
            ))
        };

        transport.bind(Arc::new(InboundDispatch {
            local: local.clone(),
            launcher: launcher.clone(),
        }));
        let router = Router::start(transport, launcher.clone());

        info!(node = %local, client_only = launcher.is_none(), "node started");
        Ok(Self {
            local,
            behaviors,
            router,
            launcher,
        })
    }

    /// Registers a behaviour under its type name.
    pub fn register(&self, behavior: Arc<dyn ActorBehavior>) {
        let name = behavior.type_name().to_string();
        if self.behaviors.register(behavior).is_some() {
            warn!(node = %self.local, %name, "behaviour replaced an earlier registration");
        }
    }

    /// Submits a message to the actor addressed by `(type, id)`.
    ///
    /// Fire-and-forget: there is no acknowledgement that the target ever
    /// receives or processes it.
    pub fn send(
        &self,
        type_name: impl Into<TypeName>,
        id: impl Into<ActorId>,
        message: impl Into<Message>,
    ) -> RuntimeResult<()> {
        self.router
            .send(ActorAddress::new(type_name, id), message.into())
    }

    pub fn local_node(&self) -> &NodeId {
        &self.local
    }

    /// The router's current view snapshot.
    pub fn cluster_view(&self) -> ClusterView {
        self.router.view()
    }

    /// Number of live instances resident on this node; zero when
    /// client-only.
    pub fn resident_count(&self) -> usize {
        self.launcher
            .as_ref()
            .map(|launcher| launcher.resident_count())
            .unwrap_or(0)
    }

    /// Whether `(type, id)` is currently resident here.
    pub fn is_resident(&self, type_name: impl Into<TypeName>, id: impl Into<ActorId>) -> bool {
        self.launcher
            .as_ref()
            .map(|launcher| launcher.is_resident(&ActorAddress::new(type_name, id)))
            .unwrap_or(false)
    }

    /// Addresses of every live instance resident here.
    pub fn resident_addresses(&self) -> Vec<ActorAddress> {
        self.launcher
            .as_ref()
            .map(|launcher| launcher.resident_addresses())
            .unwrap_or_default()
    }

    /// Asks every resident instance to stop. Durable state is untouched.
    pub fn shutdown(&self) {
        info!(node = %self.local, "node shutting down");
        if let Some(launcher) = &self.launcher {
            launcher.stop_all();
        }
    }
}
