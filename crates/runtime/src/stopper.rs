//! Recency tracking and memory-pressure eviction.
//!
//! The stopper is a per-node single-writer task. Instances report liveness
//! with a touch on every processed message; the stopper keeps them in a
//! recency structure and, whenever the sampled free-memory ratio falls below
//! the watermark, asks the oldest instance to stop. At most one instance is
//! stopped per sweep: its termination marks it done here, which sweeps again
//! if pressure persists.

use crate::instance::{InstanceHandle, InstanceId};
use lru::LruCache;
use sysinfo::{System, SystemExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Free-memory fraction below which the oldest instance is asked to stop.
pub const LOW_MEMORY_WATERMARK: f64 = 0.20;

/// One sample of system memory occupancy.
#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    pub available: u64,
    pub total: u64,
}

impl MemorySample {
    /// Fraction of memory still free; a zero-total sample reads as unloaded.
    pub fn free_ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.available as f64 / self.total as f64
        }
    }
}

/// Source of memory samples for eviction decisions.
pub trait MemoryProbe: Send + 'static {
    fn sample(&mut self) -> MemorySample;
}

/// Probe backed by the operating system.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn sample(&mut self) -> MemorySample {
        self.system.refresh_memory();
        MemorySample {
            available: self.system.available_memory(),
            total: self.system.total_memory(),
        }
    }
}

pub(crate) enum StopperMsg {
    Touch(InstanceHandle),
    MarkDone(InstanceId),
}

/// Client side of the stopper task.
#[derive(Clone)]
pub(crate) struct StopperHandle {
    tx: mpsc::UnboundedSender<StopperMsg>,
}

impl StopperHandle {
    pub(crate) fn touch(&self, handle: InstanceHandle) {
        let _ = self.tx.send(StopperMsg::Touch(handle));
    }

    pub(crate) fn mark_done(&self, instance: InstanceId) {
        let _ = self.tx.send(StopperMsg::MarkDone(instance));
    }
}

pub(crate) struct Stopper {
    recency: LruCache<InstanceId, InstanceHandle>,
    probe: Box<dyn MemoryProbe>,
    watermark: f64,
}

impl Stopper {
    pub(crate) fn spawn(probe: Box<dyn MemoryProbe>, watermark: f64) -> StopperHandle {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut stopper = Self {
            recency: LruCache::unbounded(),
            probe,
            watermark,
        };
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                stopper.handle(msg);
            }
        });
        StopperHandle { tx }
    }

    fn handle(&mut self, msg: StopperMsg) {
        match msg {
            StopperMsg::Touch(handle) => {
                self.recency.push(handle.id(), handle);
                self.sweep();
            }
            StopperMsg::MarkDone(instance) => {
                self.recency.pop(&instance);
                self.sweep();
            }
        }
    }

    fn sweep(&mut self) {
        let sample = self.probe.sample();
        if sample.free_ratio() >= self.watermark {
            return;
        }
        if let Some((_, oldest)) = self.recency.peek_lru() {
            debug!(
                address = %oldest.address(),
                free_ratio = sample.free_ratio(),
                "memory pressure, stopping oldest instance"
            );
            oldest.request_stop();
        }
    }
}
