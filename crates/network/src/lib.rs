//! Cluster transport for the vactor runtime.
//!
//! The runtime needs three invocations against a named peer: submit a message
//! to the peer's launcher, ask whether the peer hosts a live launcher, and
//! introduce itself after observing the peer come up. This crate defines that
//! contract ([`Transport`]), the inbound half the runtime implements
//! ([`RuntimeHook`]), a length-prefixed bincode wire codec, and two
//! transports: TCP for real clusters and an in-process hub for multi-node
//! tests inside one process.

mod error;
mod memory;
mod tcp;
mod transport;
mod wire;

pub use error::{NetworkError, NetworkResult};
pub use memory::{InProcessHub, InProcessTransport};
pub use tcp::TcpTransport;
pub use transport::{PeerEvent, RuntimeHook, Transport};
pub use wire::{read_frame, write_frame, WireMessage, MAX_FRAME_LEN};
