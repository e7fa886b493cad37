//! Core types for the vactor virtual-actor runtime.
//!
//! An application addresses actors by `(type, id)` without knowing where an
//! instance lives or whether it is currently resident. This crate defines the
//! addressing types, the behaviour contract an actor type implements, the
//! verdicts a behaviour returns to drive state and lifecycle, and the registry
//! that maps wire-level type names to registered behaviours.

pub mod address;
pub mod behavior;

pub use address::{ActorAddress, ActorId, NodeId, TypeName};
pub use behavior::{ActorBehavior, ActorState, Message, TypeRegistry, Verdict};
