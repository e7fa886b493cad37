//! Deterministic placement of addresses onto cluster nodes.
//!
//! Rendezvous (highest-random-weight) hashing: every node's weight for an
//! address is the SHA-256 digest of the length-prefixed serialisation of
//! `(node, type, id)`, and the node with the lexicographically greatest
//! digest wins. Every peer computes the same answer for the same view, and a
//! single-node view change relocates only ~1/|V| of addresses, always onto or
//! off the changed node.

use sha2::{Digest, Sha256};
use vactor_core::{ActorAddress, NodeId};

fn weight(node: &NodeId, address: &ActorAddress) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in [
        node.as_str(),
        address.type_name().as_str(),
        address.id().as_str(),
    ] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().into()
}

/// Selects the home node for `address` out of `nodes`.
///
/// Returns `None` for an empty view. Ties (astronomically improbable with a
/// 32-byte digest) resolve to the earlier node in iteration order.
pub fn home_node<'a>(nodes: &'a [NodeId], address: &ActorAddress) -> Option<&'a NodeId> {
    let mut best: Option<(&NodeId, [u8; 32])> = None;
    for node in nodes {
        let candidate = weight(node, address);
        match &best {
            Some((_, current)) if *current >= candidate => {}
            _ => best = Some((node, candidate)),
        }
    }
    best.map(|(node, _)| node)
}
