//! Built-in demo behaviour so a fresh cluster is exercisable out of the box.
//!
//! A `counter` actor holds a little-endian u64. `inc` adds one, `report`
//! logs the current value, `done` stops the actor and deletes its state.

use async_trait::async_trait;
use tracing::info;
use vactor_core::{ActorBehavior, ActorId, ActorState, Message, Verdict};

pub struct Counter;

fn decode(state: &ActorState) -> u64 {
    if state.as_slice().len() == 8 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(state.as_slice());
        u64::from_le_bytes(bytes)
    } else {
        0
    }
}

fn encode(value: u64) -> ActorState {
    ActorState::from(value.to_le_bytes().to_vec())
}

#[async_trait]
impl ActorBehavior for Counter {
    fn type_name(&self) -> &str {
        "counter"
    }

    async fn process(&self, state: &ActorState, id: &ActorId, message: &Message) -> Verdict {
        let value = decode(state);
        match message.as_slice() {
            b"inc" => Verdict::Ok(encode(value + 1)),
            b"report" => {
                info!(%id, value, "counter value");
                Verdict::NoUpdate
            }
            b"done" => Verdict::Stop,
            other => {
                info!(%id, message = %String::from_utf8_lossy(other), "unknown counter message");
                Verdict::NoUpdate
            }
        }
    }
}
