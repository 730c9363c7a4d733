//! Same-tab broadcast bus for entity list updates
//!
//! Every mutating store operation serializes its entire record list and
//! publishes it here after writing durable storage. The bus fans out to
//! every subscriber; receiving hubs merge foreign lists through conflict
//! detection and drop messages carrying their own origin tag. This is a
//! coarse whole-list protocol for a single logical user across tabs, not
//! multi-writer replication.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use portico_domain::EntityKind;
use uuid::Uuid;

/// A full-list broadcast for one entity kind. `payload` is the JSON
/// serialization of the kind's complete record list; `origin` is the tab
/// that produced it, so receivers can skip their own echoes.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncMessage {
    pub origin: Uuid,
    pub kind: EntityKind,
    pub payload: String,
}

/// The broadcast bus contract. Publishing fans out to every subscriber,
/// including the originator.
pub trait SyncBus: Send + Sync {
    fn publish(&self, message: SyncMessage);
    fn subscribe(&self) -> Receiver<SyncMessage>;
}

/// In-process bus implementation over mpsc channels.
#[derive(Default)]
pub struct MemoryBus {
    subscribers: Mutex<Vec<Sender<SyncMessage>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncBus for MemoryBus {
    fn publish(&self, message: SyncMessage) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|subscriber| subscriber.send(message.clone()).is_ok());
    }

    fn subscribe(&self) -> Receiver<SyncMessage> {
        let (tx, rx) = channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }
}
