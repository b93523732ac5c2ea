//! Commit event fan-out.
//!
//! The pipeline publishes `CommitComplete` after a block's batch is
//! durable. Delivery is fire-and-forget on a detached thread: subscribers
//! get their own channel and an `Arc` of the immutable block, a dead or
//! slow subscriber never stalls the pipeline, and disconnected channels
//! are pruned on the next publish.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;

use super::block::Block;

/// Published once per committed block, after the batch flush.
#[derive(Clone, Debug)]
pub struct CommitComplete {
    /// The committed block.
    pub block: Arc<Block>,
}

/// Fan-out hub for commit events.
#[derive(Clone, Default)]
pub struct EventHub {
    subscribers: Arc<RwLock<Vec<Sender<CommitComplete>>>>,
}

impl EventHub {
    /// Creates a hub with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> Receiver<CommitComplete> {
        let (sender, receiver) = channel();
        self.subscribers.write().push(sender);
        receiver
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Delivers `event` to every subscriber on a detached thread.
    pub fn publish(&self, event: CommitComplete) {
        let subscribers = self.subscribers.clone();
        thread::spawn(move || {
            subscribers
                .write()
                .retain(|sender| sender.send(event.clone()).is_ok());
        });
    }
}
