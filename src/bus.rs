//! Scheduling and delivery substrate shared by every agent: a FIFO mailbox,
//! a work queue drained by a fixed worker pool, and the set of real-time
//! listeners that receive completion events.

use crate::message::Message;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Per-agent FIFO message queue.
///
/// Any number of producers; the single consumer is the agent's mailbox loop,
/// which takes the receiver once at start.
pub struct Mailbox {
    tx: mpsc::UnboundedSender<Message>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Enqueue a message. Returns false if the mailbox loop has gone away.
    pub fn post(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }

    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Message>> {
        self.rx.lock().take()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue of accepted task ids consumed by a pool of workers.
///
/// Closing the queue stops new work from being accepted while anything
/// already queued is still handed out to the workers.
pub struct WorkQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Queue a task id. Returns false once the queue is closed.
    pub fn push(&self, task_id: String) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(task_id).is_ok(),
            None => false,
        }
    }

    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Wait for the next task id. `None` once closed and drained.
    pub async fn next(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Real-time listeners of one agent
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<Mutex<Vec<(u64, mpsc::UnboundedSender<String>)>>>,
    next_id: Arc<AtomicU64>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Dropping the receiver unsubscribes it.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().push((id, tx));
        debug!(listener = id, "Listener subscribed");
        rx
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a record to every listener, pruning unreachable ones.
    /// Returns how many listeners received it.
    pub fn broadcast<T: Serialize>(&self, record: &T) -> usize {
        let payload = match serde_json::to_string(record) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Failed to serialize broadcast record");
                return 0;
            }
        };

        let mut listeners = self.inner.lock();
        listeners.retain(|(id, tx)| {
            let delivered = tx.send(payload.clone()).is_ok();
            if !delivered {
                debug!(listener = *id, "Pruning disconnected listener");
            }
            delivered
        });
        listeners.len()
    }
}
