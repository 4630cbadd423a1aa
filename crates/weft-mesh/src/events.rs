//! Mesh event bus.
//!
//! Services observe the mesh through subscriptions rather than callbacks
//! wired at construction time. A `Subscription` deregisters itself on
//! drop, so a service that goes away stops consuming events without any
//! explicit teardown call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use weft_core::envelope::PlainEnvelope;

/// Everything the controller reports upward.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshEvent {
    PeerConnected {
        peer: String,
    },
    PeerDisconnected {
        peer: String,
    },
    /// A frame survived decryption and signature checks.
    DataReceived {
        from: String,
        envelope: PlainEnvelope,
        /// Verified sender public key, when the frame was signed.
        sender_key: Option<String>,
    },
    /// A frame failed a cryptographic check. The frame is dropped; this
    /// event exists so operators can see who is misbehaving.
    SecurityAlert {
        peer: String,
        kind: AlertKind,
    },
    /// Locally observed work that deserves a witnessed reward.
    ContributionDetected {
        to: String,
        amount: f64,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    BadSignature,
    UndecryptableFrame,
    MalformedFrame,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadSignature => "bad_signature",
            Self::UndecryptableFrame => "undecryptable_frame",
            Self::MalformedFrame => "malformed_frame",
        }
    }
}

type Subscribers = Arc<DashMap<u64, mpsc::UnboundedSender<MeshEvent>>>;

/// Fan-out of mesh events to any number of subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Subscribers,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id, tx);
        Subscription {
            id,
            subscribers: self.subscribers.clone(),
            rx,
        }
    }

    /// Deliver an event to every live subscriber. Dead subscribers are
    /// pruned as they are discovered.
    pub fn publish(&self, event: MeshEvent) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().send(event.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// A live event feed. Dropping it deregisters from the bus.
pub struct Subscription {
    id: u64,
    subscribers: Subscribers,
    rx: mpsc::UnboundedReceiver<MeshEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<MeshEvent> {
        self.rx.recv().await
    }

    /// Non-blocking drain, for callers polling from a select loop.
    pub fn try_recv(&mut self) -> Option<MeshEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}
