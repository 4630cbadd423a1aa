//! The mesh controller.
//!
//! Owns the connection table, the Lamport clock, and the envelope
//! pipeline. Outbound: stamp clock → sign → encrypt → fan out to
//! interested open peers. Inbound: decrypt → verify → observe clock →
//! publish on the event bus. Frames that fail a cryptographic check are
//! dropped and reported as security alerts, never processed.
//!
//! Fan-out is interest-based: a peer only receives namespaces it declared
//! in its handshake. Peers whose interests are not yet known receive
//! everything — failing open costs bandwidth, failing closed loses data.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use weft_core::crypto::{IdentityKeypair, SymmetricKey};
use weft_core::envelope::{open, seal, EnvelopeError, PlainEnvelope};
use weft_core::schema::{namespace, Packet};

use crate::events::{AlertKind, EventBus, MeshEvent, Subscription};
use crate::transport::{Transport, TransportError};

// ── Connections ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
}

#[derive(Debug, Clone)]
struct Connection {
    state: ConnectionState,
    /// Interests the peer declared. `None` until its handshake arrives.
    interests: Option<HashSet<String>>,
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct MeshController {
    transport: Arc<dyn Transport>,
    identity: Arc<IdentityKeypair>,
    mesh_key: Option<SymmetricKey>,
    interests: RwLock<HashSet<String>>,
    connections: DashMap<String, Connection>,
    clock: AtomicU64,
    events: EventBus,
    asset_timeout: Duration,
}

impl MeshController {
    pub fn new(
        transport: Arc<dyn Transport>,
        identity: Arc<IdentityKeypair>,
        mesh_key: Option<SymmetricKey>,
        interests: Vec<String>,
        asset_timeout: Duration,
    ) -> Self {
        let mut set: HashSet<String> = interests.into_iter().collect();
        for ns in namespace::IMPLICIT {
            set.insert(ns.to_string());
        }
        Self {
            transport,
            identity,
            mesh_key,
            interests: RwLock::new(set),
            connections: DashMap::new(),
            clock: AtomicU64::new(0),
            events: EventBus::new(),
            asset_timeout,
        }
    }

    pub fn local_id(&self) -> &str {
        self.transport.local_id()
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ── Lamport clock ─────────────────────────────────────────────────────

    /// Advance for a local event and return the new value.
    pub fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Merge a remote clock: max(local, remote) + 1.
    pub fn observe(&self, remote: u64) -> u64 {
        let mut current = self.clock.load(Ordering::Relaxed);
        loop {
            let next = current.max(remote) + 1;
            match self.clock.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn clock_now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    // ── Connection lifecycle (driven by the transport) ────────────────────

    /// A peer has started connecting; frames to it are not yet deliverable.
    pub fn register_connecting(&self, peer: &str) {
        self.connections.insert(
            peer.to_string(),
            Connection {
                state: ConnectionState::Connecting,
                interests: None,
            },
        );
    }

    /// A peer's channel is open. Sends our interest handshake immediately.
    pub async fn on_peer_open(&self, peer: &str) {
        self.connections.insert(
            peer.to_string(),
            Connection {
                state: ConnectionState::Open,
                interests: None,
            },
        );
        debug!(peer, "peer open");
        if let Err(e) = self.send_handshake(peer).await {
            warn!(peer, error = %e, "handshake send failed");
        }
        self.events
            .publish(MeshEvent::PeerConnected { peer: peer.to_string() });
    }

    pub fn on_peer_close(&self, peer: &str) {
        if self.connections.remove(peer).is_some() {
            debug!(peer, "peer closed");
            self.events
                .publish(MeshEvent::PeerDisconnected { peer: peer.to_string() });
        }
    }

    /// Open peers, in snapshot order.
    pub fn open_peers(&self) -> Vec<String> {
        self.connections
            .iter()
            .filter(|e| e.value().state == ConnectionState::Open)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Open-peer count — the denominator for witness quorum.
    pub fn peer_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|e| e.value().state == ConnectionState::Open)
            .count()
    }

    // ── Inbound pipeline ──────────────────────────────────────────────────

    /// Handle one inbound frame from the transport.
    pub async fn on_data(&self, from: &str, bytes: &[u8]) {
        let (envelope, sender_key) = match open(bytes, self.mesh_key.as_ref()) {
            Ok(opened) => opened,
            Err(e) => {
                let kind = match e {
                    EnvelopeError::SignatureInvalid => AlertKind::BadSignature,
                    EnvelopeError::Decryption | EnvelopeError::MissingKey => {
                        AlertKind::UndecryptableFrame
                    }
                    _ => AlertKind::MalformedFrame,
                };
                warn!(peer = from, alert = kind.as_str(), "dropping frame");
                self.events.publish(MeshEvent::SecurityAlert {
                    peer: from.to_string(),
                    kind,
                });
                return;
            }
        };
        self.observe(envelope.clock);

        // Handshakes update the connection table and stop here.
        if let Packet::InterestHandshake { interests } = &envelope.packet {
            if let Some(mut conn) = self.connections.get_mut(from) {
                conn.interests = Some(interests.iter().cloned().collect());
                debug!(peer = from, count = interests.len(), "interests updated");
            }
            return;
        }

        self.events.publish(MeshEvent::DataReceived {
            from: from.to_string(),
            envelope,
            sender_key,
        });
    }

    // ── Outbound pipeline ─────────────────────────────────────────────────

    /// Broadcast a packet to every open peer interested in `namespace`.
    /// Returns how many peers it was sent to.
    pub async fn broadcast(&self, ns: &str, packet: Packet) -> Result<usize, MeshError> {
        let envelope = PlainEnvelope::new(self.tick(), ns, packet);
        let bytes = seal(envelope, Some(&self.identity), self.mesh_key.as_ref())?;
        let frame = Bytes::from(bytes);

        // Snapshot eligibility before sending; peers arriving mid-loop
        // catch up through normal traffic.
        let targets: Vec<String> = self
            .connections
            .iter()
            .filter(|e| e.value().state == ConnectionState::Open)
            .filter(|e| interested(e.value().interests.as_ref(), ns))
            .map(|e| e.key().clone())
            .collect();

        let mut sent = 0;
        for peer in &targets {
            match self.transport.send(peer, frame.clone()).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(peer = peer.as_str(), error = %e, "send failed"),
            }
        }
        Ok(sent)
    }

    /// Unicast a packet, sealed the same way broadcasts are.
    pub async fn send_to(&self, peer: &str, ns: &str, packet: Packet) -> Result<(), MeshError> {
        let envelope = PlainEnvelope::new(self.tick(), ns, packet);
        let bytes = seal(envelope, Some(&self.identity), self.mesh_key.as_ref())?;
        self.transport.send(peer, Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Ask the mesh for an asset; first response wins. `None` on timeout.
    pub async fn request_asset(&self, path: &str) -> Option<(Vec<u8>, Option<String>)> {
        let mut sub = self.events.subscribe();
        if let Err(e) = self
            .broadcast(
                namespace::GLOBAL,
                Packet::AssetRequest {
                    path: path.to_string(),
                },
            )
            .await
        {
            warn!(path, error = %e, "asset request broadcast failed");
            return None;
        }

        let wait = async {
            while let Some(event) = sub.recv().await {
                if let MeshEvent::DataReceived { envelope, .. } = event {
                    if let Packet::AssetResponse {
                        path: got,
                        data,
                        content_type,
                    } = envelope.packet
                    {
                        if got == path {
                            return Some((data, content_type));
                        }
                    }
                }
            }
            None
        };
        match timeout(self.asset_timeout, wait).await {
            Ok(found) => found,
            Err(_) => {
                debug!(path, "asset request timed out");
                None
            }
        }
    }

    // ── Interests ─────────────────────────────────────────────────────────

    pub fn interests(&self) -> Vec<String> {
        self.interests
            .read()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Declare interest in a namespace and re-handshake every open peer.
    pub async fn add_interest(&self, ns: &str) {
        let added = self
            .interests
            .write()
            .map(|mut set| set.insert(ns.to_string()))
            .unwrap_or(false);
        if !added {
            return;
        }
        for peer in self.open_peers() {
            if let Err(e) = self.send_handshake(&peer).await {
                warn!(peer = peer.as_str(), error = %e, "handshake send failed");
            }
        }
    }

    /// Handshakes travel as plain frames: interests must be negotiable
    /// before a peer proves it holds the mesh key.
    async fn send_handshake(&self, peer: &str) -> Result<(), MeshError> {
        let envelope = PlainEnvelope::new(
            self.tick(),
            namespace::GLOBAL,
            Packet::InterestHandshake {
                interests: self.interests(),
            },
        );
        let bytes = seal(envelope, None, None)?;
        self.transport.send(peer, Bytes::from(bytes)).await?;
        Ok(())
    }
}

/// Fan-out eligibility: GLOBAL reaches everyone, unknown interests fail
/// open, otherwise the peer must have declared the namespace.
fn interested(peer_interests: Option<&HashSet<String>>, ns: &str) -> bool {
    if ns == namespace::GLOBAL {
        return true;
    }
    match peer_interests {
        None => true,
        Some(set) => set.contains(ns),
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MeshError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
