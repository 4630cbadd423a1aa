//! Transport contract.
//!
//! A transport delivers opaque byte frames to named peers and reports
//! lifecycle through the controller's `register_connecting` /
//! `on_peer_open` / `on_data` / `on_peer_close` entry points. The
//! controller never constructs connections itself.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[async_trait]
pub trait Transport: Send + Sync {
    /// This node's mesh-wide peer id.
    fn local_id(&self) -> &str;

    /// Deliver one frame to a remote peer. Frames are whole messages —
    /// the transport must not split or merge them.
    async fn send(&self, remote: &str, frame: Bytes) -> Result<(), TransportError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is not reachable")]
    PeerUnreachable(String),

    #[error("transport is closed")]
    Closed,
}
