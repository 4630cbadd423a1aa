//! weft-mesh — transport abstraction, event bus, and the mesh controller.
//!
//! The controller owns the connection table, the Lamport clock, and the
//! seal/open pipeline; it knows nothing about the services built on top.
//! Transports and stores are injected behind traits so the same controller
//! runs over a real network or an in-memory hub in tests.

pub mod controller;
pub mod events;
pub mod memory;
pub mod store;
pub mod transport;

pub use controller::{MeshController, MeshError};
pub use events::{AlertKind, EventBus, MeshEvent, Subscription};
pub use memory::{MemoryHub, MemoryStore, MemoryTransport};
pub use store::{KvStore, KvStoreExt, StoreError};
pub use transport::{Transport, TransportError};
