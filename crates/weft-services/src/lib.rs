//! weft-services — the services built on top of the mesh controller.
//!
//! File sharding, the witnessed credit economy, social identity recovery,
//! version/asset seeding, posts, notes, and the `MeshCore` node that
//! wires them all together over an injected transport and store.

pub mod credit;
pub mod node;
pub mod notes;
pub mod recovery;
pub mod sharding;
pub mod social;
pub mod version;
pub mod witness;

pub use credit::{CreditError, CreditLedger, MINT};
pub use node::{generate_peer_id, MeshCore};
pub use notes::NotesService;
pub use recovery::{RecoveryEngine, RecoveryError};
pub use sharding::{ShardError, ShardingManager};
pub use social::SocialFeed;
pub use version::{CachedAsset, VersionService};
pub use witness::WitnessEngine;
