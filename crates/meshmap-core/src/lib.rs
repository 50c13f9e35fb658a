//! Meshmap Core - Thread topology reconstruction and device matching
//!
//! This crate holds the synchronous engine of meshmap:
//! - OTBR diagnostic payload types and the topology parser
//! - Border router vendor classification and link-quality tiers
//! - Registry model and the registry-to-node matcher
//! - Network snapshots, the snapshot store and its health tracking
//! - Markdown rendering and per-node status projections

pub mod address;
pub mod classify;
pub mod link_quality;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod registry;
pub mod render;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod wire;

pub use address::{AddressError, ExtAddress};
pub use classify::{RouterRule, RulePattern};
pub use link_quality::{LinkQuality, ThresholdError, Thresholds};
pub use matcher::{match_device, AmbiguousMatch};
pub use model::{Link, LinkOrigin, MatchedIdentity, Node, Role, RouterClass, Transport};
pub use parser::{parse, ParseConflict, ParsedTopology, TopologyError};
pub use registry::{RegistryEntry, RegistryError, RegistrySource, StaticRegistry};
pub use snapshot::{EngineSettings, NetworkSnapshot};
pub use store::{Availability, CycleFailure, FailureKind, SnapshotStore, StoreHealth, StoreView};
pub use wire::RawDiagnostics;
