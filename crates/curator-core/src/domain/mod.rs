//! Domain models for the curator pipeline.
//!
//! Canonical definitions for the core entities:
//! - `Item`: immutable candidate content unit
//! - `SegmentProfile`: named audience configuration
//! - `Selection`: tier-annotated subset of items for one segment/run
//! - `RenderedArtifact`: the composed document handed to the gate

pub mod artifact;
pub mod digest;
pub mod error;
pub mod item;
pub mod segment;
pub mod selection;

pub use artifact::RenderedArtifact;
pub use digest::ContentDigest;
pub use error::{CuratorError, Result};
pub use item::{Item, ItemId, ItemPool, SourceAuthority, TrendingSignal};
pub use segment::{SegmentCatalog, SegmentProfile, SelectionBounds, TierTargets};
pub use selection::{SelectedItem, Selection, SelectionViolation, Tier};
