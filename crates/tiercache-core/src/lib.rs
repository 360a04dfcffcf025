//! TierCache composition and lifecycle engine
//!
//! This crate implements the tier-agnostic machinery of a hierarchical
//! cache:
//! - Store contract (capability traits every tier satisfies)
//! - Length-verified, self-releasing stream wrapper
//! - Backfill-on-read stream with an awaitable completion slot
//! - Composition engine (authoritative tier + fallbacks + fan-out)
//! - Capacity-bounded LRU eviction engine
//!
//! Concrete tiers (memory, disk, HTTP origin, object-storage origin) live
//! in the `tiercache-stores` crate and only implement the store contract.

pub mod backfill;
pub mod config;
pub mod error;
pub mod reader;
pub mod scavenger;
pub mod store;
pub mod tiered;

#[cfg(test)]
mod testutil;

// Re-exports
pub use backfill::{BackfillStream, FillHandle, FillOutcome};
pub use config::{CacheConfig, EvictionConfig, FanoutMode, FanoutPolicy};
pub use error::{Error, Result};
pub use reader::VerifiedReader;
pub use scavenger::Scavenger;
pub use store::{ByteStream, Entry, Metadata, ReadStore, Store, WriteStore, metadata, metadata_as};
pub use tiered::{Child, ChildId, TieredCache};
