//! Leaf store adapters for TierCache
//!
//! - [`MemoryStore`]: map-backed read/write store, the usual hot tier
//! - [`DiskStore`]: filesystem read/write store with staged atomic commits
//! - [`FsReadStore`]: read-only pass-through over local filesystem paths
//! - [`HttpReadStore`]: read-only HTTP origin keyed by URL
//! - [`ObjectReadStore`]: read-only object storage container
//!
//! All adapters speak the `tiercache-core` store contract and compose
//! freely under its `TieredCache` and `Scavenger` engines.

pub mod disk;
pub mod fs;
pub mod http;
pub mod memory;
pub mod object;

#[cfg(test)]
pub(crate) mod testserver;

pub use disk::DiskStore;
pub use fs::FsReadStore;
pub use http::HttpReadStore;
pub use memory::MemoryStore;
pub use object::ObjectReadStore;
