//! Configuration types for TierCache
//!
//! This module defines the configuration structures for the composition
//! and eviction engines.

use serde::{Deserialize, Serialize};

/// Dispatch mode for write/delete fan-out and for backfill on read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutMode {
    /// Wait for every child (and for the backfill) to complete before
    /// returning control to the caller.
    Synchronous,
    /// Dispatch children as detached tasks and return as soon as the
    /// authoritative operation is durable.
    #[default]
    Asynchronous,
}

/// Propagation policy for a composition engine instance
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FanoutPolicy {
    /// Replay successful puts to every write-capable child
    pub write_through: bool,
    /// Replay successful deletes to every write-capable child
    pub delete_through: bool,
    /// Whether fan-out (and backfill) waits for completion
    pub mode: FanoutMode,
}

impl Default for FanoutPolicy {
    fn default() -> Self {
        Self {
            write_through: false,
            delete_through: false,
            mode: FanoutMode::Asynchronous,
        }
    }
}

/// Configuration for a capacity-bounded eviction engine
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Size budget in bytes; exceeding it triggers an inline scavenge
    pub max_bytes: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            max_bytes: 256 * 1024 * 1024, // 256MB
        }
    }
}

/// Root configuration for one cache hierarchy
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Fan-out propagation policy
    pub fanout: FanoutPolicy,
    /// Eviction budget for the accounting layer, if one is stacked on top
    pub eviction: EvictionConfig,
}
