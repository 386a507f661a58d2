//! Allocation heuristics for storage buffers
//!
//! # Environment Variables
//!
//! - `TENRSO_STORAGE_CAPACITY`: initial capacity of every buffer when no size
//!   hint is available (default: 16)
//! - `TENRSO_STORAGE_GROWTH`: growth factor applied when a buffer is full
//!   (default: 2)

use serde::{Deserialize, Serialize};

/// Initial capacity used when nothing better is known
pub const DEFAULT_CAPACITY: usize = 16;

/// Multiplier applied to a full buffer's capacity
pub const DEFAULT_GROWTH_FACTOR: usize = 2;

/// Buffer allocation configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Capacity of position/coordinate/value buffers without a size hint
    pub default_capacity: usize,
    /// Geometric growth factor (values below 2 are treated as 2)
    pub growth_factor: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            growth_factor: DEFAULT_GROWTH_FACTOR,
        }
    }
}

impl StorageConfig {
    /// Defaults overridden by `TENRSO_STORAGE_CAPACITY` / `TENRSO_STORAGE_GROWTH`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(cap) = read_env("TENRSO_STORAGE_CAPACITY") {
            config.default_capacity = cap;
        }
        if let Some(growth) = read_env("TENRSO_STORAGE_GROWTH") {
            config.growth_factor = growth;
        }
        config
    }

    /// Capacity after growing a buffer of `capacity` to hold at least `needed` elements
    pub fn grown_capacity(&self, capacity: usize, needed: usize) -> usize {
        let factor = self.growth_factor.max(2);
        let mut next = capacity.max(1);
        while next < needed {
            next = next.saturating_mul(factor);
        }
        next
    }
}

fn read_env(key: &str) -> Option<usize> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value > 0 => Some(value),
            _ => {
                tracing::warn!(key, value = %raw, "ignoring invalid storage setting");
                None
            }
        },
        Err(_) => None,
    }
}
