//! Single-chunk vs. split decision.

use crate::config::{PushSettings, DEFAULT_SPLIT_COUNT, GIB};

/// Number of chunks an artifact is pushed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingDecision {
    pub count: usize,
}

impl ChunkingDecision {
    pub fn is_split(&self) -> bool {
        self.count > 1
    }
}

/// Splits artifacts strictly larger than `threshold_bytes` into a fixed
/// number of parts. The part count does not depend on the size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    pub threshold_bytes: u64,
    pub split_count: usize,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            threshold_bytes: GIB,
            split_count: DEFAULT_SPLIT_COUNT,
        }
    }
}

impl SizePolicy {
    pub fn new(threshold_bytes: u64, split_count: usize) -> Self {
        Self {
            threshold_bytes,
            split_count,
        }
    }

    pub fn from_settings(settings: &PushSettings) -> Self {
        Self::new(settings.split_threshold_bytes, settings.split_count)
    }

    /// A size equal to the threshold is not split.
    pub fn decide(&self, byte_size: u64) -> ChunkingDecision {
        let count = if byte_size > self.threshold_bytes {
            self.split_count.max(1)
        } else {
            1
        };
        ChunkingDecision { count }
    }
}
