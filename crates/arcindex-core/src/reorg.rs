//! Reorg detection and sanity limits.
//!
//! A reorg shows up on the block stream as a height lower than the last
//! dispatched one. Everything above the new height is stale and has to be
//! removed before the replacement chain is ingested. A rollback deeper than
//! the configured limit means the node itself is unhealthy.

use std::ops::RangeInclusive;

use crate::error::IndexerError;

/// Default maximum rollback depth.
pub const DEFAULT_MAX_REORG_DEPTH: u64 = 1000;

/// Describes a detected chain reorganization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgEvent {
    /// New chain height reported by the stream.
    pub detected_at: u64,
    /// Heights whose records must be deleted.
    pub stale: RangeInclusive<u64>,
    /// Number of heights rolled back.
    pub depth: u64,
}

/// Validates stream rewinds against a depth limit.
#[derive(Debug, Clone)]
pub struct ReorgDetector {
    max_depth: u64,
}

impl Default for ReorgDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REORG_DEPTH)
    }
}

impl ReorgDetector {
    pub fn new(max_depth: u64) -> Self {
        Self { max_depth }
    }

    /// Check a rewind from `last_height` down to `new_height`.
    ///
    /// Returns `Ok(None)` if the stream did not go backwards and
    /// `Err(ReorgTooDeep)` if the rollback exceeds the limit.
    pub fn check(
        &self,
        new_height: u64,
        last_height: u64,
    ) -> Result<Option<ReorgEvent>, IndexerError> {
        if new_height >= last_height {
            return Ok(None);
        }
        let depth = last_height - new_height;
        if depth > self.max_depth {
            tracing::error!(
                from = last_height,
                to = new_height,
                depth,
                max = self.max_depth,
                "Reorg exceeds limit, node is unhealthy"
            );
            return Err(IndexerError::ReorgTooDeep {
                from: last_height,
                to: new_height,
                depth,
            });
        }
        tracing::warn!(depth, at = new_height, "Reorg detected");
        Ok(Some(ReorgEvent {
            detected_at: new_height,
            stale: new_height + 1..=last_height,
            depth,
        }))
    }
}
