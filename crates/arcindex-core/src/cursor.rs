//! Sync cursor: tracks the last height handed to the live miner.

use serde::{Deserialize, Serialize};

/// What to do with a height received from the block stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeightStep {
    /// `height` directly follows the cursor.
    Next(u64),
    /// Heights `first..=last` were skipped by the stream and must be
    /// ingested before `height`.
    Gap { first: u64, last: u64, height: u64 },
    /// The stream re-sent the cursor height.
    Repeat(u64),
    /// The stream went backwards: heights `height+1..=from` were replaced.
    Rewind { from: u64, height: u64 },
}

/// The live sync position.
///
/// Only the sync controller's loop mutates the cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Highest height dispatched for ingestion.
    pub last_height: u64,
}

impl SyncCursor {
    pub fn new(last_height: u64) -> Self {
        Self { last_height }
    }

    /// Classify a received height against the cursor.
    pub fn step(&self, height: u64) -> HeightStep {
        let last = self.last_height;
        if height < last {
            HeightStep::Rewind { from: last, height }
        } else if height == last {
            HeightStep::Repeat(height)
        } else if height == last + 1 {
            HeightStep::Next(height)
        } else {
            HeightStep::Gap {
                first: last + 1,
                last: height - 1,
                height,
            }
        }
    }

    /// Move the cursor to `height`. Heights never move backwards here.
    pub fn advance(&mut self, height: u64) {
        self.last_height = self.last_height.max(height);
    }

    /// Move the cursor back after a reorg.
    pub fn rewind(&mut self, height: u64) {
        self.last_height = height;
    }

    /// Returns the next height expected from the stream.
    pub fn next_height(&self) -> u64 {
        self.last_height + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps() {
        let c = SyncCursor::new(100);
        assert_eq!(c.step(101), HeightStep::Next(101));
        assert_eq!(c.step(100), HeightStep::Repeat(100));
        assert_eq!(
            c.step(104),
            HeightStep::Gap {
                first: 101,
                last: 103,
                height: 104
            }
        );
        assert_eq!(c.step(97), HeightStep::Rewind { from: 100, height: 97 });
    }

    #[test]
    fn advance_and_rewind() {
        let mut c = SyncCursor::new(10);
        c.advance(12);
        assert_eq!(c.last_height, 12);
        c.advance(11);
        assert_eq!(c.last_height, 12);
        c.rewind(8);
        assert_eq!(c.last_height, 8);
        assert_eq!(c.next_height(), 9);
    }
}
