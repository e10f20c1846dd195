//! Consistency checker.
//!
//! Walks the stored block heights of `[from, to]` in descending order and
//! backfills every missing run of heights through the bulk engine.

use std::ops::RangeInclusive;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use arcindex_core::document::RecordKind;
use arcindex_core::error::IndexerError;
use arcindex_core::store::{DocumentStore, Query};

use crate::bulk::BulkEngine;
use crate::context::PipelineContext;
use crate::miner::{MinerPool, WorkKind};
use crate::sink::RecordSink;

/// Scroll page size for the height scan.
const SCAN_PAGE: usize = 10_000;

// ─── GapScanner ───────────────────────────────────────────────────────────────

/// Finds missing heights in a descending sequence of stored heights.
#[derive(Debug, Clone)]
pub struct GapScanner {
    from: u64,
    prev: u64,
    missing: u64,
    done: bool,
}

impl GapScanner {
    pub fn new(from: u64, to: u64) -> Self {
        Self {
            from,
            prev: to.saturating_add(1),
            missing: 0,
            done: false,
        }
    }

    /// Feed the next stored height. Returns the gap just above it, if any.
    ///
    /// Heights at or above the previous one are ignored. A height at or below
    /// `from` closes the scan.
    pub fn observe(&mut self, height: u64) -> Option<RangeInclusive<u64>> {
        if self.done || height >= self.prev {
            return None;
        }
        if height <= self.from {
            self.done = true;
            let low = if height == self.from { self.from + 1 } else { self.from };
            return self.gap(low, self.prev);
        }
        let gap = self.gap(height + 1, self.prev);
        self.prev = height;
        gap
    }

    /// Close the scan. Returns the tail below the lowest stored height.
    pub fn finish(&mut self) -> Option<RangeInclusive<u64>> {
        if self.done {
            return None;
        }
        self.done = true;
        self.gap(self.from, self.prev)
    }

    /// Total heights reported missing so far.
    pub fn missing(&self) -> u64 {
        self.missing
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Gap `[low, above)`, if non-empty.
    fn gap(&mut self, low: u64, above: u64) -> Option<RangeInclusive<u64>> {
        if low >= above {
            return None;
        }
        self.missing += above - low;
        Some(low..=above - 1)
    }
}

/// Missing block ranges of `[from, to]`, highest first. Does not backfill.
pub async fn find_gaps(
    store: &dyn DocumentStore,
    block_index: &str,
    from: u64,
    to: u64,
) -> Result<Vec<RangeInclusive<u64>>, IndexerError> {
    let mut scanner = GapScanner::new(from, to);
    let mut gaps = Vec::new();
    let mut heights = store.scroll(block_index, height_query(from, to));
    while let Some(doc) = heights.next().await {
        let Some(height) = doc?.u64_field("no") else {
            continue;
        };
        gaps.extend(scanner.observe(height));
        if scanner.is_done() {
            break;
        }
    }
    gaps.extend(scanner.finish());
    Ok(gaps)
}

fn height_query(from: u64, to: u64) -> Query {
    Query::range("no", from, to)
        .sorted_by("no", false)
        .with_size(SCAN_PAGE)
}

// ─── Checker ──────────────────────────────────────────────────────────────────

/// Result of a consistency run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub missing: u64,
    pub ranges: Vec<RangeInclusive<u64>>,
}

pub struct Checker {
    ctx: PipelineContext,
}

impl Checker {
    pub fn new(ctx: &PipelineContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    /// Scan `[from, to]` and backfill every gap. With `fix`, the whole range
    /// is re-ingested without scanning. An inverted range is a config error.
    ///
    /// The bulk engine and miners live exactly as long as the run; everything
    /// is committed when this returns `Ok`.
    pub async fn run(
        &self,
        from: u64,
        to: u64,
        fix: bool,
        fatal: CancellationToken,
    ) -> Result<CheckReport, IndexerError> {
        if from > to {
            return Err(IndexerError::Config(format!(
                "invalid check range: from {from} > to {to}"
            )));
        }
        let started = Instant::now();
        tracing::info!(from, to, fix, "Starting consistency check");

        self.ctx.cache.clear_seen();
        let engine = BulkEngine::start(&self.ctx, fatal.clone());
        let miners = MinerPool::spawn(
            &self.ctx,
            RecordSink::bulk(&self.ctx, engine.router()),
            self.ctx.config.miners,
            fatal.clone(),
        );

        let scanned = if fix {
            miners
                .dispatch_range(WorkKind::Bulk, from..=to)
                .await
                .map(|_| CheckReport {
                    missing: to - from + 1,
                    ranges: vec![from..=to],
                })
        } else {
            self.scan(from, to, &miners).await
        };

        miners.stop().await;
        let stopped = engine.stop().await;
        let report = scanned?;
        stopped?;
        if fatal.is_cancelled() {
            return Err(IndexerError::aborted("consistency check interrupted"));
        }

        let elapsed = started.elapsed().as_secs_f64();
        tracing::info!(
            missing = report.missing,
            ranges = report.ranges.len(),
            elapsed_s = elapsed,
            per_second = if elapsed > 0.0 { report.missing as f64 / elapsed } else { 0.0 },
            "Consistency check complete"
        );
        Ok(report)
    }

    async fn scan(
        &self,
        from: u64,
        to: u64,
        miners: &MinerPool,
    ) -> Result<CheckReport, IndexerError> {
        let store = self.ctx.store.as_ref();
        let mut scanner = GapScanner::new(from, to);
        let mut ranges = Vec::new();
        let mut heights = store.scroll(self.ctx.index(RecordKind::Block), height_query(from, to));
        while let Some(doc) = heights.next().await {
            let Some(height) = doc?.u64_field("no") else {
                continue;
            };
            if let Some(gap) = scanner.observe(height) {
                self.backfill(miners, gap, &mut ranges).await?;
            }
            if scanner.is_done() {
                break;
            }
        }
        drop(heights);
        if let Some(gap) = scanner.finish() {
            self.backfill(miners, gap, &mut ranges).await?;
        }
        Ok(CheckReport {
            missing: scanner.missing(),
            ranges,
        })
    }

    async fn backfill(
        &self,
        miners: &MinerPool,
        gap: RangeInclusive<u64>,
        ranges: &mut Vec<RangeInclusive<u64>>,
    ) -> Result<(), IndexerError> {
        tracing::info!(
            from = *gap.start(),
            to = *gap.end(),
            count = gap.end() - gap.start() + 1,
            "Backfilling gap"
        );
        miners.dispatch_range(WorkKind::Bulk, gap.clone()).await?;
        ranges.push(gap);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(from: u64, to: u64, heights: &[u64]) -> (Vec<RangeInclusive<u64>>, u64) {
        let mut s = GapScanner::new(from, to);
        let mut gaps: Vec<_> = heights.iter().filter_map(|h| s.observe(*h)).collect();
        gaps.extend(s.finish());
        (gaps, s.missing())
    }

    #[test]
    fn gaps_and_tail() {
        let (gaps, missing) = scan(0, 10, &[10, 9, 7, 5]);
        assert_eq!(gaps, vec![8..=8, 6..=6, 0..=4]);
        assert_eq!(missing, 7);
    }

    #[test]
    fn tail_respects_from() {
        let (gaps, missing) = scan(3, 10, &[10, 9, 7, 5]);
        assert_eq!(gaps, vec![8..=8, 6..=6, 3..=4]);
        assert_eq!(missing, 4);
    }

    #[test]
    fn missing_top() {
        let (gaps, _) = scan(0, 10, &[8, 7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(gaps, vec![9..=10]);
    }

    #[test]
    fn stored_from_closes_scan() {
        let (gaps, missing) = scan(2, 6, &[6, 4, 2, 1]);
        assert_eq!(gaps, vec![5..=5, 3..=3]);
        assert_eq!(missing, 2);
    }

    #[test]
    fn duplicates_are_ignored() {
        let (gaps, missing) = scan(0, 5, &[5, 5, 4, 4, 3, 2, 1, 0]);
        assert!(gaps.is_empty());
        assert_eq!(missing, 0);
    }

    #[test]
    fn empty_store_is_one_gap() {
        let (gaps, missing) = scan(1, 100, &[]);
        assert_eq!(gaps, vec![1..=100]);
        assert_eq!(missing, 100);
    }
}
