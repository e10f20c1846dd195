//! Live sync controller.
//!
//! Follows the node's block stream and feeds every height to a single live
//! miner, so live heights are mined in the order they are dispatched.
//!
//! # Per received height `h`
//! - `h < last`: reorg. Drain the miner, delete every record in `(h, last]`,
//!   rewind, and mine `h` again.
//! - `h == last`: the block at `last` was replaced. Its records are deleted
//!   and `h` is mined again.
//! - `h > last + 1`: mine the skipped heights in ascending order, then `h`.
//!
//! Every `lag_check_interval` received blocks the stored tip is compared with
//! `h`. If the store trails by more than `max_store_lag`, ingestion pauses:
//! stream messages are discarded while the store catches up, and any heights
//! lost that way come back as a gap.
//!
//! A dropped stream is reopened after a fixed backoff; the cursor survives.

use std::ops::RangeInclusive;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use arcindex_core::cursor::{HeightStep, SyncCursor};
use arcindex_core::document::RecordKind;
use arcindex_core::error::IndexerError;
use arcindex_core::indexer::SyncState;
use arcindex_core::reorg::ReorgDetector;
use arcindex_core::store::Query;
use arcindex_core::BlockStream;

use crate::context::PipelineContext;
use crate::miner::{MinerPool, WorkKind};
use crate::sink::RecordSink;

/// Outcome of one stream connection.
enum StreamEnd {
    /// Reconnect after the backoff.
    Dropped,
    /// Shutdown requested.
    Shutdown,
}

pub struct SyncController {
    ctx: PipelineContext,
    miner: MinerPool,
    cursor: SyncCursor,
    detector: ReorgDetector,
    state: SyncState,
    received: u64,
    fatal: CancellationToken,
}

impl SyncController {
    /// Create a controller resuming after `last_height`. `fatal` stops the
    /// controller and aborts in-flight fetches.
    pub fn new(ctx: &PipelineContext, last_height: u64, fatal: CancellationToken) -> Self {
        let miner = MinerPool::spawn(ctx, RecordSink::direct(ctx), 1, fatal.clone());
        Self {
            ctx: ctx.clone(),
            miner,
            cursor: SyncCursor::new(last_height),
            detector: ReorgDetector::new(ctx.config.sync.max_reorg_depth),
            state: SyncState::Idle,
            received: 0,
            fatal,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn last_height(&self) -> u64 {
        self.cursor.last_height
    }

    /// Run until `shutdown` is cancelled or a fatal error occurs. Queued live
    /// work is mined before returning. Returns the last dispatched height.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<u64, IndexerError> {
        tracing::info!(from = self.cursor.next_height(), "Starting live sync");
        let result = self.follow(&shutdown).await;
        self.state = SyncState::Stopped;
        let last = self.cursor.last_height;
        self.miner.stop().await;
        match &result {
            Ok(()) => tracing::info!(last, "Live sync stopped"),
            Err(e) => tracing::error!(last, error = %e, "Live sync failed"),
        }
        result.map(|_| last)
    }

    async fn follow(&mut self, shutdown: &CancellationToken) -> Result<(), IndexerError> {
        let backoff = self.ctx.config.sync.reconnect_backoff();
        loop {
            let opened = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = self.fatal.cancelled() => return Err(IndexerError::aborted("pipeline failed")),
                res = self.ctx.node.stream_blocks() => res,
            };
            match opened {
                Ok(stream) => {
                    if let StreamEnd::Shutdown = self.receive(stream, shutdown).await? {
                        return Ok(());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to open block stream"),
            }

            tracing::warn!(backoff_ms = backoff.as_millis() as u64, "Block stream lost, reconnecting");
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = self.fatal.cancelled() => return Err(IndexerError::aborted("pipeline failed")),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn receive(
        &mut self,
        mut stream: BlockStream,
        shutdown: &CancellationToken,
    ) -> Result<StreamEnd, IndexerError> {
        self.state = SyncState::Streaming;
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => return Ok(StreamEnd::Shutdown),
                _ = self.fatal.cancelled() => return Err(IndexerError::aborted("pipeline failed")),
                next = stream.next() => next,
            };
            let height = match next {
                Some(Ok(block)) => block.height,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Block stream error");
                    return Ok(StreamEnd::Dropped);
                }
                None => return Ok(StreamEnd::Dropped),
            };

            self.on_height(height).await?;

            self.received += 1;
            if self.received % self.ctx.config.sync.lag_check_interval == 0
                && self.throttle(height, &mut stream, shutdown).await?
            {
                return Ok(StreamEnd::Dropped);
            }
        }
    }

    async fn on_height(&mut self, height: u64) -> Result<(), IndexerError> {
        match self.cursor.step(height) {
            HeightStep::Next(h) => {
                self.miner.dispatch(WorkKind::Sync, h).await?;
                self.cursor.advance(h);
            }
            HeightStep::Gap { first, last, height } => {
                tracing::info!(first, last, "Filling stream gap");
                self.miner.dispatch_range(WorkKind::Sync, first..=height).await?;
                self.cursor.advance(height);
            }
            HeightStep::Repeat(h) => {
                tracing::debug!(height = h, "Block at current height replaced");
                self.reingest(h, h..=h).await?;
            }
            HeightStep::Rewind { from, height } => {
                if let Some(reorg) = self.detector.check(height, from)? {
                    self.reingest(height, reorg.stale).await?;
                }
            }
        }
        Ok(())
    }

    /// Drain the miner, delete `stale`, rewind to `height`, and mine it again.
    async fn reingest(&mut self, height: u64, stale: RangeInclusive<u64>) -> Result<(), IndexerError> {
        self.state = SyncState::ReorgRecovery;
        self.miner.wait_idle().await?;
        let deleted = delete_heights(&self.ctx, stale.clone()).await?;
        tracing::info!(from = *stale.start(), to = *stale.end(), deleted, "Removed stale records");
        self.cursor.rewind(height);
        self.miner.dispatch(WorkKind::Sync, height).await?;
        self.state = SyncState::Streaming;
        Ok(())
    }

    /// Pause while the store lags. Returns `true` if the stream ended while
    /// paused.
    async fn throttle(
        &mut self,
        height: u64,
        stream: &mut BlockStream,
        shutdown: &CancellationToken,
    ) -> Result<bool, IndexerError> {
        let stored = self.ctx.best_stored_height().await?.unwrap_or(0);
        let lag = height.saturating_sub(stored);
        if lag <= self.ctx.config.sync.max_store_lag {
            return Ok(false);
        }

        self.state = SyncState::Paused;
        let target = self.cursor.last_height;
        tracing::warn!(height, stored, lag, "Store is lagging, pausing ingestion");

        let mut poll = tokio::time::interval(self.ctx.config.sync.pause_poll());
        poll.tick().await;
        let mut stream_open = true;
        let mut discarded = 0u64;
        let stored = loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(false),
                _ = self.fatal.cancelled() => return Err(IndexerError::aborted("pipeline failed")),
                msg = stream.next(), if stream_open => match msg {
                    Some(Ok(_)) => discarded += 1,
                    Some(Err(_)) | None => stream_open = false,
                },
                _ = poll.tick() => {
                    let stored = self.ctx.best_stored_height().await?.unwrap_or(0);
                    if stored >= target || self.miner.pending() == 0 {
                        break stored;
                    }
                }
            }
        };

        self.cursor.advance(stored);
        self.state = SyncState::Streaming;
        tracing::info!(stored, discarded, "Store caught up, resuming ingestion");
        Ok(!stream_open)
    }
}

/// Delete every height-bearing record with a height in `range`.
pub async fn delete_heights(
    ctx: &PipelineContext,
    range: RangeInclusive<u64>,
) -> Result<u64, IndexerError> {
    let mut deleted = 0;
    for kind in RecordKind::HEIGHT_BEARING {
        let Some(field) = kind.height_field() else {
            continue;
        };
        let query = Query::range(field, *range.start(), *range.end());
        deleted += ctx.store.delete(ctx.index(kind), &query).await?;
    }
    Ok(deleted)
}
