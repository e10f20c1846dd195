//! Bulk commit engine.
//!
//! One batching task per batched record kind. Each task accumulates
//! documents and writes them with a single `bulk_commit` when the batch is
//! full, when asked to commit, or when it stops.
//!
//! The block task is the pacing heartbeat of the whole engine. It flushes on
//! a timer, and before every flush of its own it asks the six dependent
//! tasks to commit and waits for all of them to acknowledge. A block record
//! therefore never becomes visible before the records produced while mining
//! that block.
//!
//! ```text
//!   miners ──Add──► tx, token, token_transfer, name, account_tokens, nft
//!        │                  ▲ Commit(ack)  │ ack
//!        └──Add──► block ───┘ ◄────────────┘ ──► bulk_commit(block)
//! ```
//!
//! Any flush failure is fatal: the task logs it, cancels the shared fatal
//! token, and exits without retrying.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use arcindex_core::document::{Document, RecordKind};
use arcindex_core::error::IndexerError;
use arcindex_core::indexer::BulkConfig;
use arcindex_core::DocumentStore;

use crate::context::PipelineContext;

/// Kinds whose batches are committed before each block batch.
pub const DEPENDENT_KINDS: [RecordKind; 6] = [
    RecordKind::Tx,
    RecordKind::Token,
    RecordKind::TokenTransfer,
    RecordKind::Name,
    RecordKind::AccountTokens,
    RecordKind::Nft,
];

/// Message to a batching task.
#[derive(Debug)]
pub enum BatchItem {
    /// Flush what remains and terminate.
    Stop,
    Add(Document),
    /// Flush now. The sender, if any, is signalled once the flush is done,
    /// even when the batch was empty.
    Commit(Option<oneshot::Sender<()>>),
}

// ─── BatchRouter ──────────────────────────────────────────────────────────────

/// Cloneable handle that routes documents to their kind's batching task.
#[derive(Clone)]
pub struct BatchRouter {
    senders: HashMap<RecordKind, mpsc::Sender<BatchItem>>,
}

impl BatchRouter {
    /// Returns `true` if documents of `kind` are batched.
    pub fn handles(&self, kind: RecordKind) -> bool {
        self.senders.contains_key(&kind)
    }

    /// Queue a document. Blocks while the task's queue is full.
    pub async fn add(&self, doc: Document) -> Result<(), IndexerError> {
        let kind = doc.kind();
        let sender = self
            .senders
            .get(&kind)
            .ok_or_else(|| IndexerError::Other(format!("no bulk engine for '{kind}'")))?;
        sender
            .send(BatchItem::Add(doc))
            .await
            .map_err(|_| IndexerError::aborted(format!("bulk engine for '{kind}' is closed")))
    }
}

// ─── Batch ────────────────────────────────────────────────────────────────────

struct Batch {
    kind: RecordKind,
    index: String,
    docs: Vec<Document>,
    bulk_size: usize,
    last_flush: Instant,
}

impl Batch {
    fn new(kind: RecordKind, index: String, bulk_size: usize) -> Self {
        Self {
            kind,
            index,
            docs: Vec::with_capacity(bulk_size),
            bulk_size,
            last_flush: Instant::now(),
        }
    }

    fn is_full(&self) -> bool {
        self.docs.len() >= self.bulk_size
    }

    async fn flush(&mut self, store: &dyn DocumentStore) -> Result<(), IndexerError> {
        if self.docs.is_empty() {
            self.last_flush = Instant::now();
            return Ok(());
        }
        let started = Instant::now();
        store.bulk_commit(&self.index, &self.docs).await?;
        tracing::debug!(
            kind = %self.kind,
            count = self.docs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bulk committed"
        );
        self.docs.clear();
        self.last_flush = Instant::now();
        Ok(())
    }
}

// ─── Engine tasks ─────────────────────────────────────────────────────────────

async fn run_dependent(
    ctx: PipelineContext,
    mut batch: Batch,
    mut rx: mpsc::Receiver<BatchItem>,
    fatal: CancellationToken,
) -> Result<(), IndexerError> {
    let store = ctx.store.as_ref();
    loop {
        let item = tokio::select! {
            _ = fatal.cancelled() => {
                return Err(IndexerError::aborted(format!("{} batch abandoned", batch.kind)));
            }
            item = rx.recv() => item,
        };
        match item {
            None | Some(BatchItem::Stop) => break,
            Some(BatchItem::Add(doc)) => {
                if batch.is_full() {
                    batch.flush(store).await?;
                }
                batch.docs.push(doc);
            }
            Some(BatchItem::Commit(ack)) => {
                batch.flush(store).await?;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }
    batch.flush(store).await
}

struct BlockTask {
    ctx: PipelineContext,
    batch: Batch,
    dependents: Vec<(RecordKind, mpsc::Sender<BatchItem>)>,
    fatal: CancellationToken,
}

impl BlockTask {
    /// Commit every dependent batch, then the block batch.
    async fn barrier_flush(&mut self) -> Result<(), IndexerError> {
        let mut acks = Vec::with_capacity(self.dependents.len());
        for (kind, sender) in &self.dependents {
            let (tx, rx) = oneshot::channel();
            sender
                .send(BatchItem::Commit(Some(tx)))
                .await
                .map_err(|_| IndexerError::aborted(format!("bulk engine for '{kind}' is closed")))?;
            acks.push((*kind, rx));
        }
        for (kind, rx) in acks {
            tokio::select! {
                _ = self.fatal.cancelled() => {
                    return Err(IndexerError::aborted("barrier interrupted"));
                }
                res = rx => res.map_err(|_| {
                    IndexerError::aborted(format!("'{kind}' engine exited before acknowledging commit"))
                })?,
            }
        }
        self.batch.flush(self.ctx.store.as_ref()).await
    }

    async fn run(mut self, mut rx: mpsc::Receiver<BatchItem>) -> Result<(), IndexerError> {
        let batch_time = self.ctx.config.bulk.batch_time();
        let mut ticker = tokio::time::interval(batch_time);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.fatal.cancelled() => {
                    return Err(IndexerError::aborted("block batch abandoned"));
                }
                _ = ticker.tick() => {
                    if !self.batch.docs.is_empty() && self.batch.last_flush.elapsed() >= batch_time {
                        tracing::debug!(count = self.batch.docs.len(), "Batch time elapsed, committing");
                        self.barrier_flush().await?;
                    }
                }
                item = rx.recv() => match item {
                    None | Some(BatchItem::Stop) => break,
                    Some(BatchItem::Add(doc)) => {
                        if self.batch.is_full() {
                            self.barrier_flush().await?;
                        }
                        self.batch.docs.push(doc);
                    }
                    Some(BatchItem::Commit(ack)) => {
                        self.barrier_flush().await?;
                        if let Some(ack) = ack {
                            let _ = ack.send(());
                        }
                    }
                },
            }
        }
        self.barrier_flush().await
    }
}

/// Spawn a task whose failure cancels the fatal token.
fn spawn_engine<F>(
    kind: RecordKind,
    fatal: CancellationToken,
    fut: F,
) -> JoinHandle<Result<(), IndexerError>>
where
    F: std::future::Future<Output = Result<(), IndexerError>> + Send + 'static,
{
    tokio::spawn(async move {
        let res = fut.await;
        if let Err(e) = &res {
            if !matches!(e, IndexerError::Aborted { .. }) {
                tracing::error!(kind = %kind, error = %e, "Bulk engine failed, shutting down pipeline");
                fatal.cancel();
            }
        }
        res
    })
}

// ─── BulkEngine ───────────────────────────────────────────────────────────────

/// The running set of batching tasks.
pub struct BulkEngine {
    block: mpsc::Sender<BatchItem>,
    block_handle: JoinHandle<Result<(), IndexerError>>,
    dependents: Vec<(RecordKind, mpsc::Sender<BatchItem>, JoinHandle<Result<(), IndexerError>>)>,
    router: BatchRouter,
}

impl BulkEngine {
    /// Start one task per batched kind, writing into the context's indices.
    pub fn start(ctx: &PipelineContext, fatal: CancellationToken) -> Self {
        let BulkConfig {
            bulk_size,
            queue_capacity,
            ..
        } = ctx.config.bulk.clone();

        let mut senders = HashMap::new();
        let mut dependents = Vec::with_capacity(DEPENDENT_KINDS.len());
        let mut barrier = Vec::with_capacity(DEPENDENT_KINDS.len());
        for kind in DEPENDENT_KINDS {
            let (tx, rx) = mpsc::channel(queue_capacity);
            let batch = Batch::new(kind, ctx.index(kind).to_string(), bulk_size);
            let handle = spawn_engine(
                kind,
                fatal.clone(),
                run_dependent(ctx.clone(), batch, rx, fatal.clone()),
            );
            senders.insert(kind, tx.clone());
            barrier.push((kind, tx.clone()));
            dependents.push((kind, tx, handle));
        }

        let (block, rx) = mpsc::channel(queue_capacity);
        senders.insert(RecordKind::Block, block.clone());
        let task = BlockTask {
            ctx: ctx.clone(),
            batch: Batch::new(
                RecordKind::Block,
                ctx.index(RecordKind::Block).to_string(),
                bulk_size,
            ),
            dependents: barrier,
            fatal: fatal.clone(),
        };
        let block_handle = spawn_engine(RecordKind::Block, fatal, task.run(rx));

        tracing::info!(bulk_size, batch_time_ms = ctx.config.bulk.batch_time_ms, "Bulk engine started");
        Self {
            block,
            block_handle,
            dependents,
            router: BatchRouter { senders },
        }
    }

    pub fn router(&self) -> BatchRouter {
        self.router.clone()
    }

    /// Force a barrier commit of everything queued so far and wait for it.
    pub async fn commit(&self) -> Result<(), IndexerError> {
        let (tx, rx) = oneshot::channel();
        self.block
            .send(BatchItem::Commit(Some(tx)))
            .await
            .map_err(|_| IndexerError::aborted("block engine is closed"))?;
        rx.await
            .map_err(|_| IndexerError::aborted("block engine exited before committing"))
    }

    /// Flush and stop every task. The block task goes first so its final
    /// barrier commit still reaches the dependents.
    pub async fn stop(self) -> Result<(), IndexerError> {
        let mut result: Result<(), IndexerError> = Ok(());
        let _ = self.block.send(BatchItem::Stop).await;
        result = result.and(join(RecordKind::Block, self.block_handle).await);

        for (kind, sender, handle) in self.dependents {
            let _ = sender.send(BatchItem::Stop).await;
            result = result.and(join(kind, handle).await);
        }
        if result.is_ok() {
            tracing::info!("Bulk engine stopped");
        }
        result
    }
}

async fn join(
    kind: RecordKind,
    handle: JoinHandle<Result<(), IndexerError>>,
) -> Result<(), IndexerError> {
    handle
        .await
        .map_err(|e| IndexerError::Other(format!("{kind} engine panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};

    use super::*;
    use arcindex_core::document::{BlockDoc, NameDoc};
    use arcindex_core::indexer::IndexerConfig;
    use arcindex_core::store::{IndexNames, Query};
    use arcindex_core::{NodeClient, ResolutionCache};
    use arcindex_storage::MemoryStore;

    struct NoNode;

    #[async_trait::async_trait]
    impl NodeClient for NoNode {
        async fn chain_info(&self) -> Result<arcindex_core::ChainInfo, IndexerError> {
            Err(IndexerError::Rpc("offline".into()))
        }
        async fn best_height(&self) -> Result<u64, IndexerError> {
            Err(IndexerError::Rpc("offline".into()))
        }
        async fn block(&self, _: u64) -> Result<arcindex_core::RawBlock, IndexerError> {
            Err(IndexerError::Rpc("offline".into()))
        }
        async fn receipt(&self, _: &str) -> Result<arcindex_core::RawReceipt, IndexerError> {
            Err(IndexerError::Rpc("offline".into()))
        }
        async fn stream_blocks(&self) -> Result<arcindex_core::BlockStream, IndexerError> {
            Err(IndexerError::Rpc("offline".into()))
        }
        async fn query_contract(
            &self,
            _: &str,
            _: &str,
            _: &[String],
        ) -> Result<serde_json::Value, IndexerError> {
            Err(IndexerError::Rpc("offline".into()))
        }
        async fn account_state(&self, _: &str) -> Result<arcindex_core::AccountState, IndexerError> {
            Err(IndexerError::Rpc("offline".into()))
        }
    }

    fn context(store: Arc<MemoryStore>, bulk_size: usize, batch_time_ms: u64) -> PipelineContext {
        let mut config = IndexerConfig::default();
        config.bulk.bulk_size = bulk_size;
        config.bulk.batch_time_ms = batch_time_ms;
        PipelineContext::new(
            Arc::new(NoNode),
            store,
            Arc::new(ResolutionCache::new()),
            IndexNames::fresh("t", DateTime::<Utc>::UNIX_EPOCH),
            config,
        )
    }

    fn block(no: u64) -> Document {
        Document::Block(BlockDoc {
            id: format!("b{no}"),
            ts: DateTime::<Utc>::UNIX_EPOCH,
            no,
            previous_block: String::new(),
            txs: 0,
            size: 0,
            coinbase: String::new(),
            block_producer: String::new(),
            reward_account: String::new(),
            reward_amount: String::new(),
        })
    }

    fn name(no: u64) -> Document {
        Document::Name(NameDoc {
            id: format!("n{no}"),
            name: format!("n{no}"),
            address: String::new(),
            blockno: no,
            tx: String::new(),
        })
    }

    async fn count(store: &MemoryStore, ctx: &PipelineContext, kind: RecordKind) -> u64 {
        store.count(ctx.index(kind), &Query::all()).await.unwrap()
    }

    #[tokio::test]
    async fn commit_on_empty_engine_completes() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone(), 10, 60_000);
        let engine = BulkEngine::start(&ctx, CancellationToken::new());
        engine.commit().await.unwrap();
        engine.commit().await.unwrap();
        engine.stop().await.unwrap();
        assert_eq!(count(&store, &ctx, RecordKind::Block).await, 0);
    }

    #[tokio::test]
    async fn commit_flushes_dependents_with_blocks() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone(), 100, 60_000);
        let engine = BulkEngine::start(&ctx, CancellationToken::new());
        let router = engine.router();
        for h in 1..=3 {
            router.add(name(h)).await.unwrap();
            router.add(block(h)).await.unwrap();
        }
        assert_eq!(count(&store, &ctx, RecordKind::Block).await, 0);

        engine.commit().await.unwrap();
        assert_eq!(count(&store, &ctx, RecordKind::Block).await, 3);
        assert_eq!(count(&store, &ctx, RecordKind::Name).await, 3);
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn full_batch_flushes_before_next_add() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone(), 2, 60_000);
        let engine = BulkEngine::start(&ctx, CancellationToken::new());
        let router = engine.router();
        for h in 1..=3 {
            router.add(block(h)).await.unwrap();
        }
        // The third add found two queued blocks and flushed them first.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while count(&store, &ctx, RecordKind::Block).await < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(count(&store, &ctx, RecordKind::Block).await, 2);

        engine.stop().await.unwrap();
        assert_eq!(count(&store, &ctx, RecordKind::Block).await, 3);
    }

    #[tokio::test]
    async fn timer_flushes_idle_block_batch() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone(), 100, 20);
        let engine = BulkEngine::start(&ctx, CancellationToken::new());
        engine.router().add(name(1)).await.unwrap();
        engine.router().add(block(1)).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while count(&store, &ctx, RecordKind::Block).await == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(count(&store, &ctx, RecordKind::Name).await, 1);
        engine.stop().await.unwrap();
    }

    #[test]
    fn block_is_not_a_dependent() {
        assert!(!DEPENDENT_KINDS.contains(&RecordKind::Block));
        assert!(!DEPENDENT_KINDS.contains(&RecordKind::AccountBalance));
    }
}
