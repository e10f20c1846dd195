//! Scripted node and helpers shared by the pipeline integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt};
use serde_json::Value;
use tokio::sync::Notify;

use arcindex_core::document::RecordKind;
use arcindex_core::indexer::IndexerConfig;
use arcindex_core::store::{DocumentStore, IndexNames, Query};
use arcindex_core::types::{AccountState, ChainInfo, RawBlock, RawReceipt};
use arcindex_core::{BlockStream, IndexerError, NodeClient, ResolutionCache};
use arcindex_pipeline::PipelineContext;
use arcindex_storage::MemoryStore;

/// In-memory node. Heights without a scripted block return an empty block
/// with hash `h{height}`. Contract queries without a scripted result fail.
pub struct MockNode {
    pub chain: Mutex<ChainInfo>,
    pub best: AtomicU64,
    blocks: Mutex<HashMap<u64, RawBlock>>,
    receipts: Mutex<HashMap<String, RawReceipt>>,
    queries: Mutex<HashMap<(String, String, Vec<String>), Value>>,
    accounts: Mutex<HashMap<String, AccountState>>,
    streams: Mutex<VecDeque<Vec<u64>>>,
    /// Every block fetch, in call order.
    pub fetched: Mutex<Vec<u64>>,
    /// Signalled when the last scripted stream connection has been handed out.
    pub exhausted: Notify,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(ChainInfo {
                magic: "testnet.aergo.io".into(),
                public: true,
                mainnet: false,
                consensus: "dpos".into(),
                version: 3,
            }),
            best: AtomicU64::new(0),
            blocks: Mutex::default(),
            receipts: Mutex::default(),
            queries: Mutex::default(),
            accounts: Mutex::default(),
            streams: Mutex::default(),
            fetched: Mutex::default(),
            exhausted: Notify::new(),
        }
    }

    pub fn with_best(self, best: u64) -> Self {
        self.best.store(best, Ordering::SeqCst);
        self
    }

    pub fn add_block(&self, block: RawBlock) {
        self.blocks.lock().unwrap().insert(block.height, block);
    }

    pub fn add_receipt(&self, tx_hash: &str, receipt: RawReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(tx_hash.to_string(), receipt);
    }

    pub fn add_query(&self, contract: &str, method: &str, args: &[&str], result: Value) {
        let args = args.iter().map(|a| a.to_string()).collect();
        self.queries
            .lock()
            .unwrap()
            .insert((contract.to_string(), method.to_string(), args), result);
    }

    pub fn add_account(&self, address: &str, state: AccountState) {
        self.accounts
            .lock()
            .unwrap()
            .insert(address.to_string(), state);
    }

    /// Queue one stream connection that delivers `heights` and then ends.
    pub fn add_stream(&self, heights: Vec<u64>) {
        self.streams.lock().unwrap().push_back(heights);
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    fn block_at(&self, height: u64) -> RawBlock {
        self.blocks
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .unwrap_or_else(|| empty_block(height))
    }
}

pub fn empty_block(height: u64) -> RawBlock {
    RawBlock {
        hash: format!("h{height}"),
        prev_hash: format!("h{}", height.saturating_sub(1)),
        height,
        timestamp: 1_700_000_000_000_000_000 + height as i64 * 1_000_000_000,
        producer_pubkey: vec![8, 2, 18, 33, height as u8],
        ..Default::default()
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn chain_info(&self) -> Result<ChainInfo, IndexerError> {
        Ok(self.chain.lock().unwrap().clone())
    }

    async fn best_height(&self) -> Result<u64, IndexerError> {
        Ok(self.best.load(Ordering::SeqCst))
    }

    async fn block(&self, height: u64) -> Result<RawBlock, IndexerError> {
        self.fetched.lock().unwrap().push(height);
        Ok(self.block_at(height))
    }

    async fn receipt(&self, tx_hash: &str) -> Result<RawReceipt, IndexerError> {
        self.receipts
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| IndexerError::Rpc(format!("no receipt for {tx_hash}")))
    }

    async fn stream_blocks(&self) -> Result<BlockStream, IndexerError> {
        let next = self.streams.lock().unwrap().pop_front();
        match next {
            Some(heights) => {
                let blocks: Vec<_> = heights.into_iter().map(|h| Ok(self.block_at(h))).collect();
                Ok(stream::iter(blocks).boxed())
            }
            None => {
                self.exhausted.notify_one();
                Ok(stream::pending().boxed())
            }
        }
    }

    async fn query_contract(
        &self,
        contract: &str,
        method: &str,
        args: &[String],
    ) -> Result<Value, IndexerError> {
        let key = (contract.to_string(), method.to_string(), args.to_vec());
        self.queries
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| IndexerError::Rpc(format!("{contract}.{method} failed")))
    }

    async fn account_state(&self, address: &str) -> Result<AccountState, IndexerError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}

// ─── Context helpers ──────────────────────────────────────────────────────────

/// Configuration with short timers.
pub fn test_config() -> IndexerConfig {
    let mut config = IndexerConfig {
        prefix: "test".into(),
        miners: 4,
        fetch_retry_ms: 5,
        ..Default::default()
    };
    config.bulk.bulk_size = 100;
    config.bulk.batch_time_ms = 60_000;
    config.sync.reconnect_backoff_ms = 10;
    config.sync.pause_poll_ms = 10;
    config
}

pub fn context(node: Arc<MockNode>, store: Arc<MemoryStore>, config: IndexerConfig) -> PipelineContext {
    PipelineContext::new(
        node,
        store,
        Arc::new(ResolutionCache::new()),
        IndexNames::fresh(&config.prefix, Utc::now()),
        config,
    )
}

/// Stored block heights, ascending.
pub async fn stored_heights(ctx: &PipelineContext) -> Vec<u64> {
    ctx.store
        .scroll(ctx.index(RecordKind::Block), Query::all().sorted_by("no", true))
        .filter_map(|doc| async move { doc.ok().and_then(|d| d.u64_field("no")) })
        .collect()
        .await
}

pub async fn count(ctx: &PipelineContext, kind: RecordKind) -> u64 {
    ctx.store
        .count(ctx.index(kind), &Query::all())
        .await
        .unwrap_or(0)
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
