//! Miner pool.
//!
//! A fixed set of worker tasks, each owning one bounded queue of height work
//! items. Height `h` always goes to worker `h % N`, so a contiguous range is
//! striped across the workers. Items are processed in send order within one
//! worker; there is no ordering between workers.
//!
//! Per block a worker fetches the block, converts it and its transactions,
//! decodes token events, and writes every record through a [`RecordSink`].

use std::ops::RangeInclusive;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use arcindex_core::account::NAME_ADDRESS;
use arcindex_core::category::{detect_token_deploy, TokenType, TxCategory};
use arcindex_core::convert::{
    account_tokens_doc, block_doc, contract_doc, name_doc, nft_doc, token_doc,
    token_transfer_doc, tx_doc,
};
use arcindex_core::document::{AccountTokensDoc, BlockDoc, Document, RecordKind, TxDoc};
use arcindex_core::error::IndexerError;
use arcindex_core::event::{parse_event, TokenEvent, TransferEvent, TransferKind, BURN, MINT};
use arcindex_core::types::{RawTx, TxType};

use crate::balance::{refresh_balance, refresh_watched};
use crate::context::PipelineContext;
use crate::fetcher::NodeFetcher;
use crate::sink::RecordSink;

/// How a height is ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    /// Terminate the worker.
    Stop,
    /// Backfill: records go through the bulk engine.
    Bulk,
    /// Live: records are written directly.
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub kind: WorkKind,
    pub height: u64,
}

/// Worker index a height is assigned to.
pub fn shard_for(height: u64, workers: usize) -> usize {
    (height % workers.max(1) as u64) as usize
}

// ─── MinerPool ────────────────────────────────────────────────────────────────

pub struct MinerPool {
    queues: Vec<mpsc::Sender<WorkItem>>,
    handles: Vec<JoinHandle<()>>,
    pending: Arc<watch::Sender<usize>>,
    cancel: CancellationToken,
}

impl MinerPool {
    /// Spawn `workers` miners writing through `sink`. `cancel` aborts block
    /// fetches that are still retrying.
    pub fn spawn(
        ctx: &PipelineContext,
        sink: RecordSink,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let workers = workers.max(1);
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        let miner = BlockMiner {
            ctx: ctx.clone(),
            fetcher: NodeFetcher::new(ctx),
            sink,
            cancel: cancel.clone(),
        };

        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel(ctx.config.bulk.queue_capacity);
            queues.push(tx);
            handles.push(tokio::spawn(run_worker(
                id,
                miner.clone(),
                rx,
                pending.clone(),
            )));
        }
        tracing::debug!(workers, "Miner pool started");
        Self {
            queues,
            handles,
            pending,
            cancel,
        }
    }

    pub fn workers(&self) -> usize {
        self.queues.len()
    }

    /// Queue one height on its worker. Blocks while that queue is full.
    pub async fn dispatch(&self, kind: WorkKind, height: u64) -> Result<(), IndexerError> {
        let queue = &self.queues[shard_for(height, self.queues.len())];
        self.pending.send_modify(|n| *n += 1);
        if queue.send(WorkItem { kind, height }).await.is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(IndexerError::aborted(format!("miner for height {height} is gone")));
        }
        Ok(())
    }

    /// Queue every height of `range` in ascending order.
    pub async fn dispatch_range(
        &self,
        kind: WorkKind,
        range: RangeInclusive<u64>,
    ) -> Result<(), IndexerError> {
        for height in range {
            self.dispatch(kind, height).await?;
        }
        Ok(())
    }

    /// Items queued or in progress.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every dispatched item has been mined.
    pub async fn wait_idle(&self) -> Result<(), IndexerError> {
        let mut rx = self.pending.subscribe();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(IndexerError::aborted("miner pool cancelled")),
            res = rx.wait_for(|n| *n == 0) => res
                .map(|_| ())
                .map_err(|_| IndexerError::aborted("miner pool closed")),
        }
    }

    /// Let every worker finish its queue, then join them.
    pub async fn stop(self) {
        for queue in &self.queues {
            let _ = queue
                .send(WorkItem {
                    kind: WorkKind::Stop,
                    height: 0,
                })
                .await;
        }
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Miner worker panicked");
            }
        }
        tracing::debug!("Miner pool stopped");
    }
}

async fn run_worker(
    id: usize,
    miner: BlockMiner,
    mut rx: mpsc::Receiver<WorkItem>,
    pending: Arc<watch::Sender<usize>>,
) {
    while let Some(item) = rx.recv().await {
        if item.kind == WorkKind::Stop {
            break;
        }
        match miner.mine(item).await {
            Ok(()) => {}
            Err(IndexerError::Aborted { reason }) => {
                tracing::debug!(worker = id, height = item.height, reason = %reason, "Mining aborted")
            }
            Err(e) => tracing::error!(worker = id, height = item.height, error = %e, "Failed to mine block"),
        }
        pending.send_modify(|n| *n = n.saturating_sub(1));
    }
    tracing::trace!(worker = id, "Miner stopped");
}

// ─── BlockMiner ───────────────────────────────────────────────────────────────

#[derive(Clone)]
struct BlockMiner {
    ctx: PipelineContext,
    fetcher: NodeFetcher,
    sink: RecordSink,
    cancel: CancellationToken,
}

impl BlockMiner {
    async fn mine(&self, item: WorkItem) -> Result<(), IndexerError> {
        let mode = item.kind;
        let block = self.fetcher.block(item.height, &self.cancel).await?;
        if block.txs.is_empty() && self.ctx.config.skip_empty_blocks {
            return Ok(());
        }

        let producer = self.ctx.cache.peer_id(&block.producer_pubkey);
        let block_doc = block_doc(&block, producer);
        for (idx, tx) in block.txs.iter().enumerate() {
            self.mine_tx(mode, idx as u64, tx, &block_doc).await?;
        }

        let (height, ts) = (block_doc.no, block_doc.ts);
        self.sink.write(mode, Document::Block(block_doc)).await?;

        if mode == WorkKind::Sync
            && height > 0
            && height % self.ctx.config.whitelist_refresh_interval == 0
        {
            if let Err(e) = refresh_watched(&self.ctx, &self.fetcher, height, ts).await {
                tracing::warn!(height, error = %e, "Whitelist refresh failed");
            }
        }
        Ok(())
    }

    async fn mine_tx(
        &self,
        mode: WorkKind,
        idx: u64,
        tx: &RawTx,
        block: &BlockDoc,
    ) -> Result<(), IndexerError> {
        let receipt = self.fetcher.receipt(&tx.hash).await;
        let mut txd = tx_doc(idx, tx, receipt.as_ref(), block);
        let receipt = match receipt {
            Some(r) if !r.is_error() => r,
            _ => return self.sink.write(mode, Document::Tx(txd)).await,
        };

        if tx.tx_type == TxType::Governance && tx.recipient == NAME_ADDRESS {
            self.sink
                .write(mode, Document::Name(name_doc(tx, block.no)))
                .await?;
            return self.sink.write(mode, Document::Tx(txd)).await;
        }

        for address in parties(tx) {
            if let Err(e) = refresh_balance(&self.ctx, &self.fetcher, address, block.no, block.ts).await {
                tracing::warn!(address, tx = %tx.hash, error = %e, "Failed to refresh balance");
            }
        }
        if !txd.category.is_token_candidate() {
            return self.sink.write(mode, Document::Tx(txd)).await;
        }

        if txd.category == TxCategory::Deploy && !receipt.contract_address.is_empty() {
            let doc = contract_doc(&txd, &receipt.contract_address);
            self.sink.write(mode, Document::Contract(doc)).await?;
        }

        for event in &receipt.events {
            match parse_event(event) {
                Ok(Some(TokenEvent::NewToken {
                    token_type,
                    contract,
                })) => self.new_token(mode, &txd, &contract, token_type).await?,
                Ok(Some(TokenEvent::Transfer(transfer))) => {
                    self.transfer(mode, &mut txd, event.idx, &transfer).await?
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(tx = %tx.hash, event = %event.name, error = %e, "Skipping malformed token event"),
            }
        }

        let detected = detect_token_deploy(tx);
        if detected != TokenType::None && !receipt.contract_address.is_empty() {
            self.new_token(mode, &txd, &receipt.contract_address, detected)
                .await?;
        }

        self.sink.write(mode, Document::Tx(txd)).await
    }

    /// Token, contract, and creator holdings of a newly deployed token.
    async fn new_token(
        &self,
        mode: WorkKind,
        tx: &TxDoc,
        contract: &str,
        token_type: TokenType,
    ) -> Result<(), IndexerError> {
        let meta = self.fetcher.token_meta(contract).await;
        if meta.name.is_empty() {
            tracing::debug!(contract, tx = %tx.id, "Token without a name, skipping");
            return Ok(());
        }
        let decimals = holding_decimals(token_type, meta.decimals);
        let supply = self.fetcher.total_supply(contract, decimals).await;
        let token = token_doc(tx, contract, token_type, &meta, &supply);
        self.sink.write(mode, Document::Token(token)).await?;
        self.sink
            .write(mode, Document::Contract(contract_doc(tx, contract)))
            .await?;

        let balance = self.fetcher.balance_of(contract, &tx.from, decimals).await;
        let holding = account_tokens_doc(token_type, contract, tx.ts, tx.blockno, &tx.from, &balance);
        self.write_holding(mode, holding).await
    }

    async fn transfer(
        &self,
        mode: WorkKind,
        tx: &mut TxDoc,
        event_idx: u32,
        transfer: &TransferEvent,
    ) -> Result<(), IndexerError> {
        let contract = transfer.contract.as_str();
        let Some(value) = self
            .fetcher
            .transfer_value(contract, &transfer.amount_or_id)
            .await
        else {
            tracing::debug!(contract, tx = %tx.id, arg = %transfer.amount_or_id, "Unresolvable transfer value, skipping");
            return Ok(());
        };

        let doc = token_transfer_doc(tx, event_idx, contract, &transfer.from, &transfer.to, &value);
        tx.token_transfers += 1;

        let decimals = match value.token_type {
            TokenType::Arc2 => 0,
            _ => self.fetcher.token_meta(contract).await.decimals,
        };
        for account in [&transfer.from, &transfer.to] {
            if account == MINT || account == BURN {
                continue;
            }
            let balance = self.fetcher.balance_of(contract, account, decimals).await;
            let holding =
                account_tokens_doc(value.token_type, contract, doc.ts, doc.blockno, account, &balance);
            self.write_holding(mode, holding).await?;
        }

        // Burned NFTs are only refreshed while following the tip.
        if value.token_type == TokenType::Arc2
            && (transfer.kind != TransferKind::Burn || mode == WorkKind::Sync)
        {
            let (uri, image) = self.fetcher.nft_metadata(contract, &doc.token_id).await;
            self.sink
                .write(mode, Document::Nft(nft_doc(&doc, uri, image)))
                .await?;
        }
        if mode == WorkKind::Sync && transfer.kind != TransferKind::Transfer {
            self.refresh_supply(contract, value.token_type).await;
        }

        self.sink.write(mode, Document::TokenTransfer(doc)).await
    }

    /// Bulk mode writes each holding once per run.
    async fn write_holding(&self, mode: WorkKind, doc: AccountTokensDoc) -> Result<(), IndexerError> {
        if mode == WorkKind::Bulk && self.ctx.cache.mark_seen(&doc.id) {
            return Ok(());
        }
        self.sink.write(mode, Document::AccountTokens(doc)).await
    }

    /// Re-read `totalSupply` after a mint or burn.
    async fn refresh_supply(&self, contract: &str, token_type: TokenType) {
        let decimals = holding_decimals(token_type, self.fetcher.token_meta(contract).await.decimals);
        let supply = self.fetcher.total_supply(contract, decimals).await;
        let partial = serde_json::json!({
            "supply": supply.exact,
            "supply_float": supply.float,
        });
        if let Err(e) = self
            .ctx
            .store
            .update(self.ctx.index(RecordKind::Token), contract, partial)
            .await
        {
            tracing::debug!(contract, error = %e, "Supply not refreshed");
        }
    }
}

/// NFT holdings and supplies are plain counts.
fn holding_decimals(token_type: TokenType, decimals: u8) -> u8 {
    match token_type {
        TokenType::Arc2 => 0,
        _ => decimals,
    }
}

/// Sender and recipient, without duplicates or empty addresses.
fn parties(tx: &RawTx) -> impl Iterator<Item = &str> {
    let recipient = (!tx.recipient.is_empty() && tx.recipient != tx.account)
        .then_some(tx.recipient.as_str());
    std::iter::once(tx.account.as_str())
        .filter(|a| !a.is_empty())
        .chain(recipient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heights_stripe_across_workers() {
        let shards: Vec<usize> = (10..16).map(|h| shard_for(h, 4)).collect();
        assert_eq!(shards, vec![2, 3, 0, 1, 2, 3]);
        assert_eq!(shard_for(7, 0), 0);
    }

    #[test]
    fn parties_skip_self_and_empty() {
        let tx = RawTx {
            account: "AmAlice".into(),
            recipient: "AmAlice".into(),
            ..Default::default()
        };
        assert_eq!(parties(&tx).collect::<Vec<_>>(), vec!["AmAlice"]);

        let deploy = RawTx {
            account: "AmAlice".into(),
            ..Default::default()
        };
        assert_eq!(parties(&deploy).count(), 1);

        let transfer = RawTx {
            account: "AmAlice".into(),
            recipient: "AmBob".into(),
            ..Default::default()
        };
        assert_eq!(parties(&transfer).collect::<Vec<_>>(), vec!["AmAlice", "AmBob"]);
    }

    #[test]
    fn nft_holdings_have_no_decimals() {
        assert_eq!(holding_decimals(TokenType::Arc2, 18), 0);
        assert_eq!(holding_decimals(TokenType::Arc1, 18), 18);
    }
}
