//! Top-level orchestrator.
//!
//! Prepares the indices, verifies the chain identity, and runs the configured
//! [`RunMode`] until it completes or `shutdown` is cancelled.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo(
//! #     node: std::sync::Arc<dyn arcindex_core::NodeClient>,
//! #     store: std::sync::Arc<dyn arcindex_core::DocumentStore>,
//! # ) -> Result<(), arcindex_core::IndexerError> {
//! use arcindex_pipeline::{Indexer, IndexerBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = IndexerBuilder::new().prefix("mainnet").miners(16).build_config();
//! let shutdown = CancellationToken::new();
//! Indexer::new(node, store, config).run(shutdown).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use arcindex_core::convert::chain_info_doc;
use arcindex_core::document::{ChainInfoDoc, Document, RecordKind};
use arcindex_core::error::IndexerError;
use arcindex_core::indexer::{IndexerConfig, RunMode};
use arcindex_core::store::{DocumentStore, IndexNames, Query};
use arcindex_core::{NodeClient, ResolutionCache};

use crate::balance::{persist_whitelist, seed_watch_set};
use crate::checker::{CheckReport, Checker};
use crate::context::PipelineContext;
use crate::sync::SyncController;

pub struct Indexer {
    node: Arc<dyn NodeClient>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<ResolutionCache>,
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(
        node: Arc<dyn NodeClient>,
        store: Arc<dyn DocumentStore>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            node,
            store,
            cache: Arc::new(ResolutionCache::new()),
            config,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Validate the configuration, open or create every index, verify the
    /// chain identity, and store the configured whitelist.
    pub async fn init(&self) -> Result<PipelineContext, IndexerError> {
        self.config.validate()?;
        let names = init_indices(self.store.as_ref(), &self.config.prefix).await?;
        let ctx = PipelineContext::new(
            self.node.clone(),
            self.store.clone(),
            self.cache.clone(),
            names,
            self.config.clone(),
        );
        verify_chain(&ctx).await?;
        persist_whitelist(&ctx).await?;
        Ok(ctx)
    }

    /// Run the configured mode. Returns once a bounded mode has finished or,
    /// for the live modes, once `shutdown` is cancelled and queued work has
    /// been written.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), IndexerError> {
        let ctx = self.init().await?;
        tracing::info!(
            prefix = %self.config.prefix,
            mode = %self.config.mode,
            miners = self.config.miners,
            "Indexer started"
        );

        match self.config.mode {
            RunMode::Check => {
                let to = self.range_end(&ctx).await?;
                Checker::new(&ctx)
                    .run(self.config.from, to, self.config.fix, shutdown.child_token())
                    .await
                    .map(|_| ())
            }
            RunMode::OnSync => {
                let fatal = CancellationToken::new();
                let last = warm_start(&ctx, &shutdown, &fatal).await?;
                live_sync(&ctx, last, shutdown, fatal).await
            }
            RunMode::All => {
                let fatal = CancellationToken::new();
                let best = ctx.node.best_height().await?.saturating_sub(1);
                let to = self.ordered_end(self.config.to.unwrap_or(best))?;
                seed_watch_set(&ctx).await?;
                let sync = SyncController::new(&ctx, best, fatal.clone());
                let live = tokio::spawn(sync.run(shutdown.clone()));

                let checked = Checker::new(&ctx)
                    .run(self.config.from, to, self.config.fix, shutdown.child_token())
                    .await;
                if let Err(e) = &checked {
                    if !matches!(e, IndexerError::Aborted { .. }) {
                        fatal.cancel();
                    }
                }
                let live = join_sync(live).await;
                checked?;
                live
            }
            RunMode::Rebuild => self.rebuild(&ctx, shutdown).await.map(|_| ()),
        }
    }

    /// Re-index `[from, best]` into fresh indices, then point every alias at
    /// them.
    async fn rebuild(
        &self,
        ctx: &PipelineContext,
        shutdown: CancellationToken,
    ) -> Result<CheckReport, IndexerError> {
        let to = self.range_end(ctx).await?;
        let names = IndexNames::fresh(&self.config.prefix, Utc::now());
        create_indices(self.store.as_ref(), &names).await?;
        let fresh = ctx.with_names(names);
        verify_chain(&fresh).await?;
        persist_whitelist(&fresh).await?;

        tracing::info!(from = self.config.from, to, "Rebuilding indices");
        let report = Checker::new(&fresh)
            .run(self.config.from, to, true, shutdown.child_token())
            .await?;

        swing_aliases(self.store.as_ref(), &fresh.names).await?;
        tracing::info!(blocks = report.missing, "Rebuild complete, aliases updated");
        Ok(report)
    }

    /// Configured upper bound, or the node's best height minus one.
    async fn range_end(&self, ctx: &PipelineContext) -> Result<u64, IndexerError> {
        let to = match self.config.to {
            Some(to) => to,
            None => ctx.node.best_height().await?.saturating_sub(1),
        };
        self.ordered_end(to)
    }

    fn ordered_end(&self, to: u64) -> Result<u64, IndexerError> {
        if self.config.from > to {
            return Err(IndexerError::Config(format!(
                "start height {} is above the last height {to}",
                self.config.from
            )));
        }
        Ok(to)
    }
}

// ─── Index lifecycle ──────────────────────────────────────────────────────────

/// Resolve every kind's index: reuse the alias target if there is one,
/// otherwise create a fresh index behind the alias.
pub async fn init_indices(
    store: &dyn DocumentStore,
    prefix: &str,
) -> Result<IndexNames, IndexerError> {
    let mut names = IndexNames::fresh(prefix, Utc::now());
    for kind in RecordKind::ALL {
        let alias = names.alias(kind);
        match store.existing_index(&alias).await? {
            Some(index) => {
                tracing::debug!(%alias, %index, "Reusing index");
                names.set_index(kind, index);
            }
            None => {
                let index = names.index(kind).to_string();
                store.create_index(&index, kind).await?;
                store.update_alias(&alias, &index).await?;
                tracing::info!(%alias, %index, "Created index");
            }
        }
    }
    Ok(names)
}

/// Create every index in `names` without touching the aliases.
pub async fn create_indices(store: &dyn DocumentStore, names: &IndexNames) -> Result<(), IndexerError> {
    for kind in RecordKind::ALL {
        store.create_index(names.index(kind), kind).await?;
    }
    Ok(())
}

/// Point every alias at the index in `names`.
pub async fn swing_aliases(store: &dyn DocumentStore, names: &IndexNames) -> Result<(), IndexerError> {
    for kind in RecordKind::ALL {
        store.update_alias(&names.alias(kind), names.index(kind)).await?;
    }
    Ok(())
}

/// Store the node's chain info on first start; refuse to continue if the
/// stored record describes a different chain.
pub async fn verify_chain(ctx: &PipelineContext) -> Result<(), IndexerError> {
    let info = ctx.node.chain_info().await?;
    let current = chain_info_doc(&info);
    let index = ctx.index(RecordKind::ChainInfo);

    let Some(stored) = ctx.store.select_one(index, &Query::all()).await? else {
        ctx.store
            .insert(index, &Document::ChainInfo(current))
            .await?;
        tracing::info!(magic = %info.magic, "Chain info stored");
        return Ok(());
    };

    let mut stored_doc: ChainInfoDoc = stored.decode()?;
    stored_doc.id = stored.id.clone();
    if stored_doc != current {
        return Err(IndexerError::ChainMismatch(format!(
            "store holds '{}' ({}, version {}), node reports '{}' ({}, version {})",
            stored_doc.id,
            stored_doc.consensus,
            stored_doc.version,
            current.id,
            current.consensus,
            current.version,
        )));
    }
    Ok(())
}

// ─── Live sync ────────────────────────────────────────────────────────────────

/// Pick the height live sync resumes after, starting a background backfill
/// when the store trails the node by a moderate amount.
async fn warm_start(
    ctx: &PipelineContext,
    shutdown: &CancellationToken,
    fatal: &CancellationToken,
) -> Result<u64, IndexerError> {
    let best = ctx.node.best_height().await?.saturating_sub(1);
    let stored = ctx.best_stored_height().await?.unwrap_or(0);
    let lag = best.saturating_sub(stored);
    let sync = &ctx.config.sync;

    if lag <= sync.warm_start_direct {
        tracing::info!(stored, best, lag, "Resuming from stored height");
        return Ok(stored);
    }
    if lag < sync.warm_start_bulk {
        tracing::info!(from = stored + 1, to = best, "Backfilling behind live sync");
        spawn_backfill(ctx, stored + 1, best, shutdown.child_token(), fatal.clone());
    } else {
        tracing::warn!(
            stored,
            best,
            lag,
            "Store is too far behind; run in check mode to fill the history"
        );
    }
    Ok(best)
}

fn spawn_backfill(
    ctx: &PipelineContext,
    from: u64,
    to: u64,
    cancel: CancellationToken,
    fatal: CancellationToken,
) {
    let checker = Checker::new(ctx);
    tokio::spawn(async move {
        match checker.run(from, to, true, cancel).await {
            Ok(report) => tracing::info!(blocks = report.missing, "Background backfill complete"),
            Err(IndexerError::Aborted { reason }) => {
                tracing::info!(reason = %reason, "Background backfill stopped")
            }
            Err(e) => {
                tracing::error!(error = %e, "Background backfill failed");
                fatal.cancel();
            }
        }
    });
}

async fn live_sync(
    ctx: &PipelineContext,
    last: u64,
    shutdown: CancellationToken,
    fatal: CancellationToken,
) -> Result<(), IndexerError> {
    seed_watch_set(ctx).await?;
    SyncController::new(ctx, last, fatal)
        .run(shutdown)
        .await
        .map(|_| ())
}

async fn join_sync(handle: JoinHandle<Result<u64, IndexerError>>) -> Result<(), IndexerError> {
    handle
        .await
        .map_err(|e| IndexerError::Other(format!("live sync panicked: {e}")))?
        .map(|_| ())
}
