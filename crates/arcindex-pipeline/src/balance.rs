//! Account balance records and the balance watch set.

use chrono::{DateTime, Utc};
use futures::StreamExt;

use arcindex_core::account::is_balance_not_resolved;
use arcindex_core::convert::{account_balance_doc, whitelist_doc};
use arcindex_core::document::{Document, RecordKind};
use arcindex_core::error::IndexerError;
use arcindex_core::store::Query;
use arcindex_core::WatchOrigin;

use crate::context::PipelineContext;
use crate::fetcher::{AccountBalance, NodeFetcher};

/// Whitelist entry type of configured accounts.
pub const ACCOUNT_ENTRY: &str = "account";

/// Refresh the balance record of `address` at `blockno`.
///
/// An existing record is always updated; its height and timestamp only move
/// forward. A missing record is created only for a positive balance. A
/// positive stake puts the address on the watch list. Returns the fetched
/// balance, or `None` if the address is not resolvable or the node failed.
pub async fn refresh_balance(
    ctx: &PipelineContext,
    fetcher: &NodeFetcher,
    address: &str,
    blockno: u64,
    ts: DateTime<Utc>,
) -> Result<Option<AccountBalance>, IndexerError> {
    if is_balance_not_resolved(address) {
        return Ok(None);
    }
    let Some(fetched) = fetcher.account_balance(address).await else {
        return Ok(None);
    };

    let index = ctx.index(RecordKind::AccountBalance);
    let doc = account_balance_doc(address, blockno, ts, &fetched.balance, &fetched.staking);
    match ctx.store.select_one(index, &Query::id(address)).await? {
        Some(existing) => {
            let mut partial = serde_json::json!({
                "balance": doc.balance,
                "balance_float": doc.balance_float,
                "staking": doc.staking,
                "staking_float": doc.staking_float,
            });
            if existing.u64_field("blockno").map_or(true, |stored| blockno >= stored) {
                partial["blockno"] = blockno.into();
                partial["ts"] = serde_json::to_value(ts)?;
            }
            ctx.store.update(index, address, partial).await?;
        }
        None if !fetched.balance.is_zero() => {
            ctx.store.insert(index, &Document::AccountBalance(doc)).await?;
        }
        None => {}
    }

    if !fetched.staking.is_zero() {
        ctx.cache.watch(address, WatchOrigin::Staking);
    }
    Ok(Some(fetched))
}

/// Refresh every watched address. Stake-derived entries whose stake is gone
/// leave the watch set.
pub async fn refresh_watched(
    ctx: &PipelineContext,
    fetcher: &NodeFetcher,
    blockno: u64,
    ts: DateTime<Utc>,
) -> Result<(), IndexerError> {
    let watched = ctx.cache.watched();
    let mut released = 0usize;
    for address in &watched {
        if let Some(fetched) = refresh_balance(ctx, fetcher, address, blockno, ts).await? {
            if fetched.staking.is_zero() && ctx.cache.release_stake(address) {
                released += 1;
            }
        }
    }
    tracing::info!(height = blockno, watched = watched.len(), released, "Whitelist refreshed");
    Ok(())
}

/// Persist the configured whitelist as whitelist records.
pub async fn persist_whitelist(ctx: &PipelineContext) -> Result<(), IndexerError> {
    let index = ctx.index(RecordKind::Whitelist);
    for address in &ctx.config.whitelist {
        let doc = whitelist_doc(address, address, ACCOUNT_ENTRY);
        ctx.store.insert(index, &Document::Whitelist(doc)).await?;
    }
    Ok(())
}

/// Seed the watch set from the stored whitelist and from stored accounts
/// staking at least `staking_whitelist_min`. Returns the watch set size.
pub async fn seed_watch_set(ctx: &PipelineContext) -> Result<usize, IndexerError> {
    for address in &ctx.config.whitelist {
        ctx.cache.watch(address, WatchOrigin::Seeded);
    }

    let mut entries = ctx
        .store
        .scroll(ctx.index(RecordKind::Whitelist), Query::all());
    while let Some(entry) = entries.next().await {
        ctx.cache.watch(&entry?.id, WatchOrigin::Seeded);
    }
    drop(entries);

    let min = ctx.config.staking_whitelist_min;
    let mut stakers = ctx.store.scroll(
        ctx.index(RecordKind::AccountBalance),
        Query::all().sorted_by("staking_float", false),
    );
    while let Some(doc) = stakers.next().await {
        let doc = doc?;
        if doc.f64_field("staking_float").unwrap_or_default() < min {
            break;
        }
        ctx.cache.watch(&doc.id, WatchOrigin::Staking);
    }

    let size = ctx.cache.watched().len();
    tracing::info!(watched = size, "Balance watch set seeded");
    Ok(size)
}
