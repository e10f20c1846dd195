mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use arcindex_core::document::RecordKind;
use arcindex_core::store::{DocumentStore, IndexNames, Query};
use arcindex_core::{IndexerError, RunMode};
use arcindex_pipeline::indexer::init_indices;
use arcindex_pipeline::{Indexer, IndexerBuilder};
use arcindex_storage::MemoryStore;

use common::{test_config, MockNode};

fn builder() -> IndexerBuilder {
    IndexerBuilder::from_config(test_config())
}

async fn alias_heights(store: &MemoryStore, alias: &str) -> Vec<u64> {
    let mut heights: Vec<u64> = Vec::new();
    for id in store.ids(alias).await {
        if let Some(doc) = store.get(alias, &id).await {
            heights.extend(doc.u64_field("no"));
        }
    }
    heights.sort_unstable();
    heights
}

#[tokio::test]
async fn init_creates_indices_once() {
    let store = Arc::new(MemoryStore::new());
    let first = init_indices(store.as_ref(), "test").await.unwrap();
    let second = init_indices(store.as_ref(), "test").await.unwrap();

    for kind in RecordKind::ALL {
        assert_eq!(first.index(kind), second.index(kind));
        let alias = first.alias(kind);
        assert_eq!(
            store.existing_index(&alias).await.unwrap().as_deref(),
            Some(first.index(kind))
        );
    }
}

#[tokio::test]
async fn chain_identity_is_enforced() {
    let store = Arc::new(MemoryStore::new());
    let node = Arc::new(MockNode::new());

    let indexer = builder().build(node.clone(), store.clone()).unwrap();
    let ctx = indexer.init().await.unwrap();
    assert_eq!(
        ctx.store
            .count(ctx.index(RecordKind::ChainInfo), &Query::all())
            .await
            .unwrap(),
        1
    );
    indexer.init().await.unwrap();

    node.chain.lock().unwrap().magic = "mainnet.aergo.io".into();
    let err = Indexer::new(node, store, test_config())
        .init()
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::ChainMismatch(_)));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let node = Arc::new(MockNode::new());
    let result = builder().miners(0).build(node, store);
    assert!(matches!(result, Err(IndexerError::Config(_))));
}

#[tokio::test]
async fn check_mode_fills_range_below_best() {
    let store = Arc::new(MemoryStore::new());
    let node = Arc::new(MockNode::new().with_best(6));

    let indexer = builder()
        .mode(RunMode::Check)
        .range(1, None)
        .build(node, store.clone())
        .unwrap();
    indexer.run(CancellationToken::new()).await.unwrap();

    assert_eq!(alias_heights(&store, "test_block").await, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn whitelist_is_persisted() {
    let store = Arc::new(MemoryStore::new());
    let node = Arc::new(MockNode::new());

    let indexer = builder()
        .whitelist(["AmWatchedAccount001"])
        .build(node, store.clone())
        .unwrap();
    indexer.init().await.unwrap();

    let entry = store
        .get("test_whitelist", "AmWatchedAccount001")
        .await
        .expect("whitelist entry");
    assert_eq!(entry.str_field("type"), Some("account"));
}

#[tokio::test]
async fn rebuild_swaps_aliases_to_fresh_indices() {
    let store = Arc::new(MemoryStore::new());
    let node = Arc::new(MockNode::new().with_best(4));

    // Existing indices from an earlier run, holding a stale block.
    let old = IndexNames::fresh("test", chrono::Utc::now() - chrono::Duration::days(1));
    for kind in RecordKind::ALL {
        store.create_index(old.index(kind), kind).await.unwrap();
        store.update_alias(&old.alias(kind), old.index(kind)).await.unwrap();
    }
    let stale = arcindex_core::convert::block_doc(&common::empty_block(99), String::new());
    store
        .insert(old.index(RecordKind::Block), &arcindex_core::Document::Block(stale))
        .await
        .unwrap();

    let indexer = builder()
        .mode(RunMode::Rebuild)
        .range(0, None)
        .build(node, store.clone())
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), indexer.run(CancellationToken::new()))
        .await
        .expect("rebuild finished")
        .unwrap();

    let current = store.existing_index("test_block").await.unwrap().unwrap();
    assert_ne!(current, old.index(RecordKind::Block));
    assert_eq!(alias_heights(&store, "test_block").await, vec![0, 1, 2, 3]);
    assert_eq!(alias_heights(&store, old.index(RecordKind::Block)).await, vec![99]);
}

#[tokio::test]
async fn live_mode_stops_on_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let node = Arc::new(MockNode::new().with_best(3));
    node.add_stream(vec![3, 4]);

    let indexer = builder().build(node.clone(), store.clone()).unwrap();
    let shutdown = CancellationToken::new();
    let run = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { indexer.run(shutdown).await }
    });

    tokio::time::timeout(Duration::from_secs(5), node.exhausted.notified())
        .await
        .expect("stream consumed");
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("indexer stopped")
        .unwrap()
        .unwrap();

    // Empty store, lag of two: live sync resumes from 0 and fills the gap.
    assert_eq!(alias_heights(&store, "test_block").await, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn rebuild_above_tip_creates_nothing() {
    let store = Arc::new(MemoryStore::new());
    let node = Arc::new(MockNode::new().with_best(4));

    let indexer = builder()
        .mode(RunMode::Rebuild)
        .range(100, None)
        .build(node.clone(), store.clone())
        .unwrap();
    let err = indexer.run(CancellationToken::new()).await.unwrap_err();

    // Only the alias-backed set from init; no fresh rebuild set.
    assert!(matches!(err, IndexerError::Config(_)));
    assert_eq!(store.index_names().await.len(), RecordKind::ALL.len());
    assert!(node.fetched().is_empty());
}
