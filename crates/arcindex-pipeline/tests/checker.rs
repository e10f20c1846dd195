mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use arcindex_core::convert::block_doc;
use arcindex_core::document::{Document, RecordKind};
use arcindex_core::IndexerError;
use arcindex_pipeline::{find_gaps, Checker, PipelineContext};
use arcindex_storage::MemoryStore;

use common::{context, empty_block, stored_heights, test_config, MockNode};

async fn store_blocks(ctx: &PipelineContext, heights: &[u64]) {
    for h in heights {
        let doc = block_doc(&empty_block(*h), "producer".into());
        ctx.store
            .insert(ctx.index(RecordKind::Block), &Document::Block(doc))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn reports_and_fills_gaps() {
    let node = Arc::new(MockNode::new());
    let ctx = context(node.clone(), Arc::new(MemoryStore::new()), test_config());
    store_blocks(&ctx, &[10, 9, 7, 5]).await;

    let report = Checker::new(&ctx)
        .run(0, 10, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.missing, 7);
    assert_eq!(report.ranges, vec![8..=8, 6..=6, 0..=4]);
    assert_eq!(stored_heights(&ctx).await, (0..=10).collect::<Vec<_>>());

    let mut fetched = node.fetched();
    fetched.sort_unstable();
    assert_eq!(fetched, vec![0, 1, 2, 3, 4, 6, 8]);
}

#[tokio::test]
async fn complete_range_needs_no_backfill() {
    let node = Arc::new(MockNode::new());
    let ctx = context(node.clone(), Arc::new(MemoryStore::new()), test_config());
    store_blocks(&ctx, &[3, 4, 5, 6]).await;

    let report = Checker::new(&ctx)
        .run(3, 6, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.missing, 0);
    assert!(report.ranges.is_empty());
    assert!(node.fetched().is_empty());
}

#[tokio::test]
async fn fix_reingests_whole_range() {
    let node = Arc::new(MockNode::new());
    let ctx = context(node.clone(), Arc::new(MemoryStore::new()), test_config());
    store_blocks(&ctx, &[1, 2, 3]).await;

    let report = Checker::new(&ctx)
        .run(1, 5, true, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.missing, 5);
    assert_eq!(stored_heights(&ctx).await, vec![1, 2, 3, 4, 5]);
    assert_eq!(node.fetched().len(), 5);
}

#[tokio::test]
async fn dry_run_lists_gaps_only() {
    let node = Arc::new(MockNode::new());
    let ctx = context(node.clone(), Arc::new(MemoryStore::new()), test_config());
    store_blocks(&ctx, &[10, 9, 7, 5]).await;

    let gaps = find_gaps(ctx.store.as_ref(), ctx.index(RecordKind::Block), 2, 10)
        .await
        .unwrap();

    assert_eq!(gaps, vec![8..=8, 6..=6, 2..=4]);
    assert_eq!(stored_heights(&ctx).await, vec![5, 7, 9, 10]);
    assert!(node.fetched().is_empty());
}

#[tokio::test]
async fn cancelled_check_is_aborted() {
    let node = Arc::new(MockNode::new());
    let ctx = context(node, Arc::new(MemoryStore::new()), test_config());
    let fatal = CancellationToken::new();
    fatal.cancel();

    let err = Checker::new(&ctx).run(0, 50, false, fatal).await.unwrap_err();
    assert!(matches!(err, IndexerError::Aborted { .. }));
}

#[tokio::test]
async fn inverted_range_is_rejected() {
    let node = Arc::new(MockNode::new());
    let ctx = context(node.clone(), Arc::new(MemoryStore::new()), test_config());

    for fix in [true, false] {
        let err = Checker::new(&ctx)
            .run(100, 49, fix, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
    }
    assert!(node.fetched().is_empty());
    assert!(stored_heights(&ctx).await.is_empty());
}
