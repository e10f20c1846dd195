mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use arcindex_core::document::RecordKind;
use arcindex_core::indexer::IndexerConfig;
use arcindex_core::types::{AccountState, RawReceipt, RawTx, TxType};
use arcindex_core::{IndexerError, WatchOrigin};
use arcindex_pipeline::{PipelineContext, SyncController};
use arcindex_storage::MemoryStore;

use common::{context, count, empty_block, stored_heights, test_config, MockNode};

fn start(
    ctx: &PipelineContext,
    last: u64,
    shutdown: &CancellationToken,
) -> JoinHandle<Result<u64, IndexerError>> {
    let controller = SyncController::new(ctx, last, CancellationToken::new());
    tokio::spawn(controller.run(shutdown.clone()))
}

/// Wait for every scripted connection to be consumed, then shut down.
async fn finish(
    node: &MockNode,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<u64, IndexerError>>,
) -> u64 {
    tokio::time::timeout(Duration::from_secs(5), node.exhausted.notified())
        .await
        .expect("streams consumed");
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("sync stopped")
        .unwrap()
        .unwrap()
}

fn setup(config: IndexerConfig) -> (Arc<MockNode>, PipelineContext) {
    let node = Arc::new(MockNode::new());
    let ctx = context(node.clone(), Arc::new(MemoryStore::new()), config);
    (node, ctx)
}

#[tokio::test]
async fn follows_stream_in_order() {
    let (node, ctx) = setup(test_config());
    node.add_stream(vec![1, 2, 3]);
    node.add_stream(vec![4]);

    let shutdown = CancellationToken::new();
    let last = finish(&node, shutdown.clone(), start(&ctx, 0, &shutdown)).await;

    assert_eq!(last, 4);
    assert_eq!(stored_heights(&ctx).await, vec![1, 2, 3, 4]);
    assert_eq!(node.fetched(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn forward_gap_is_filled_in_order() {
    let (node, ctx) = setup(test_config());
    node.add_stream(vec![1, 2, 5]);

    let shutdown = CancellationToken::new();
    let last = finish(&node, shutdown.clone(), start(&ctx, 0, &shutdown)).await;

    assert_eq!(last, 5);
    assert_eq!(node.fetched(), vec![1, 2, 3, 4, 5]);
    assert_eq!(stored_heights(&ctx).await, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn resumes_after_last_height() {
    let (node, ctx) = setup(test_config());
    node.add_stream(vec![12]);

    let shutdown = CancellationToken::new();
    let last = finish(&node, shutdown.clone(), start(&ctx, 10, &shutdown)).await;

    assert_eq!(last, 12);
    assert_eq!(node.fetched(), vec![11, 12]);
}

#[tokio::test]
async fn reorg_removes_stale_heights() {
    let (node, ctx) = setup(test_config());
    let mut block = empty_block(5);
    block.txs.push(RawTx {
        hash: "tx5".into(),
        account: "AmSenderAccount0001".into(),
        recipient: "AmReceiverAccount01".into(),
        amount: vec![1],
        tx_type: TxType::Transfer,
        ..Default::default()
    });
    node.add_block(block);
    node.add_receipt(
        "tx5",
        RawReceipt {
            status: "SUCCESS".into(),
            ..Default::default()
        },
    );
    node.add_stream(vec![1, 2, 3, 4, 5]);
    node.add_stream(vec![3]);

    let shutdown = CancellationToken::new();
    let last = finish(&node, shutdown.clone(), start(&ctx, 0, &shutdown)).await;

    assert_eq!(last, 3);
    assert_eq!(stored_heights(&ctx).await, vec![1, 2, 3]);
    assert_eq!(count(&ctx, RecordKind::Tx).await, 0);
    assert_eq!(node.fetched(), vec![1, 2, 3, 4, 5, 3]);
}

#[tokio::test]
async fn replaced_tip_is_mined_again() {
    let (node, ctx) = setup(test_config());
    node.add_stream(vec![1, 2]);
    node.add_stream(vec![2, 3]);

    let shutdown = CancellationToken::new();
    let last = finish(&node, shutdown.clone(), start(&ctx, 0, &shutdown)).await;

    assert_eq!(last, 3);
    assert_eq!(node.fetched(), vec![1, 2, 2, 3]);
    assert_eq!(stored_heights(&ctx).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn deep_reorg_is_fatal() {
    let mut config = test_config();
    config.sync.max_reorg_depth = 2;
    let (node, ctx) = setup(config);
    node.add_stream(vec![1, 2, 3, 4, 5, 6]);
    node.add_stream(vec![1]);

    let shutdown = CancellationToken::new();
    let result = tokio::time::timeout(Duration::from_secs(5), start(&ctx, 0, &shutdown))
        .await
        .expect("sync stopped")
        .unwrap();

    assert!(matches!(result, Err(IndexerError::ReorgTooDeep { depth: 5, .. })));
}

#[tokio::test]
async fn lagging_store_pauses_without_losing_heights() {
    let mut config = test_config();
    config.sync.lag_check_interval = 2;
    config.sync.max_store_lag = 0;
    let (node, ctx) = setup(config);
    node.add_stream((1..=6).collect());
    node.add_stream(vec![7]);

    let shutdown = CancellationToken::new();
    let last = finish(&node, shutdown.clone(), start(&ctx, 0, &shutdown)).await;

    assert_eq!(last, 7);
    assert_eq!(stored_heights(&ctx).await, (1..=7).collect::<Vec<_>>());
}

#[tokio::test]
async fn watched_balances_refresh_on_interval() {
    let mut config = test_config();
    config.whitelist_refresh_interval = 2;
    let (node, ctx) = setup(config);
    let watched = "AmWatchedAccount001";
    ctx.cache.watch(watched, WatchOrigin::Seeded);
    node.add_account(
        watched,
        AccountState {
            balance: vec![1, 0],
            staking: vec![],
        },
    );
    node.add_stream(vec![1, 2]);

    let shutdown = CancellationToken::new();
    finish(&node, shutdown.clone(), start(&ctx, 0, &shutdown)).await;

    let doc = ctx
        .store
        .select_one(
            ctx.index(RecordKind::AccountBalance),
            &arcindex_core::Query::id(watched),
        )
        .await
        .unwrap()
        .expect("balance stored");
    assert_eq!(doc.str_field("balance"), Some("256"));
    assert_eq!(doc.u64_field("blockno"), Some(2));
}
