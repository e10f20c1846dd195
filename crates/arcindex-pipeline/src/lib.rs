//! arcindex-pipeline: miners, bulk commit engine, live sync, and consistency
//! checker.
//!
//! Everything here runs on tokio and talks to the outside world only through
//! the `NodeClient` and `DocumentStore` traits of `arcindex-core`.

pub mod balance;
pub mod builder;
pub mod bulk;
pub mod checker;
pub mod context;
pub mod fetcher;
pub mod indexer;
pub mod miner;
pub mod sink;
pub mod sync;

pub use builder::IndexerBuilder;
pub use bulk::{BatchRouter, BulkEngine};
pub use checker::{find_gaps, CheckReport, Checker, GapScanner};
pub use context::PipelineContext;
pub use fetcher::NodeFetcher;
pub use indexer::Indexer;
pub use miner::{MinerPool, WorkKind};
pub use sink::RecordSink;
pub use sync::SyncController;
