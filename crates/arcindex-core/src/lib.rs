//! arcindex-core: foundation for the Aergo chain indexing pipeline.
//!
//! # Architecture
//!
//! ```text
//! Indexer → SyncController ─┐
//!         → Checker ────────┼→ MinerPool → classify / convert → BulkEngine ─→ DocumentStore
//!                           │        │                         (barrier)  └→ direct writes
//!                           │        └── ResolutionCache (peer ids, dedup, balance watch)
//!                           └── NodeClient (blocks, receipts, stream, contract queries)
//! ```
//!
//! This crate holds the pure parts (classification, record conversion, event
//! decoding, amounts), the shared cache, the sync cursor and reorg guard, and
//! the two collaborator traits. It performs no I/O of its own.

pub mod account;
pub mod amount;
pub mod cache;
pub mod category;
pub mod convert;
pub mod cursor;
pub mod document;
pub mod error;
pub mod event;
pub mod indexer;
pub mod node;
pub mod reorg;
pub mod store;
pub mod types;

pub use amount::Amount;
pub use cache::{ResolutionCache, WatchOrigin};
pub use category::{classify, TokenType, TxCategory};
pub use cursor::{HeightStep, SyncCursor};
pub use document::{Document, RecordKind};
pub use error::IndexerError;
pub use indexer::{BulkConfig, IndexerConfig, RunMode, SyncConfig, SyncState};
pub use node::{BlockStream, NodeClient};
pub use reorg::{ReorgDetector, ReorgEvent};
pub use store::{DocumentStore, IndexNames, Query, StoredDocument};
pub use types::{AccountState, ChainInfo, RawBlock, RawEvent, RawReceipt, RawTx, TxType};
