//! Fluent builder API for indexer configurations.
//!
//! # Example
//!
//! ```rust,no_run
//! use arcindex_core::RunMode;
//! use arcindex_pipeline::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .prefix("mainnet")
//!     .mode(RunMode::Check)
//!     .range(1_000_000, Some(2_000_000))
//!     .miners(64)
//!     .bulk_size(2000)
//!     .whitelist(["AmgVbUZiReUVFXdYb4UVMru4ZqyicSsFPqBGFD8SWqfD5qqfW8NB"])
//!     .build_config();
//! ```

use std::sync::Arc;

use arcindex_core::indexer::{IndexerConfig, RunMode};
use arcindex_core::{DocumentStore, IndexerError, NodeClient};

use crate::indexer::Indexer;

/// Fluent builder for [`IndexerConfig`].
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: IndexerConfig) -> Self {
        Self { config }
    }

    /// Set the index and alias name prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the height range for check and rebuild runs. `None` means the
    /// node's best height minus one.
    pub fn range(mut self, from: u64, to: Option<u64>) -> Self {
        self.config.from = from;
        self.config.to = to;
        self
    }

    /// Re-ingest the whole range instead of scanning for gaps.
    pub fn fix(mut self, fix: bool) -> Self {
        self.config.fix = fix;
        self
    }

    /// Set the number of miner workers used for backfills.
    pub fn miners(mut self, n: usize) -> Self {
        self.config.miners = n;
        self
    }

    pub fn skip_empty_blocks(mut self, skip: bool) -> Self {
        self.config.skip_empty_blocks = skip;
        self
    }

    /// Set the records per bulk batch.
    pub fn bulk_size(mut self, size: usize) -> Self {
        self.config.bulk.bulk_size = size;
        self
    }

    /// Set the block batch flush interval in milliseconds.
    pub fn batch_time_ms(mut self, ms: u64) -> Self {
        self.config.bulk.batch_time_ms = ms;
        self
    }

    /// Add addresses to the balance whitelist.
    pub fn whitelist<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .whitelist
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    /// Contracts whose methods are reached through their `query` entry point.
    pub fn wrapped_query_contract(mut self, contract: impl Into<String>) -> Self {
        self.config.wrapped_query_contracts.push(contract.into());
        self
    }

    pub fn max_reorg_depth(mut self, depth: u64) -> Self {
        self.config.sync.max_reorg_depth = depth;
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the configuration and build an [`Indexer`].
    pub fn build(
        self,
        node: Arc<dyn NodeClient>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Indexer, IndexerError> {
        self.config.validate()?;
        Ok(Indexer::new(node, store, self.config))
    }
}
