//! Indexer configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::reorg::DEFAULT_MAX_REORG_DEPTH;

/// What the indexer does after start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Scan a stored height range for gaps and backfill them, then exit.
    Check,
    /// Follow the chain tip.
    #[default]
    OnSync,
    /// Follow the chain tip and check the stored history in parallel.
    All,
    /// Re-index everything into fresh indices, then swap the aliases.
    Rebuild,
}

impl std::str::FromStr for RunMode {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check" => Ok(Self::Check),
            "onsync" => Ok(Self::OnSync),
            "all" => Ok(Self::All),
            "rebuild" => Ok(Self::Rebuild),
            other => Err(IndexerError::Config(format!("invalid run mode '{other}'"))),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Check => write!(f, "check"),
            Self::OnSync => write!(f, "onsync"),
            Self::All => write!(f, "all"),
            Self::Rebuild => write!(f, "rebuild"),
        }
    }
}

// ─── BulkConfig ───────────────────────────────────────────────────────────────

/// Bulk commit engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Records per batch before a flush is forced.
    pub bulk_size: usize,
    /// Maximum age of a non-empty block batch (milliseconds).
    pub batch_time_ms: u64,
    /// Capacity of each engine's input queue.
    pub queue_capacity: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            bulk_size: 4000,
            batch_time_ms: 60_000,
            queue_capacity: 1024,
        }
    }
}

impl BulkConfig {
    pub fn batch_time(&self) -> Duration {
        Duration::from_millis(self.batch_time_ms)
    }
}

// ─── SyncConfig ───────────────────────────────────────────────────────────────

/// Live sync tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Deepest rollback accepted before the node is declared unhealthy.
    pub max_reorg_depth: u64,
    /// Measure store lag every N received blocks.
    pub lag_check_interval: u64,
    /// Pause ingestion when the store trails the stream by more than this.
    pub max_store_lag: u64,
    /// Store polling interval while paused (milliseconds).
    pub pause_poll_ms: u64,
    /// Delay before reopening a dropped block stream (milliseconds).
    pub reconnect_backoff_ms: u64,
    /// On start, a stored tip at most this far behind resumes directly.
    pub warm_start_direct: u64,
    /// On start, a stored tip less than this far behind is bulk-backfilled.
    pub warm_start_bulk: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_reorg_depth: DEFAULT_MAX_REORG_DEPTH,
            lag_check_interval: 10,
            max_store_lag: 100,
            pause_poll_ms: 5_000,
            reconnect_backoff_ms: 6_000,
            warm_start_direct: 100,
            warm_start_bulk: 10_000,
        }
    }
}

impl SyncConfig {
    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

// ─── IndexerConfig ────────────────────────────────────────────────────────────

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Index/alias name prefix (e.g. `"mainnet"`).
    pub prefix: String,
    pub mode: RunMode,
    /// First height of a check/rebuild range.
    pub from: u64,
    /// Last height of a check range. `None` = node best height − 1.
    pub to: Option<u64>,
    /// In check mode, re-insert the whole range instead of scanning for gaps.
    pub fix: bool,
    /// Number of miner workers used for bulk ingestion.
    pub miners: usize,
    /// Skip blocks without transactions.
    pub skip_empty_blocks: bool,
    /// Delay between failed block fetches (milliseconds).
    pub fetch_retry_ms: u64,
    /// Refresh watched balances every N live blocks.
    pub whitelist_refresh_interval: u64,
    /// Stored accounts staking at least this much are watched on start.
    pub staking_whitelist_min: f64,
    /// Addresses whose balances are always watched.
    pub whitelist: Vec<String>,
    /// Contracts that expose their interface through a `query` dispatcher.
    pub wrapped_query_contracts: Vec<String>,
    pub bulk: BulkConfig,
    pub sync: SyncConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            prefix: "testnet".into(),
            mode: RunMode::OnSync,
            from: 0,
            to: None,
            fix: false,
            miners: 32,
            skip_empty_blocks: false,
            fetch_retry_ms: 100,
            whitelist_refresh_interval: 1000,
            staking_whitelist_min: 10_000.0,
            whitelist: Vec::new(),
            wrapped_query_contracts: Vec::new(),
            bulk: BulkConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl IndexerConfig {
    pub fn fetch_retry(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_ms)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.prefix.is_empty() {
            return Err(IndexerError::Config("prefix must not be empty".into()));
        }
        if self.miners == 0 {
            return Err(IndexerError::Config("at least one miner is required".into()));
        }
        if self.bulk.bulk_size == 0 || self.bulk.queue_capacity == 0 {
            return Err(IndexerError::Config(
                "bulk size and queue capacity must be positive".into(),
            ));
        }
        if self.sync.lag_check_interval == 0 || self.whitelist_refresh_interval == 0 {
            return Err(IndexerError::Config("intervals must be positive".into()));
        }
        if let Some(to) = self.to {
            if to < self.from {
                return Err(IndexerError::Config(format!(
                    "invalid range: from {} > to {to}",
                    self.from
                )));
            }
        }
        Ok(())
    }
}

// ─── SyncState ────────────────────────────────────────────────────────────────

/// Runtime state of the live sync controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Not yet started.
    Idle,
    /// Receiving blocks from the stream.
    Streaming,
    /// Draining the stream while the store catches up.
    Paused,
    /// Removing records of a rolled-back chain segment.
    ReorgRecovery,
    /// Terminated.
    Stopped,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Streaming => write!(f, "streaming"),
            Self::Paused => write!(f, "paused"),
            Self::ReorgRecovery => write!(f, "reorg-recovery"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
