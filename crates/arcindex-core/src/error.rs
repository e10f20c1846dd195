//! Error types for the arcindex pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Reorg too deep: stream went from {from} back to {to} ({depth} blocks)")]
    ReorgTooDeep { from: u64, to: u64, depth: u64 },

    #[error("Chain mismatch: {0}")]
    ChainMismatch(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Returns `true` for node failures that are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }

    /// Returns `true` if the process cannot continue safely.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ReorgTooDeep { .. } | Self::ChainMismatch(_) | Self::Config(_)
        )
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(IndexerError::Rpc("timeout".into()).is_transient());
        assert!(!IndexerError::Storage("down".into()).is_transient());
        assert!(IndexerError::ReorgTooDeep {
            from: 5000,
            to: 10,
            depth: 4990
        }
        .is_fatal());
        assert!(!IndexerError::aborted("shutdown").is_fatal());
    }
}
