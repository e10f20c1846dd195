//! Chain node abstraction.
//!
//! Implement [`NodeClient`] over the node's RPC transport; the pipeline only
//! ever talks to the chain through this trait.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::IndexerError;
use crate::types::{AccountState, ChainInfo, RawBlock, RawReceipt};

/// Push stream of newly produced blocks. Ends when the connection drops.
pub type BlockStream = BoxStream<'static, Result<RawBlock, IndexerError>>;

#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn chain_info(&self) -> Result<ChainInfo, IndexerError>;

    async fn best_height(&self) -> Result<u64, IndexerError>;

    async fn block(&self, height: u64) -> Result<RawBlock, IndexerError>;

    async fn receipt(&self, tx_hash: &str) -> Result<RawReceipt, IndexerError>;

    /// Subscribe to new blocks.
    async fn stream_blocks(&self) -> Result<BlockStream, IndexerError>;

    /// Run a read-only contract query `{"Name": method, "Args": args}` and
    /// return the decoded JSON result.
    async fn query_contract(
        &self,
        contract: &str,
        method: &str,
        args: &[String],
    ) -> Result<serde_json::Value, IndexerError>;

    async fn account_state(&self, address: &str) -> Result<AccountState, IndexerError>;
}
