//! Node fetcher.
//!
//! Wraps a [`NodeClient`] with the retry policy of the pipeline and the
//! token contract queries the miners need. Block fetches retry until they
//! succeed or the pipeline is cancelled; every other call degrades to an
//! absent value and is logged.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use arcindex_core::amount::{Amount, NATIVE_DECIMALS};
use arcindex_core::category::TokenType;
use arcindex_core::convert::{TokenMeta, TransferValue};
use arcindex_core::error::IndexerError;
use arcindex_core::event::{amount_or_id_from_value, BURN};
use arcindex_core::types::{RawBlock, RawReceipt};
use arcindex_core::{NodeClient, ResolutionCache};

use crate::context::PipelineContext;

/// Decimals assumed when a token does not answer `decimals()`.
const FALLBACK_DECIMALS: u8 = 1;

/// Balance and stake of an account, scaled to the native decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    /// Spendable plus staked.
    pub balance: Amount,
    pub staking: Amount,
}

/// Normalise a contract query result to a string. JSON `null` is absent.
pub fn query_result_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => amount_or_id_from_value(other),
    }
}

#[derive(Clone)]
pub struct NodeFetcher {
    node: Arc<dyn NodeClient>,
    cache: Arc<ResolutionCache>,
    wrapped: Arc<HashSet<String>>,
    retry: Duration,
}

impl NodeFetcher {
    pub fn new(ctx: &PipelineContext) -> Self {
        Self {
            node: ctx.node.clone(),
            cache: ctx.cache.clone(),
            wrapped: Arc::new(ctx.config.wrapped_query_contracts.iter().cloned().collect()),
            retry: ctx.config.fetch_retry(),
        }
    }

    // ─── Chain data ───────────────────────────────────────────────────────────

    /// Fetch a block, retrying indefinitely. Fails only when `cancel` fires.
    pub async fn block(
        &self,
        height: u64,
        cancel: &CancellationToken,
    ) -> Result<RawBlock, IndexerError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(IndexerError::aborted(format!("fetch of block {height} cancelled")));
                }
                res = self.node.block(height) => match res {
                    Ok(block) => return Ok(block),
                    Err(e) => tracing::warn!(height, error = %e, "Failed to fetch block, retrying"),
                },
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(IndexerError::aborted(format!("fetch of block {height} cancelled")));
                }
                _ = tokio::time::sleep(self.retry) => {}
            }
        }
    }

    pub async fn receipt(&self, tx_hash: &str) -> Option<RawReceipt> {
        match self.node.receipt(tx_hash).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                tracing::warn!(tx = tx_hash, error = %e, "Failed to fetch receipt");
                None
            }
        }
    }

    pub async fn account_balance(&self, address: &str) -> Option<AccountBalance> {
        let state = match self.node.account_state(address).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(address, error = %e, "Failed to fetch account state");
                return None;
            }
        };
        let spendable = Amount::from_be_bytes(&state.balance, NATIVE_DECIMALS);
        let staking = Amount::from_be_bytes(&state.staking, NATIVE_DECIMALS);
        let balance = spendable.checked_add(&staking, NATIVE_DECIMALS)?;
        Some(AccountBalance { balance, staking })
    }

    // ─── Contract queries ─────────────────────────────────────────────────────

    /// Query a contract method. `Err` means the call failed, `Ok(None)` that it
    /// returned `null`.
    pub async fn query(
        &self,
        contract: &str,
        method: &str,
        args: &[&str],
    ) -> Result<Option<String>, IndexerError> {
        let value = if self.wrapped.contains(contract) {
            let mut wrapped_args = Vec::with_capacity(args.len() + 1);
            wrapped_args.push(method.to_string());
            wrapped_args.extend(args.iter().map(|a| a.to_string()));
            self.node.query_contract(contract, "query", &wrapped_args).await?
        } else {
            let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            self.node.query_contract(contract, method, &args).await?
        };
        Ok(query_result_string(&value))
    }

    async fn query_or_empty(&self, contract: &str, method: &str, args: &[&str]) -> String {
        match self.query(contract, method, args).await {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                tracing::debug!(contract, method, error = %e, "Contract query failed");
                String::new()
            }
        }
    }

    /// Name, symbol, and decimals of a token. Memoised per contract once a
    /// name is known.
    pub async fn token_meta(&self, contract: &str) -> TokenMeta {
        if let Some(meta) = self.cache.token_meta(contract) {
            return meta;
        }
        let name = self.query_or_empty(contract, "name", &[]).await;
        let symbol = self.query_or_empty(contract, "symbol", &[]).await;
        let decimals = self
            .query_or_empty(contract, "decimals", &[])
            .await
            .parse::<u8>()
            .unwrap_or(FALLBACK_DECIMALS);
        let meta = TokenMeta {
            name,
            symbol,
            decimals,
        };
        if !meta.name.is_empty() {
            self.cache.remember_token(contract, meta.clone());
        }
        meta
    }

    pub async fn total_supply(&self, contract: &str, decimals: u8) -> Amount {
        let raw = self.query_or_empty(contract, "totalSupply", &[]).await;
        Amount::parse(&raw, decimals).unwrap_or_else(Amount::zero)
    }

    pub async fn balance_of(&self, contract: &str, account: &str, decimals: u8) -> Amount {
        let raw = self.query_or_empty(contract, "balanceOf", &[account]).await;
        Amount::parse(&raw, decimals).unwrap_or_else(Amount::zero)
    }

    /// Resolve the value moved by a transfer event.
    ///
    /// A successful `ownerOf` marks an ARC2 token: the argument is the token
    /// id and the amount holds the new owner (`BURN` if none). Otherwise the
    /// argument must be a fungible amount.
    pub async fn transfer_value(&self, contract: &str, amount_or_id: &str) -> Option<TransferValue> {
        match self.query(contract, "ownerOf", &[amount_or_id]).await {
            Ok(owner) => Some(TransferValue {
                token_type: TokenType::Arc2,
                token_id: amount_or_id.to_string(),
                amount: Amount {
                    exact: owner.unwrap_or_else(|| BURN.to_string()),
                    float: 1.0,
                },
            }),
            Err(_) => {
                let decimals = self.token_meta(contract).await.decimals;
                let amount = Amount::parse(amount_or_id, decimals)?;
                Some(TransferValue {
                    token_type: TokenType::Arc1,
                    token_id: String::new(),
                    amount,
                })
            }
        }
    }

    /// `(token_uri, image_url)` of an NFT. Missing entries are empty.
    pub async fn nft_metadata(&self, contract: &str, token_id: &str) -> (String, String) {
        let uri = self
            .query_or_empty(contract, "get_metadata", &[token_id, "token_uri"])
            .await;
        let image = self
            .query_or_empty(contract, "get_metadata", &[token_id, "image_url"])
            .await;
        (uri, image)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn query_results_normalise() {
        assert_eq!(query_result_string(&json!("AmOwner")).as_deref(), Some("AmOwner"));
        assert_eq!(query_result_string(&json!(18)).as_deref(), Some("18"));
        assert_eq!(
            query_result_string(&json!({"_bignum": "1000000000000000000000"})).as_deref(),
            Some("1000000000000000000000")
        );
        assert_eq!(query_result_string(&json!(true)).as_deref(), Some("true"));
        assert!(query_result_string(&Value::Null).is_none());
    }
}
