//! Output records written to the document store.
//!
//! Every record has a deterministic id derived from chain content, so
//! re-ingesting the same data overwrites instead of duplicating. The id is
//! kept out of the serialized body; stores key documents by it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::{TokenType, TxCategory};
use crate::error::IndexerError;

// ─── RecordKind ───────────────────────────────────────────────────────────────

/// Downstream record type. Each kind lives in its own index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Block,
    Tx,
    Name,
    Token,
    TokenTransfer,
    AccountTokens,
    AccountBalance,
    Nft,
    Contract,
    Whitelist,
    ChainInfo,
}

impl RecordKind {
    pub const ALL: [RecordKind; 11] = [
        Self::Block,
        Self::Tx,
        Self::Name,
        Self::Token,
        Self::TokenTransfer,
        Self::AccountTokens,
        Self::AccountBalance,
        Self::Nft,
        Self::Contract,
        Self::Whitelist,
        Self::ChainInfo,
    ];

    /// Kinds whose records carry a block height and are rolled back on reorg.
    pub const HEIGHT_BEARING: [RecordKind; 9] = [
        Self::Block,
        Self::Tx,
        Self::Name,
        Self::Token,
        Self::TokenTransfer,
        Self::AccountTokens,
        Self::AccountBalance,
        Self::Nft,
        Self::Contract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Tx => "tx",
            Self::Name => "name",
            Self::Token => "token",
            Self::TokenTransfer => "token_transfer",
            Self::AccountTokens => "account_tokens",
            Self::AccountBalance => "account_balance",
            Self::Nft => "nft",
            Self::Contract => "contract",
            Self::Whitelist => "whitelist",
            Self::ChainInfo => "chain_info",
        }
    }

    /// Name of the field holding the block height, if any.
    pub fn height_field(&self) -> Option<&'static str> {
        match self {
            Self::Block => Some("no"),
            Self::Whitelist | Self::ChainInfo => None,
            _ => Some("blockno"),
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| IndexerError::Config(format!("unknown record kind '{s}'")))
    }
}

// ─── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDoc {
    #[serde(skip)]
    pub id: String,
    pub ts: DateTime<Utc>,
    pub no: u64,
    pub previous_block: String,
    pub txs: u64,
    pub size: u64,
    pub coinbase: String,
    pub block_producer: String,
    pub reward_account: String,
    pub reward_amount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxDoc {
    #[serde(skip)]
    pub id: String,
    pub ts: DateTime<Utc>,
    pub blockno: u64,
    pub block_id: String,
    pub tx_idx: u64,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub amount_float: f32,
    #[serde(rename = "type")]
    pub tx_type: u8,
    pub category: TxCategory,
    pub method: String,
    pub token_transfers: u64,
    pub status: String,
    pub result: String,
    pub contract: String,
    pub nonce: u64,
    pub fee_delegation: bool,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub fee_used: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameDoc {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub address: String,
    pub blockno: u64,
    pub tx: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDoc {
    #[serde(skip)]
    pub id: String,
    pub tx_id: String,
    pub blockno: u64,
    pub creator: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub name: String,
    pub name_lower: String,
    pub symbol: String,
    pub symbol_lower: String,
    pub token_transfers: u64,
    pub decimals: u8,
    pub supply: String,
    pub supply_float: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransferDoc {
    #[serde(skip)]
    pub id: String,
    pub tx_id: String,
    pub ts: DateTime<Utc>,
    pub blockno: u64,
    /// Token contract address.
    pub address: String,
    pub token_id: String,
    pub from: String,
    pub to: String,
    pub sender: String,
    pub amount: String,
    pub amount_float: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTokensDoc {
    #[serde(skip)]
    pub id: String,
    pub account: String,
    /// Token contract address.
    pub address: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub ts: DateTime<Utc>,
    pub blockno: u64,
    pub balance: String,
    pub balance_float: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalanceDoc {
    #[serde(skip)]
    pub id: String,
    pub ts: DateTime<Utc>,
    pub blockno: u64,
    pub balance: String,
    pub balance_float: f32,
    pub staking: String,
    pub staking_float: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NftDoc {
    #[serde(skip)]
    pub id: String,
    /// Token contract address.
    pub address: String,
    pub token_id: String,
    /// Current owner, or `BURN`.
    pub account: String,
    pub blockno: u64,
    pub ts: DateTime<Utc>,
    pub token_uri: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDoc {
    #[serde(skip)]
    pub id: String,
    pub tx_id: String,
    pub creator: String,
    pub blockno: u64,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistDoc {
    #[serde(skip)]
    pub id: String,
    pub contract: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainInfoDoc {
    #[serde(skip)]
    pub id: String,
    pub public: bool,
    pub mainnet: bool,
    pub consensus: String,
    pub version: u64,
}

// ─── Document ─────────────────────────────────────────────────────────────────

/// Any output record.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Block(BlockDoc),
    Tx(TxDoc),
    Name(NameDoc),
    Token(TokenDoc),
    TokenTransfer(TokenTransferDoc),
    AccountTokens(AccountTokensDoc),
    AccountBalance(AccountBalanceDoc),
    Nft(NftDoc),
    Contract(ContractDoc),
    Whitelist(WhitelistDoc),
    ChainInfo(ChainInfoDoc),
}

impl Document {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Block(_) => RecordKind::Block,
            Self::Tx(_) => RecordKind::Tx,
            Self::Name(_) => RecordKind::Name,
            Self::Token(_) => RecordKind::Token,
            Self::TokenTransfer(_) => RecordKind::TokenTransfer,
            Self::AccountTokens(_) => RecordKind::AccountTokens,
            Self::AccountBalance(_) => RecordKind::AccountBalance,
            Self::Nft(_) => RecordKind::Nft,
            Self::Contract(_) => RecordKind::Contract,
            Self::Whitelist(_) => RecordKind::Whitelist,
            Self::ChainInfo(_) => RecordKind::ChainInfo,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Block(d) => &d.id,
            Self::Tx(d) => &d.id,
            Self::Name(d) => &d.id,
            Self::Token(d) => &d.id,
            Self::TokenTransfer(d) => &d.id,
            Self::AccountTokens(d) => &d.id,
            Self::AccountBalance(d) => &d.id,
            Self::Nft(d) => &d.id,
            Self::Contract(d) => &d.id,
            Self::Whitelist(d) => &d.id,
            Self::ChainInfo(d) => &d.id,
        }
    }

    /// Block height the record belongs to.
    pub fn height(&self) -> Option<u64> {
        match self {
            Self::Block(d) => Some(d.no),
            Self::Tx(d) => Some(d.blockno),
            Self::Name(d) => Some(d.blockno),
            Self::Token(d) => Some(d.blockno),
            Self::TokenTransfer(d) => Some(d.blockno),
            Self::AccountTokens(d) => Some(d.blockno),
            Self::AccountBalance(d) => Some(d.blockno),
            Self::Nft(d) => Some(d.blockno),
            Self::Contract(d) => Some(d.blockno),
            Self::Whitelist(_) | Self::ChainInfo(_) => None,
        }
    }

    /// Serialized body, without the id.
    pub fn body(&self) -> Result<serde_json::Value, IndexerError> {
        let value = match self {
            Self::Block(d) => serde_json::to_value(d),
            Self::Tx(d) => serde_json::to_value(d),
            Self::Name(d) => serde_json::to_value(d),
            Self::Token(d) => serde_json::to_value(d),
            Self::TokenTransfer(d) => serde_json::to_value(d),
            Self::AccountTokens(d) => serde_json::to_value(d),
            Self::AccountBalance(d) => serde_json::to_value(d),
            Self::Nft(d) => serde_json::to_value(d),
            Self::Contract(d) => serde_json::to_value(d),
            Self::Whitelist(d) => serde_json::to_value(d),
            Self::ChainInfo(d) => serde_json::to_value(d),
        };
        Ok(value?)
    }
}
