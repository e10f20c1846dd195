//! Transaction classification.
//!
//! [`classify`] runs a fixed priority cascade over a transaction's type tag,
//! recipient, payload, and amount. The first matching rule wins; the order of
//! the rules below is part of the contract.

use serde::{Deserialize, Serialize};

use crate::account::{ENTERPRISE_ADDRESS, NAME_ADDRESS, SYSTEM_ADDRESS};
use crate::types::{RawTx, TxType};

/// Maximum stored length of a call name.
pub const MAX_CALL_NAME_LEN: usize = 50;

/// Deploy payloads shorter than this never carry a token contract.
const MIN_TOKEN_PAYLOAD_LEN: usize = 30;

/// User-facing category of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxCategory {
    #[default]
    #[serde(rename = "")]
    None,
    Payload,
    Call,
    Governance,
    System,
    Staking,
    Voting,
    Name,
    NameCreate,
    NameUpdate,
    Enterprise,
    Conf,
    Cluster,
    Deploy,
    Redeploy,
    MultiCall,
    Transfer,
}

impl TxCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Payload => "payload",
            Self::Call => "call",
            Self::Governance => "governance",
            Self::System => "system",
            Self::Staking => "staking",
            Self::Voting => "voting",
            Self::Name => "name",
            Self::NameCreate => "namecreate",
            Self::NameUpdate => "nameupdate",
            Self::Enterprise => "enterprise",
            Self::Conf => "conf",
            Self::Cluster => "cluster",
            Self::Deploy => "deploy",
            Self::Redeploy => "redeploy",
            Self::MultiCall => "multicall",
            Self::Transfer => "transfer",
        }
    }

    /// Categories whose receipts are scanned for token activity.
    pub fn is_token_candidate(&self) -> bool {
        matches!(self, Self::Call | Self::Deploy | Self::Payload | Self::MultiCall)
    }
}

impl std::fmt::Display for TxCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contract call encoded in a transaction payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CallPayload {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Args", default)]
    pub args: Vec<serde_json::Value>,
}

/// Parse a payload as `{"Name": ..., "Args": [...]}`.
pub fn parse_call(payload: &[u8]) -> Option<CallPayload> {
    serde_json::from_slice(payload).ok()
}

/// Classify a transaction into `(category, call_name)`.
pub fn classify(tx: &RawTx) -> (TxCategory, String) {
    match tx.tx_type {
        TxType::Redeploy => return (TxCategory::Redeploy, String::new()),
        TxType::MultiCall => return (TxCategory::MultiCall, String::new()),
        _ => {}
    }

    if tx.recipient.is_empty() && !tx.payload.is_empty() {
        return (TxCategory::Deploy, String::new());
    }

    match tx.recipient.as_str() {
        ENTERPRISE_ADDRESS => {
            return system_call(tx, TxCategory::Enterprise, |name| {
                if name.ends_with("cluster") {
                    Some(TxCategory::Cluster)
                } else if name.ends_with("conf") {
                    Some(TxCategory::Conf)
                } else {
                    None
                }
            })
        }
        NAME_ADDRESS => {
            return system_call(tx, TxCategory::Name, |name| {
                if name.ends_with("updatename") {
                    Some(TxCategory::NameUpdate)
                } else if name.ends_with("createname") {
                    Some(TxCategory::NameCreate)
                } else {
                    None
                }
            })
        }
        SYSTEM_ADDRESS => {
            return system_call(tx, TxCategory::System, |name| {
                if name.ends_with("stake") {
                    Some(TxCategory::Staking)
                } else if name.ends_with("vote")
                    || name.ends_with("votedao")
                    || name.ends_with("votebp")
                    || name.ends_with("proposal")
                {
                    Some(TxCategory::Voting)
                } else {
                    None
                }
            })
        }
        _ => {}
    }

    if tx.tx_type == TxType::Governance {
        return (TxCategory::Governance, String::new());
    }

    if let Some(call) = parse_call(&tx.payload) {
        if !call.name.is_empty() {
            return (TxCategory::Call, truncate_call_name(&call.name));
        }
    }

    if !tx.payload.is_empty() {
        return (TxCategory::Payload, String::new());
    }

    if tx.tx_type == TxType::Transfer || (tx.tx_type == TxType::Normal && tx.has_amount()) {
        return (TxCategory::Transfer, String::new());
    }

    (TxCategory::None, String::new())
}

/// Calls into a system contract are refined by the suffix of the lower-cased
/// call name; unparseable payloads keep the contract's generic category.
fn system_call(
    tx: &RawTx,
    generic: TxCategory,
    refine: impl Fn(&str) -> Option<TxCategory>,
) -> (TxCategory, String) {
    match parse_call(&tx.payload) {
        Some(call) => {
            let name = truncate_call_name(&call.name.to_lowercase());
            (refine(&name).unwrap_or(generic), name)
        }
        None => (generic, String::new()),
    }
}

fn truncate_call_name(name: &str) -> String {
    name.chars().take(MAX_CALL_NAME_LEN).collect()
}

// ─── Token deploy heuristic ───────────────────────────────────────────────────

/// Token contract convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "ARC1")]
    Arc1,
    #[serde(rename = "ARC2")]
    Arc2,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Arc1 => "ARC1",
            Self::Arc2 => "ARC2",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const TOKEN_KEYWORDS: [&str; 5] = ["name", "balanceOf", "transfer", "symbol", "totalSupply"];

/// Detect a token deployment by scanning the deploy payload for the token
/// interface method names.
pub fn detect_token_deploy(tx: &RawTx) -> TokenType {
    if tx.tx_type != TxType::Deploy || tx.payload.len() <= MIN_TOKEN_PAYLOAD_LEN {
        return TokenType::None;
    }
    let text = tx.payload_text();
    if !TOKEN_KEYWORDS.iter().all(|k| text.contains(k)) {
        return TokenType::None;
    }
    if text.contains("decimals") {
        TokenType::Arc1
    } else if text.contains("ownerOf") {
        TokenType::Arc2
    } else {
        TokenType::None
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
