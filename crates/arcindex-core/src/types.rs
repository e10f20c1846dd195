//! Raw chain data as delivered by the node client.
//!
//! Addresses arrive already encoded (base58check or plain name); amounts
//! arrive as big-endian unsigned integers, exactly as the node stores them.

use serde::{Deserialize, Serialize};

// ─── TxType ───────────────────────────────────────────────────────────────────

/// Transaction type tag carried in the transaction body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    #[default]
    Normal,
    Governance,
    Redeploy,
    FeeDelegation,
    Transfer,
    Call,
    Deploy,
    MultiCall,
}

impl TxType {
    /// Numeric tag as used on the wire and in stored transaction records.
    pub fn code(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Governance => 1,
            Self::Redeploy => 2,
            Self::FeeDelegation => 3,
            Self::Transfer => 4,
            Self::Call => 5,
            Self::Deploy => 6,
            Self::MultiCall => 7,
        }
    }
}

// ─── RawTx ────────────────────────────────────────────────────────────────────

/// A transaction as contained in a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTx {
    /// Transaction hash (base58).
    pub hash: String,
    /// Sender address.
    pub account: String,
    /// Recipient address. Empty for contract deployments.
    pub recipient: String,
    /// Transferred amount, big-endian.
    pub amount: Vec<u8>,
    pub payload: Vec<u8>,
    pub tx_type: TxType,
    pub nonce: u64,
    pub gas_limit: u64,
}

impl RawTx {
    /// Returns `true` if the amount encodes a non-zero value.
    pub fn has_amount(&self) -> bool {
        self.amount.iter().any(|b| *b != 0)
    }

    /// Payload interpreted as UTF-8 text (lossy).
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

// ─── RawBlock ─────────────────────────────────────────────────────────────────

/// A full block with its transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlock {
    /// Block hash (base58).
    pub hash: String,
    pub prev_hash: String,
    pub height: u64,
    /// Block timestamp in nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// Public key of the block producer, as raw bytes.
    pub producer_pubkey: Vec<u8>,
    pub coinbase: String,
    /// Consensus reward account. Empty when the chain pays no block reward.
    pub reward_account: String,
    /// Serialized block size in bytes.
    pub size: u64,
    pub txs: Vec<RawTx>,
}

// ─── Receipt / events ─────────────────────────────────────────────────────────

/// Status string the node reports for a failed transaction.
pub const RECEIPT_ERROR: &str = "ERROR";

/// Status stored when the receipt could not be fetched.
pub const NO_RECEIPT: &str = "NO_RECEIPT";

/// Execution receipt of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReceipt {
    pub status: String,
    /// Address of the contract created by a deploy, or called by a call.
    pub contract_address: String,
    pub ret: String,
    pub gas_used: u64,
    /// Fee paid, big-endian.
    pub fee_used: Vec<u8>,
    pub fee_delegation: bool,
    pub events: Vec<RawEvent>,
}

impl RawReceipt {
    pub fn is_error(&self) -> bool {
        self.status == RECEIPT_ERROR
    }
}

/// A contract event emitted during transaction execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub contract_address: String,
    pub name: String,
    /// Event arguments as a JSON array.
    pub json_args: String,
    /// Position of the event within the transaction.
    pub idx: u32,
}

// ─── Accounts / chain ─────────────────────────────────────────────────────────

/// On-chain balance state of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Spendable balance, big-endian.
    pub balance: Vec<u8>,
    /// Staked amount, big-endian.
    pub staking: Vec<u8>,
}

/// Identity of the chain a node serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub magic: String,
    pub public: bool,
    pub mainnet: bool,
    pub consensus: String,
    pub version: u64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_presence() {
        let mut tx = RawTx::default();
        assert!(!tx.has_amount());
        tx.amount = vec![0, 0];
        assert!(!tx.has_amount());
        tx.amount = vec![0, 1];
        assert!(tx.has_amount());
    }

    #[test]
    fn tx_type_codes() {
        assert_eq!(TxType::Normal.code(), 0);
        assert_eq!(TxType::MultiCall.code(), 7);
        let json = serde_json::to_string(&TxType::FeeDelegation).unwrap();
        assert_eq!(json, "\"FEE_DELEGATION\"");
    }
}
