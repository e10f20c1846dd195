//! Pure conversion of raw chain data into output records.
//!
//! Converters take already-fetched chain data plus already-resolved values
//! (peer ids, token metadata, balances) and never perform I/O.

use chrono::{DateTime, TimeZone, Utc};

use crate::amount::{Amount, NATIVE_DECIMALS};
use crate::category::{classify, parse_call, TokenType};
use crate::document::{
    AccountBalanceDoc, AccountTokensDoc, BlockDoc, ChainInfoDoc, ContractDoc, NameDoc, NftDoc,
    TokenDoc, TokenTransferDoc, TxDoc, WhitelistDoc,
};
use crate::types::{ChainInfo, RawBlock, RawReceipt, RawTx, NO_RECEIPT};

/// Reward paid per block when the chain has a consensus reward account.
pub const BLOCK_REWARD: &str = "160000000000000000";

/// Name stored when a name-registry payload cannot be decoded.
const UNPARSEABLE_NAME: &str = "error";

/// Token metadata read from the token contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMeta {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Resolved value of a token movement: an NFT id with its owner, or a
/// fungible amount.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferValue {
    pub token_type: TokenType,
    /// NFT id; empty for fungible tokens.
    pub token_id: String,
    /// Fungible amount, or the NFT's owner after the transfer.
    pub amount: Amount,
}

pub fn timestamp(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

pub fn block_doc(block: &RawBlock, block_producer: String) -> BlockDoc {
    let reward_amount = if block.reward_account.is_empty() {
        String::new()
    } else {
        BLOCK_REWARD.to_string()
    };
    BlockDoc {
        id: block.hash.clone(),
        ts: timestamp(block.timestamp),
        no: block.height,
        previous_block: block.prev_hash.clone(),
        txs: block.txs.len() as u64,
        size: block.size,
        coinbase: block.coinbase.clone(),
        block_producer,
        reward_account: block.reward_account.clone(),
        reward_amount,
    }
}

pub fn tx_doc(tx_idx: u64, tx: &RawTx, receipt: Option<&RawReceipt>, block: &BlockDoc) -> TxDoc {
    let amount = Amount::from_be_bytes(&tx.amount, NATIVE_DECIMALS);
    let (category, method) = classify(tx);
    let mut doc = TxDoc {
        id: tx.hash.clone(),
        ts: block.ts,
        blockno: block.no,
        block_id: block.id.clone(),
        tx_idx,
        from: tx.account.clone(),
        to: tx.recipient.clone(),
        amount: amount.exact,
        amount_float: amount.float,
        tx_type: tx.tx_type.code(),
        category,
        method,
        token_transfers: 0,
        status: NO_RECEIPT.to_string(),
        result: String::new(),
        contract: String::new(),
        nonce: tx.nonce,
        fee_delegation: false,
        gas_used: 0,
        gas_limit: tx.gas_limit,
        fee_used: String::new(),
    };
    if let Some(receipt) = receipt {
        doc.status = receipt.status.clone();
        doc.result = receipt.ret.clone();
        doc.contract = receipt.contract_address.clone();
        doc.fee_delegation = receipt.fee_delegation;
        doc.gas_used = receipt.gas_used;
        doc.fee_used = Amount::from_be_bytes(&receipt.fee_used, NATIVE_DECIMALS).exact;
    }
    doc
}

/// Name-registry record. `v1createName` binds the sender, `v1updateName`
/// binds the second call argument.
pub fn name_doc(tx: &RawTx, blockno: u64) -> NameDoc {
    let mut name = UNPARSEABLE_NAME.to_string();
    let mut address = String::new();
    if let Some(call) = parse_call(&tx.payload) {
        if let Some(first) = call.args.first().and_then(|v| v.as_str()) {
            name = first.to_string();
            match call.name.as_str() {
                "v1createName" => address = tx.account.clone(),
                "v1updateName" => {
                    address = call
                        .args
                        .get(1)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                }
                _ => {}
            }
        }
    }
    NameDoc {
        id: format!("{name}-{}", tx.hash),
        name,
        address,
        blockno,
        tx: tx.hash.clone(),
    }
}

pub fn token_doc(
    tx: &TxDoc,
    contract: &str,
    token_type: TokenType,
    meta: &TokenMeta,
    supply: &Amount,
) -> TokenDoc {
    TokenDoc {
        id: contract.to_string(),
        tx_id: tx.id.clone(),
        blockno: tx.blockno,
        creator: tx.from.clone(),
        token_type,
        name: meta.name.clone(),
        name_lower: meta.name.to_lowercase(),
        symbol: meta.symbol.clone(),
        symbol_lower: meta.symbol.to_lowercase(),
        token_transfers: 0,
        decimals: meta.decimals,
        supply: supply.exact.clone(),
        supply_float: supply.float,
    }
}

pub fn token_transfer_doc(
    tx: &TxDoc,
    event_idx: u32,
    contract: &str,
    from: &str,
    to: &str,
    value: &TransferValue,
) -> TokenTransferDoc {
    TokenTransferDoc {
        id: format!("{}-{}", tx.id, event_idx),
        tx_id: tx.id.clone(),
        ts: tx.ts,
        blockno: tx.blockno,
        address: contract.to_string(),
        token_id: value.token_id.clone(),
        from: from.to_string(),
        to: to.to_string(),
        sender: tx.from.clone(),
        amount: value.amount.exact.clone(),
        amount_float: value.amount.float,
    }
}

pub fn account_tokens_doc(
    token_type: TokenType,
    contract: &str,
    ts: DateTime<Utc>,
    blockno: u64,
    account: &str,
    balance: &Amount,
) -> AccountTokensDoc {
    AccountTokensDoc {
        id: format!("{account}-{contract}"),
        account: account.to_string(),
        address: contract.to_string(),
        token_type,
        ts,
        blockno,
        balance: balance.exact.clone(),
        balance_float: balance.float,
    }
}

pub fn account_balance_doc(
    address: &str,
    blockno: u64,
    ts: DateTime<Utc>,
    balance: &Amount,
    staking: &Amount,
) -> AccountBalanceDoc {
    AccountBalanceDoc {
        id: address.to_string(),
        ts,
        blockno,
        balance: balance.exact.clone(),
        balance_float: balance.float,
        staking: staking.exact.clone(),
        staking_float: staking.float,
    }
}

/// NFT record built from an ARC2 transfer; the transfer amount holds the
/// new owner.
pub fn nft_doc(transfer: &TokenTransferDoc, token_uri: String, image_url: String) -> NftDoc {
    NftDoc {
        id: format!("{}-{}", transfer.address, transfer.token_id),
        address: transfer.address.clone(),
        token_id: transfer.token_id.clone(),
        account: transfer.amount.clone(),
        blockno: transfer.blockno,
        ts: transfer.ts,
        token_uri,
        image_url,
    }
}

pub fn contract_doc(tx: &TxDoc, contract: &str) -> ContractDoc {
    ContractDoc {
        id: contract.to_string(),
        tx_id: tx.id.clone(),
        creator: tx.from.clone(),
        blockno: tx.blockno,
        ts: tx.ts,
    }
}

pub fn chain_info_doc(info: &ChainInfo) -> ChainInfoDoc {
    ChainInfoDoc {
        id: info.magic.clone(),
        public: info.public,
        mainnet: info.mainnet,
        consensus: info.consensus.clone(),
        version: info.version,
    }
}

pub fn whitelist_doc(address: &str, contract: &str, entry_type: &str) -> WhitelistDoc {
    WhitelistDoc {
        id: address.to_string(),
        contract: contract.to_string(),
        entry_type: entry_type.to_string(),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::TxCategory;
    use crate::types::TxType;

    fn raw_block() -> RawBlock {
        RawBlock {
            hash: "blockhash".into(),
            prev_hash: "parenthash".into(),
            height: 42,
            timestamp: 1_600_000_000_000_000_000,
            producer_pubkey: vec![1, 2, 3],
            coinbase: "AmCoinbase".into(),
            reward_account: "AmReward".into(),
            size: 512,
            txs: vec![RawTx {
                hash: "txhash".into(),
                account: "AmAlice".into(),
                recipient: "AmBob".into(),
                amount: 2_000_000_000_000_000_000u128.to_be_bytes().to_vec(),
                tx_type: TxType::Transfer,
                nonce: 3,
                gas_limit: 100_000,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn conversion_is_idempotent() {
        let block = raw_block();
        let a = block_doc(&block, "peer".into());
        let b = block_doc(&block, "peer".into());
        assert_eq!(a, b);
        assert_eq!(a.id, "blockhash");
        assert_eq!(a.reward_amount, BLOCK_REWARD);
        assert_eq!(a.ts.timestamp(), 1_600_000_000);

        let tx1 = tx_doc(0, &block.txs[0], None, &a);
        let tx2 = tx_doc(0, &block.txs[0], None, &a);
        assert_eq!(tx1, tx2);
        assert_eq!(tx1.id, "txhash");
        assert_eq!(tx1.amount, "2000000000000000000");
        assert!((tx1.amount_float - 2.0).abs() < 1e-6);
        assert_eq!(tx1.category, TxCategory::Transfer);
        assert_eq!(tx1.status, NO_RECEIPT);
    }

    #[test]
    fn no_reward_without_reward_account() {
        let mut block = raw_block();
        block.reward_account.clear();
        assert_eq!(block_doc(&block, String::new()).reward_amount, "");
    }

    #[test]
    fn receipt_fields() {
        let block = raw_block();
        let b = block_doc(&block, "peer".into());
        let receipt = RawReceipt {
            status: "SUCCESS".into(),
            contract_address: "AmContract".into(),
            ret: "{}".into(),
            gas_used: 21_000,
            fee_used: vec![0x03, 0xe8],
            fee_delegation: true,
            events: vec![],
        };
        let doc = tx_doc(1, &block.txs[0], Some(&receipt), &b);
        assert_eq!(doc.status, "SUCCESS");
        assert_eq!(doc.contract, "AmContract");
        assert_eq!(doc.fee_used, "1000");
        assert!(doc.fee_delegation);
    }

    #[test]
    fn name_records() {
        let mut tx = RawTx {
            hash: "h1".into(),
            account: "AmAlice".into(),
            recipient: "aergo.name".into(),
            tx_type: TxType::Governance,
            payload: br#"{"Name":"v1createName","Args":["alicealice12"]}"#.to_vec(),
            ..Default::default()
        };
        let doc = name_doc(&tx, 9);
        assert_eq!(doc.id, "alicealice12-h1");
        assert_eq!(doc.address, "AmAlice");

        tx.payload = br#"{"Name":"v1updateName","Args":["alicealice12","AmBob"]}"#.to_vec();
        assert_eq!(name_doc(&tx, 9).address, "AmBob");

        tx.payload = b"garbage".to_vec();
        let doc = name_doc(&tx, 9);
        assert_eq!(doc.name, "error");
        assert_eq!(doc.id, "error-h1");
    }

    #[test]
    fn token_record_ids() {
        let block = raw_block();
        let b = block_doc(&block, String::new());
        let tx = tx_doc(0, &block.txs[0], None, &b);
        let value = TransferValue {
            token_type: TokenType::Arc2,
            token_id: "17".into(),
            amount: Amount {
                exact: "AmBob".into(),
                float: 1.0,
            },
        };
        let transfer = token_transfer_doc(&tx, 3, "AmNft", "AmAlice", "AmBob", &value);
        assert_eq!(transfer.id, "txhash-3");
        let nft = nft_doc(&transfer, "uri".into(), "img".into());
        assert_eq!(nft.id, "AmNft-17");
        assert_eq!(nft.account, "AmBob");

        let holding = account_tokens_doc(TokenType::Arc1, "AmTok", tx.ts, 42, "AmAlice", &Amount::zero());
        assert_eq!(holding.id, "AmAlice-AmTok");

        let meta = TokenMeta {
            name: "Arc Token".into(),
            symbol: "ARC".into(),
            decimals: 18,
        };
        let token = token_doc(&tx, "AmTok", TokenType::Arc1, &meta, &Amount::zero());
        assert_eq!(token.name_lower, "arc token");
        assert_eq!(token.creator, "AmAlice");
    }
}
