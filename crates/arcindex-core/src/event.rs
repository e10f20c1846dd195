//! Decoding of token contract events.
//!
//! Event arguments arrive as a JSON array. Some contracts emit a leading
//! `null` argument, which is dropped before positional parsing.

use serde_json::Value;

use crate::account::ZERO_ADDRESS_MARKER;
use crate::category::TokenType;
use crate::error::IndexerError;
use crate::types::RawEvent;

pub const MINT: &str = "MINT";
pub const BURN: &str = "BURN";

/// A decoded token event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// A factory announced a new token contract.
    NewToken {
        token_type: TokenType,
        contract: String,
    },
    /// Movement of a fungible amount or an NFT id.
    Transfer(TransferEvent),
}

/// Mint, transfer, or burn, normalised to `from → to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub kind: TransferKind,
    pub contract: String,
    pub from: String,
    pub to: String,
    /// Decimal amount for fungible tokens, token id for NFTs.
    pub amount_or_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Mint,
    Transfer,
    Burn,
}

/// Decode an event. Returns `Ok(None)` for events that carry no token
/// semantics, and `Err` for token events with malformed arguments.
pub fn parse_event(event: &RawEvent) -> Result<Option<TokenEvent>, IndexerError> {
    let token_type = match event.name.as_str() {
        "new_arc1_token" => TokenType::Arc1,
        "new_arc2_token" => TokenType::Arc2,
        "mint" => return parse_mint(event).map(|t| Some(TokenEvent::Transfer(t))),
        "transfer" => return parse_transfer(event).map(|t| Some(TokenEvent::Transfer(t))),
        "burn" => return parse_burn(event).map(|t| Some(TokenEvent::Transfer(t))),
        _ => return Ok(None),
    };

    let args = args(event)?;
    let contract = string_arg(event, &args, 0)?;
    Ok(Some(TokenEvent::NewToken {
        token_type,
        contract,
    }))
}

fn parse_mint(event: &RawEvent) -> Result<TransferEvent, IndexerError> {
    let args = stripped_args(event)?;
    require_len(event, &args, 2)?;
    Ok(TransferEvent {
        kind: TransferKind::Mint,
        contract: event.contract_address.clone(),
        from: MINT.to_string(),
        to: string_arg(event, &args, 0)?,
        amount_or_id: amount_or_id(event, &args[1])?,
    })
}

fn parse_transfer(event: &RawEvent) -> Result<TransferEvent, IndexerError> {
    let args = stripped_args(event)?;
    require_len(event, &args, 3)?;
    let mut from = string_arg(event, &args, 0)?;
    let mut to = string_arg(event, &args, 1)?;
    // Only one side is rewritten; `from` wins.
    if from.contains(ZERO_ADDRESS_MARKER) {
        from = MINT.to_string();
    } else if to.contains(ZERO_ADDRESS_MARKER) {
        to = BURN.to_string();
    }
    Ok(TransferEvent {
        kind: TransferKind::Transfer,
        contract: event.contract_address.clone(),
        from,
        to,
        amount_or_id: amount_or_id(event, &args[2])?,
    })
}

fn parse_burn(event: &RawEvent) -> Result<TransferEvent, IndexerError> {
    let args = stripped_args(event)?;
    require_len(event, &args, 2)?;
    Ok(TransferEvent {
        kind: TransferKind::Burn,
        contract: event.contract_address.clone(),
        from: string_arg(event, &args, 0)?,
        to: BURN.to_string(),
        amount_or_id: amount_or_id(event, &args[1])?,
    })
}

/// Normalise an amount-or-id argument: strings verbatim, unsigned integers
/// in decimal, `{"_bignum": "..."}` objects to their digits.
pub fn amount_or_id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n.as_u64().map(|v| v.to_string()),
        Value::Object(map) => match map.get("_bignum") {
            Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                Some(s.clone())
            }
            _ => None,
        },
        _ => None,
    }
}

// ─── Argument helpers ─────────────────────────────────────────────────────────

fn malformed(event: &RawEvent, reason: &str) -> IndexerError {
    IndexerError::Decode(format!(
        "event '{}' {}: {}",
        event.name, reason, event.json_args
    ))
}

fn args(event: &RawEvent) -> Result<Vec<Value>, IndexerError> {
    serde_json::from_str(&event.json_args).map_err(|_| malformed(event, "invalid args"))
}

fn stripped_args(event: &RawEvent) -> Result<Vec<Value>, IndexerError> {
    let mut args = args(event)?;
    if matches!(args.first(), Some(Value::Null)) {
        args.remove(0);
    }
    Ok(args)
}

fn require_len(event: &RawEvent, args: &[Value], len: usize) -> Result<(), IndexerError> {
    if args.len() < len {
        return Err(malformed(event, &format!("expects {len} args")));
    }
    Ok(())
}

fn string_arg(event: &RawEvent, args: &[Value], idx: usize) -> Result<String, IndexerError> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(malformed(event, &format!("arg {idx} is not a string"))),
    }
}

fn amount_or_id(event: &RawEvent, value: &Value) -> Result<String, IndexerError> {
    amount_or_id_from_value(value).ok_or_else(|| malformed(event, "invalid amount or id"))
}
