//! Exact and lossy representations of on-chain amounts.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Decimals of the native coin.
pub const NATIVE_DECIMALS: u8 = 18;

/// An amount stored both as an exact base-10 string and as a lossy float
/// that is only meant for sorting and range filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub exact: String,
    pub float: f32,
}

impl Amount {
    pub fn zero() -> Self {
        Self {
            exact: "0".into(),
            float: 0.0,
        }
    }

    /// Build from a big-endian unsigned integer. Values wider than 256 bits
    /// saturate.
    pub fn from_be_bytes(bytes: &[u8], decimals: u8) -> Self {
        Self::from_u256(be_to_u256(bytes), decimals)
    }

    /// Parse a base-10 integer string.
    pub fn parse(s: &str, decimals: u8) -> Option<Self> {
        parse_decimal(s).map(|v| Self::from_u256(v, decimals))
    }

    pub fn from_u256(value: U256, decimals: u8) -> Self {
        Self {
            exact: value.to_string(),
            float: to_lossy_float(&value, decimals),
        }
    }

    /// Sum of two exact amounts, keeping `decimals` for the float.
    pub fn checked_add(&self, other: &Amount, decimals: u8) -> Option<Self> {
        let a = parse_decimal(&self.exact)?;
        let b = parse_decimal(&other.exact)?;
        Some(Self::from_u256(a.saturating_add(b), decimals))
    }

    pub fn is_zero(&self) -> bool {
        parse_decimal(&self.exact).map_or(true, |v| v.is_zero())
    }
}

/// Parse a non-empty string of ASCII digits.
pub fn parse_decimal(s: &str) -> Option<U256> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(s, 10).ok()
}

fn be_to_u256(bytes: &[u8]) -> U256 {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    U256::try_from_be_slice(&bytes[start..]).unwrap_or(U256::MAX)
}

/// `value / 10^decimals` as an `f32`. Precision is intentionally dropped.
pub fn to_lossy_float(value: &U256, decimals: u8) -> f32 {
    let raw: f64 = value.to_string().parse().unwrap_or(f64::MAX);
    (raw / 10f64.powi(i32::from(decimals))) as f32
}
