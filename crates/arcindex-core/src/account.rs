//! Account naming rules and peer-id derivation.

use sha2::{Digest, Sha256};

/// Name-registry system contract.
pub const NAME_ADDRESS: &str = "aergo.name";
/// Staking/voting system contract.
pub const SYSTEM_ADDRESS: &str = "aergo.system";
/// Enterprise (permissioned chain) system contract.
pub const ENTERPRISE_ADDRESS: &str = "aergo.enterprise";
pub const VAULT_ADDRESS: &str = "aergo.vault";

/// Marker contained in the zero address used by mint/burn transfers.
pub const ZERO_ADDRESS_MARKER: &str = "1111111111111111111111111";

/// Returns `true` for 12-character alphanumeric account aliases.
pub fn is_alias(address: &str) -> bool {
    address.chars().count() == 12 && address.chars().all(char::is_alphanumeric)
}

/// Returns `true` for the built-in system account names.
pub fn is_internal_name(name: &str) -> bool {
    matches!(
        name,
        NAME_ADDRESS | SYSTEM_ADDRESS | ENTERPRISE_ADDRESS | VAULT_ADDRESS
    )
}

/// Accounts whose balance is never resolved against the node.
pub fn is_balance_not_resolved(address: &str) -> bool {
    is_alias(address) || address == SYSTEM_ADDRESS
}

/// Multihash codes used by peer ids.
const MULTIHASH_IDENTITY: u8 = 0x00;
const MULTIHASH_SHA2_256: u8 = 0x12;
/// Keys up to this length are inlined into the peer id.
const MAX_INLINE_KEY_LEN: usize = 42;

/// Derive the base58 peer id of a block producer from its serialized
/// public key.
pub fn derive_peer_id(pubkey: &[u8]) -> String {
    let mut multihash = Vec::with_capacity(MAX_INLINE_KEY_LEN + 2);
    if pubkey.len() <= MAX_INLINE_KEY_LEN {
        multihash.push(MULTIHASH_IDENTITY);
        multihash.push(pubkey.len() as u8);
        multihash.extend_from_slice(pubkey);
    } else {
        let digest = Sha256::digest(pubkey);
        multihash.push(MULTIHASH_SHA2_256);
        multihash.push(digest.len() as u8);
        multihash.extend_from_slice(&digest);
    }
    bs58::encode(multihash).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_rules() {
        assert!(is_alias("abcdefg12345"));
        assert!(is_alias("TOKENLOCKERR"));
        assert!(!is_alias("abcdefg1234"));
        assert!(!is_alias("abcdefg1234."));
        assert!(!is_alias("AmMRo3jey9pL5qwJSNJFghe9t9J6fPEoZfNv8XjsqSrajGFuJGpi"));
    }

    #[test]
    fn balance_resolution() {
        assert!(is_balance_not_resolved("aergo.system"));
        assert!(is_balance_not_resolved("abcdefg12345"));
        assert!(!is_balance_not_resolved("aergo.name"));
        assert!(is_internal_name("aergo.vault"));
    }

    #[test]
    fn short_keys_are_inlined() {
        // secp256k1 compressed key wrapped in its protobuf envelope (37 bytes)
        let mut key = vec![0x08, 0x02, 0x12, 0x21, 0x02];
        key.extend_from_slice(&[7u8; 32]);
        let id = derive_peer_id(&key);
        assert!(id.starts_with("16Uiu2"), "got {id}");
        assert_eq!(id, derive_peer_id(&key));
    }

    #[test]
    fn long_keys_are_hashed() {
        let id = derive_peer_id(&[1u8; 64]);
        assert!(id.starts_with("Qm"), "got {id}");
    }
}
