//! Process-wide resolution cache shared by all miner workers.
//!
//! Holds memoized peer ids, the account/token dedup set, the balance watch
//! set, and token metadata. Every operation locks internally; callers never
//! coordinate access themselves.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::account::derive_peer_id;
use crate::convert::TokenMeta;

/// Why an address is in the balance watch set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOrigin {
    /// Configured or persisted whitelist entry. Never removed by refresh.
    Seeded,
    /// Added because the account holds a stake. Removed once the stake is gone.
    Staking,
}

#[derive(Debug, Default)]
pub struct ResolutionCache {
    peer_ids: Mutex<HashMap<Vec<u8>, String>>,
    seen: Mutex<HashSet<String>>,
    watch: Mutex<HashMap<String, WatchOrigin>>,
    tokens: Mutex<HashMap<String, TokenMeta>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Peer ids ─────────────────────────────────────────────────────────────

    /// Peer id for a producer public key, derived at most once per key.
    pub fn peer_id(&self, pubkey: &[u8]) -> String {
        if let Some(id) = self.peer_ids.lock().get(pubkey) {
            return id.clone();
        }
        let derived = derive_peer_id(pubkey);
        self.peer_ids
            .lock()
            .entry(pubkey.to_vec())
            .or_insert(derived)
            .clone()
    }

    // ─── Dedup set ────────────────────────────────────────────────────────────

    /// Mark `id` as seen. Returns `true` if it was already present.
    ///
    /// Test and set happen under one lock: among concurrent callers with the
    /// same id exactly one gets `false`.
    pub fn mark_seen(&self, id: &str) -> bool {
        !self.seen.lock().insert(id.to_string())
    }

    pub fn clear_seen(&self) {
        self.seen.lock().clear();
    }

    // ─── Balance watch set ────────────────────────────────────────────────────

    /// Add an address to the watch set. A seeded entry is never downgraded.
    pub fn watch(&self, address: &str, origin: WatchOrigin) {
        let mut watch = self.watch.lock();
        let entry = watch.entry(address.to_string()).or_insert(origin);
        if origin == WatchOrigin::Seeded {
            *entry = WatchOrigin::Seeded;
        }
    }

    /// Drop a stake-derived entry. Seeded entries stay. Returns `true` if the
    /// address was removed.
    pub fn release_stake(&self, address: &str) -> bool {
        let mut watch = self.watch.lock();
        if watch.get(address) == Some(&WatchOrigin::Staking) {
            watch.remove(address);
            return true;
        }
        false
    }

    pub fn is_watched(&self, address: &str) -> bool {
        self.watch.lock().contains_key(address)
    }

    /// Snapshot of the watch set, sorted.
    pub fn watched(&self) -> Vec<String> {
        let mut out: Vec<String> = self.watch.lock().keys().cloned().collect();
        out.sort();
        out
    }

    // ─── Token metadata ───────────────────────────────────────────────────────

    pub fn token_meta(&self, contract: &str) -> Option<TokenMeta> {
        self.tokens.lock().get(contract).cloned()
    }

    pub fn remember_token(&self, contract: &str, meta: TokenMeta) {
        self.tokens.lock().insert(contract.to_string(), meta);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn peer_id_is_memoized() {
        let cache = ResolutionCache::new();
        let a = cache.peer_id(&[1, 2, 3]);
        let b = cache.peer_id(&[1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, cache.peer_id(&[3, 2, 1]));
        assert_eq!(cache.peer_ids.lock().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_mark_seen_has_one_winner() {
        let cache = Arc::new(ResolutionCache::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(32));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let cache = cache.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                cache.mark_seen("AmAlice-AmToken")
            }));
        }
        let mut first = 0;
        for h in handles {
            if !h.await.unwrap() {
                first += 1;
            }
        }
        assert_eq!(first, 1);
        assert!(cache.mark_seen("AmAlice-AmToken"));
    }

    #[test]
    fn seeded_entries_are_pinned() {
        let cache = ResolutionCache::new();
        cache.watch("AmSeed", WatchOrigin::Seeded);
        cache.watch("AmStaker", WatchOrigin::Staking);
        cache.watch("AmSeed", WatchOrigin::Staking);

        assert!(!cache.release_stake("AmSeed"));
        assert!(cache.release_stake("AmStaker"));
        assert!(!cache.release_stake("AmStaker"));
        assert_eq!(cache.watched(), vec!["AmSeed".to_string()]);
    }

    #[test]
    fn staking_entry_upgrades_to_seeded() {
        let cache = ResolutionCache::new();
        cache.watch("AmA", WatchOrigin::Staking);
        cache.watch("AmA", WatchOrigin::Seeded);
        assert!(!cache.release_stake("AmA"));
        assert!(cache.is_watched("AmA"));
    }

    #[test]
    fn token_metadata() {
        let cache = ResolutionCache::new();
        assert!(cache.token_meta("AmTok").is_none());
        cache.remember_token(
            "AmTok",
            TokenMeta {
                name: "T".into(),
                symbol: "T".into(),
                decimals: 8,
            },
        );
        assert_eq!(cache.token_meta("AmTok").unwrap().decimals, 8);
    }
}
