//! Read-side cache and invalidation hook
//!
//! The transfer core never reads from the cache; it only signals which keys
//! became stale after a commit through [`CacheInvalidator`]. [`ReadCache`] is
//! the TTL cache (via the `cached` crate) used by the read endpoints.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use cached::{Cached, TimedCache};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::account::AccountId;
use crate::transfer::TransactionId;

/// Default TTL for cached read views
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache key builders, shared by readers and the invalidation hook
pub mod keys {
    use super::*;

    pub const ACCOUNTS_ALL: &str = "accounts:all";

    /// Prefix of filtered transaction listings; all of them go stale on any commit
    pub const TRANSACTION_LIST_PREFIX: &str = "transactions:list:";

    pub fn transaction_list(query: &str) -> String {
        format!("{}{}", TRANSACTION_LIST_PREFIX, query)
    }

    pub fn account(id: AccountId) -> String {
        format!("account:{}", id)
    }

    pub fn account_balance(id: AccountId) -> String {
        format!("account:{}:balance", id)
    }

    pub fn transaction(id: TransactionId) -> String {
        format!("transaction:{}", id)
    }

    pub fn account_stats(id: AccountId) -> String {
        format!("transaction:account:{}:stats", id)
    }
}

/// Every key made stale by a committed transfer touching `account_ids`
pub fn invalidation_keys(account_ids: &[AccountId], transaction_id: TransactionId) -> Vec<String> {
    let mut out = Vec::with_capacity(account_ids.len() * 3 + 2);
    for id in account_ids {
        out.push(keys::account(*id));
        out.push(keys::account_balance(*id));
        out.push(keys::account_stats(*id));
    }
    out.push(keys::ACCOUNTS_ALL.to_string());
    out.push(keys::transaction(transaction_id));
    out.dedup();
    out
}

/// Fire-and-forget eviction hook called after a committed transfer
pub trait CacheInvalidator: Send + Sync {
    /// Must not fail or block; implementations log their own problems
    fn invalidate(&self, account_ids: &[AccountId], transaction_id: TransactionId);
}

/// Invalidator for deployments without a read cache
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, account_ids: &[AccountId], transaction_id: TransactionId) {
        tracing::trace!(
            accounts = account_ids.len(),
            transaction_id = %transaction_id,
            "No read cache configured"
        );
    }
}

/// TTL cache of serialized read views.
///
/// Every invalidation bumps a generation counter. Readers capture the
/// generation before loading from the store and store the view with
/// [`ReadCache::put_if_current`], so a view loaded before a commit can never
/// be written back after that commit's eviction.
pub struct ReadCache {
    inner: Mutex<CacheState>,
}

struct CacheState {
    entries: TimedCache<String, serde_json::Value>,
    generation: u64,
    /// Live keys under [`keys::TRANSACTION_LIST_PREFIX`], evicted as a group
    list_keys: HashSet<String>,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheState {
                entries: TimedCache::with_lifespan(ttl.as_secs().max(1)),
                generation: 0,
                list_keys: HashSet::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut state = self.state();
        let value = state.entries.cache_get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, error = %e, "[cache] Dropping undecodable entry");
                state.entries.cache_remove(key);
                None
            }
        }
    }

    /// Current invalidation generation; capture it before loading a view
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    pub fn put<T: Serialize>(&self, key: impl Into<String>, value: &T) {
        let generation = self.generation();
        self.put_if_current(key, value, generation);
    }

    /// Store `value` only if no invalidation happened since `generation`
    pub fn put_if_current<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
        generation: u64,
    ) -> bool {
        let key = key.into();
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "[cache] Failed to serialize view");
                return false;
            }
        };

        let mut state = self.state();
        if state.generation != generation {
            tracing::debug!(key = %key, "[cache] Discarding view loaded before invalidation");
            return false;
        }
        if key.starts_with(keys::TRANSACTION_LIST_PREFIX) {
            state.list_keys.insert(key.clone());
        }
        state.entries.cache_set(key, value);
        true
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.state();
        state.list_keys.remove(key);
        state.entries.cache_remove(key);
    }

    pub fn len(&self) -> usize {
        self.state().entries.cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CacheInvalidator for ReadCache {
    fn invalidate(&self, account_ids: &[AccountId], transaction_id: TransactionId) {
        let stale = invalidation_keys(account_ids, transaction_id);
        let mut state = self.state();
        state.generation = state.generation.wrapping_add(1);
        for key in &stale {
            state.entries.cache_remove(key);
        }
        let lists: Vec<String> = state.list_keys.drain().collect();
        for key in &lists {
            state.entries.cache_remove(key);
        }
        tracing::debug!(
            keys = ?stale,
            listings = lists.len(),
            generation = state.generation,
            "[cache] Invalidating"
        );
    }
}

/// Invalidator that records every call
#[cfg(test)]
pub mod mock {
    use super::*;

    #[derive(Default)]
    pub struct RecordingInvalidator {
        calls: Mutex<Vec<(Vec<AccountId>, TransactionId)>>,
    }

    impl RecordingInvalidator {
        pub fn calls(&self) -> Vec<(Vec<AccountId>, TransactionId)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CacheInvalidator for RecordingInvalidator {
        fn invalidate(&self, account_ids: &[AccountId], transaction_id: TransactionId) {
            self.calls
                .lock()
                .unwrap()
                .push((account_ids.to_vec(), transaction_id));
        }
    }
}
