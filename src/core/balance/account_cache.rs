// Typed in-memory mirror of hot account data.
//
// **DashMap:**
// A concurrent HashMap that's safe to use across multiple async tasks
// without an explicit Mutex. Multiple interactive calls and the periodic
// jobs all read balances concurrently, so the cache has to tolerate that.
//
// The cache is never authoritative: the ledger store is the single source
// of truth, and every store write either refreshes or invalidates the
// matching entry. Sufficiency checks on critical paths are re-validated
// inside the store's own atomic unit regardless of what is cached.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::core::ledger::{Account, BalanceKind};

/// Cached snapshot of one account's balances.
#[derive(Debug, Clone)]
pub struct CachedAccount {
    pub balance: f64,
    pub bank_balance: f64,
    pub refreshed_at: DateTime<Utc>,
}

impl CachedAccount {
    pub fn of(&self, kind: BalanceKind) -> f64 {
        match kind {
            BalanceKind::Liquid => self.balance,
            BalanceKind::Bank => self.bank_balance,
        }
    }
}

/// Bounded UUID-keyed account cache. Only the balance engine writes here,
/// and only right after a successful store write of the same data.
pub struct AccountCache {
    entries: DashMap<Uuid, CachedAccount>,
    max_entries: usize,
}

impl AccountCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    pub fn get(&self, account_id: &Uuid) -> Option<CachedAccount> {
        self.entries.get(account_id).map(|entry| entry.clone())
    }

    /// Refresh the cache from a freshly loaded account row.
    pub fn refresh(&self, account: &Account) {
        self.evict_if_full(&account.id);
        self.entries.insert(
            account.id,
            CachedAccount {
                balance: account.balance,
                bank_balance: account.bank_balance,
                refreshed_at: Utc::now(),
            },
        );
    }

    /// Update one balance field of an existing entry. If the account isn't
    /// cached, nothing happens; the next read repopulates it from the store.
    pub fn apply(&self, account_id: Uuid, kind: BalanceKind, amount: f64) {
        if let Some(mut entry) = self.entries.get_mut(&account_id) {
            match kind {
                BalanceKind::Liquid => entry.balance = amount,
                BalanceKind::Bank => entry.bank_balance = amount,
            }
            entry.refreshed_at = Utc::now();
        }
    }

    /// Drop an entry after a store write done outside the balance engine
    /// (transfers, bids, settlements, interest).
    pub fn invalidate(&self, account_id: &Uuid) {
        self.entries.remove(account_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    // Keeps the cache bounded; which entry gets dropped doesn't matter for
    // correctness, so an arbitrary one goes.
    fn evict_if_full(&self, incoming: &Uuid) {
        if self.entries.len() < self.max_entries || self.entries.contains_key(incoming) {
            return;
        }
        // Bind the victim key before removing: the iterator holds a shard
        // read guard, and removing while it lives deadlocks on that shard.
        let victim = self.entries.iter().next().map(|e| *e.key());
        if let Some(victim) = victim {
            self.entries.remove(&victim);
        }
    }
}
