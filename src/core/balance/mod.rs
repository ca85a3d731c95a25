// Account balance engine: validated get/set/add/remove on liquid and bank
// balances, bank deposits/withdrawals, and the typed read-through cache.

mod account_cache;
mod balance_service;

pub use account_cache::{AccountCache, CachedAccount};
pub use balance_service::BalanceService;

pub use crate::core::ledger::BalanceKind;
