// Interest accrual - the scheduled-settlement side of the bank.
//
// The external scheduler invokes `calculate_and_apply_interest` once per
// period (e.g. daily). The engine itself is a pure function of stored
// state: invoking it twice in one period double-pays, and guarding against
// that is the scheduler's job, not this engine's.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::core::balance::AccountCache;
use crate::core::config::BankConfig;
use crate::core::ledger::{AccountStore, EconomyError, TransactionKind, TransactionRecord};
use crate::core::money;

/// Summary of one interest run.
#[derive(Debug, Clone, Default)]
pub struct InterestRun {
    pub accounts_credited: usize,
    pub accounts_failed: usize,
    pub total_interest: f64,
}

/// Periodic bank-interest driver.
pub struct InterestService<S: AccountStore> {
    store: S,
    cache: Arc<AccountCache>,
    bank: BankConfig,
}

impl<S: AccountStore> InterestService<S> {
    pub fn new(store: S, cache: Arc<AccountCache>, bank: BankConfig) -> Self {
        Self { store, cache, bank }
    }

    /// Credit `bank_balance * rate / 100` (2-decimal, half-up) to every
    /// account at or above the minimum, appending one interest record per
    /// account. Each account commits independently; one bad row is logged
    /// and skipped, never aborting the batch.
    pub async fn calculate_and_apply_interest(&self) -> Result<InterestRun, EconomyError> {
        let eligible = self
            .store
            .accounts_with_bank_at_least(self.bank.min_balance_for_interest)
            .await?;

        let mut run = InterestRun::default();
        for (account_id, bank_balance) in eligible {
            let interest = money::round2(bank_balance * self.bank.interest_rate / 100.0);
            if interest <= 0.0 {
                continue;
            }
            match self.credit_one(account_id, interest).await {
                Ok(()) => {
                    run.accounts_credited += 1;
                    run.total_interest += interest;
                    self.cache.invalidate(&account_id);
                }
                Err(e) => {
                    run.accounts_failed += 1;
                    error!(account = %account_id, error = %e, "failed to apply interest");
                }
            }
        }

        info!(
            credited = run.accounts_credited,
            failed = run.accounts_failed,
            total = run.total_interest,
            "interest run complete"
        );
        Ok(run)
    }

    async fn credit_one(&self, account_id: Uuid, interest: f64) -> Result<(), EconomyError> {
        let record = TransactionRecord::new(
            None, // system-minted
            Some(account_id),
            interest,
            TransactionKind::Interest,
            format!("Interest earned: {}", money::format(interest)),
        );
        self.store.apply_interest(account_id, interest, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::balance::{AccountCache, BalanceKind, BalanceService};
    use crate::core::config::{BankConfig, EconomyConfig};
    use crate::infra::memory::MemoryLedgerStore;

    fn setup(bank: BankConfig) -> (InterestService<MemoryLedgerStore>, BalanceService<MemoryLedgerStore>) {
        let store = MemoryLedgerStore::new();
        let cache = Arc::new(AccountCache::new(100));
        let interest = InterestService::new(store.clone(), cache.clone(), bank.clone());
        let balances = BalanceService::new(store, cache, EconomyConfig::default(), bank);
        (interest, balances)
    }

    #[tokio::test]
    async fn credits_exactly_rate_percent_once() {
        let (interest, balances) = setup(BankConfig::default());
        let id = uuid::Uuid::new_v4();
        balances.set_balance(id, BalanceKind::Bank, 2000.0).await.unwrap();

        let run = interest.calculate_and_apply_interest().await.unwrap();
        assert_eq!(run.accounts_credited, 1);
        assert_eq!(run.total_interest, 2.0); // 2000 * 0.1%

        assert_eq!(balances.balance(id, BalanceKind::Bank).await, 2002.0);

        let records = balances.recent_transactions(id, 10).await.unwrap();
        let interest_records: Vec<_> = records
            .iter()
            .filter(|r| r.kind == TransactionKind::Interest)
            .collect();
        assert_eq!(interest_records.len(), 1);
        assert_eq!(interest_records[0].amount, 2.0);
        assert_eq!(interest_records[0].from, None);
    }

    #[tokio::test]
    async fn skips_accounts_below_minimum() {
        let (interest, balances) = setup(BankConfig::default());
        let small = uuid::Uuid::new_v4();
        let big = uuid::Uuid::new_v4();
        balances.set_balance(small, BalanceKind::Bank, 999.99).await.unwrap();
        balances.set_balance(big, BalanceKind::Bank, 1000.0).await.unwrap();

        let run = interest.calculate_and_apply_interest().await.unwrap();
        assert_eq!(run.accounts_credited, 1);
        assert_eq!(balances.balance(small, BalanceKind::Bank).await, 999.99);
        assert_eq!(balances.balance(big, BalanceKind::Bank).await, 1001.0);
    }

    #[tokio::test]
    async fn interest_rounds_half_up() {
        let bank = BankConfig {
            interest_rate: 0.1,
            min_balance_for_interest: 0.01,
            ..BankConfig::default()
        };
        let (interest, balances) = setup(bank);
        let id = uuid::Uuid::new_v4();
        // 1234.56 * 0.1% = 1.23456 -> 1.23
        balances.set_balance(id, BalanceKind::Bank, 1234.56).await.unwrap();

        let run = interest.calculate_and_apply_interest().await.unwrap();
        assert_eq!(run.total_interest, 1.23);
        assert_eq!(balances.balance(id, BalanceKind::Bank).await, 1235.79);
    }

    #[tokio::test]
    async fn empty_run_is_fine() {
        let (interest, _) = setup(BankConfig::default());
        let run = interest.calculate_and_apply_interest().await.unwrap();
        assert_eq!(run.accounts_credited, 0);
        assert_eq!(run.total_interest, 0.0);
    }
}
