// Account balance engine - validated mutations of liquid and bank balances.
//
// All mutations go through the store's atomic operations; the saturating
// add/remove policy (floor at 0, cap at max_balance) is applied in the same
// statement as the write so concurrent callers can't interleave a stale
// read-then-write.

use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use crate::core::config::{BankConfig, EconomyConfig};
use crate::core::ledger::{
    Account, AccountBalance, AccountStore, BalanceKind, EconomyError, TransactionKind,
    TransactionRecord,
};
use crate::core::money;

use super::account_cache::AccountCache;

/// The main service for balance operations.
///
/// Generic over S: AccountStore so we can swap implementations.
pub struct BalanceService<S: AccountStore> {
    store: S,
    cache: Arc<AccountCache>,
    economy: EconomyConfig,
    bank: BankConfig,
}

impl<S: AccountStore> BalanceService<S> {
    pub fn new(store: S, cache: Arc<AccountCache>, economy: EconomyConfig, bank: BankConfig) -> Self {
        Self {
            store,
            cache,
            economy,
            bank,
        }
    }

    /// Current balance of the given kind. Lazily creates the account with
    /// the configured starting balance on first sight.
    ///
    /// This is the one operation that never surfaces a hard error: on
    /// storage failure it logs and reports 0.0 so callers (commands, UI)
    /// always get a number.
    pub async fn balance(&self, account_id: Uuid, kind: BalanceKind) -> f64 {
        if let Some(entry) = self.cache.get(&account_id) {
            return entry.of(kind);
        }

        match self
            .store
            .get_or_create_account(account_id, self.economy.starting_balance)
            .await
        {
            Ok(account) => {
                self.cache.refresh(&account);
                match kind {
                    BalanceKind::Liquid => account.balance,
                    BalanceKind::Bank => account.bank_balance,
                }
            }
            Err(e) => {
                error!(account = %account_id, error = %e, "balance read failed, reporting 0");
                0.0
            }
        }
    }

    /// Whether the account holds at least `amount` of the given kind.
    pub async fn has(&self, account_id: Uuid, kind: BalanceKind, amount: f64) -> bool {
        self.balance(account_id, kind).await >= amount
    }

    /// Full account row, bypassing the cache.
    pub async fn account(&self, account_id: Uuid) -> Result<Account, EconomyError> {
        let account = self
            .store
            .get_or_create_account(account_id, self.economy.starting_balance)
            .await?;
        self.cache.refresh(&account);
        Ok(account)
    }

    /// Overwrite a balance. Liquid must land in `[0, max_balance]`, bank
    /// only has to be non-negative. Persisted with 2-decimal rounding.
    pub async fn set_balance(
        &self,
        account_id: Uuid,
        kind: BalanceKind,
        amount: f64,
    ) -> Result<(), EconomyError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(EconomyError::InvalidAmount(format!(
                "balance must be non-negative, got {amount}"
            )));
        }
        if kind == BalanceKind::Liquid && amount > self.economy.max_balance {
            return Err(EconomyError::InvalidAmount(format!(
                "balance exceeds the maximum of {}",
                self.economy.max_balance
            )));
        }

        let amount = money::round2(amount);
        self.ensure_account(account_id).await?;
        let updated = self.store.set_balance(account_id, kind, amount).await?;
        if !updated {
            return Err(EconomyError::Store(format!(
                "no account row for {account_id}"
            )));
        }
        self.cache.apply(account_id, kind, amount);
        Ok(())
    }

    /// Credit an account. Saturates at the cap instead of failing; returns
    /// the new balance.
    pub async fn add_money(
        &self,
        account_id: Uuid,
        kind: BalanceKind,
        amount: f64,
    ) -> Result<f64, EconomyError> {
        let amount = self.positive_amount(amount)?;
        self.ensure_account(account_id).await?;
        let new_balance = self
            .store
            .adjust_balance(account_id, kind, amount, self.cap(kind))
            .await?;
        self.cache.apply(account_id, kind, new_balance);
        Ok(new_balance)
    }

    /// Debit an account. Removing more than is available floors at 0
    /// instead of failing; returns the new balance.
    pub async fn remove_money(
        &self,
        account_id: Uuid,
        kind: BalanceKind,
        amount: f64,
    ) -> Result<f64, EconomyError> {
        let amount = self.positive_amount(amount)?;
        self.ensure_account(account_id).await?;
        let new_balance = self
            .store
            .adjust_balance(account_id, kind, -amount, self.cap(kind))
            .await?;
        self.cache.apply(account_id, kind, new_balance);
        Ok(new_balance)
    }

    /// Move liquid funds into the bank. One atomic unit: the debit is
    /// guarded against overdraw at commit time.
    pub async fn deposit_to_bank(&self, account_id: Uuid, amount: f64) -> Result<(), EconomyError> {
        let amount = self.positive_amount(amount)?;
        if amount > self.bank.daily_deposit_limit {
            return Err(EconomyError::DepositLimitExceeded {
                limit: self.bank.daily_deposit_limit,
            });
        }

        let account = self.ensure_account(account_id).await?;
        if account.balance < amount {
            return Err(EconomyError::InsufficientFunds {
                required: amount,
                available: account.balance,
            });
        }

        let record = TransactionRecord::new(
            Some(account_id),
            Some(account_id),
            amount,
            TransactionKind::Deposit,
            "Deposit to bank",
        );
        self.store
            .move_between_balances(
                account_id,
                BalanceKind::Liquid,
                amount,
                self.economy.max_balance,
                record,
            )
            .await?;
        self.cache.invalidate(&account_id);
        Ok(())
    }

    /// Move banked funds back to the liquid balance. The liquid side keeps
    /// its cap; the credit saturates there like any other add.
    pub async fn withdraw_from_bank(
        &self,
        account_id: Uuid,
        amount: f64,
    ) -> Result<(), EconomyError> {
        let amount = self.positive_amount(amount)?;

        let account = self.ensure_account(account_id).await?;
        if account.bank_balance < amount {
            return Err(EconomyError::InsufficientFunds {
                required: amount,
                available: account.bank_balance,
            });
        }

        let record = TransactionRecord::new(
            Some(account_id),
            Some(account_id),
            amount,
            TransactionKind::Withdrawal,
            "Withdrawal from bank",
        );
        self.store
            .move_between_balances(
                account_id,
                BalanceKind::Bank,
                amount,
                self.economy.max_balance,
                record,
            )
            .await?;
        self.cache.invalidate(&account_id);
        Ok(())
    }

    /// Most recent ledger records touching the account, newest first.
    pub async fn recent_transactions(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, EconomyError> {
        self.store.recent_transactions(account_id, limit).await
    }

    /// Top liquid balances for the leaderboard.
    pub async fn top_balances(&self, limit: usize) -> Result<Vec<AccountBalance>, EconomyError> {
        self.store.top_balances(limit).await
    }

    /// Total liquid money in circulation.
    pub async fn total_money(&self) -> Result<f64, EconomyError> {
        self.store.total_liquid().await
    }

    /// Total money held in banks.
    pub async fn total_bank_money(&self) -> Result<f64, EconomyError> {
        self.store.total_banked().await
    }

    async fn ensure_account(&self, account_id: Uuid) -> Result<Account, EconomyError> {
        self.store
            .get_or_create_account(account_id, self.economy.starting_balance)
            .await
    }

    fn positive_amount(&self, amount: f64) -> Result<f64, EconomyError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EconomyError::InvalidAmount(format!(
                "amount must be positive, got {amount}"
            )));
        }
        Ok(money::round2(amount))
    }

    fn cap(&self, kind: BalanceKind) -> f64 {
        match kind {
            BalanceKind::Liquid => self.economy.max_balance,
            // Bank balances have no configured ceiling.
            BalanceKind::Bank => f64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryLedgerStore;

    fn service(economy: EconomyConfig) -> BalanceService<MemoryLedgerStore> {
        let cache = Arc::new(AccountCache::new(100));
        BalanceService::new(MemoryLedgerStore::new(), cache, economy, BankConfig::default())
    }

    #[tokio::test]
    async fn lazily_creates_with_starting_balance() {
        let svc = service(EconomyConfig::default());
        let id = Uuid::new_v4();

        assert_eq!(svc.balance(id, BalanceKind::Liquid).await, 100.0);
        assert_eq!(svc.balance(id, BalanceKind::Bank).await, 0.0);
    }

    #[tokio::test]
    async fn add_and_remove_round_trip() {
        let svc = service(EconomyConfig::default());
        let id = Uuid::new_v4();

        let after_add = svc.add_money(id, BalanceKind::Liquid, 50.0).await.unwrap();
        assert_eq!(after_add, 150.0);
        let after_remove = svc.remove_money(id, BalanceKind::Liquid, 30.0).await.unwrap();
        assert_eq!(after_remove, 120.0);
    }

    #[tokio::test]
    async fn remove_floors_at_zero() {
        let svc = service(EconomyConfig::default());
        let id = Uuid::new_v4();

        let new_balance = svc
            .remove_money(id, BalanceKind::Liquid, 10_000.0)
            .await
            .unwrap();
        assert_eq!(new_balance, 0.0);
    }

    #[tokio::test]
    async fn add_saturates_at_cap() {
        let economy = EconomyConfig {
            max_balance: 500.0,
            ..EconomyConfig::default()
        };
        let svc = service(economy);
        let id = Uuid::new_v4();

        let new_balance = svc.add_money(id, BalanceKind::Liquid, 9_999.0).await.unwrap();
        assert_eq!(new_balance, 500.0);
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let svc = service(EconomyConfig::default());
        let id = Uuid::new_v4();

        assert!(matches!(
            svc.add_money(id, BalanceKind::Liquid, 0.0).await,
            Err(EconomyError::InvalidAmount(_))
        ));
        assert!(matches!(
            svc.remove_money(id, BalanceKind::Liquid, -5.0).await,
            Err(EconomyError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn set_balance_validates_range() {
        let svc = service(EconomyConfig::default());
        let id = Uuid::new_v4();

        assert!(matches!(
            svc.set_balance(id, BalanceKind::Liquid, -1.0).await,
            Err(EconomyError::InvalidAmount(_))
        ));
        assert!(matches!(
            svc.set_balance(id, BalanceKind::Liquid, 2_000_000_000.0).await,
            Err(EconomyError::InvalidAmount(_))
        ));
        // Bank has no upper cap.
        svc.set_balance(id, BalanceKind::Bank, 2_000_000_000.0)
            .await
            .unwrap();
        assert_eq!(svc.balance(id, BalanceKind::Bank).await, 2_000_000_000.0);
    }

    #[tokio::test]
    async fn set_balance_rounds_half_up() {
        let svc = service(EconomyConfig::default());
        let id = Uuid::new_v4();

        svc.set_balance(id, BalanceKind::Liquid, 10.006).await.unwrap();
        assert_eq!(svc.balance(id, BalanceKind::Liquid).await, 10.01);
    }

    #[tokio::test]
    async fn deposit_and_withdraw_move_between_balances() {
        let svc = service(EconomyConfig::default());
        let id = Uuid::new_v4();

        svc.deposit_to_bank(id, 60.0).await.unwrap();
        assert_eq!(svc.balance(id, BalanceKind::Liquid).await, 40.0);
        assert_eq!(svc.balance(id, BalanceKind::Bank).await, 60.0);

        svc.withdraw_from_bank(id, 25.0).await.unwrap();
        assert_eq!(svc.balance(id, BalanceKind::Liquid).await, 65.0);
        assert_eq!(svc.balance(id, BalanceKind::Bank).await, 35.0);

        // Both moves are in the ledger.
        let log = svc.recent_transactions(id, 10).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].kind, TransactionKind::Withdrawal);
        assert_eq!(log[1].kind, TransactionKind::Deposit);
    }

    #[tokio::test]
    async fn deposit_rejects_overdraw_and_limit() {
        let svc = service(EconomyConfig::default());
        let id = Uuid::new_v4();

        assert!(matches!(
            svc.deposit_to_bank(id, 500.0).await,
            Err(EconomyError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            svc.deposit_to_bank(id, 2_000_000.0).await,
            Err(EconomyError::DepositLimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn withdraw_rejects_overdraw() {
        let svc = service(EconomyConfig::default());
        let id = Uuid::new_v4();

        assert!(matches!(
            svc.withdraw_from_bank(id, 1.0).await,
            Err(EconomyError::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    async fn balances_stay_in_range_under_mixed_calls() {
        let economy = EconomyConfig {
            max_balance: 200.0,
            starting_balance: 0.0,
            ..EconomyConfig::default()
        };
        let svc = service(economy);
        let id = Uuid::new_v4();

        for _ in 0..10 {
            let _ = svc.add_money(id, BalanceKind::Liquid, 77.7).await.unwrap();
            let _ = svc.remove_money(id, BalanceKind::Liquid, 123.4).await.unwrap();
        }
        let balance = svc.balance(id, BalanceKind::Liquid).await;
        assert!((0.0..=200.0).contains(&balance), "balance {balance} out of range");
    }

    #[tokio::test]
    async fn top_balances_and_totals() {
        let svc = service(EconomyConfig {
            starting_balance: 0.0,
            ..EconomyConfig::default()
        });
        let rich = Uuid::new_v4();
        let poor = Uuid::new_v4();
        svc.add_money(rich, BalanceKind::Liquid, 900.0).await.unwrap();
        svc.add_money(poor, BalanceKind::Liquid, 10.0).await.unwrap();
        svc.add_money(rich, BalanceKind::Bank, 40.0).await.unwrap();

        let top = svc.top_balances(1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, rich);
        assert_eq!(svc.total_money().await.unwrap(), 910.0);
        assert_eq!(svc.total_bank_money().await.unwrap(), 40.0);
    }
}
