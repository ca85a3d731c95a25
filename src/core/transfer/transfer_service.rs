// Transfer engine - peer-to-peer money movement with cooldowns, rate
// limits and fees.
//
// The debit/credit/ledger-append run as one atomic store operation; the
// sender is never left debited without the receiver credited. Cooldown and
// rolling-amount tracking live in process memory only: they are advisory,
// safe for concurrent callers, and reset on restart.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::core::balance::AccountCache;
use crate::core::config::{EconomyConfig, SecurityConfig};
use crate::core::ledger::{AccountStore, EconomyError, TransactionKind, TransactionRecord};
use crate::core::money;

/// Outcome of a committed transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub from: Uuid,
    pub to: Uuid,
    /// What the sender was debited.
    pub gross: f64,
    /// What the receiver was credited.
    pub net: f64,
    pub fee: f64,
}

#[derive(Debug, Clone)]
struct MinuteWindow {
    started: DateTime<Utc>,
    count: u32,
}

/// Per-process, best-effort tracking of sender activity. Nothing in here
/// is persisted and nothing in here is authoritative for balances.
pub struct TransferTracker {
    last_transfer: DashMap<Uuid, DateTime<Utc>>,
    minute_windows: DashMap<Uuid, MinuteWindow>,
    daily_amount: DashMap<Uuid, f64>,
    weekly_amount: DashMap<Uuid, f64>,
}

impl TransferTracker {
    pub fn new() -> Self {
        Self {
            last_transfer: DashMap::new(),
            minute_windows: DashMap::new(),
            daily_amount: DashMap::new(),
            weekly_amount: DashMap::new(),
        }
    }

    fn cooldown_until(&self, sender: Uuid, cooldown_seconds: i64) -> Option<DateTime<Utc>> {
        let last = self.last_transfer.get(&sender)?;
        let until = *last + Duration::seconds(cooldown_seconds);
        (Utc::now() < until).then_some(until)
    }

    /// Counts this attempt against the sender's minute window and reports
    /// whether it stays within the limit.
    fn check_rate(&self, sender: Uuid, max_per_minute: u32) -> bool {
        let now = Utc::now();
        let mut window = self.minute_windows.entry(sender).or_insert(MinuteWindow {
            started: now,
            count: 0,
        });
        if now - window.started > Duration::minutes(1) {
            window.started = now;
            window.count = 0;
        }
        window.count += 1;
        window.count <= max_per_minute
    }

    fn record(&self, sender: Uuid, amount: f64) {
        self.last_transfer.insert(sender, Utc::now());
        *self.daily_amount.entry(sender).or_insert(0.0) += amount;
        *self.weekly_amount.entry(sender).or_insert(0.0) += amount;
    }

    /// Rolling amount a sender has moved today. Informational only; no
    /// limit is enforced against it.
    pub fn daily_amount(&self, sender: Uuid) -> f64 {
        self.daily_amount.get(&sender).map(|v| *v).unwrap_or(0.0)
    }

    /// Rolling amount a sender has moved this week. Informational only.
    pub fn weekly_amount(&self, sender: Uuid) -> f64 {
        self.weekly_amount.get(&sender).map(|v| *v).unwrap_or(0.0)
    }

    /// Called by the external scheduler once per day.
    pub fn reset_daily(&self) {
        self.daily_amount.clear();
    }

    /// Called by the external scheduler once per week.
    pub fn reset_weekly(&self) {
        self.weekly_amount.clear();
    }

    /// Called by the external scheduler to clear stale minute windows.
    pub fn reset_rate_windows(&self) {
        self.minute_windows.clear();
    }
}

impl Default for TransferTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The transfer engine.
pub struct TransferService<S: AccountStore> {
    store: S,
    cache: Arc<AccountCache>,
    tracker: TransferTracker,
    economy: EconomyConfig,
    security: SecurityConfig,
}

impl<S: AccountStore> TransferService<S> {
    pub fn new(
        store: S,
        cache: Arc<AccountCache>,
        economy: EconomyConfig,
        security: SecurityConfig,
    ) -> Self {
        Self {
            store,
            cache,
            tracker: TransferTracker::new(),
            economy,
            security,
        }
    }

    /// Move money from one account to another.
    ///
    /// The sender is debited the full amount; the receiver is credited the
    /// amount minus the configured fee. Rejections (minimum, funds,
    /// cooldown, rate) come back as typed errors; a storage failure rolls
    /// the whole attempt back before it surfaces.
    pub async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: f64,
    ) -> Result<TransferReceipt, EconomyError> {
        if !amount.is_finite() || amount < self.economy.min_transaction {
            return Err(EconomyError::InvalidAmount(format!(
                "transfers must move at least {}",
                self.economy.min_transaction
            )));
        }
        let amount = money::round2(amount);

        if let Some(available_at) = self
            .tracker
            .cooldown_until(from, self.security.transaction_cooldown_seconds)
        {
            return Err(EconomyError::OnCooldown { available_at });
        }
        if !self
            .tracker
            .check_rate(from, self.security.max_transactions_per_minute)
        {
            return Err(EconomyError::RateLimited);
        }

        // Precheck for a precise error; the store re-validates sufficiency
        // inside the same transaction as the debit.
        let sender = self
            .store
            .get_or_create_account(from, self.economy.starting_balance)
            .await?;
        if sender.balance < amount {
            return Err(EconomyError::InsufficientFunds {
                required: amount,
                available: sender.balance,
            });
        }
        // Make sure the receiver row exists before the guarded update.
        self.store
            .get_or_create_account(to, self.economy.starting_balance)
            .await?;

        let fee = money::round2(amount * self.economy.transaction_fee / 100.0);
        let net = money::round2(amount - fee);

        let record = TransactionRecord::new(
            Some(from),
            Some(to),
            amount,
            TransactionKind::Transfer,
            format!("Transfer of {} (fee {})", money::format(net), money::format(fee)),
        );
        self.store
            .transfer(from, to, amount, net, self.economy.max_balance, record)
            .await?;

        self.tracker.record(from, amount);
        self.cache.invalidate(&from);
        self.cache.invalidate(&to);

        Ok(TransferReceipt {
            from,
            to,
            gross: amount,
            net,
            fee,
        })
    }

    /// The advisory activity tracker, exposed for the scheduler's periodic
    /// resets and for inspection commands.
    pub fn tracker(&self) -> &TransferTracker {
        &self.tracker
    }
}
