// In-memory implementation of the ledger store.
//
// **Why have this at all?**
// - Easier to test the engines without setting up a database
// - Still follows the same contracts as the SQLite implementation
// - Useful as an ephemeral backend for throwaway environments
//
// One mutex guards the whole ledger: every trait method locks, mutates and
// releases, so each call is atomic exactly the way a SQLite transaction is.
// Nothing here holds the lock across an await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::core::ledger::{
    Account, AccountBalance, AccountStore, AuctionListing, AuctionStatus, AuctionStore,
    BalanceKind, BidOutcome, BidRecord, EconomyError, NewListing, Settlement, TransactionKind,
    TransactionRecord,
};
use crate::core::money;

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<TransactionRecord>,
    listings: HashMap<i64, AuctionListing>,
    bids: Vec<BidRecord>,
    next_listing_id: i64,
}

/// In-memory ledger store. Cloning shares the underlying state.
#[derive(Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_listing_id: 1,
                ..Inner::default()
            })),
        }
    }

    /// Test helper: push a listing's end time into the past so an expiry
    /// sweep picks it up without real waiting.
    pub fn force_expire(&self, auction_id: i64) {
        let mut inner = self.lock();
        if let Some(listing) = inner.listings.get_mut(&auction_id) {
            listing.end_time = Utc::now() - Duration::seconds(1);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The mutex is never held across an await, so poisoning only
        // happens if a test panicked mid-mutation; propagating the panic
        // is the right call there.
        self.inner.lock().expect("ledger mutex poisoned")
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn account_entry(&mut self, account_id: Uuid, starting_balance: f64) -> &mut Account {
        self.accounts.entry(account_id).or_insert_with(|| {
            let now = Utc::now();
            Account {
                id: account_id,
                balance: money::round2(starting_balance),
                bank_balance: 0.0,
                total_earned: 0.0,
                total_spent: 0.0,
                created_at: now,
                last_seen: now,
            }
        })
    }

    fn balance_of(account: &Account, kind: BalanceKind) -> f64 {
        match kind {
            BalanceKind::Liquid => account.balance,
            BalanceKind::Bank => account.bank_balance,
        }
    }

    fn set_balance_of(account: &mut Account, kind: BalanceKind, amount: f64) {
        match kind {
            BalanceKind::Liquid => account.balance = amount,
            BalanceKind::Bank => account.bank_balance = amount,
        }
        account.last_seen = Utc::now();
    }

    /// Saturating adjust with the lifetime counters, mirroring the SQL
    /// the SQLite store runs in one statement. The counters move by the
    /// effective balance change, so a clamped adjustment only counts what
    /// actually moved.
    fn adjust(account: &mut Account, kind: BalanceKind, delta: f64, max: f64) -> f64 {
        let old_balance = Self::balance_of(account, kind);
        let new_balance = money::round2((old_balance + delta).clamp(0.0, max));
        Self::set_balance_of(account, kind, new_balance);
        if new_balance >= old_balance {
            account.total_earned = money::round2(account.total_earned + (new_balance - old_balance));
        } else {
            account.total_spent = money::round2(account.total_spent + (old_balance - new_balance));
        }
        new_balance
    }
}

#[async_trait]
impl AccountStore for MemoryLedgerStore {
    async fn get_or_create_account(
        &self,
        account_id: Uuid,
        starting_balance: f64,
    ) -> Result<Account, EconomyError> {
        let mut inner = self.lock();
        Ok(inner.account_entry(account_id, starting_balance).clone())
    }

    async fn set_balance(
        &self,
        account_id: Uuid,
        kind: BalanceKind,
        amount: f64,
    ) -> Result<bool, EconomyError> {
        let mut inner = self.lock();
        match inner.accounts.get_mut(&account_id) {
            Some(account) => {
                Inner::set_balance_of(account, kind, amount);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn adjust_balance(
        &self,
        account_id: Uuid,
        kind: BalanceKind,
        delta: f64,
        max: f64,
    ) -> Result<f64, EconomyError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| EconomyError::Store(format!("no account row for {account_id}")))?;
        Ok(Inner::adjust(account, kind, delta, max))
    }

    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        gross: f64,
        net: f64,
        max_balance: f64,
        record: TransactionRecord,
    ) -> Result<(), EconomyError> {
        let mut inner = self.lock();

        // Guarded debit: re-checked here, inside the same critical section
        // as the credit and the log append.
        let sender = inner
            .accounts
            .get_mut(&from)
            .ok_or_else(|| EconomyError::Store(format!("no account row for {from}")))?;
        if sender.balance < gross {
            return Err(EconomyError::InsufficientFunds {
                required: gross,
                available: sender.balance,
            });
        }
        Inner::adjust(sender, BalanceKind::Liquid, -gross, max_balance);

        let receiver = inner
            .accounts
            .get_mut(&to)
            .ok_or_else(|| EconomyError::Store(format!("no account row for {to}")))?;
        Inner::adjust(receiver, BalanceKind::Liquid, net, max_balance);

        inner.transactions.push(record);
        Ok(())
    }

    async fn move_between_balances(
        &self,
        account_id: Uuid,
        from: BalanceKind,
        amount: f64,
        max_balance: f64,
        record: TransactionRecord,
    ) -> Result<(), EconomyError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| EconomyError::Store(format!("no account row for {account_id}")))?;

        if Inner::balance_of(account, from) < amount {
            return Err(EconomyError::InsufficientFunds {
                required: amount,
                available: Inner::balance_of(account, from),
            });
        }

        let (to, cap) = match from {
            BalanceKind::Liquid => (BalanceKind::Bank, f64::MAX),
            BalanceKind::Bank => (BalanceKind::Liquid, max_balance),
        };
        let debited = money::round2(Inner::balance_of(account, from) - amount);
        Inner::set_balance_of(account, from, debited);
        let credited = money::round2((Inner::balance_of(account, to) + amount).min(cap));
        Inner::set_balance_of(account, to, credited);

        inner.transactions.push(record);
        Ok(())
    }

    async fn log_transaction(&self, record: TransactionRecord) -> Result<(), EconomyError> {
        self.lock().transactions.push(record);
        Ok(())
    }

    async fn recent_transactions(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, EconomyError> {
        let inner = self.lock();
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.from == Some(account_id) || t.to == Some(account_id))
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn top_balances(&self, limit: usize) -> Result<Vec<AccountBalance>, EconomyError> {
        let inner = self.lock();
        let mut balances: Vec<AccountBalance> = inner
            .accounts
            .values()
            .map(|a| AccountBalance {
                id: a.id,
                balance: a.balance,
            })
            .collect();
        balances.sort_by(|a, b| b.balance.total_cmp(&a.balance));
        balances.truncate(limit);
        Ok(balances)
    }

    async fn total_liquid(&self) -> Result<f64, EconomyError> {
        let inner = self.lock();
        Ok(money::round2(
            inner.accounts.values().map(|a| a.balance).sum(),
        ))
    }

    async fn total_banked(&self) -> Result<f64, EconomyError> {
        let inner = self.lock();
        Ok(money::round2(
            inner.accounts.values().map(|a| a.bank_balance).sum(),
        ))
    }

    async fn accounts_with_bank_at_least(
        &self,
        minimum: f64,
    ) -> Result<Vec<(Uuid, f64)>, EconomyError> {
        let inner = self.lock();
        Ok(inner
            .accounts
            .values()
            .filter(|a| a.bank_balance >= minimum)
            .map(|a| (a.id, a.bank_balance))
            .collect())
    }

    async fn apply_interest(
        &self,
        account_id: Uuid,
        interest: f64,
        record: TransactionRecord,
    ) -> Result<(), EconomyError> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| EconomyError::Store(format!("no account row for {account_id}")))?;
        Inner::adjust(account, BalanceKind::Bank, interest, f64::MAX);
        inner.transactions.push(record);
        Ok(())
    }
}

#[async_trait]
impl AuctionStore for MemoryLedgerStore {
    async fn insert_listing(&self, listing: NewListing) -> Result<i64, EconomyError> {
        let mut inner = self.lock();
        let id = inner.next_listing_id;
        inner.next_listing_id += 1;
        let now = Utc::now();
        inner.listings.insert(
            id,
            AuctionListing {
                id,
                seller: listing.seller,
                item_name: listing.item_name,
                item_data: listing.item_data,
                starting_bid: listing.starting_bid,
                buyout_price: listing.buyout_price,
                current_bid: 0.0,
                highest_bidder: None,
                duration_seconds: listing.duration_seconds,
                start_time: now,
                end_time: now + Duration::seconds(listing.duration_seconds),
                status: AuctionStatus::Active,
                category: listing.category,
                created_at: now,
            },
        );
        Ok(id)
    }

    async fn listing(&self, auction_id: i64) -> Result<Option<AuctionListing>, EconomyError> {
        Ok(self.lock().listings.get(&auction_id).cloned())
    }

    async fn active_listings(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionListing>, EconomyError> {
        let inner = self.lock();
        let mut open: Vec<AuctionListing> = inner
            .listings
            .values()
            .filter(|l| l.is_open(now))
            .cloned()
            .collect();
        open.sort_by_key(|l| l.end_time);
        Ok(open)
    }

    async fn listings_by_category(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionListing>, EconomyError> {
        let inner = self.lock();
        let mut open: Vec<AuctionListing> = inner
            .listings
            .values()
            .filter(|l| l.is_open(now) && l.category == category)
            .cloned()
            .collect();
        open.sort_by_key(|l| l.end_time);
        Ok(open)
    }

    async fn listings_by_seller(
        &self,
        seller: Uuid,
    ) -> Result<Vec<AuctionListing>, EconomyError> {
        let inner = self.lock();
        let mut rows: Vec<AuctionListing> = inner
            .listings
            .values()
            .filter(|l| l.seller == seller)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn last_bid_time(
        &self,
        auction_id: i64,
        bidder: Uuid,
    ) -> Result<Option<DateTime<Utc>>, EconomyError> {
        let inner = self.lock();
        Ok(inner
            .bids
            .iter()
            .filter(|b| b.auction_id == auction_id && b.bidder == bidder)
            .map(|b| b.timestamp)
            .max())
    }

    async fn bids_for_listing(&self, auction_id: i64) -> Result<Vec<BidRecord>, EconomyError> {
        let inner = self.lock();
        Ok(inner
            .bids
            .iter()
            .filter(|b| b.auction_id == auction_id)
            .rev()
            .cloned()
            .collect())
    }

    async fn place_bid(
        &self,
        auction_id: i64,
        bidder: Uuid,
        amount: f64,
        minimum_increase: f64,
        max_balance: f64,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, EconomyError> {
        let mut inner = self.lock();

        // Everything below happens under one lock: the floor check, the
        // debit, the refund and the listing update can't interleave with a
        // competing bid.
        let listing = inner
            .listings
            .get(&auction_id)
            .ok_or(EconomyError::AuctionNotFound)?;
        if !listing.is_open(now) {
            return Err(EconomyError::AuctionNotActive);
        }
        let floor = listing.bid_floor(minimum_increase);
        if amount < floor {
            return Err(EconomyError::BidTooLow { minimum: floor });
        }
        let previous = listing.highest_bidder.map(|p| (p, listing.current_bid));
        let seller = listing.seller;

        // The refund target's row must exist before anything is mutated;
        // there is no rollback once the debit below has happened.
        if let Some((prev_bidder, _)) = previous {
            if !inner.accounts.contains_key(&prev_bidder) {
                return Err(EconomyError::Store(format!(
                    "no account row for {prev_bidder}"
                )));
            }
        }

        // Guarded debit of the new bidder.
        let account = inner
            .accounts
            .get_mut(&bidder)
            .ok_or_else(|| EconomyError::Store(format!("no account row for {bidder}")))?;
        if account.balance < amount {
            return Err(EconomyError::InsufficientFunds {
                required: amount,
                available: account.balance,
            });
        }
        Inner::adjust(account, BalanceKind::Liquid, -amount, max_balance);

        // Unconditional refund of the superseded bid.
        let mut refunded = 0.0;
        if let Some((prev_bidder, prev_bid)) = previous {
            let prev_account = inner
                .accounts
                .get_mut(&prev_bidder)
                .ok_or_else(|| EconomyError::Store(format!("no account row for {prev_bidder}")))?;
            Inner::adjust(prev_account, BalanceKind::Liquid, prev_bid, max_balance);
            refunded = prev_bid;
            inner.transactions.push(TransactionRecord::new(
                None,
                Some(prev_bidder),
                prev_bid,
                TransactionKind::AuctionRefund,
                format!("Outbid on auction {auction_id}"),
            ));
        }

        let listing = inner
            .listings
            .get_mut(&auction_id)
            .ok_or(EconomyError::AuctionNotFound)?;
        listing.current_bid = amount;
        listing.highest_bidder = Some(bidder);

        inner.bids.push(BidRecord {
            auction_id,
            bidder,
            amount,
            timestamp: now,
        });
        inner.transactions.push(TransactionRecord::new(
            Some(bidder),
            None,
            amount,
            TransactionKind::AuctionBid,
            format!("Bid on auction {auction_id} (seller {seller})"),
        ));

        Ok(BidOutcome {
            previous_bidder: previous.map(|(p, _)| p),
            refunded,
            new_bid: amount,
        })
    }

    async fn ended_listings(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionListing>, EconomyError> {
        let inner = self.lock();
        Ok(inner
            .listings
            .values()
            .filter(|l| l.status == AuctionStatus::Active && l.end_time <= now)
            .cloned()
            .collect())
    }

    async fn settle_listing(
        &self,
        auction_id: i64,
        fee_percentage: f64,
        max_balance: f64,
    ) -> Result<Option<Settlement>, EconomyError> {
        let mut inner = self.lock();

        let listing = match inner.listings.get_mut(&auction_id) {
            Some(l) if l.status == AuctionStatus::Active => l,
            // Already settled or cancelled; nothing to do.
            _ => return Ok(None),
        };
        listing.status = AuctionStatus::Ended;

        let seller = listing.seller;
        let winner = listing.highest_bidder;
        let winning_bid = listing.current_bid;

        let (fee, proceeds) = if winner.is_some() {
            let fee = money::round2(winning_bid * fee_percentage / 100.0);
            (fee, money::round2(winning_bid - fee))
        } else {
            (0.0, 0.0)
        };

        if winner.is_some() && proceeds > 0.0 {
            let account = inner
                .accounts
                .get_mut(&seller)
                .ok_or_else(|| EconomyError::Store(format!("no account row for {seller}")))?;
            Inner::adjust(account, BalanceKind::Liquid, proceeds, max_balance);
            inner.transactions.push(TransactionRecord::new(
                winner,
                Some(seller),
                winning_bid,
                TransactionKind::AuctionSale,
                format!(
                    "Auction {auction_id} sold (fee {})",
                    money::format(fee)
                ),
            ));
        }

        Ok(Some(Settlement {
            auction_id,
            seller,
            winner,
            winning_bid,
            fee,
            seller_proceeds: proceeds,
        }))
    }

    async fn cancel_listing(&self, auction_id: i64, seller: Uuid) -> Result<bool, EconomyError> {
        let mut inner = self.lock();
        match inner.listings.get_mut(&auction_id) {
            Some(l)
                if l.seller == seller
                    && l.status == AuctionStatus::Active
                    && l.highest_bidder.is_none()
                    && l.current_bid <= l.starting_bid =>
            {
                l.status = AuctionStatus::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
