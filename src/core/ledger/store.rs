// Storage traits the engines depend on.
//
// Following the same pattern as the rest of the codebase: core defines the
// contract, infra provides SQLite and in-memory implementations. Every
// method that touches more than one row is a single trait call so the
// implementation can run it inside one transaction (or one lock) and roll
// back as a unit. Sufficiency and floor checks are re-validated inside
// that unit; service-level prechecks exist only for precise errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::EconomyError;
use super::models::{
    Account, AccountBalance, AuctionListing, BalanceKind, BidRecord, NewListing,
    TransactionRecord,
};

/// Result of an atomically placed bid.
#[derive(Debug, Clone)]
pub struct BidOutcome {
    /// Who held the top bid before this one, if anyone.
    pub previous_bidder: Option<Uuid>,
    /// Amount credited back to the previous bidder.
    pub refunded: f64,
    /// The newly accepted bid amount.
    pub new_bid: f64,
}

/// Result of settling one ended listing.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub auction_id: i64,
    pub seller: Uuid,
    /// `None` means the listing expired without bids and the item should be
    /// returned to the seller by the inventory collaborator.
    pub winner: Option<Uuid>,
    pub winning_bid: f64,
    pub fee: f64,
    /// What the seller actually received (`winning_bid - fee`).
    pub seller_proceeds: f64,
}

/// Persistence contract for accounts and the transaction log.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch an account, creating it with the given starting liquid balance
    /// (and zero bank balance) if it does not exist yet.
    async fn get_or_create_account(
        &self,
        account_id: Uuid,
        starting_balance: f64,
    ) -> Result<Account, EconomyError>;

    /// Overwrite one balance column. Returns false if the account row does
    /// not exist. The amount is already validated and rounded by the caller.
    async fn set_balance(
        &self,
        account_id: Uuid,
        kind: BalanceKind,
        amount: f64,
    ) -> Result<bool, EconomyError>;

    /// Saturating atomic adjustment: the stored balance moves by `delta`
    /// but is clamped to `[0, max]` in the same statement. Returns the new
    /// balance. Lifetime earned/spent counters move with the request.
    async fn adjust_balance(
        &self,
        account_id: Uuid,
        kind: BalanceKind,
        delta: f64,
        max: f64,
    ) -> Result<f64, EconomyError>;

    /// Atomic two-account transfer: debit `from` the gross amount (guarded,
    /// fails with `InsufficientFunds` if the balance is short at commit
    /// time), credit `to` the net amount clamped at `max_balance`, append
    /// the ledger record. All or nothing.
    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        gross: f64,
        net: f64,
        max_balance: f64,
        record: TransactionRecord,
    ) -> Result<(), EconomyError>;

    /// Atomic move between the liquid and bank balances of one account,
    /// guarded against overdraw on the source side.
    async fn move_between_balances(
        &self,
        account_id: Uuid,
        from: BalanceKind,
        amount: f64,
        max_balance: f64,
        record: TransactionRecord,
    ) -> Result<(), EconomyError>;

    /// Append a ledger record outside any larger unit.
    async fn log_transaction(&self, record: TransactionRecord) -> Result<(), EconomyError>;

    /// Most recent ledger records touching an account, newest first.
    async fn recent_transactions(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, EconomyError>;

    /// Top liquid balances for the leaderboard.
    async fn top_balances(&self, limit: usize) -> Result<Vec<AccountBalance>, EconomyError>;

    /// Sum of all liquid balances.
    async fn total_liquid(&self) -> Result<f64, EconomyError>;

    /// Sum of all bank balances.
    async fn total_banked(&self) -> Result<f64, EconomyError>;

    /// Accounts whose bank balance qualifies for interest.
    async fn accounts_with_bank_at_least(
        &self,
        minimum: f64,
    ) -> Result<Vec<(Uuid, f64)>, EconomyError>;

    /// Atomically credit interest to one account's bank balance and append
    /// the matching ledger record.
    async fn apply_interest(
        &self,
        account_id: Uuid,
        interest: f64,
        record: TransactionRecord,
    ) -> Result<(), EconomyError>;
}

/// Persistence contract for auction listings and bid history.
#[async_trait]
pub trait AuctionStore: Send + Sync {
    /// Insert a new ACTIVE listing and return its id.
    async fn insert_listing(&self, listing: NewListing) -> Result<i64, EconomyError>;

    async fn listing(&self, auction_id: i64) -> Result<Option<AuctionListing>, EconomyError>;

    /// ACTIVE listings that have not yet reached their end time, soonest
    /// ending first.
    async fn active_listings(&self, now: DateTime<Utc>)
        -> Result<Vec<AuctionListing>, EconomyError>;

    async fn listings_by_category(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionListing>, EconomyError>;

    /// All of a seller's listings regardless of status, newest first.
    async fn listings_by_seller(&self, seller: Uuid)
        -> Result<Vec<AuctionListing>, EconomyError>;

    /// Timestamp of the bidder's most recent accepted bid on a listing,
    /// for cooldown checks.
    async fn last_bid_time(
        &self,
        auction_id: i64,
        bidder: Uuid,
    ) -> Result<Option<DateTime<Utc>>, EconomyError>;

    /// Bid history for a listing, newest first.
    async fn bids_for_listing(&self, auction_id: i64) -> Result<Vec<BidRecord>, EconomyError>;

    /// Atomically place a bid: re-check the listing is open and the amount
    /// clears the floor, debit the bidder (guarded), refund the previous
    /// highest bidder unconditionally, update the listing, append the bid
    /// row and the ledger records. Two concurrent bids at the same floor
    /// can never both succeed.
    async fn place_bid(
        &self,
        auction_id: i64,
        bidder: Uuid,
        amount: f64,
        minimum_increase: f64,
        max_balance: f64,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, EconomyError>;

    /// ACTIVE listings whose end time has passed.
    async fn ended_listings(&self, now: DateTime<Utc>)
        -> Result<Vec<AuctionListing>, EconomyError>;

    /// Atomically settle one listing: flip ACTIVE -> ENDED (guarded, so a
    /// second sweep is a no-op), pay the seller the winning bid minus the
    /// fee, append the sale record. Returns `Ok(None)` when the listing was
    /// already settled or cancelled by someone else.
    async fn settle_listing(
        &self,
        auction_id: i64,
        fee_percentage: f64,
        max_balance: f64,
    ) -> Result<Option<Settlement>, EconomyError>;

    /// Flip ACTIVE -> CANCELLED, guarded on the seller matching and no bid
    /// having been accepted. Returns whether a row was updated.
    async fn cancel_listing(&self, auction_id: i64, seller: Uuid) -> Result<bool, EconomyError>;
}
