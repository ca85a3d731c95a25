// Domain models mirroring the persisted schema. The field names and types
// here are the contract other tooling (backup/restore) depends on, so they
// track the table layout exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which of an account's two balances an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    /// Immediately spendable funds.
    Liquid,
    /// Banked funds (earn interest, capped only at zero below).
    Bank,
}

/// A player's stored monetary state.
///
/// Owned exclusively by the ledger store; mutated only through the balance
/// engine's operations, never written directly by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Immediately spendable funds. Always in `[0, max_balance]`.
    pub balance: f64,
    /// Banked funds. Never negative, no upper cap.
    pub bank_balance: f64,
    /// Cumulative credits over the account's lifetime.
    pub total_earned: f64,
    /// Cumulative debits over the account's lifetime.
    pub total_spent: f64,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// One row of the leaderboard query.
#[derive(Debug, Clone)]
pub struct AccountBalance {
    pub id: Uuid,
    pub balance: f64,
}

/// What a ledger entry records. Persisted as a lowercase tag string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Liquid -> bank move within one account.
    Deposit,
    /// Bank -> liquid move within one account.
    Withdrawal,
    /// Peer-to-peer transfer between two accounts.
    Transfer,
    /// Bank interest credit (system-minted, no source account).
    Interest,
    /// Bid amount held when a bid is accepted.
    AuctionBid,
    /// Seller payout when a listing settles with a winner.
    AuctionSale,
    /// Superseded bid returned to the previous highest bidder.
    AuctionRefund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Interest => "interest",
            TransactionKind::AuctionBid => "auction_bid",
            TransactionKind::AuctionSale => "auction_sale",
            TransactionKind::AuctionRefund => "auction_refund",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "deposit" => TransactionKind::Deposit,
            "withdrawal" => TransactionKind::Withdrawal,
            "transfer" => TransactionKind::Transfer,
            "interest" => TransactionKind::Interest,
            "auction_bid" => TransactionKind::AuctionBid,
            "auction_sale" => TransactionKind::AuctionSale,
            "auction_refund" => TransactionKind::AuctionRefund,
            _ => return None,
        })
    }
}

/// An append-only ledger entry. Immutable once written.
///
/// Source and destination are both optional: system-minted funds (interest)
/// have no source, burns and holds have no destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub from: Option<Uuid>,
    pub to: Option<Uuid>,
    pub amount: f64,
    pub kind: TransactionKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        from: Option<Uuid>,
        to: Option<Uuid>,
        amount: f64,
        kind: TransactionKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            from,
            to,
            amount,
            kind,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Listing lifecycle. `Ended` and `Cancelled` are terminal; a listing never
/// returns to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    Active,
    Ended,
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Active => "ACTIVE",
            AuctionStatus::Ended => "ENDED",
            AuctionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "ACTIVE" => AuctionStatus::Active,
            "ENDED" => AuctionStatus::Ended,
            "CANCELLED" => AuctionStatus::Cancelled,
            _ => return None,
        })
    }
}

/// A persisted auction listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionListing {
    pub id: i64,
    pub seller: Uuid,
    pub item_name: String,
    /// Opaque serialized item payload; this crate never looks inside it.
    pub item_data: String,
    pub starting_bid: f64,
    pub buyout_price: Option<f64>,
    /// 0.0 means "no bids yet"; the starting bid is the effective floor.
    pub current_bid: f64,
    pub highest_bidder: Option<Uuid>,
    pub duration_seconds: i64,
    pub start_time: DateTime<Utc>,
    /// Fixed at creation (`start_time + duration`), never extended.
    pub end_time: DateTime<Utc>,
    pub status: AuctionStatus,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl AuctionListing {
    /// The smallest amount the next bid must reach, given the configured
    /// minimum increase.
    pub fn bid_floor(&self, minimum_increase: f64) -> f64 {
        self.current_bid.max(self.starting_bid) + minimum_increase
    }

    /// Whether the listing can still take bids at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Active && now < self.end_time
    }

    /// Whether any bid has been accepted yet.
    pub fn has_bids(&self) -> bool {
        self.highest_bidder.is_some()
    }
}

/// Parameters for creating a listing.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub seller: Uuid,
    pub item_name: String,
    pub item_data: String,
    pub starting_bid: f64,
    pub buyout_price: Option<f64>,
    pub duration_seconds: i64,
    pub category: String,
}

/// One accepted bid; append-only audit trail and the source for
/// per-(bidder, auction) cooldown lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRecord {
    pub auction_id: i64,
    pub bidder: Uuid,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}
