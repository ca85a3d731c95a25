// Configuration for the economy core.
//
// The host plugin loads these values from wherever it keeps its config
// (file, env, admin commands) and hands the structs in at construction.
// Defaults match the values the rest of the tooling assumes.

use serde::{Deserialize, Serialize};

/// Configuration for balances and transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Liquid balance a brand-new account starts with.
    pub starting_balance: f64,

    /// Hard cap on any liquid balance.
    pub max_balance: f64,

    /// Smallest amount a transfer may move.
    pub min_transaction: f64,

    /// Transfer fee as a percentage of the sent amount (0 = no fee).
    pub transaction_fee: f64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_balance: 100.0,
            max_balance: 1_000_000_000.0,
            min_transaction: 0.01,
            transaction_fee: 0.0,
        }
    }
}

/// Configuration for the banking side: deposit limits and interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankConfig {
    /// Largest single deposit accepted per day.
    pub daily_deposit_limit: f64,

    /// Interest rate in percent, applied per scheduler period.
    pub interest_rate: f64,

    /// Bank balance below which no interest accrues.
    pub min_balance_for_interest: f64,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            daily_deposit_limit: 1_000_000.0,
            interest_rate: 0.1,
            min_balance_for_interest: 1000.0,
        }
    }
}

/// Configuration for the auction house.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionConfig {
    /// How much above the current floor a new bid must be.
    pub minimum_bid_increase: f64,

    /// Seconds a bidder must wait between bids on the same listing.
    pub bid_cooldown_seconds: i64,

    /// Sale fee in percent, taken from the winning bid before payout.
    pub fee_percentage: f64,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            minimum_bid_increase: 1.0,
            bid_cooldown_seconds: 5,
            fee_percentage: 5.0,
        }
    }
}

/// Rate-limiting knobs for the transfer engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Seconds a sender must wait between transfers.
    pub transaction_cooldown_seconds: i64,

    /// Transfers allowed per sender per rolling minute.
    pub max_transactions_per_minute: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            transaction_cooldown_seconds: 1,
            max_transactions_per_minute: 10,
        }
    }
}

/// Sizing for the in-memory account cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Most account entries kept in memory at once.
    pub max_cached_players: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cached_players: 1000,
        }
    }
}
