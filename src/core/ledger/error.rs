use chrono::{DateTime, Utc};
use thiserror::Error;

/// Everything a public economy operation can fail with.
///
/// Business-rule rejections (insufficient funds, cooldowns, bad bids) are
/// ordinary variants the caller matches on; only `Store` represents an
/// actual storage failure, and by the time it surfaces the underlying
/// transaction has already been rolled back.
#[derive(Debug, Clone, Error)]
pub enum EconomyError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient funds: need {required:.2}, have {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("on cooldown until {available_at}")]
    OnCooldown { available_at: DateTime<Utc> },

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("deposit exceeds the daily limit of {limit:.2}")]
    DepositLimitExceeded { limit: f64 },

    #[error("auction not found")]
    AuctionNotFound,

    #[error("auction is not active")]
    AuctionNotActive,

    #[error("bid too low: minimum is {minimum:.2}")]
    BidTooLow { minimum: f64 },

    #[error("only the seller may do that")]
    NotSeller,

    #[error("auction already has bids")]
    AuctionHasBids,

    #[error("storage error: {0}")]
    Store(String),
}
