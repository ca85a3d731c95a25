// The ledger module owns the persisted data model: accounts, the
// append-only transaction log, auction listings and bid history, plus the
// storage traits the engines talk through.

mod error;
mod models;
mod store;

pub use error::EconomyError;
pub use models::{
    Account, AccountBalance, AuctionListing, AuctionStatus, BalanceKind, BidRecord, NewListing,
    TransactionKind, TransactionRecord,
};
pub use store::{AccountStore, AuctionStore, BidOutcome, Settlement};
