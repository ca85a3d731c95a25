// The core module contains all business logic.
// Each engine gets its own submodule.

#[path = "ledger/mod.rs"]
pub mod ledger;

#[path = "balance/mod.rs"]
pub mod balance;

#[path = "transfer/transfer_service.rs"]
pub mod transfer;

#[path = "auction/auction_service.rs"]
pub mod auction;

#[path = "interest/interest_service.rs"]
pub mod interest;

pub mod config;

pub mod money;
