// Transactional economy core for a game server.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic): balance, transfer,
//   auction and interest engines plus the ledger models and storage traits
// - `infra/` = Implementations of the core storage traits (SQLite via sqlx,
//   in-memory via DashMap-style shared state)
//
// The host runtime (command dispatch, GUI, notifications, scheduling) lives
// outside this crate and talks to it through the service types re-exported
// below. Periodic jobs (`process_ended_auctions`, interest accrual,
// rate-window resets) are driven by an external scheduler; this crate never
// schedules itself.

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;

pub use crate::core::auction::AuctionService;
pub use crate::core::balance::{
    AccountCache, BalanceKind, BalanceService, CachedAccount,
};
pub use crate::core::config::{
    AuctionConfig, BankConfig, CacheConfig, EconomyConfig, SecurityConfig,
};
pub use crate::core::interest::{InterestRun, InterestService};
pub use crate::core::ledger::{
    Account, AccountBalance, AccountStore, AuctionListing, AuctionStatus, AuctionStore,
    BidOutcome, BidRecord, EconomyError, NewListing, Settlement, TransactionKind,
    TransactionRecord,
};
pub use crate::core::transfer::{TransferReceipt, TransferService, TransferTracker};
pub use crate::infra::memory::MemoryLedgerStore;
pub use crate::infra::sqlite::SqliteLedgerStore;
