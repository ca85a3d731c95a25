// SQLite implementation of the ledger store.

mod schema;
mod sqlite_store;

pub use sqlite_store::SqliteLedgerStore;
