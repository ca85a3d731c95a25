// Database schema creation. All tables are created on first run; the
// schema_migrations table records which version the database is on so
// future migrations have somewhere to start from.

use sqlx::SqlitePool;
use tracing::info;

const SCHEMA_VERSION: &str = "1.0.0";

/// Create all tables and indexes if they don't exist yet.
pub(crate) async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Players table: one row per account. Balances are stored with two
    // decimal places; the engines round before writing.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            uuid TEXT PRIMARY KEY,
            balance REAL NOT NULL DEFAULT 0.00,
            bank_balance REAL NOT NULL DEFAULT 0.00,
            total_earned REAL NOT NULL DEFAULT 0.00,
            total_spent REAL NOT NULL DEFAULT 0.00,
            created_at TEXT NOT NULL,
            last_seen TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only ledger. Rows are never updated or deleted; from/to are
    // both nullable (system-minted funds have no source, holds no
    // destination).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_uuid TEXT,
            to_uuid TEXT,
            amount REAL NOT NULL,
            type TEXT NOT NULL,
            description TEXT,
            timestamp TEXT NOT NULL,
            FOREIGN KEY (from_uuid) REFERENCES players(uuid),
            FOREIGN KEY (to_uuid) REFERENCES players(uuid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auctions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            seller_uuid TEXT NOT NULL,
            item_name TEXT NOT NULL,
            item_data TEXT NOT NULL,
            starting_bid REAL NOT NULL,
            buyout_price REAL,
            current_bid REAL NOT NULL DEFAULT 0.00,
            highest_bidder_uuid TEXT,
            duration_seconds INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            category TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (seller_uuid) REFERENCES players(uuid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auction_bids (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            auction_id INTEGER NOT NULL,
            bidder_uuid TEXT NOT NULL,
            bid_amount REAL NOT NULL,
            timestamp TEXT NOT NULL,
            FOREIGN KEY (auction_id) REFERENCES auctions(id) ON DELETE CASCADE,
            FOREIGN KEY (bidder_uuid) REFERENCES players(uuid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for the hot lookups: per-account ledger scans, the expiry
    // sweep, category browsing, and per-(bidder, auction) cooldowns.
    for index in [
        "CREATE INDEX IF NOT EXISTS idx_transactions_from ON transactions(from_uuid, timestamp DESC)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_to ON transactions(to_uuid, timestamp DESC)",
        "CREATE INDEX IF NOT EXISTS idx_auctions_status_end ON auctions(status, end_time)",
        "CREATE INDEX IF NOT EXISTS idx_auctions_seller ON auctions(seller_uuid)",
        "CREATE INDEX IF NOT EXISTS idx_auctions_category ON auctions(category)",
        "CREATE INDEX IF NOT EXISTS idx_bids_auction_bidder ON auction_bids(auction_id, bidder_uuid, timestamp DESC)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO schema_migrations (version, description) VALUES (?, ?)",
    )
    .bind(SCHEMA_VERSION)
    .bind("Initial schema creation")
    .execute(pool)
    .await?;

    if inserted.rows_affected() > 0 {
        info!(version = SCHEMA_VERSION, "created ledger schema");
    }

    Ok(())
}
