// SQLite implementation of the AccountStore and AuctionStore traits.
//
// Serialization model: SQLite is single-writer, and the pool is capped at
// one connection, so every transaction here runs strictly after the
// previous one. On top of that, every debit and every status flip is a
// guarded UPDATE (`... WHERE balance >= ?`, `... WHERE status = 'ACTIVE'`)
// whose affected-row count is checked, so even a reordered schedule can't
// overdraw an account or settle a listing twice.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::core::ledger::{
    Account, AccountBalance, AccountStore, AuctionListing, AuctionStatus, AuctionStore,
    BalanceKind, BidOutcome, BidRecord, EconomyError, NewListing, Settlement, TransactionKind,
    TransactionRecord,
};
use crate::core::money;

use super::schema;

/// SQLite-backed ledger store. Cloning shares the connection pool.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Open (or create) the database at the given path and make sure the
    /// schema exists.
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        // One connection: SQLite has a single writer anyway, and funneling
        // every transaction through one handle removes busy-retry handling.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        schema::migrate(&store.pool).await?;
        Ok(store)
    }

    fn column(kind: BalanceKind) -> &'static str {
        match kind {
            BalanceKind::Liquid => "balance",
            BalanceKind::Bank => "bank_balance",
        }
    }

    /// Debit a liquid balance inside a transaction, guarded against
    /// overdraw at commit time.
    async fn guarded_debit(
        conn: &mut SqliteConnection,
        account_id: Uuid,
        amount: f64,
    ) -> Result<(), EconomyError> {
        let result = sqlx::query(
            r#"
            UPDATE players
            SET balance = ROUND(balance - ?1, 2),
                total_spent = ROUND(total_spent + ?1, 2),
                last_seen = ?2
            WHERE uuid = ?3 AND balance >= ?1
            "#,
        )
        .bind(amount)
        .bind(fmt_ts(Utc::now()))
        .bind(account_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            let available: f64 = sqlx::query("SELECT balance FROM players WHERE uuid = ?")
                .bind(account_id.to_string())
                .fetch_optional(&mut *conn)
                .await
                .map_err(store_err)?
                .map(|row| row.get("balance"))
                .unwrap_or(0.0);
            return Err(EconomyError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Credit a liquid balance inside a transaction, saturating at the cap.
    async fn clamped_credit(
        conn: &mut SqliteConnection,
        account_id: Uuid,
        amount: f64,
        max_balance: f64,
    ) -> Result<(), EconomyError> {
        // The earned counter only moves by what actually lands after the cap.
        let result = sqlx::query(
            r#"
            UPDATE players
            SET total_earned = ROUND(total_earned
                    + MAX(ROUND(MIN(balance + ?1, ?2), 2) - balance, 0.0), 2),
                balance = ROUND(MIN(balance + ?1, ?2), 2),
                last_seen = ?3
            WHERE uuid = ?4
            "#,
        )
        .bind(amount)
        .bind(max_balance)
        .bind(fmt_ts(Utc::now()))
        .bind(account_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(EconomyError::Store(format!(
                "no account row for {account_id}"
            )));
        }
        Ok(())
    }

    async fn insert_record(
        conn: &mut SqliteConnection,
        record: &TransactionRecord,
    ) -> Result<(), EconomyError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (from_uuid, to_uuid, amount, type, description, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.from.map(|u| u.to_string()))
        .bind(record.to.map(|u| u.to_string()))
        .bind(record.amount)
        .bind(record.kind.as_str())
        .bind(&record.description)
        .bind(fmt_ts(record.timestamp))
        .execute(&mut *conn)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn fetch_account(&self, account_id: Uuid) -> Result<Option<Account>, EconomyError> {
        let row = sqlx::query(
            r#"
            SELECT uuid, balance, bank_balance, total_earned, total_spent, created_at, last_seen
            FROM players
            WHERE uuid = ?
            "#,
        )
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(|r| row_to_account(&r)).transpose()
    }
}

#[async_trait]
impl AccountStore for SqliteLedgerStore {
    async fn get_or_create_account(
        &self,
        account_id: Uuid,
        starting_balance: f64,
    ) -> Result<Account, EconomyError> {
        if let Some(account) = self.fetch_account(account_id).await? {
            return Ok(account);
        }

        let now = fmt_ts(Utc::now());
        // OR IGNORE: a concurrent caller may have created the row between
        // the select and this insert; whoever wins, the re-read below sees
        // one consistent row.
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO players
                (uuid, balance, bank_balance, total_earned, total_spent, created_at, last_seen)
            VALUES (?, ?, 0, 0, 0, ?, ?)
            "#,
        )
        .bind(account_id.to_string())
        .bind(money::round2(starting_balance))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        self.fetch_account(account_id)
            .await?
            .ok_or_else(|| EconomyError::Store(format!("account {account_id} vanished after insert")))
    }

    async fn set_balance(
        &self,
        account_id: Uuid,
        kind: BalanceKind,
        amount: f64,
    ) -> Result<bool, EconomyError> {
        let sql = format!(
            "UPDATE players SET {} = ?, last_seen = ? WHERE uuid = ?",
            Self::column(kind)
        );
        let result = sqlx::query(&sql)
            .bind(amount)
            .bind(fmt_ts(Utc::now()))
            .bind(account_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn adjust_balance(
        &self,
        account_id: Uuid,
        kind: BalanceKind,
        delta: f64,
        max: f64,
    ) -> Result<f64, EconomyError> {
        let column = Self::column(kind);
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // Clamp in the same statement as the write: no stale read-then-set.
        // Every SET expression sees the pre-update row, so the clamped new
        // value is recomputed for the counters and they move by the
        // effective change, not the requested delta.
        let sql = format!(
            r#"
            UPDATE players
            SET total_earned = ROUND(total_earned
                    + MAX(ROUND(MIN(MAX({column} + ?1, 0.0), ?2), 2) - {column}, 0.0), 2),
                total_spent = ROUND(total_spent
                    + MAX({column} - ROUND(MIN(MAX({column} + ?1, 0.0), ?2), 2), 0.0), 2),
                {column} = ROUND(MIN(MAX({column} + ?1, 0.0), ?2), 2),
                last_seen = ?3
            WHERE uuid = ?4
            "#
        );
        let result = sqlx::query(&sql)
            .bind(delta)
            .bind(max)
            .bind(fmt_ts(Utc::now()))
            .bind(account_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        if result.rows_affected() == 0 {
            return Err(EconomyError::Store(format!(
                "no account row for {account_id}"
            )));
        }

        let sql = format!("SELECT {column} AS value FROM players WHERE uuid = ?");
        let new_balance: f64 = sqlx::query(&sql)
            .bind(account_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(store_err)?
            .get("value");

        tx.commit().await.map_err(store_err)?;
        Ok(new_balance)
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
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        Self::guarded_debit(&mut tx, from, gross).await?;
        Self::clamped_credit(&mut tx, to, net, max_balance).await?;
        Self::insert_record(&mut tx, &record).await?;

        tx.commit().await.map_err(store_err)?;
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
        let from_col = Self::column(from);
        let (to_col, cap) = match from {
            BalanceKind::Liquid => (Self::column(BalanceKind::Bank), f64::MAX),
            BalanceKind::Bank => (Self::column(BalanceKind::Liquid), max_balance),
        };

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let sql = format!(
            "UPDATE players SET {from_col} = ROUND({from_col} - ?1, 2), last_seen = ?2 \
             WHERE uuid = ?3 AND {from_col} >= ?1"
        );
        let debited = sqlx::query(&sql)
            .bind(amount)
            .bind(fmt_ts(Utc::now()))
            .bind(account_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        if debited.rows_affected() == 0 {
            let sql = format!("SELECT {from_col} AS value FROM players WHERE uuid = ?");
            let available: f64 = sqlx::query(&sql)
                .bind(account_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?
                .map(|row| row.get("value"))
                .unwrap_or(0.0);
            return Err(EconomyError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        let sql = format!(
            "UPDATE players SET {to_col} = ROUND(MIN({to_col} + ?1, ?2), 2) WHERE uuid = ?3"
        );
        sqlx::query(&sql)
            .bind(amount)
            .bind(cap)
            .bind(account_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        Self::insert_record(&mut tx, &record).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn log_transaction(&self, record: TransactionRecord) -> Result<(), EconomyError> {
        let mut conn = self.pool.acquire().await.map_err(store_err)?;
        Self::insert_record(&mut *conn, &record).await
    }

    async fn recent_transactions(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, EconomyError> {
        let rows = sqlx::query(
            r#"
            SELECT from_uuid, to_uuid, amount, type, description, timestamp
            FROM transactions
            WHERE from_uuid = ?1 OR to_uuid = ?1
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(account_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        // Rows with unknown type tags (written by a newer version) are
        // skipped rather than failing the whole read.
        Ok(rows
            .iter()
            .filter_map(|row| row_to_record(row).ok().flatten())
            .collect())
    }

    async fn top_balances(&self, limit: usize) -> Result<Vec<AccountBalance>, EconomyError> {
        let rows = sqlx::query(
            "SELECT uuid, balance FROM players ORDER BY balance DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                Ok(AccountBalance {
                    id: parse_uuid(row.get("uuid"))?,
                    balance: row.get("balance"),
                })
            })
            .collect()
    }

    async fn total_liquid(&self) -> Result<f64, EconomyError> {
        let total: Option<f64> = sqlx::query("SELECT SUM(balance) AS total FROM players")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?
            .get("total");
        Ok(money::round2(total.unwrap_or(0.0).max(0.0)))
    }

    async fn total_banked(&self) -> Result<f64, EconomyError> {
        let total: Option<f64> = sqlx::query("SELECT SUM(bank_balance) AS total FROM players")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?
            .get("total");
        Ok(money::round2(total.unwrap_or(0.0).max(0.0)))
    }

    async fn accounts_with_bank_at_least(
        &self,
        minimum: f64,
    ) -> Result<Vec<(Uuid, f64)>, EconomyError> {
        let rows = sqlx::query("SELECT uuid, bank_balance FROM players WHERE bank_balance >= ?")
            .bind(minimum)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter()
            .map(|row| Ok((parse_uuid(row.get("uuid"))?, row.get("bank_balance"))))
            .collect()
    }

    async fn apply_interest(
        &self,
        account_id: Uuid,
        interest: f64,
        record: TransactionRecord,
    ) -> Result<(), EconomyError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let result = sqlx::query(
            r#"
            UPDATE players
            SET bank_balance = ROUND(bank_balance + ?1, 2),
                total_earned = ROUND(total_earned + ?1, 2)
            WHERE uuid = ?2
            "#,
        )
        .bind(interest)
        .bind(account_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
        if result.rows_affected() == 0 {
            return Err(EconomyError::Store(format!(
                "no account row for {account_id}"
            )));
        }

        Self::insert_record(&mut tx, &record).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl AuctionStore for SqliteLedgerStore {
    async fn insert_listing(&self, listing: NewListing) -> Result<i64, EconomyError> {
        let now = Utc::now();
        let end_time = now + chrono::Duration::seconds(listing.duration_seconds);
        let result = sqlx::query(
            r#"
            INSERT INTO auctions
                (seller_uuid, item_name, item_data, starting_bid, buyout_price,
                 current_bid, highest_bidder_uuid, duration_seconds,
                 start_time, end_time, status, category, created_at)
            VALUES (?, ?, ?, ?, ?, 0, NULL, ?, ?, ?, 'ACTIVE', ?, ?)
            "#,
        )
        .bind(listing.seller.to_string())
        .bind(&listing.item_name)
        .bind(&listing.item_data)
        .bind(listing.starting_bid)
        .bind(listing.buyout_price)
        .bind(listing.duration_seconds)
        .bind(fmt_ts(now))
        .bind(fmt_ts(end_time))
        .bind(&listing.category)
        .bind(fmt_ts(now))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn listing(&self, auction_id: i64) -> Result<Option<AuctionListing>, EconomyError> {
        let row = sqlx::query(LISTING_SELECT)
            .bind(auction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.map(|r| row_to_listing(&r)).transpose()
    }

    async fn active_listings(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionListing>, EconomyError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM auctions
            WHERE status = 'ACTIVE' AND end_time > ?
            ORDER BY end_time ASC
            "#,
        )
        .bind(fmt_ts(now))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(row_to_listing).collect()
    }

    async fn listings_by_category(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionListing>, EconomyError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM auctions
            WHERE status = 'ACTIVE' AND category = ? AND end_time > ?
            ORDER BY end_time ASC
            "#,
        )
        .bind(category)
        .bind(fmt_ts(now))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(row_to_listing).collect()
    }

    async fn listings_by_seller(
        &self,
        seller: Uuid,
    ) -> Result<Vec<AuctionListing>, EconomyError> {
        let rows = sqlx::query(
            "SELECT * FROM auctions WHERE seller_uuid = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(seller.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(row_to_listing).collect()
    }

    async fn last_bid_time(
        &self,
        auction_id: i64,
        bidder: Uuid,
    ) -> Result<Option<DateTime<Utc>>, EconomyError> {
        let row = sqlx::query(
            r#"
            SELECT timestamp FROM auction_bids
            WHERE auction_id = ? AND bidder_uuid = ?
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(auction_id)
        .bind(bidder.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(|r| parse_ts(r.get("timestamp"))).transpose()
    }

    async fn bids_for_listing(&self, auction_id: i64) -> Result<Vec<BidRecord>, EconomyError> {
        let rows = sqlx::query(
            r#"
            SELECT auction_id, bidder_uuid, bid_amount, timestamp
            FROM auction_bids
            WHERE auction_id = ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(auction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                Ok(BidRecord {
                    auction_id: row.get("auction_id"),
                    bidder: parse_uuid(row.get("bidder_uuid"))?,
                    amount: row.get("bid_amount"),
                    timestamp: parse_ts(row.get("timestamp"))?,
                })
            })
            .collect()
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
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query(LISTING_SELECT)
            .bind(auction_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?
            .ok_or(EconomyError::AuctionNotFound)?;
        let listing = row_to_listing(&row)?;

        if !listing.is_open(now) {
            return Err(EconomyError::AuctionNotActive);
        }
        let floor = listing.bid_floor(minimum_increase);
        if amount < floor {
            return Err(EconomyError::BidTooLow { minimum: floor });
        }

        // CAS on the listing: the update only lands if the bid we read is
        // still the top bid. Zero rows means we lost a race.
        let updated = sqlx::query(
            r#"
            UPDATE auctions
            SET current_bid = ?1, highest_bidder_uuid = ?2
            WHERE id = ?3 AND status = 'ACTIVE' AND current_bid = ?4 AND end_time > ?5
            "#,
        )
        .bind(amount)
        .bind(bidder.to_string())
        .bind(auction_id)
        .bind(listing.current_bid)
        .bind(fmt_ts(now))
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
        if updated.rows_affected() == 0 {
            return Err(EconomyError::Store(format!(
                "listing {auction_id} changed while bidding; retry"
            )));
        }

        Self::guarded_debit(&mut tx, bidder, amount).await?;

        // Refund the superseded bid unconditionally; whether that player is
        // online only matters for notifications, which aren't our problem.
        let mut refunded = 0.0;
        if let Some(previous) = listing.highest_bidder {
            Self::clamped_credit(&mut tx, previous, listing.current_bid, max_balance).await?;
            refunded = listing.current_bid;
            Self::insert_record(
                &mut tx,
                &TransactionRecord::new(
                    None,
                    Some(previous),
                    listing.current_bid,
                    TransactionKind::AuctionRefund,
                    format!("Outbid on auction {auction_id}"),
                ),
            )
            .await?;
        }

        sqlx::query(
            "INSERT INTO auction_bids (auction_id, bidder_uuid, bid_amount, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(auction_id)
        .bind(bidder.to_string())
        .bind(amount)
        .bind(fmt_ts(now))
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        Self::insert_record(
            &mut tx,
            &TransactionRecord::new(
                Some(bidder),
                None,
                amount,
                TransactionKind::AuctionBid,
                format!("Bid on auction {auction_id} (seller {})", listing.seller),
            ),
        )
        .await?;

        tx.commit().await.map_err(store_err)?;
        Ok(BidOutcome {
            previous_bidder: listing.highest_bidder,
            refunded,
            new_bid: amount,
        })
    }

    async fn ended_listings(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionListing>, EconomyError> {
        let rows = sqlx::query("SELECT * FROM auctions WHERE status = 'ACTIVE' AND end_time <= ?")
            .bind(fmt_ts(now))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(row_to_listing).collect()
    }

    async fn settle_listing(
        &self,
        auction_id: i64,
        fee_percentage: f64,
        max_balance: f64,
    ) -> Result<Option<Settlement>, EconomyError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query(LISTING_SELECT)
            .bind(auction_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;
        let listing = match row.map(|r| row_to_listing(&r)).transpose()? {
            Some(l) if l.status == AuctionStatus::Active => l,
            // Already settled or cancelled.
            _ => return Ok(None),
        };

        // Guarded flip: a second sweep (or a concurrent one) gets zero rows
        // here and performs no payout.
        let flipped = sqlx::query(
            "UPDATE auctions SET status = 'ENDED' WHERE id = ? AND status = 'ACTIVE'",
        )
        .bind(auction_id)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;
        if flipped.rows_affected() == 0 {
            return Ok(None);
        }

        let (fee, proceeds) = if listing.highest_bidder.is_some() {
            let fee = money::round2(listing.current_bid * fee_percentage / 100.0);
            (fee, money::round2(listing.current_bid - fee))
        } else {
            (0.0, 0.0)
        };

        if listing.highest_bidder.is_some() && proceeds > 0.0 {
            Self::clamped_credit(&mut tx, listing.seller, proceeds, max_balance).await?;
            Self::insert_record(
                &mut tx,
                &TransactionRecord::new(
                    listing.highest_bidder,
                    Some(listing.seller),
                    listing.current_bid,
                    TransactionKind::AuctionSale,
                    format!("Auction {auction_id} sold (fee {})", money::format(fee)),
                ),
            )
            .await?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(Some(Settlement {
            auction_id,
            seller: listing.seller,
            winner: listing.highest_bidder,
            winning_bid: listing.current_bid,
            fee,
            seller_proceeds: proceeds,
        }))
    }

    async fn cancel_listing(&self, auction_id: i64, seller: Uuid) -> Result<bool, EconomyError> {
        let result = sqlx::query(
            r#"
            UPDATE auctions
            SET status = 'CANCELLED'
            WHERE id = ? AND seller_uuid = ? AND status = 'ACTIVE'
              AND highest_bidder_uuid IS NULL AND current_bid <= starting_bid
            "#,
        )
        .bind(auction_id)
        .bind(seller.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }
}

const LISTING_SELECT: &str = r#"
    SELECT id, seller_uuid, item_name, item_data, starting_bid, buyout_price,
           current_bid, highest_bidder_uuid, duration_seconds, start_time,
           end_time, status, category, created_at
    FROM auctions
    WHERE id = ?
"#;

fn store_err(e: sqlx::Error) -> EconomyError {
    EconomyError::Store(e.to_string())
}

// Timestamps are stored as fixed-width RFC3339 UTC text so that the string
// ordering SQLite applies matches chronological ordering.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, EconomyError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EconomyError::Store(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, EconomyError> {
    Uuid::parse_str(raw).map_err(|e| EconomyError::Store(format!("bad uuid {raw:?}: {e}")))
}

fn row_to_account(row: &SqliteRow) -> Result<Account, EconomyError> {
    Ok(Account {
        id: parse_uuid(row.get("uuid"))?,
        balance: row.get("balance"),
        bank_balance: row.get("bank_balance"),
        total_earned: row.get("total_earned"),
        total_spent: row.get("total_spent"),
        created_at: parse_ts(row.get("created_at"))?,
        last_seen: parse_ts(row.get("last_seen"))?,
    })
}

fn row_to_listing(row: &SqliteRow) -> Result<AuctionListing, EconomyError> {
    let status_raw: String = row.get("status");
    let status = AuctionStatus::parse(&status_raw)
        .ok_or_else(|| EconomyError::Store(format!("unknown auction status {status_raw:?}")))?;
    let highest_bidder: Option<String> = row.get("highest_bidder_uuid");

    Ok(AuctionListing {
        id: row.get("id"),
        seller: parse_uuid(row.get("seller_uuid"))?,
        item_name: row.get("item_name"),
        item_data: row.get("item_data"),
        starting_bid: row.get("starting_bid"),
        buyout_price: row.get("buyout_price"),
        current_bid: row.get("current_bid"),
        highest_bidder: highest_bidder.as_deref().map(parse_uuid).transpose()?,
        duration_seconds: row.get("duration_seconds"),
        start_time: parse_ts(row.get("start_time"))?,
        end_time: parse_ts(row.get("end_time"))?,
        status,
        category: row.get("category"),
        created_at: parse_ts(row.get("created_at"))?,
    })
}

fn row_to_record(row: &SqliteRow) -> Result<Option<TransactionRecord>, EconomyError> {
    let kind_raw: String = row.get("type");
    let Some(kind) = TransactionKind::parse(&kind_raw) else {
        return Ok(None);
    };
    let from: Option<String> = row.get("from_uuid");
    let to: Option<String> = row.get("to_uuid");
    let description: Option<String> = row.get("description");

    Ok(Some(TransactionRecord {
        from: from.as_deref().map(parse_uuid).transpose()?,
        to: to.as_deref().map(parse_uuid).transpose()?,
        amount: row.get("amount"),
        kind,
        description: description.unwrap_or_default(),
        timestamp: parse_ts(row.get("timestamp"))?,
    }))
}
