//! Persistence layer.
//!
//! One SQLite database per trading mode, accessed through `sqlx`. The
//! `Store` owns the pool and the schema; the free functions below take a
//! `&mut SqliteConnection` so the ledger can compose them inside a single
//! transaction (a bet row and its audit event commit together or not at
//! all).
//!
//! Decimals are stored as TEXT decimal strings and timestamps as RFC 3339
//! TEXT. A row that does not parse back is reported as
//! `LedgerError::Corrupt`; it is never skipped.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::{
    ArchivedBet, Bet, BetId, BetRequest, BetStatus, HistoryEntry, LedgerError, LedgerEvent,
    PortfolioSnapshotRecord, PortfolioStats,
};

/// `ledger_config` key holding the starting cash.
pub const STARTING_CASH_KEY: &str = "starting_cash";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS bets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        market_id TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        outcome TEXT NOT NULL,
        side TEXT NOT NULL CHECK (side IN ('YES', 'NO')),
        amount TEXT NOT NULL,
        price TEXT NOT NULL,
        shares TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING'
            CHECK (status IN ('PENDING', 'WON', 'LOST', 'VOIDED')),
        placed_at TEXT NOT NULL,
        resolved_at TEXT,
        payout TEXT NOT NULL DEFAULT '0',
        profit TEXT NOT NULL DEFAULT '0',
        notes TEXT NOT NULL DEFAULT ''
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_bets_status ON bets(status)",
    "CREATE INDEX IF NOT EXISTS idx_bets_market ON bets(market_id)",
    r#"
    CREATE TABLE IF NOT EXISTS archived_bets (
        row_id INTEGER PRIMARY KEY AUTOINCREMENT,
        archive_id TEXT NOT NULL,
        archived_at TEXT NOT NULL,
        original_id INTEGER NOT NULL,
        market_id TEXT NOT NULL,
        description TEXT NOT NULL,
        outcome TEXT NOT NULL,
        side TEXT NOT NULL,
        amount TEXT NOT NULL,
        price TEXT NOT NULL,
        shares TEXT NOT NULL,
        status TEXT NOT NULL,
        placed_at TEXT NOT NULL,
        resolved_at TEXT,
        payout TEXT NOT NULL,
        profit TEXT NOT NULL,
        notes TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_archived_archive ON archived_bets(archive_id)",
    r#"
    CREATE TABLE IF NOT EXISTS ledger_config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        event_type TEXT NOT NULL,
        bet_id INTEGER,
        data TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_history_type ON history(event_type)",
    r#"
    CREATE TABLE IF NOT EXISTS portfolio_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        taken_at TEXT NOT NULL,
        cash TEXT NOT NULL,
        pending_invested TEXT NOT NULL,
        realized_pnl TEXT NOT NULL,
        wins INTEGER NOT NULL,
        losses INTEGER NOT NULL,
        pending INTEGER NOT NULL
    )
    "#,
];

const BET_COLUMNS: &str = "id, market_id, description, outcome, side, amount, price, shares, \
                           status, placed_at, resolved_at, payout, profit, notes";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to one ledger database.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let store = Self::connect(options).await?;
        info!(path = %path.display(), "Ledger database opened");
        Ok(store)
    }

    /// A private in-memory database (tests, dry runs).
    pub async fn in_memory() -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options).await
    }

    // A single connection that never recycles: the ledger has one writer,
    // and an in-memory database lives only as long as its connection.
    async fn connect(options: SqliteConnectOptions) -> Result<Self, LedgerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<(), LedgerError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Ledger schema ready");
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, LedgerError> {
        Ok(self.pool.begin().await?)
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, LedgerError> {
        Ok(self.pool.acquire().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, LedgerError> {
    Decimal::from_str(raw)
        .map_err(|e| LedgerError::Corrupt(format!("{field}: {raw:?} is not a decimal ({e})")))
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LedgerError::Corrupt(format!("{field}: {raw:?} is not a timestamp ({e})")))
}

fn parse_count(field: &str, raw: i64) -> Result<u64, LedgerError> {
    u64::try_from(raw).map_err(|_| LedgerError::Corrupt(format!("{field}: negative count {raw}")))
}

fn decode_bet(row: &SqliteRow) -> Result<Bet, LedgerError> {
    let id: i64 = row.try_get("id")?;
    let side: String = row.try_get("side")?;
    let status: String = row.try_get("status")?;
    let resolved_at: Option<String> = row.try_get("resolved_at")?;

    Ok(Bet {
        id,
        market_id: row.try_get("market_id")?,
        description: row.try_get("description")?,
        outcome: row.try_get("outcome")?,
        side: side
            .parse()
            .map_err(|_| LedgerError::Corrupt(format!("bet {id}: unknown side {side:?}")))?,
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        price: parse_decimal("price", row.try_get("price")?)?,
        shares: parse_decimal("shares", row.try_get("shares")?)?,
        status: status.parse()?,
        placed_at: parse_timestamp("placed_at", row.try_get("placed_at")?)?,
        resolved_at: resolved_at
            .as_deref()
            .map(|raw| parse_timestamp("resolved_at", raw))
            .transpose()?,
        payout: parse_decimal("payout", row.try_get("payout")?)?,
        profit: parse_decimal("profit", row.try_get("profit")?)?,
        notes: row.try_get("notes")?,
    })
}

fn decode_history(row: &SqliteRow) -> Result<HistoryEntry, LedgerError> {
    let id: i64 = row.try_get("id")?;
    let data: String = row.try_get("data")?;
    let event: LedgerEvent = serde_json::from_str(&data)
        .map_err(|e| LedgerError::Corrupt(format!("history {id}: {e}")))?;

    Ok(HistoryEntry {
        id,
        timestamp: parse_timestamp("created_at", row.try_get("created_at")?)?,
        event,
    })
}

fn decode_snapshot(row: &SqliteRow) -> Result<PortfolioSnapshotRecord, LedgerError> {
    Ok(PortfolioSnapshotRecord {
        id: row.try_get("id")?,
        taken_at: parse_timestamp("taken_at", row.try_get("taken_at")?)?,
        cash: parse_decimal("cash", row.try_get("cash")?)?,
        pending_invested: parse_decimal("pending_invested", row.try_get("pending_invested")?)?,
        realized_pnl: parse_decimal("realized_pnl", row.try_get("realized_pnl")?)?,
        wins: parse_count("wins", row.try_get("wins")?)?,
        losses: parse_count("losses", row.try_get("losses")?)?,
        pending: parse_count("pending", row.try_get("pending")?)?,
    })
}

// ---------------------------------------------------------------------------
// ledger_config
// ---------------------------------------------------------------------------

pub async fn get_config(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<String>, LedgerError> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM ledger_config WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(value)
}

pub async fn set_config(
    conn: &mut SqliteConnection,
    key: &str,
    value: &str,
) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO ledger_config (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Starting cash as stored, or `None` for a fresh database.
pub async fn get_starting_cash(conn: &mut SqliteConnection) -> Result<Option<Decimal>, LedgerError> {
    match get_config(conn, STARTING_CASH_KEY).await? {
        Some(raw) => Ok(Some(parse_decimal(STARTING_CASH_KEY, &raw)?)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// bets
// ---------------------------------------------------------------------------

/// Insert a new PENDING bet. The request must already be validated.
pub async fn insert_bet(
    conn: &mut SqliteConnection,
    request: &BetRequest,
    shares: Decimal,
    placed_at: DateTime<Utc>,
) -> Result<BetId, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO bets (market_id, description, outcome, side, amount, price, shares,
                          status, placed_at, payout, profit, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'PENDING', ?, '0', '0', ?)
        "#,
    )
    .bind(&request.market_id)
    .bind(&request.description)
    .bind(&request.outcome)
    .bind(request.side.as_str())
    .bind(request.amount.to_string())
    .bind(request.price.to_string())
    .bind(shares.to_string())
    .bind(placed_at.to_rfc3339())
    .bind(&request.notes)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn fetch_bet(conn: &mut SqliteConnection, id: BetId) -> Result<Option<Bet>, LedgerError> {
    let sql = format!("SELECT {BET_COLUMNS} FROM bets WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(decode_bet).transpose()
}

/// All bets in placement order, optionally filtered by status.
pub async fn fetch_bets(
    conn: &mut SqliteConnection,
    status: Option<BetStatus>,
) -> Result<Vec<Bet>, LedgerError> {
    let sql = format!(
        "SELECT {BET_COLUMNS} FROM bets WHERE (? IS NULL OR status = ?) ORDER BY id ASC"
    );
    let status = status.map(|s| s.as_str());
    let rows = sqlx::query(&sql)
        .bind(status)
        .bind(status)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(decode_bet).collect()
}

/// Move a PENDING bet to a terminal status. Returns the number of rows
/// changed: 0 means the bet was no longer pending.
pub async fn settle_bet(
    conn: &mut SqliteConnection,
    id: BetId,
    status: BetStatus,
    payout: Decimal,
    profit: Decimal,
    resolved_at: DateTime<Utc>,
) -> Result<u64, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE bets
        SET status = ?, payout = ?, profit = ?, resolved_at = ?
        WHERE id = ? AND status = 'PENDING'
        "#,
    )
    .bind(status.as_str())
    .bind(payout.to_string())
    .bind(profit.to_string())
    .bind(resolved_at.to_rfc3339())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Copy every live bet into `archived_bets` under one archive id.
pub async fn archive_bets(
    conn: &mut SqliteConnection,
    archive_id: &str,
    archived_at: DateTime<Utc>,
) -> Result<u64, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO archived_bets (archive_id, archived_at, original_id, market_id, description,
                                   outcome, side, amount, price, shares, status, placed_at,
                                   resolved_at, payout, profit, notes)
        SELECT ?, ?, id, market_id, description, outcome, side, amount, price, shares, status,
               placed_at, resolved_at, payout, profit, notes
        FROM bets
        ORDER BY id ASC
        "#,
    )
    .bind(archive_id)
    .bind(archived_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn delete_bets(conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result = sqlx::query("DELETE FROM bets").execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

pub async fn fetch_archived_bets(
    conn: &mut SqliteConnection,
) -> Result<Vec<ArchivedBet>, LedgerError> {
    let rows = sqlx::query(
        r#"
        SELECT archive_id, archived_at, original_id AS id, market_id, description, outcome, side,
               amount, price, shares, status, placed_at, resolved_at, payout, profit, notes
        FROM archived_bets
        ORDER BY row_id ASC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> Result<ArchivedBet, LedgerError> {
            Ok(ArchivedBet {
                archive_id: row.try_get("archive_id")?,
                archived_at: parse_timestamp("archived_at", row.try_get("archived_at")?)?,
                bet: decode_bet(row)?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

/// Append one audit event. History rows are never updated or deleted.
pub async fn append_event(
    conn: &mut SqliteConnection,
    event: &LedgerEvent,
    at: DateTime<Utc>,
) -> Result<i64, LedgerError> {
    let data = serde_json::to_string(event)
        .map_err(|e| LedgerError::Corrupt(format!("failed to encode {}: {e}", event.kind())))?;

    let result = sqlx::query(
        "INSERT INTO history (created_at, event_type, bet_id, data) VALUES (?, ?, ?, ?)",
    )
    .bind(at.to_rfc3339())
    .bind(event.kind())
    .bind(event.bet_id())
    .bind(data)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Most recent events first, optionally filtered by event type.
pub async fn fetch_history(
    conn: &mut SqliteConnection,
    limit: Option<u32>,
    kind: Option<&str>,
) -> Result<Vec<HistoryEntry>, LedgerError> {
    let limit = limit.map(i64::from).unwrap_or(-1);
    let rows = sqlx::query(
        r#"
        SELECT id, created_at, data FROM history
        WHERE (? IS NULL OR event_type = ?)
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(kind)
    .bind(kind)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(decode_history).collect()
}

/// The whole log in append order.
pub async fn fetch_events(conn: &mut SqliteConnection) -> Result<Vec<HistoryEntry>, LedgerError> {
    let rows = sqlx::query("SELECT id, created_at, data FROM history ORDER BY id ASC")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(decode_history).collect()
}

// ---------------------------------------------------------------------------
// portfolio_snapshots
// ---------------------------------------------------------------------------

pub async fn insert_snapshot(
    conn: &mut SqliteConnection,
    stats: &PortfolioStats,
    taken_at: DateTime<Utc>,
) -> Result<i64, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO portfolio_snapshots (taken_at, cash, pending_invested, realized_pnl,
                                         wins, losses, pending)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(taken_at.to_rfc3339())
    .bind(stats.cash.to_string())
    .bind(stats.pending_invested.to_string())
    .bind(stats.realized_pnl.to_string())
    .bind(stats.wins as i64)
    .bind(stats.losses as i64)
    .bind(stats.pending as i64)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Most recent snapshots first.
pub async fn fetch_snapshots(
    conn: &mut SqliteConnection,
    limit: Option<u32>,
) -> Result<Vec<PortfolioSnapshotRecord>, LedgerError> {
    let limit = limit.map(i64::from).unwrap_or(-1);
    let rows = sqlx::query(
        r#"
        SELECT id, taken_at, cash, pending_invested, realized_pnl, wins, losses, pending
        FROM portfolio_snapshots
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(decode_snapshot).collect()
}

pub async fn delete_snapshots(conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result = sqlx::query("DELETE FROM portfolio_snapshots")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
