//! Ledger: cash, bets, and the audit log for one trading mode.
//!
//! Cash is never stored. Every read recomputes it from the bet table and
//! the configured starting cash, and every write commits the bet change
//! together with its history event in a single transaction.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteConnection;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::{self, Store, STARTING_CASH_KEY};
use crate::types::{
    validate_money, ArchivedBet, Bet, BetId, BetRequest, BetStatus, HistoryEntry, LedgerError,
    LedgerEvent, PortfolioSnapshotRecord, PortfolioStats, ReconcileSummary, TradingMode,
};

const RESET_REASON: &str = "portfolio reset";

/// What a `reset` did to the previous portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetReport {
    /// Archive batch id when history was kept.
    pub archive_id: Option<String>,
    pub bets_cleared: u64,
    /// PENDING bets logged as archived or abandoned.
    pub pending_closed: u64,
    pub previous_starting_cash: Decimal,
    pub new_starting_cash: Decimal,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Explicit handle to one portfolio. Paper and live ledgers are separate
/// handles over separate databases.
#[derive(Debug, Clone)]
pub struct Ledger {
    store: Store,
    mode: TradingMode,
}

impl Ledger {
    /// Open the ledger database at `path`. A fresh database is seeded with
    /// `default_starting_cash`; an existing one keeps its stored value.
    pub async fn open(
        path: &Path,
        mode: TradingMode,
        default_starting_cash: Decimal,
    ) -> Result<Self, LedgerError> {
        let store = Store::open(path).await?;
        Self::with_store(store, mode, default_starting_cash).await
    }

    /// A throwaway in-memory ledger.
    pub async fn in_memory(mode: TradingMode, starting_cash: Decimal) -> Result<Self, LedgerError> {
        let store = Store::in_memory().await?;
        Self::with_store(store, mode, starting_cash).await
    }

    async fn with_store(
        store: Store,
        mode: TradingMode,
        default_starting_cash: Decimal,
    ) -> Result<Self, LedgerError> {
        let mut tx = store.begin().await?;
        match storage::get_starting_cash(&mut tx).await? {
            Some(cash) => {
                debug!(mode = %mode, starting_cash = %cash, "Existing ledger loaded");
            }
            None => {
                validate_money(default_starting_cash)?;
                storage::set_config(&mut tx, STARTING_CASH_KEY, &default_starting_cash.to_string())
                    .await?;
                let event = LedgerEvent::LedgerOpened {
                    starting_cash: default_starting_cash,
                };
                storage::append_event(&mut tx, &event, Utc::now()).await?;
                info!(
                    mode = %mode,
                    starting_cash = format!("${:.2}", default_starting_cash),
                    "New ledger initialised"
                );
            }
        }
        tx.commit().await?;

        Ok(Self { store, mode })
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    pub async fn close(&self) {
        self.store.close().await;
    }

    // -- Internal helpers --

    async fn stats_on(&self, conn: &mut SqliteConnection) -> Result<PortfolioStats, LedgerError> {
        let starting_cash = require_starting_cash(conn).await?;
        let bets = storage::fetch_bets(conn, None).await?;
        Ok(PortfolioStats::from_bets(self.mode, starting_cash, &bets))
    }

    // -- Writes --

    /// Open a new PENDING position, debiting derived cash by the stake.
    pub async fn place(&self, request: &BetRequest) -> Result<BetId, LedgerError> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let stats = self.stats_on(&mut tx).await?;
        if request.amount > stats.cash {
            warn!(
                market = %request.market_id,
                needed = format!("${:.2}", request.amount),
                available = format!("${:.2}", stats.cash),
                "Bet rejected: insufficient funds"
            );
            return Err(LedgerError::InsufficientFunds {
                needed: request.amount,
                available: stats.cash,
            });
        }

        let shares = request.shares()?;
        let bet_id = storage::insert_bet(&mut tx, request, shares, Utc::now()).await?;
        let event = LedgerEvent::BetPlaced {
            bet_id,
            market_id: request.market_id.clone(),
            outcome: request.outcome.clone(),
            side: request.side,
            amount: request.amount,
            price: request.price,
            shares,
        };
        storage::append_event(&mut tx, &event, Utc::now()).await?;
        tx.commit().await?;

        info!(
            bet_id,
            mode = %self.mode,
            market = %request.market_id,
            outcome = %request.outcome,
            side = %request.side,
            amount = format!("${:.2}", request.amount),
            price = %request.price,
            shares = format!("{:.4}", shares),
            cash_after = format!("${:.2}", stats.cash - request.amount),
            "Bet placed"
        );

        Ok(bet_id)
    }

    /// Settle a PENDING bet as won or lost. `payout` is stored verbatim.
    pub async fn resolve(
        &self,
        bet_id: BetId,
        outcome_won: bool,
        payout: Decimal,
    ) -> Result<Bet, LedgerError> {
        validate_money(payout)?;
        let status = if outcome_won { BetStatus::Won } else { BetStatus::Lost };
        self.settle(bet_id, status, payout).await
    }

    /// Settle a PENDING bet as VOIDED, crediting `refund`.
    pub async fn void(&self, bet_id: BetId, refund: Decimal) -> Result<Bet, LedgerError> {
        validate_money(refund)?;
        self.settle(bet_id, BetStatus::Voided, refund).await
    }

    async fn settle(
        &self,
        bet_id: BetId,
        status: BetStatus,
        payout: Decimal,
    ) -> Result<Bet, LedgerError> {
        let mut tx = self.store.begin().await?;

        let mut bet = storage::fetch_bet(&mut tx, bet_id)
            .await?
            .ok_or(LedgerError::BetNotFound(bet_id))?;
        if bet.status.is_terminal() {
            return Err(LedgerError::AlreadyResolved {
                bet_id,
                status: bet.status,
            });
        }

        let profit = payout - bet.amount;
        let resolved_at = Utc::now();
        let changed =
            storage::settle_bet(&mut tx, bet_id, status, payout, profit, resolved_at).await?;
        if changed == 0 {
            let current = storage::fetch_bet(&mut tx, bet_id)
                .await?
                .ok_or(LedgerError::BetNotFound(bet_id))?;
            return Err(LedgerError::AlreadyResolved {
                bet_id,
                status: current.status,
            });
        }

        let event = match status {
            BetStatus::Voided => LedgerEvent::BetVoided {
                bet_id,
                amount: bet.amount,
                refund: payout,
                profit,
            },
            _ => LedgerEvent::BetResolved {
                bet_id,
                status,
                amount: bet.amount,
                payout,
                profit,
            },
        };
        storage::append_event(&mut tx, &event, resolved_at).await?;
        tx.commit().await?;

        bet.status = status;
        bet.payout = payout;
        bet.profit = profit;
        bet.resolved_at = Some(resolved_at);

        info!(
            bet_id,
            mode = %self.mode,
            market = %bet.market_id,
            status = %status,
            payout = format!("${:.2}", payout),
            profit = format!("${:+.2}", profit),
            "Bet settled"
        );

        Ok(bet)
    }

    /// Start over with `new_starting_cash`. With `keep_history` every bet is
    /// copied to `archived_bets` first. Each PENDING bet gets its own
    /// archived/abandoned event; the history log itself is never cleared.
    pub async fn reset(
        &self,
        new_starting_cash: Decimal,
        keep_history: bool,
    ) -> Result<ResetReport, LedgerError> {
        validate_money(new_starting_cash)?;

        let mut tx = self.store.begin().await?;
        let previous_starting_cash = require_starting_cash(&mut tx).await?;
        let pending = storage::fetch_bets(&mut tx, Some(BetStatus::Pending)).await?;
        let now = Utc::now();

        let archive_id = if keep_history {
            let archive_id = Uuid::new_v4().to_string();
            storage::archive_bets(&mut tx, &archive_id, now).await?;
            Some(archive_id)
        } else {
            None
        };

        for bet in &pending {
            let event = match &archive_id {
                Some(archive_id) => LedgerEvent::BetArchived {
                    bet_id: bet.id,
                    archive_id: archive_id.clone(),
                    amount: bet.amount,
                    reason: RESET_REASON.to_string(),
                },
                None => LedgerEvent::BetAbandoned {
                    bet_id: bet.id,
                    amount: bet.amount,
                    reason: RESET_REASON.to_string(),
                },
            };
            storage::append_event(&mut tx, &event, now).await?;
        }

        let bets_cleared = storage::delete_bets(&mut tx).await?;
        storage::delete_snapshots(&mut tx).await?;
        storage::set_config(&mut tx, STARTING_CASH_KEY, &new_starting_cash.to_string()).await?;
        let event = LedgerEvent::PortfolioReset {
            starting_cash: new_starting_cash,
            keep_history,
        };
        storage::append_event(&mut tx, &event, now).await?;
        tx.commit().await?;

        info!(
            mode = %self.mode,
            archive_id = archive_id.as_deref().unwrap_or("-"),
            bets_cleared,
            pending_closed = pending.len(),
            starting_cash = format!("${:.2}", new_starting_cash),
            "Portfolio reset"
        );

        Ok(ResetReport {
            archive_id,
            bets_cleared,
            pending_closed: pending.len() as u64,
            previous_starting_cash,
            new_starting_cash,
        })
    }

    /// Log one resolver run to the audit trail.
    pub async fn record_reconcile_run(&self, summary: &ReconcileSummary) -> Result<(), LedgerError> {
        let mut conn = self.store.acquire().await?;
        let event = LedgerEvent::ReconcileRun {
            checked: summary.checked,
            won: summary.won,
            lost: summary.lost,
            voided: summary.voided,
            skipped: summary.skipped,
            errors: summary.errors,
        };
        storage::append_event(&mut conn, &event, Utc::now()).await?;
        Ok(())
    }

    /// Store the current statistics in `portfolio_snapshots`.
    pub async fn save_snapshot(&self) -> Result<PortfolioSnapshotRecord, LedgerError> {
        let mut tx = self.store.begin().await?;
        let stats = self.stats_on(&mut tx).await?;
        let taken_at = Utc::now();
        let id = storage::insert_snapshot(&mut tx, &stats, taken_at).await?;
        tx.commit().await?;

        debug!(snapshot_id = id, cash = %stats.cash, "Portfolio snapshot saved");

        Ok(PortfolioSnapshotRecord {
            id,
            taken_at,
            cash: stats.cash,
            pending_invested: stats.pending_invested,
            realized_pnl: stats.realized_pnl,
            wins: stats.wins,
            losses: stats.losses,
            pending: stats.pending,
        })
    }

    // -- Reads --

    /// Current portfolio statistics, recomputed from every bet.
    pub async fn snapshot(&self) -> Result<PortfolioStats, LedgerError> {
        let mut conn = self.store.acquire().await?;
        self.stats_on(&mut conn).await
    }

    pub async fn starting_cash(&self) -> Result<Decimal, LedgerError> {
        let mut conn = self.store.acquire().await?;
        require_starting_cash(&mut conn).await
    }

    pub async fn bet(&self, bet_id: BetId) -> Result<Bet, LedgerError> {
        let mut conn = self.store.acquire().await?;
        storage::fetch_bet(&mut conn, bet_id)
            .await?
            .ok_or(LedgerError::BetNotFound(bet_id))
    }

    pub async fn bets(&self) -> Result<Vec<Bet>, LedgerError> {
        let mut conn = self.store.acquire().await?;
        storage::fetch_bets(&mut conn, None).await
    }

    pub async fn pending(&self) -> Result<Vec<Bet>, LedgerError> {
        let mut conn = self.store.acquire().await?;
        storage::fetch_bets(&mut conn, Some(BetStatus::Pending)).await
    }

    pub async fn archived_bets(&self) -> Result<Vec<ArchivedBet>, LedgerError> {
        let mut conn = self.store.acquire().await?;
        storage::fetch_archived_bets(&mut conn).await
    }

    /// Newest history entries first, optionally of one event type.
    pub async fn history(
        &self,
        limit: Option<u32>,
        kind: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, LedgerError> {
        let mut conn = self.store.acquire().await?;
        storage::fetch_history(&mut conn, limit, kind).await
    }

    pub async fn snapshots(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<PortfolioSnapshotRecord>, LedgerError> {
        let mut conn = self.store.acquire().await?;
        storage::fetch_snapshots(&mut conn, limit).await
    }

    /// Recompute cash from the audit log alone. Always equals
    /// `snapshot().cash`; a mismatch means the tables and the log disagree.
    pub async fn replay_cash(&self) -> Result<Decimal, LedgerError> {
        let mut conn = self.store.acquire().await?;
        let events = storage::fetch_events(&mut conn).await?;
        replay(&events)
    }
}

async fn require_starting_cash(conn: &mut SqliteConnection) -> Result<Decimal, LedgerError> {
    storage::get_starting_cash(conn)
        .await?
        .ok_or_else(|| LedgerError::Corrupt("ledger has no starting cash".into()))
}

/// Fold the event log into a cash balance.
fn replay(events: &[HistoryEntry]) -> Result<Decimal, LedgerError> {
    let mut cash: Option<Decimal> = None;

    for entry in events {
        match &entry.event {
            LedgerEvent::LedgerOpened { starting_cash }
            | LedgerEvent::PortfolioReset { starting_cash, .. } => {
                cash = Some(*starting_cash);
            }
            event => {
                let Some(balance) = cash.as_mut() else {
                    return Err(LedgerError::Corrupt(format!(
                        "history {}: {} before the ledger was opened",
                        entry.id,
                        event.kind()
                    )));
                };
                match event {
                    LedgerEvent::BetPlaced { amount, .. } => *balance -= *amount,
                    LedgerEvent::BetResolved { payout, .. } => *balance += *payout,
                    LedgerEvent::BetVoided { refund, .. } => *balance += *refund,
                    _ => {}
                }
            }
        }
    }

    cash.ok_or_else(|| LedgerError::Corrupt("history has no opening event".into()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
