//! Shared types for the PAPERTRAIL ledger.
//!
//! These types form the data model used across all modules: bets and
//! their lifecycle, derived portfolio statistics, the audit event log,
//! and the error taxonomy. Storage, engine and platform modules depend on
//! them without depending on each other.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger-assigned bet identifier (monotonic).
pub type BetId = i64;

/// Decimal places kept for stakes, shares, payouts and cash.
pub const MONEY_SCALE: u32 = 8;

/// Largest stake, share count, payout or starting balance accepted.
/// Keeps every ledger sum exact within `Decimal`'s 28 digits.
pub const MAX_MONEY: Decimal = dec!(1000000000000);

/// Check a non-negative money value: at most `MONEY_SCALE` places and
/// no larger than `MAX_MONEY`.
pub fn validate_money(value: Decimal) -> Result<(), LedgerError> {
    if value < Decimal::ZERO || value > MAX_MONEY || value.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::InvalidAmount(value));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Bet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Canonical storage form: "YES" | "NO".
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }

    /// Price actually paid per share for this side, given the YES
    /// probability the bet was placed at.
    pub fn effective_price(&self, price: Decimal) -> Decimal {
        match self {
            Side::Yes => price,
            Side::No => Decimal::ONE - price,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a side string (case-insensitive).
impl std::str::FromStr for Side {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "YES" => Ok(Side::Yes),
            "NO" => Ok(Side::No),
            _ => Err(LedgerError::InvalidSide(s.to_string())),
        }
    }
}

/// Bet lifecycle status. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Voided,
}

impl BetStatus {
    pub const ALL: &'static [BetStatus] = &[
        BetStatus::Pending,
        BetStatus::Won,
        BetStatus::Lost,
        BetStatus::Voided,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "PENDING",
            BetStatus::Won => "WON",
            BetStatus::Lost => "LOST",
            BetStatus::Voided => "VOIDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self != BetStatus::Pending
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BetStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BetStatus::Pending),
            "WON" => Ok(BetStatus::Won),
            "LOST" => Ok(BetStatus::Lost),
            "VOIDED" => Ok(BetStatus::Voided),
            other => Err(LedgerError::Corrupt(format!("unknown bet status: {other}"))),
        }
    }
}

/// Which portfolio a ledger handle operates on. Each mode has its own
/// database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Paper,
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradingMode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown trading mode: {other} (expected paper or live)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// A request to open a new position. Validated by the ledger before any
/// write happens.
#[derive(Debug, Clone, PartialEq)]
pub struct BetRequest {
    pub market_id: String,
    pub description: String,
    /// Outcome label bet on. "YES" for binary markets.
    pub outcome: String,
    pub side: Side,
    pub amount: Decimal,
    /// YES probability at entry, strictly inside (0, 1).
    pub price: Decimal,
    pub notes: String,
}

impl BetRequest {
    pub fn new(market_id: &str, side: Side, amount: Decimal, price: Decimal) -> Self {
        Self {
            market_id: market_id.to_string(),
            description: String::new(),
            outcome: "YES".to_string(),
            side,
            amount,
            price,
            notes: String::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_outcome(mut self, outcome: &str) -> Self {
        self.outcome = outcome.to_string();
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }

    /// Input checks that do not depend on ledger state.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(self.amount));
        }
        validate_money(self.amount)?;
        if self.price <= Decimal::ZERO || self.price >= Decimal::ONE {
            return Err(LedgerError::InvalidPrice(self.price));
        }
        self.shares()?;
        if self.market_id.trim().is_empty() {
            return Err(LedgerError::InvalidInput("market id must not be empty".into()));
        }
        if self.outcome.trim().is_empty() {
            return Err(LedgerError::InvalidInput("outcome must not be empty".into()));
        }
        Ok(())
    }

    pub fn effective_price(&self) -> Decimal {
        self.side.effective_price(self.price)
    }

    /// Shares bought: amount / effective price, truncated to `MONEY_SCALE`
    /// places. A price so extreme that the count overflows or exceeds
    /// `MAX_MONEY` is `InvalidPrice`.
    pub fn shares(&self) -> Result<Decimal, LedgerError> {
        self.amount
            .checked_div(self.effective_price())
            .map(|shares| shares.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero))
            .filter(|shares| *shares > Decimal::ZERO && *shares <= MAX_MONEY)
            .ok_or(LedgerError::InvalidPrice(self.price))
    }
}

/// One wagered position as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub market_id: String,
    pub description: String,
    pub outcome: String,
    pub side: Side,
    pub amount: Decimal,
    pub price: Decimal,
    pub shares: Decimal,
    pub status: BetStatus,
    pub placed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub payout: Decimal,
    pub profit: Decimal,
    pub notes: String,
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[#{}] {} {} @ {:.1}% ${:.2} ({:.2} shares) {} | {}",
            self.id,
            self.outcome,
            self.side,
            self.effective_price() * Decimal::ONE_HUNDRED,
            self.amount,
            self.shares,
            self.status,
            self.description,
        )
    }
}

impl Bet {
    pub fn effective_price(&self) -> Decimal {
        self.side.effective_price(self.price)
    }

    pub fn is_pending(&self) -> bool {
        self.status == BetStatus::Pending
    }

    /// Payout if the held side wins: one currency unit per share.
    pub fn winning_payout(&self) -> Decimal {
        self.shares
    }

    /// Whether this bet wins given the market's winning outcome label.
    ///
    /// A YES bet wins when its outcome is the winner; a NO bet wins when
    /// it is not. Labels compare case-insensitively.
    pub fn wins_against(&self, winning_outcome: &str) -> bool {
        let matches = self
            .outcome
            .trim()
            .eq_ignore_ascii_case(winning_outcome.trim());
        (self.side == Side::Yes) == matches
    }

    /// Short question text for tables.
    pub fn short_description(&self, max_chars: usize) -> String {
        if self.description.chars().count() > max_chars {
            let truncated: String = self.description.chars().take(max_chars).collect();
            format!("{truncated}...")
        } else {
            self.description.clone()
        }
    }
}

/// A bet copied out of the live table by a history-keeping reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedBet {
    pub archive_id: String,
    pub archived_at: DateTime<Utc>,
    /// The bet as it stood at reset time; `bet.id` is its original id.
    pub bet: Bet,
}

// ---------------------------------------------------------------------------
// Portfolio statistics
// ---------------------------------------------------------------------------

/// Derived account state. Always recomputed from the bet log plus the
/// configured starting cash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub mode: TradingMode,
    pub starting_cash: Decimal,
    pub cash: Decimal,
    pub pending_invested: Decimal,
    pub realized_pnl: Decimal,
    pub total_value: Decimal,
    pub wins: u64,
    pub losses: u64,
    pub voided: u64,
    pub pending: u64,
    pub total_bets: u64,
    pub total_wagered: Decimal,
}

impl PortfolioStats {
    /// Fold a bet log into portfolio statistics.
    pub fn from_bets(mode: TradingMode, starting_cash: Decimal, bets: &[Bet]) -> Self {
        let mut stats = Self {
            mode,
            starting_cash,
            cash: Decimal::ZERO,
            pending_invested: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            total_value: Decimal::ZERO,
            wins: 0,
            losses: 0,
            voided: 0,
            pending: 0,
            total_bets: bets.len() as u64,
            total_wagered: Decimal::ZERO,
        };

        for bet in bets {
            stats.total_wagered += bet.amount;
            match bet.status {
                BetStatus::Pending => {
                    stats.pending += 1;
                    stats.pending_invested += bet.amount;
                }
                BetStatus::Won => {
                    stats.wins += 1;
                    stats.realized_pnl += bet.profit;
                }
                BetStatus::Lost => {
                    stats.losses += 1;
                    stats.realized_pnl += bet.profit;
                }
                BetStatus::Voided => {
                    stats.voided += 1;
                    stats.realized_pnl += bet.profit;
                }
            }
        }

        stats.cash = starting_cash + stats.realized_pnl - stats.pending_invested;
        stats.total_value = stats.cash + stats.pending_invested;
        stats
    }

    /// Wins / (wins + losses). Returns 0.0 if nothing has resolved.
    pub fn win_rate(&self) -> f64 {
        let resolved = self.wins + self.losses;
        if resolved == 0 {
            0.0
        } else {
            self.wins as f64 / resolved as f64
        }
    }

    /// Total value minus starting cash.
    pub fn pnl(&self) -> Decimal {
        self.total_value - self.starting_cash
    }

    /// P&L as a percentage of starting cash.
    pub fn pnl_pct(&self) -> f64 {
        if self.starting_cash <= Decimal::ZERO {
            return 0.0;
        }
        (self.pnl() / self.starting_cash * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    }
}

impl fmt::Display for PortfolioStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] cash=${:.2} | pending=${:.2} | value=${:.2} | PnL=${:.2} ({:+.1}%) | W{}/L{}/V{}/P{} | win_rate={:.1}%",
            self.mode,
            self.cash,
            self.pending_invested,
            self.total_value,
            self.pnl(),
            self.pnl_pct(),
            self.wins,
            self.losses,
            self.voided,
            self.pending,
            self.win_rate() * 100.0,
        )
    }
}

/// A stored point-in-time copy of the portfolio statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshotRecord {
    pub id: i64,
    pub taken_at: DateTime<Utc>,
    pub cash: Decimal,
    pub pending_invested: Decimal,
    pub realized_pnl: Decimal,
    pub wins: u64,
    pub losses: u64,
    pub pending: u64,
}

/// Per-run counts from the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub checked: u64,
    pub won: u64,
    pub lost: u64,
    pub voided: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl ReconcileSummary {
    /// Bets that reached a terminal status in this run.
    pub fn settled(&self) -> u64 {
        self.won + self.lost + self.voided
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked={} won={} lost={} voided={} skipped={} errors={}",
            self.checked, self.won, self.lost, self.voided, self.skipped, self.errors
        )
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// One entry in the append-only history log. Monetary values are encoded
/// as decimal strings so that replaying the log is exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEvent {
    LedgerOpened {
        #[serde(with = "rust_decimal::serde::str")]
        starting_cash: Decimal,
    },
    BetPlaced {
        bet_id: BetId,
        market_id: String,
        outcome: String,
        side: Side,
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        price: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        shares: Decimal,
    },
    BetResolved {
        bet_id: BetId,
        status: BetStatus,
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        payout: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        profit: Decimal,
    },
    BetVoided {
        bet_id: BetId,
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        refund: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        profit: Decimal,
    },
    BetArchived {
        bet_id: BetId,
        archive_id: String,
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
        reason: String,
    },
    BetAbandoned {
        bet_id: BetId,
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
        reason: String,
    },
    PortfolioReset {
        #[serde(with = "rust_decimal::serde::str")]
        starting_cash: Decimal,
        keep_history: bool,
    },
    ReconcileRun {
        checked: u64,
        won: u64,
        lost: u64,
        voided: u64,
        skipped: u64,
        errors: u64,
    },
}

impl LedgerEvent {
    /// Stored `event_type` column value.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::LedgerOpened { .. } => "LEDGER_OPENED",
            LedgerEvent::BetPlaced { .. } => "BET_PLACED",
            LedgerEvent::BetResolved { .. } => "BET_RESOLVED",
            LedgerEvent::BetVoided { .. } => "BET_VOIDED",
            LedgerEvent::BetArchived { .. } => "BET_ARCHIVED",
            LedgerEvent::BetAbandoned { .. } => "BET_ABANDONED",
            LedgerEvent::PortfolioReset { .. } => "PORTFOLIO_RESET",
            LedgerEvent::ReconcileRun { .. } => "RECONCILE_RUN",
        }
    }

    /// The bet this event refers to, if any.
    pub fn bet_id(&self) -> Option<BetId> {
        match self {
            LedgerEvent::BetPlaced { bet_id, .. }
            | LedgerEvent::BetResolved { bet_id, .. }
            | LedgerEvent::BetVoided { bet_id, .. }
            | LedgerEvent::BetArchived { bet_id, .. }
            | LedgerEvent::BetAbandoned { bet_id, .. } => Some(*bet_id),
            _ => None,
        }
    }
}

/// A history row: event plus its position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event: LedgerEvent,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let when = self.timestamp.format("%Y-%m-%d %H:%M:%S");
        match &self.event {
            LedgerEvent::LedgerOpened { starting_cash } => {
                write!(f, "{when} | LEDGER_OPENED   | starting cash ${starting_cash:.2}")
            }
            LedgerEvent::BetPlaced { bet_id, outcome, side, amount, price, .. } => write!(
                f,
                "{when} | BET_PLACED      | #{bet_id} {outcome} {side} ${amount:.2} @ {price}"
            ),
            LedgerEvent::BetResolved { bet_id, status, payout, profit, .. } => write!(
                f,
                "{when} | BET_RESOLVED    | #{bet_id} {status} payout ${payout:.2} profit ${profit:+.2}"
            ),
            LedgerEvent::BetVoided { bet_id, refund, profit, .. } => write!(
                f,
                "{when} | BET_VOIDED      | #{bet_id} refund ${refund:.2} profit ${profit:+.2}"
            ),
            LedgerEvent::BetArchived { bet_id, archive_id, .. } => {
                write!(f, "{when} | BET_ARCHIVED    | #{bet_id} -> {archive_id}")
            }
            LedgerEvent::BetAbandoned { bet_id, amount, .. } => {
                write!(f, "{when} | BET_ABANDONED   | #{bet_id} stake ${amount:.2}")
            }
            LedgerEvent::PortfolioReset { starting_cash, keep_history } => write!(
                f,
                "{when} | PORTFOLIO_RESET | starting cash ${starting_cash:.2} (history kept: {keep_history})"
            ),
            LedgerEvent::ReconcileRun { checked, won, lost, voided, skipped, errors } => write!(
                f,
                "{when} | RECONCILE_RUN   | checked={checked} won={won} lost={lost} voided={voided} skipped={skipped} errors={errors}"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Coarse error classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InsufficientFunds,
    NotFound,
    AlreadyResolved,
    ExternalUnavailable,
    Storage,
}

/// Domain-specific error types for the ledger and resolver.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Invalid price: {0} (must be strictly between 0 and 1)")]
    InvalidPrice(Decimal),

    #[error("Invalid side: {0} (must be YES or NO)")]
    InvalidSide(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Bet not found: {0}")]
    BetNotFound(BetId),

    #[error("Bet {bet_id} already resolved: {status}")]
    AlreadyResolved { bet_id: BetId, status: BetStatus },

    #[error("Market oracle unavailable for {market_id}: {message}")]
    ExternalUnavailable { market_id: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidPrice(_)
            | LedgerError::InvalidSide(_)
            | LedgerError::InvalidInput(_) => ErrorKind::InvalidInput,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::BetNotFound(_) => ErrorKind::NotFound,
            LedgerError::AlreadyResolved { .. } => ErrorKind::AlreadyResolved,
            LedgerError::ExternalUnavailable { .. } => ErrorKind::ExternalUnavailable,
            LedgerError::Storage(_) | LedgerError::Corrupt(_) => ErrorKind::Storage,
        }
    }

    /// Transient failures that are safe to retry on a later run.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ExternalUnavailable
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_bet(side: Side, outcome: &str, amount: Decimal, price: Decimal, status: BetStatus) -> Bet {
        let shares = amount / side.effective_price(price);
        Bet {
            id: 1,
            market_id: "m1".to_string(),
            description: "Will it rain tomorrow?".to_string(),
            outcome: outcome.to_string(),
            side,
            amount,
            price,
            shares,
            status,
            placed_at: Utc::now(),
            resolved_at: None,
            payout: Decimal::ZERO,
            profit: Decimal::ZERO,
            notes: String::new(),
        }
    }

    // -- Side tests --

    #[test]
    fn test_side_display() {
        assert_eq!(format!("{}", Side::Yes), "YES");
        assert_eq!(format!("{}", Side::No), "NO");
    }

    #[test]
    fn test_side_from_str() {
        assert_eq!("yes".parse::<Side>().unwrap(), Side::Yes);
        assert_eq!(" NO ".parse::<Side>().unwrap(), Side::No);
        let err = "maybe".parse::<Side>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(matches!(err, LedgerError::InvalidSide(s) if s == "maybe"));
    }

    #[test]
    fn test_side_effective_price() {
        assert_eq!(Side::Yes.effective_price(dec!(0.30)), dec!(0.30));
        assert_eq!(Side::No.effective_price(dec!(0.30)), dec!(0.70));
    }

    #[test]
    fn test_side_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Side::Yes).unwrap(), "\"YES\"");
        let no: Side = serde_json::from_str("\"NO\"").unwrap();
        assert_eq!(no, Side::No);
    }

    // -- BetStatus tests --

    #[test]
    fn test_status_parse_and_terminal() {
        for status in BetStatus::ALL {
            assert_eq!(status.as_str().parse::<BetStatus>().unwrap(), *status);
        }
        assert!(!BetStatus::Pending.is_terminal());
        assert!(BetStatus::Voided.is_terminal());
        assert!(matches!("won".parse::<BetStatus>(), Err(LedgerError::Corrupt(_))));
    }

    #[test]
    fn test_trading_mode_from_str() {
        assert_eq!("Paper".parse::<TradingMode>().unwrap(), TradingMode::Paper);
        assert_eq!("live".parse::<TradingMode>().unwrap(), TradingMode::Live);
        assert!("demo".parse::<TradingMode>().is_err());
    }

    // -- BetRequest tests --

    #[test]
    fn test_request_validation() {
        assert!(BetRequest::new("m1", Side::Yes, dec!(50), dec!(0.80)).validate().is_ok());
        assert!(matches!(
            BetRequest::new("m1", Side::Yes, dec!(0), dec!(0.5)).validate(),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            BetRequest::new("m1", Side::Yes, dec!(-5), dec!(0.5)).validate(),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            BetRequest::new("m1", Side::Yes, dec!(5), dec!(1)).validate(),
            Err(LedgerError::InvalidPrice(_))
        ));
        assert!(matches!(
            BetRequest::new("m1", Side::No, dec!(5), dec!(0)).validate(),
            Err(LedgerError::InvalidPrice(_))
        ));
        assert!(matches!(
            BetRequest::new("  ", Side::No, dec!(5), dec!(0.4)).validate(),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_request_shares() {
        let yes = BetRequest::new("m1", Side::Yes, dec!(50), dec!(0.80));
        assert_eq!(yes.shares().unwrap(), dec!(62.5));

        // Repeating quotients are truncated, never rounded up.
        let no = BetRequest::new("m1", Side::No, dec!(20), dec!(0.30));
        assert_eq!(no.shares().unwrap(), dec!(28.57142857));
        let yes = BetRequest::new("m1", Side::Yes, dec!(10), dec!(0.3));
        assert_eq!(yes.shares().unwrap(), dec!(33.33333333));
    }

    #[test]
    fn test_extreme_price_is_invalid_not_a_panic() {
        let tiny = Decimal::new(1, 27);
        let yes = BetRequest::new("m1", Side::Yes, dec!(500), tiny);
        assert!(matches!(yes.shares(), Err(LedgerError::InvalidPrice(_))));
        assert!(matches!(yes.validate(), Err(LedgerError::InvalidPrice(_))));

        let no = BetRequest::new("m1", Side::No, dec!(500), Decimal::ONE - tiny);
        assert!(matches!(no.validate(), Err(LedgerError::InvalidPrice(_))));

        // Small but representable prices are still fine.
        let cheap = BetRequest::new("m1", Side::Yes, dec!(1), dec!(0.0001));
        assert_eq!(cheap.shares().unwrap(), dec!(10000));
    }

    #[test]
    fn test_money_bounds() {
        assert!(validate_money(Decimal::ZERO).is_ok());
        assert!(validate_money(dec!(12.34567890)).is_ok());
        assert!(validate_money(MAX_MONEY).is_ok());
        assert!(matches!(validate_money(dec!(-0.01)), Err(LedgerError::InvalidAmount(_))));
        assert!(validate_money(dec!(0.000000001)).is_err());
        assert!(validate_money(MAX_MONEY + Decimal::ONE).is_err());

        let dust = BetRequest::new("m1", Side::Yes, dec!(0.123456789), dec!(0.5));
        assert!(matches!(dust.validate(), Err(LedgerError::InvalidAmount(_))));
    }

    // -- Bet tests --

    #[test]
    fn test_wins_against_binary() {
        let yes = make_bet(Side::Yes, "YES", dec!(10), dec!(0.5), BetStatus::Pending);
        assert!(yes.wins_against("YES"));
        assert!(!yes.wins_against("NO"));

        let no = make_bet(Side::No, "YES", dec!(10), dec!(0.5), BetStatus::Pending);
        assert!(no.wins_against("NO"));
        assert!(!no.wins_against("yes"));
    }

    #[test]
    fn test_wins_against_multi_outcome() {
        let bet = make_bet(Side::Yes, "Trump", dec!(10), dec!(0.5), BetStatus::Pending);
        assert!(bet.wins_against("trump"));
        assert!(!bet.wins_against("Harris"));

        let fade = make_bet(Side::No, "Trump", dec!(10), dec!(0.5), BetStatus::Pending);
        assert!(fade.wins_against("Harris"));
    }

    #[test]
    fn test_short_description() {
        let bet = make_bet(Side::Yes, "YES", dec!(10), dec!(0.5), BetStatus::Pending);
        assert_eq!(bet.short_description(100), "Will it rain tomorrow?");
        assert_eq!(bet.short_description(4), "Will...");
    }

    // -- PortfolioStats tests --

    #[test]
    fn test_stats_empty() {
        let stats = PortfolioStats::from_bets(TradingMode::Paper, dec!(500), &[]);
        assert_eq!(stats.cash, dec!(500));
        assert_eq!(stats.total_value, dec!(500));
        assert_eq!(stats.win_rate(), 0.0);
        assert_eq!(stats.pnl(), Decimal::ZERO);
        assert_eq!(stats.pnl_pct(), 0.0);
    }

    #[test]
    fn test_stats_mixed_bets() {
        let pending = make_bet(Side::Yes, "YES", dec!(30), dec!(0.5), BetStatus::Pending);
        let mut won = make_bet(Side::Yes, "YES", dec!(50), dec!(0.8), BetStatus::Won);
        won.payout = dec!(62.5);
        won.profit = dec!(12.5);
        let mut lost = make_bet(Side::No, "YES", dec!(20), dec!(0.3), BetStatus::Lost);
        lost.profit = dec!(-20);
        let mut voided = make_bet(Side::Yes, "YES", dec!(10), dec!(0.5), BetStatus::Voided);
        voided.payout = dec!(10);

        let stats = PortfolioStats::from_bets(
            TradingMode::Paper,
            dec!(500),
            &[pending, won, lost, voided],
        );

        assert_eq!(stats.pending_invested, dec!(30));
        assert_eq!(stats.realized_pnl, dec!(-7.5));
        assert_eq!(stats.cash, dec!(462.5));
        assert_eq!(stats.total_value, dec!(492.5));
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.voided, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total_bets, 4);
        assert_eq!(stats.total_wagered, dec!(110));
        assert!((stats.win_rate() - 0.5).abs() < f64::EPSILON);
        assert!((stats.pnl_pct() - -1.5).abs() < 1e-9);
    }

    // -- Event tests --

    #[test]
    fn test_event_encodes_decimals_as_strings() {
        let event = LedgerEvent::BetPlaced {
            bet_id: 7,
            market_id: "m1".into(),
            outcome: "YES".into(),
            side: Side::No,
            amount: dec!(20),
            price: dec!(0.30),
            shares: dec!(20) / dec!(0.70),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BET_PLACED");
        assert_eq!(json["side"], "NO");
        assert_eq!(json["amount"], "20");
        assert!(json["shares"].as_str().unwrap().starts_with("28.571428"));

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind(), "BET_PLACED");
        assert_eq!(back.bet_id(), Some(7));
    }

    #[test]
    fn test_event_without_bet() {
        let event = LedgerEvent::PortfolioReset { starting_cash: dec!(100), keep_history: true };
        assert_eq!(event.kind(), "PORTFOLIO_RESET");
        assert_eq!(event.bet_id(), None);
    }

    // -- Error tests --

    #[test]
    fn test_error_kinds() {
        assert_eq!(LedgerError::BetNotFound(3).kind(), ErrorKind::NotFound);
        assert_eq!(
            LedgerError::AlreadyResolved { bet_id: 3, status: BetStatus::Won }.kind(),
            ErrorKind::AlreadyResolved
        );
        let unavailable = LedgerError::ExternalUnavailable {
            market_id: "m1".into(),
            message: "timeout".into(),
        };
        assert!(unavailable.is_retryable());
        assert!(!LedgerError::Corrupt("bad".into()).is_retryable());
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = LedgerError::InsufficientFunds { needed: dec!(600), available: dec!(500) };
        assert_eq!(err.to_string(), "Insufficient funds: need $600.00, have $500.00");
    }
}
