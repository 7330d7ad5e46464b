//! Resolver: settle pending bets against a market oracle.
//!
//! Each distinct market is looked up once per run under a bounded timeout.
//! Oracle failures leave bets PENDING and are reported, never turned into
//! losses. Re-running is always safe: the ledger refuses to settle a bet
//! twice, and that refusal is reported as a skip.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::ledger::Ledger;
use crate::platforms::{MarketOracle, MarketStatus, OracleError};
use crate::types::{Bet, BetId, ErrorKind, LedgerError, ReconcileSummary};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Refund policy for markets that close without a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoidPolicy {
    /// Refund nothing: the stake is lost.
    #[default]
    None,
    /// Refund the full stake.
    Stake,
}

impl VoidPolicy {
    pub fn refund_for(&self, bet: &Bet) -> Decimal {
        match self {
            VoidPolicy::None => Decimal::ZERO,
            VoidPolicy::Stake => bet.amount,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Upper bound on one market lookup, retries included.
    pub timeout: Duration,
    pub void_policy: VoidPolicy,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            void_policy: VoidPolicy::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Won { payout: Decimal, profit: Decimal },
    Lost { profit: Decimal },
    Voided { refund: Decimal, profit: Decimal },
    Skipped { reason: String },
    /// The bet was left PENDING. `kind` and `retryable` come from the
    /// underlying `LedgerError`.
    Error {
        kind: ErrorKind,
        retryable: bool,
        message: String,
    },
}

impl ReconcileOutcome {
    pub fn from_error(err: &LedgerError) -> Self {
        ReconcileOutcome::Error {
            kind: err.kind(),
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

/// What happened to one pending bet.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub bet_id: BetId,
    pub market_id: String,
    pub outcome: ReconcileOutcome,
}

impl fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}] ", self.bet_id, self.market_id)?;
        match &self.outcome {
            ReconcileOutcome::Won { payout, profit } => {
                write!(f, "WON payout ${payout:.2} profit ${profit:+.2}")
            }
            ReconcileOutcome::Lost { profit } => write!(f, "LOST profit ${profit:+.2}"),
            ReconcileOutcome::Voided { refund, profit } => {
                write!(f, "VOIDED refund ${refund:.2} profit ${profit:+.2}")
            }
            ReconcileOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            ReconcileOutcome::Error { message, retryable: true, .. } => {
                write!(f, "error: {message} (retried next run)")
            }
            ReconcileOutcome::Error { message, .. } => write!(f, "error: {message}"),
        }
    }
}

/// Count results by outcome.
pub fn summarize(results: &[ReconciliationResult]) -> ReconcileSummary {
    let mut summary = ReconcileSummary {
        checked: results.len() as u64,
        ..Default::default()
    };
    for result in results {
        match result.outcome {
            ReconcileOutcome::Won { .. } => summary.won += 1,
            ReconcileOutcome::Lost { .. } => summary.lost += 1,
            ReconcileOutcome::Voided { .. } => summary.voided += 1,
            ReconcileOutcome::Skipped { .. } => summary.skipped += 1,
            ReconcileOutcome::Error { .. } => summary.errors += 1,
        }
    }
    summary
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct Resolver<'a> {
    ledger: &'a Ledger,
    oracle: &'a dyn MarketOracle,
    settings: ResolverSettings,
}

impl<'a> Resolver<'a> {
    pub fn new(ledger: &'a Ledger, oracle: &'a dyn MarketOracle, settings: ResolverSettings) -> Self {
        Self {
            ledger,
            oracle,
            settings,
        }
    }

    /// One bounded oracle lookup. Timeouts become `OracleError::Timeout`.
    async fn lookup(&self, market_id: &str) -> Result<MarketStatus, OracleError> {
        match tokio::time::timeout(self.settings.timeout, self.oracle.market_status(market_id)).await
        {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.settings.timeout)),
        }
    }

    /// Settle each bet in `pending` that its market allows.
    ///
    /// Returns one result per input bet, in input order. Only storage
    /// failures abort the run.
    pub async fn reconcile(
        &self,
        pending: &[Bet],
    ) -> Result<Vec<ReconciliationResult>, LedgerError> {
        let mut statuses: HashMap<&str, Result<MarketStatus, LedgerError>> = HashMap::new();
        let mut results = Vec::with_capacity(pending.len());

        for bet in pending {
            if !statuses.contains_key(bet.market_id.as_str()) {
                let status = self.lookup(&bet.market_id).await.map_err(|e| {
                    warn!(market_id = %bet.market_id, error = %e, "Oracle lookup failed");
                    e.into_ledger_error(&bet.market_id)
                });
                statuses.insert(bet.market_id.as_str(), status);
            }

            let outcome = match statuses.get(bet.market_id.as_str()) {
                Some(Ok(status)) => self.apply(bet, status).await?,
                Some(Err(err)) => ReconcileOutcome::from_error(err),
                None => ReconcileOutcome::from_error(&LedgerError::ExternalUnavailable {
                    market_id: bet.market_id.clone(),
                    message: "market status missing".to_string(),
                }),
            };

            debug!(bet_id = bet.id, market_id = %bet.market_id, outcome = ?outcome, "Bet reconciled");
            results.push(ReconciliationResult {
                bet_id: bet.id,
                market_id: bet.market_id.clone(),
                outcome,
            });
        }

        Ok(results)
    }

    /// Act on one bet given its market's status.
    async fn apply(&self, bet: &Bet, status: &MarketStatus) -> Result<ReconcileOutcome, LedgerError> {
        let settled = match status {
            MarketStatus::NotFound => {
                return Ok(ReconcileOutcome::Skipped {
                    reason: "market not found".to_string(),
                })
            }
            MarketStatus::Open => {
                return Ok(ReconcileOutcome::Skipped {
                    reason: "market still open".to_string(),
                })
            }
            MarketStatus::ClosedWithoutWinner => {
                let refund = self.settings.void_policy.refund_for(bet);
                self.ledger.void(bet.id, refund).await.map(|b| ReconcileOutcome::Voided {
                    refund: b.payout,
                    profit: b.profit,
                })
            }
            MarketStatus::Resolved { winning_outcome } => {
                let won = bet.wins_against(winning_outcome);
                let payout = if won { bet.winning_payout() } else { Decimal::ZERO };
                self.ledger.resolve(bet.id, won, payout).await.map(|b| {
                    if won {
                        ReconcileOutcome::Won {
                            payout: b.payout,
                            profit: b.profit,
                        }
                    } else {
                        ReconcileOutcome::Lost { profit: b.profit }
                    }
                })
            }
        };

        match settled {
            Ok(outcome) => Ok(outcome),
            Err(LedgerError::AlreadyResolved { status, .. }) => Ok(ReconcileOutcome::Skipped {
                reason: format!("already {status}"),
            }),
            Err(LedgerError::BetNotFound(_)) => Ok(ReconcileOutcome::Skipped {
                reason: "bet no longer in ledger".to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Reconcile every pending bet, log the run, and snapshot the result.
    pub async fn run(&self) -> Result<(Vec<ReconciliationResult>, ReconcileSummary), LedgerError> {
        let pending = self.ledger.pending().await?;
        info!(
            pending = pending.len(),
            oracle = self.oracle.name(),
            mode = %self.ledger.mode(),
            "Reconciling pending bets"
        );

        let results = self.reconcile(&pending).await?;
        let summary = summarize(&results);
        self.ledger.record_reconcile_run(&summary).await?;
        self.ledger.save_snapshot().await?;

        info!(
            checked = summary.checked,
            won = summary.won,
            lost = summary.lost,
            voided = summary.voided,
            skipped = summary.skipped,
            errors = summary.errors,
            "Reconcile run complete"
        );

        Ok((results, summary))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
