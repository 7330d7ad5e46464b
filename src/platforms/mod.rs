//! Market oracles.
//!
//! Defines the `MarketOracle` trait the resolver queries for settlement,
//! and read-only implementations for:
//! - Manifold Markets (`/v0/market/{id}`)
//! - Polymarket Gamma (`/markets/{id}`)
//!
//! Both clients share the retry policy in `retry`.

pub mod manifold;
pub mod polymarket;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::types::LedgerError;
use manifold::ManifoldClient;
use polymarket::PolymarketClient;
use retry::RetryConfig;

/// User agent sent by every oracle client.
pub(crate) const USER_AGENT: &str = "PAPERTRAIL/0.1.0 (paper-trading-ledger)";

/// Per-request HTTP timeout. The resolver applies its own, usually
/// shorter, bound around the whole lookup including retries.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Market status
// ---------------------------------------------------------------------------

/// What an oracle knows about a market's settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketStatus {
    NotFound,
    Open,
    Resolved { winning_outcome: String },
    ClosedWithoutWinner,
}

impl MarketStatus {
    pub fn resolved(winning_outcome: &str) -> Self {
        MarketStatus::Resolved {
            winning_outcome: winning_outcome.to_string(),
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::NotFound => f.write_str("not found"),
            MarketStatus::Open => f.write_str("open"),
            MarketStatus::Resolved { winning_outcome } => write!(f, "resolved {winning_outcome}"),
            MarketStatus::ClosedWithoutWinner => f.write_str("closed without winner"),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures talking to an oracle. None of them say anything about the
/// market's outcome.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl OracleError {
    /// Transient failures worth another attempt: connection problems,
    /// timeouts, rate limiting and server errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            OracleError::Status { status, .. } => *status == 429 || *status >= 500,
            OracleError::Timeout(_) => true,
            OracleError::Decode(_) => false,
        }
    }

    pub fn into_ledger_error(self, market_id: &str) -> LedgerError {
        LedgerError::ExternalUnavailable {
            market_id: market_id.to_string(),
            message: self.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Source of truth for whether, and how, a market resolved.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketOracle: Send + Sync {
    /// Look up settlement status by market id.
    async fn market_status(&self, market_id: &str) -> Result<MarketStatus, OracleError>;

    /// Platform name for logging and identification.
    fn name(&self) -> &'static str;
}

/// Supported oracle platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Manifold,
    Polymarket,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Manifold => f.write_str("manifold"),
            Platform::Polymarket => f.write_str("polymarket"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manifold" => Ok(Platform::Manifold),
            "polymarket" => Ok(Platform::Polymarket),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown platform: {other} (expected manifold or polymarket)"
            ))),
        }
    }
}

/// Build the HTTP oracle for `platform`.
pub fn build_oracle(platform: Platform, retry: RetryConfig) -> anyhow::Result<Box<dyn MarketOracle>> {
    let oracle: Box<dyn MarketOracle> = match platform {
        Platform::Manifold => Box::new(ManifoldClient::new(retry)?),
        Platform::Polymarket => Box::new(PolymarketClient::new(retry)?),
    };
    Ok(oracle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
