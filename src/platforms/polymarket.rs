//! Polymarket settlement lookups via the Gamma API.
//!
//! Gamma API: https://gamma-api.polymarket.com (no auth required)
//!
//! A closed market reports `winningOutcome` when the UMA resolution has
//! been indexed. When it hasn't, the final `outcomePrices` still pin the
//! winner at (or within a cent of) 1.0.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

use super::retry::{with_retry, RetryConfig};
use super::{MarketOracle, MarketStatus, OracleError, HTTP_TIMEOUT, USER_AGENT};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";
const PLATFORM_NAME: &str = "polymarket";

/// Final price at or above which an outcome is taken as the winner.
const WINNER_PRICE: Decimal = dec!(0.99);

// ---------------------------------------------------------------------------
// Gamma API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GammaMarket {
    #[serde(default)]
    question: String,
    #[serde(default)]
    closed: bool,
    #[serde(default, rename = "winningOutcome")]
    winning_outcome: Option<String>,
    /// JSON-encoded string list, e.g. "[\"Yes\",\"No\"]". Some responses
    /// send a plain array instead.
    #[serde(default)]
    outcomes: Option<serde_json::Value>,
    /// JSON-encoded string list, e.g. "[\"1\",\"0\"]".
    #[serde(default, rename = "outcomePrices")]
    outcome_prices: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PolymarketClient {
    http: Client,
    base_url: String,
    retry: RetryConfig,
}

impl PolymarketClient {
    pub fn new(retry: RetryConfig) -> Result<Self> {
        Self::with_base_url(GAMMA_API_URL, retry)
    }

    pub fn with_base_url(base_url: &str, retry: RetryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for Polymarket")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn fetch_market(&self, market_id: &str) -> Result<Option<GammaMarket>, OracleError> {
        let url = format!("{}/markets/{}", self.base_url, urlencoding::encode(market_id));
        debug!(url = %url, "Fetching Gamma market");

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let market = serde_json::from_str(&body)
            .map_err(|e| OracleError::Decode(format!("Gamma market {market_id}: {e}")))?;
        Ok(Some(market))
    }

    /// Decode a Gamma string list, whether sent as a JSON-encoded string
    /// or as a plain array.
    pub fn parse_string_list(value: &serde_json::Value) -> Result<Vec<String>, OracleError> {
        let items: Vec<serde_json::Value> = match value {
            serde_json::Value::String(s) if s.trim().is_empty() => return Ok(Vec::new()),
            serde_json::Value::String(s) => serde_json::from_str(s)
                .map_err(|e| OracleError::Decode(format!("bad list {s:?}: {e}")))?,
            serde_json::Value::Array(items) => items.clone(),
            serde_json::Value::Null => return Ok(Vec::new()),
            other => return Err(OracleError::Decode(format!("expected a list, got {other}"))),
        };

        items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => Ok(s),
                serde_json::Value::Number(n) => Ok(n.to_string()),
                other => Err(OracleError::Decode(format!("unexpected list item {other}"))),
            })
            .collect()
    }

    /// The single outcome priced at `WINNER_PRICE` or above, if any.
    fn winner_from_prices(market: &GammaMarket) -> Result<Option<String>, OracleError> {
        let (Some(outcomes), Some(prices)) = (&market.outcomes, &market.outcome_prices) else {
            return Ok(None);
        };
        let outcomes = Self::parse_string_list(outcomes)?;
        let prices = Self::parse_string_list(prices)?;
        if outcomes.is_empty() || outcomes.len() != prices.len() {
            return Ok(None);
        }

        let mut winners = Vec::new();
        for (outcome, price) in outcomes.iter().zip(&prices) {
            let price = Decimal::from_str(price.trim())
                .map_err(|e| OracleError::Decode(format!("bad outcome price {price:?}: {e}")))?;
            if price >= WINNER_PRICE {
                winners.push(outcome.clone());
            }
        }

        Ok(match winners.as_slice() {
            [winner] => Some(winner.clone()),
            _ => None,
        })
    }

    fn interpret(market: &GammaMarket) -> Result<MarketStatus, OracleError> {
        if !market.closed {
            return Ok(MarketStatus::Open);
        }

        if let Some(winner) = market
            .winning_outcome
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
        {
            return Ok(MarketStatus::resolved(winner));
        }

        match Self::winner_from_prices(market)? {
            Some(winner) => Ok(MarketStatus::Resolved {
                winning_outcome: winner,
            }),
            None => Ok(MarketStatus::ClosedWithoutWinner),
        }
    }
}

#[async_trait]
impl MarketOracle for PolymarketClient {
    async fn market_status(&self, market_id: &str) -> Result<MarketStatus, OracleError> {
        let market =
            with_retry(&self.retry, "polymarket.market", || self.fetch_market(market_id)).await?;

        let status = match market {
            None => MarketStatus::NotFound,
            Some(market) => {
                debug!(market_id, question = %market.question, "Gamma market fetched");
                Self::interpret(&market)?
            }
        };

        debug!(market_id, status = %status, "Polymarket market status");
        Ok(status)
    }

    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
