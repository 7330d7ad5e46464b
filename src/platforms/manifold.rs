//! Manifold Markets settlement lookups.
//!
//! API docs: https://docs.manifold.markets/api
//! Base URL: https://api.manifold.markets/v0/
//! Auth: not required for reads.
//!
//! Resolution values: `YES`, `NO`, `MKT` (settled at a probability),
//! `CANCEL` (N/A), or an answer id on multiple-choice markets.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use super::retry::{with_retry, RetryConfig};
use super::{MarketOracle, MarketStatus, OracleError, HTTP_TIMEOUT, USER_AGENT};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://api.manifold.markets/v0";
const PLATFORM_NAME: &str = "manifold";

/// `MKT` resolutions above this probability count as YES, below as NO.
const MKT_THRESHOLD: Decimal = dec!(0.5);

// ---------------------------------------------------------------------------
// API response types (Manifold JSON → Rust)
// ---------------------------------------------------------------------------

/// The subset of `/v0/market/{id}` we need for settlement.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifoldMarket {
    id: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    is_resolved: bool,
    /// "YES" | "NO" | "MKT" | "CANCEL" | answer id.
    #[serde(default)]
    resolution: Option<String>,
    /// Set for `MKT` resolutions on binary markets.
    #[serde(default)]
    resolution_probability: Option<Decimal>,
    /// Last traded probability. Stands in for `resolution_probability`
    /// on `MKT` markets that lack it.
    #[serde(default)]
    probability: Option<Decimal>,
    /// Multiple-choice answers.
    #[serde(default)]
    answers: Vec<ManifoldAnswer>,
}

#[derive(Debug, Deserialize)]
struct ManifoldAnswer {
    id: String,
    #[serde(default)]
    text: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ManifoldClient {
    http: Client,
    base_url: String,
    retry: RetryConfig,
}

impl ManifoldClient {
    pub fn new(retry: RetryConfig) -> Result<Self> {
        Self::with_base_url(BASE_URL, retry)
    }

    /// Point the client at another deployment (a staging API or a local stub).
    pub fn with_base_url(base_url: &str, retry: RetryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for Manifold")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// One GET of the market. `None` on 404.
    async fn fetch_market(&self, market_id: &str) -> Result<Option<ManifoldMarket>, OracleError> {
        let url = format!("{}/market/{}", self.base_url, urlencoding::encode(market_id));
        debug!(url = %url, "Fetching Manifold market");

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
            .map_err(|e| OracleError::Decode(format!("Manifold market {market_id}: {e}")))?;
        Ok(Some(market))
    }

    /// Map a market's resolution fields onto a settlement status.
    fn interpret(market: &ManifoldMarket) -> Result<MarketStatus, OracleError> {
        if !market.is_resolved {
            return Ok(MarketStatus::Open);
        }

        let resolution = market
            .resolution
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                OracleError::Decode(format!("market {} is resolved without a resolution", market.id))
            })?;

        let status = match resolution.to_uppercase().as_str() {
            "YES" => MarketStatus::resolved("YES"),
            "NO" => MarketStatus::resolved("NO"),
            "CANCEL" => MarketStatus::ClosedWithoutWinner,
            "MKT" => {
                match market.resolution_probability.or(market.probability) {
                    Some(prob) if prob > MKT_THRESHOLD => MarketStatus::resolved("YES"),
                    Some(prob) if prob < MKT_THRESHOLD => MarketStatus::resolved("NO"),
                    _ => MarketStatus::ClosedWithoutWinner,
                }
            }
            _ => {
                // Multiple choice: the resolution is an answer id.
                let label = market
                    .answers
                    .iter()
                    .find(|a| a.id == resolution)
                    .map(|a| a.text.as_str())
                    .filter(|text| !text.is_empty())
                    .unwrap_or(resolution);
                MarketStatus::resolved(label)
            }
        };

        Ok(status)
    }
}

#[async_trait]
impl MarketOracle for ManifoldClient {
    async fn market_status(&self, market_id: &str) -> Result<MarketStatus, OracleError> {
        let market =
            with_retry(&self.retry, "manifold.market", || self.fetch_market(market_id)).await?;

        let status = match market {
            None => {
                debug!(market_id, "Manifold market not found");
                MarketStatus::NotFound
            }
            Some(market) => {
                let status = Self::interpret(&market)?;
                debug!(market_id, question = %market.question, status = %status, "Manifold market status");
                status
            }
        };

        Ok(status)
    }

    fn name(&self) -> &'static str {
        PLATFORM_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
