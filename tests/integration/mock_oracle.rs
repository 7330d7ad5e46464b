//! Scripted oracle for integration testing.
//!
//! Provides a deterministic `MarketOracle` whose answers are set from test
//! code, with per-market call counts. All state is in-memory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use papertrail::platforms::{MarketOracle, MarketStatus, OracleError};

/// A market oracle whose per-market answers are scripted by the test.
///
/// Unknown markets report `NotFound`.
#[derive(Clone, Default)]
pub struct ScriptedOracle {
    answers: Arc<Mutex<HashMap<String, Result<MarketStatus, u16>>>>,
    calls: Arc<Mutex<HashMap<String, u32>>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `status` for `market_id` from now on.
    pub fn set(&self, market_id: &str, status: MarketStatus) {
        self.answers
            .lock()
            .unwrap()
            .insert(market_id.to_string(), Ok(status));
    }

    pub fn resolve(&self, market_id: &str, winner: &str) {
        self.set(market_id, MarketStatus::resolved(winner));
    }

    /// Fail lookups of `market_id` with an HTTP status error.
    pub fn fail(&self, market_id: &str, http_status: u16) {
        self.answers
            .lock()
            .unwrap()
            .insert(market_id.to_string(), Err(http_status));
    }

    /// Number of lookups made for `market_id`.
    pub fn calls(&self, market_id: &str) -> u32 {
        self.calls.lock().unwrap().get(market_id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl MarketOracle for ScriptedOracle {
    async fn market_status(&self, market_id: &str) -> Result<MarketStatus, OracleError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(market_id.to_string())
            .or_insert(0) += 1;

        match self.answers.lock().unwrap().get(market_id) {
            Some(Ok(status)) => Ok(status.clone()),
            Some(Err(code)) => Err(OracleError::Status {
                status: *code,
                body: "scripted failure".to_string(),
            }),
            None => Ok(MarketStatus::NotFound),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
