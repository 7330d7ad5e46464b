//! Configuration loading from TOML with environment overrides.
//!
//! Reads `papertrail.toml` into strongly-typed structs. Every field has a
//! default, so a missing file or a partial file is fine. `PAPERTRAIL_DATA_DIR`
//! and `PAPERTRAIL_MODE` override the file (a `.env` is loaded first by the
//! binary).

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::engine::resolver::{ResolverSettings, VoidPolicy};
use crate::platforms::retry::RetryConfig;
use crate::platforms::Platform;
use crate::strategy::SizingConfig;
use crate::types::{validate_money, TradingMode};

pub const DEFAULT_CONFIG_FILE: &str = "papertrail.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    pub resolver: ResolverConfig,
    pub sizing: SizingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding one `<mode>.db` per trading mode.
    pub data_dir: PathBuf,
    pub default_mode: TradingMode,
    /// Seeds a fresh ledger. An existing ledger keeps its stored value.
    pub starting_cash: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_mode: TradingMode::Paper,
            starting_cash: dec!(500),
        }
    }
}

impl LedgerConfig {
    pub fn db_path(&self, mode: TradingMode) -> PathBuf {
        self.data_dir.join(format!("{mode}.db"))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    pub platform: Platform,
    pub timeout_secs: u64,
    /// Refund for markets closed without a winner: `none` or `stake`.
    pub void_refund: VoidPolicy,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Manifold,
            timeout_secs: 15,
            void_refund: VoidPolicy::None,
            max_retries: 2,
            initial_backoff_ms: 250,
        }
    }
}

impl ResolverConfig {
    pub fn settings(&self) -> ResolverSettings {
        ResolverSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            void_policy: self.void_refund,
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, self.initial_backoff_ms)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!(path, "No config file found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PAPERTRAIL_DATA_DIR` / `PAPERTRAIL_MODE` from the environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("PAPERTRAIL_DATA_DIR") {
            self.ledger.data_dir = PathBuf::from(dir);
        }
        if let Ok(mode) = std::env::var("PAPERTRAIL_MODE") {
            self.ledger.default_mode = mode
                .parse()
                .with_context(|| format!("Invalid PAPERTRAIL_MODE: {mode}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_money(self.ledger.starting_cash).context(
            "ledger.starting_cash must be non-negative, at most 1e12 with 8 decimal places",
        )?;
        if self.resolver.timeout_secs == 0 {
            anyhow::bail!("resolver.timeout_secs must be at least 1");
        }
        let sizing = &self.sizing;
        if sizing.kelly_multiplier <= Decimal::ZERO || sizing.kelly_multiplier > Decimal::ONE {
            anyhow::bail!("sizing.kelly_multiplier must be in (0, 1]");
        }
        if sizing.max_bet_pct <= Decimal::ZERO || sizing.max_bet_pct > Decimal::ONE {
            anyhow::bail!("sizing.max_bet_pct must be in (0, 1]");
        }
        if sizing.min_stake < Decimal::ZERO {
            anyhow::bail!("sizing.min_stake must not be negative");
        }
        Ok(())
    }
}
