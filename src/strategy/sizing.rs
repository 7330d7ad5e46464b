//! Stake sizing.
//!
//! Sizes new bets as a share of current derived cash, either a fixed
//! fraction or fractional Kelly, capped per bet and rounded down to cents.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Side;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    pub kelly_multiplier: Decimal,
    /// Maximum stake as a fraction of cash.
    pub max_bet_pct: Decimal,
    /// Smallest stake worth placing.
    pub min_stake: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            kelly_multiplier: dec!(0.25),
            max_bet_pct: dec!(0.10),
            min_stake: dec!(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Sizer
// ---------------------------------------------------------------------------

/// A Kelly-sized stake recommendation.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedStake {
    /// Raw Kelly fraction before the multiplier.
    pub kelly_fraction: Decimal,
    /// Fraction of cash actually staked (after multiplier and cap).
    pub stake_fraction: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct StakeSizer {
    config: SizingConfig,
}

impl StakeSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Round down to whole cents; never stake more than was sized.
    fn to_cents(amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(2, RoundingStrategy::ToZero)
    }

    /// `cash × min(fraction, max_bet_pct)`, or `None` when that falls
    /// below the minimum stake.
    pub fn fraction_of_cash(&self, cash: Decimal, fraction: Decimal) -> Option<Decimal> {
        if cash <= Decimal::ZERO || fraction <= Decimal::ZERO {
            return None;
        }

        let fraction = fraction.min(self.config.max_bet_pct);
        let stake = Self::to_cents(cash * fraction);
        if stake < self.config.min_stake {
            debug!(
                stake = format!("${:.2}", stake),
                min = format!("${:.2}", self.config.min_stake),
                "Stake below minimum"
            );
            return None;
        }
        Some(stake)
    }

    /// Fractional Kelly stake for backing `side` at YES probability `price`,
    /// where `win_prob` is the estimated probability that `side` wins.
    ///
    /// Kelly formula: f* = (b·p − q) / b
    /// where:
    ///   e = effective price paid for the side
    ///   b = (1 − e) / e, net odds per unit staked
    ///   p = win_prob, q = 1 − p
    pub fn kelly_stake(
        &self,
        cash: Decimal,
        win_prob: Decimal,
        side: Side,
        price: Decimal,
    ) -> Option<SizedStake> {
        if cash <= Decimal::ZERO
            || price <= Decimal::ZERO
            || price >= Decimal::ONE
            || win_prob < Decimal::ZERO
            || win_prob > Decimal::ONE
        {
            return None;
        }

        let effective = side.effective_price(price);
        let odds = (Decimal::ONE - effective) / effective;
        let lose_prob = Decimal::ONE - win_prob;
        let kelly = (odds * win_prob - lose_prob) / odds;

        if kelly <= Decimal::ZERO {
            debug!(
                side = %side,
                price = %price,
                win_prob = %win_prob,
                "Negative Kelly, no bet"
            );
            return None;
        }

        let stake_fraction = (kelly * self.config.kelly_multiplier).min(self.config.max_bet_pct);
        let amount = Self::to_cents(cash * stake_fraction);
        if amount < self.config.min_stake {
            return None;
        }

        debug!(
            side = %side,
            raw_kelly = format!("{:.2}%", kelly * Decimal::ONE_HUNDRED),
            fraction = format!("{:.2}%", stake_fraction * Decimal::ONE_HUNDRED),
            amount = format!("${:.2}", amount),
            "Stake sized"
        );

        Some(SizedStake {
            kelly_fraction: kelly,
            stake_fraction,
            amount,
        })
    }
}

impl Default for StakeSizer {
    fn default() -> Self {
        Self::new(SizingConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
