//! Strategy helpers: stake sizing for caller-chosen markets.

pub mod sizing;

pub use sizing::{SizedStake, SizingConfig, StakeSizer};
