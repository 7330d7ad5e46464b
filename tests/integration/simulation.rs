//! Randomised ledger simulation.
//!
//! Drives a ledger through a seeded sequence of placements, settlements,
//! voids and repeated settlements, checking after every step that cash
//! balances against the bet table and against the replayed audit log.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use papertrail::engine::{Ledger, Resolver, ResolverSettings};
use papertrail::types::{BetRequest, BetStatus, ErrorKind, LedgerError, Side, TradingMode};

use crate::mock_oracle::ScriptedOracle;

const STARTING_CASH: Decimal = dec!(200);
const STEPS: usize = 400;

/// starting + realised profit - stake still at risk.
async fn expected_cash(ledger: &Ledger) -> Decimal {
    let bets = ledger.bets().await.unwrap();
    let settled: Decimal = bets
        .iter()
        .filter(|b| !b.is_pending())
        .map(|b| b.profit)
        .sum();
    let at_risk: Decimal = bets.iter().filter(|b| b.is_pending()).map(|b| b.amount).sum();
    ledger.starting_cash().await.unwrap() + settled - at_risk
}

async fn check_invariants(ledger: &Ledger, step: usize) -> Decimal {
    let stats = ledger.snapshot().await.unwrap();
    assert_eq!(stats.cash, expected_cash(ledger).await, "conservation broken at step {step}");
    assert_eq!(
        ledger.replay_cash().await.unwrap(),
        stats.cash,
        "replay diverged at step {step}"
    );
    assert!(stats.cash >= Decimal::ZERO, "negative cash at step {step}");
    assert_eq!(stats.total_value, stats.cash + stats.pending_invested);
    stats.cash
}

fn random_request(rng: &mut StdRng, cash: Decimal) -> BetRequest {
    // Sometimes ask for more than is available.
    let ceiling = (cash * dec!(125)).trunc().to_i64().unwrap_or(0).max(100);
    let amount = Decimal::new(rng.gen_range(1..=ceiling), 2);
    let price = Decimal::new(rng.gen_range(1..=99), 2);
    let side = if rng.gen_bool(0.5) { Side::Yes } else { Side::No };
    let market = format!("m{}", rng.gen_range(0..8));
    BetRequest::new(&market, side, amount, price)
}

async fn run_simulation(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let ledger = Ledger::in_memory(TradingMode::Paper, STARTING_CASH).await.unwrap();
    let mut ids = Vec::new();
    let mut cash = check_invariants(&ledger, 0).await;

    for step in 1..=STEPS {
        let roll = rng.gen_range(0..10);
        if roll < 5 || ids.is_empty() {
            let request = random_request(&mut rng, cash);
            match ledger.place(&request).await {
                Ok(id) => {
                    assert!(request.amount <= cash);
                    ids.push(id);
                }
                Err(LedgerError::InsufficientFunds { needed, available }) => {
                    assert!(request.amount > cash);
                    assert_eq!(needed, request.amount);
                    assert_eq!(available, cash);
                }
                Err(e) => panic!("unexpected error at step {step}: {e}"),
            }
        } else {
            let id = ids[rng.gen_range(0..ids.len())];
            let before = ledger.bet(id).await.unwrap();
            let result = if roll < 9 {
                let won = rng.gen_bool(0.5);
                let payout = if won { before.winning_payout() } else { Decimal::ZERO };
                ledger.resolve(id, won, payout).await
            } else {
                let refund = if rng.gen_bool(0.5) { before.amount } else { Decimal::ZERO };
                ledger.void(id, refund).await
            };

            match result {
                Ok(settled) => {
                    assert_eq!(before.status, BetStatus::Pending);
                    assert!(settled.status.is_terminal());
                    assert_eq!(settled.profit, settled.payout - settled.amount);
                }
                Err(e) => {
                    assert_eq!(e.kind(), ErrorKind::AlreadyResolved, "step {step}: {e}");
                    assert_eq!(ledger.bet(id).await.unwrap(), before);
                }
            }
        }

        cash = check_invariants(&ledger, step).await;
    }
}

#[tokio::test]
async fn test_random_sequences_conserve_cash() {
    for seed in [7, 42, 1234] {
        run_simulation(seed).await;
    }
}

#[tokio::test]
async fn test_resolver_rerun_after_random_book() {
    let mut rng = StdRng::seed_from_u64(99);
    let ledger = Ledger::in_memory(TradingMode::Paper, dec!(1000)).await.unwrap();
    let oracle = ScriptedOracle::new();

    for _ in 0..40 {
        let mut request = random_request(&mut rng, dec!(20));
        request.amount = Decimal::new(rng.gen_range(100..=2000), 2);
        ledger.place(&request).await.unwrap();
    }
    for market in 0..8 {
        let id = format!("m{market}");
        match market % 4 {
            0 => oracle.resolve(&id, "YES"),
            1 => oracle.resolve(&id, "NO"),
            2 => oracle.fail(&id, 500),
            _ => {}
        }
    }

    let resolver = Resolver::new(&ledger, &oracle, ResolverSettings::default());
    let (_, first) = resolver.run().await.unwrap();
    assert_eq!(first.checked, 40);
    assert!(oracle.total_calls() <= 8);

    let cash = ledger.snapshot().await.unwrap().cash;
    let (_, second) = resolver.run().await.unwrap();
    assert_eq!(second.settled(), 0);
    assert_eq!(ledger.snapshot().await.unwrap().cash, cash);
    assert_eq!(ledger.replay_cash().await.unwrap(), cash);
}
