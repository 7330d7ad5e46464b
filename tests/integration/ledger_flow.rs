//! End-to-end flows: place, reconcile, reopen, reset.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use tokio_test::{assert_err, assert_ok};

use papertrail::config::LedgerConfig;
use papertrail::engine::{Ledger, ReconcileOutcome, Resolver, ResolverSettings, VoidPolicy};
use papertrail::platforms::MarketStatus;
use papertrail::types::{BetRequest, BetStatus, ErrorKind, LedgerEvent, Side, TradingMode};

use crate::mock_oracle::ScriptedOracle;

struct TempDir(PathBuf);

impl TempDir {
    fn new() -> Self {
        let mut p = std::env::temp_dir();
        p.push(format!("papertrail_it_{}", uuid::Uuid::new_v4()));
        Self(p)
    }

    fn config(&self) -> LedgerConfig {
        LedgerConfig {
            data_dir: self.0.clone(),
            ..LedgerConfig::default()
        }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

async fn open(cfg: &LedgerConfig, mode: TradingMode) -> Ledger {
    Ledger::open(&cfg.db_path(mode), mode, cfg.starting_cash)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_cycle_survives_reopen() {
    let dir = TempDir::new();
    let cfg = dir.config();
    let oracle = ScriptedOracle::new();

    {
        let ledger = open(&cfg, TradingMode::Paper).await;
        ledger
            .place(&BetRequest::new("m1", Side::Yes, dec!(50), dec!(0.80)).with_description("Q1"))
            .await
            .unwrap();
        ledger
            .place(&BetRequest::new("m2", Side::No, dec!(20), dec!(0.30)))
            .await
            .unwrap();
        ledger
            .place(&BetRequest::new("m3", Side::Yes, dec!(10), dec!(0.50)))
            .await
            .unwrap();

        oracle.resolve("m1", "YES");
        oracle.resolve("m2", "YES");
        oracle.set("m3", MarketStatus::Open);

        let resolver = Resolver::new(&ledger, &oracle, ResolverSettings::default());
        let (_, summary) = resolver.run().await.unwrap();
        assert_eq!(summary.won, 1);
        assert_eq!(summary.lost, 1);
        assert_eq!(summary.skipped, 1);
        ledger.close().await;
    }

    let ledger = open(&cfg, TradingMode::Paper).await;
    let stats = ledger.snapshot().await.unwrap();
    // 500 - 50 - 20 - 10 + 62.5
    assert_eq!(stats.cash, dec!(482.5));
    assert_eq!(stats.pending_invested, dec!(10));
    assert_eq!(stats.total_value, dec!(492.5));
    assert_eq!(stats.realized_pnl, dec!(-7.5));
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.losses, 1);
    assert_eq!(stats.pending, 1);
    assert!((stats.win_rate() - 0.5).abs() < f64::EPSILON);
    assert_eq!(ledger.replay_cash().await.unwrap(), stats.cash);
    assert_eq!(ledger.snapshots(None).await.unwrap().len(), 1);
    ledger.close().await;
}

#[tokio::test]
async fn test_starting_cash_is_seeded_once() {
    let dir = TempDir::new();
    let cfg = dir.config();

    let ledger = open(&cfg, TradingMode::Paper).await;
    ledger.reset(dec!(750), false).await.unwrap();
    ledger.close().await;

    // Reopening with the configured default keeps the stored value.
    let ledger = open(&cfg, TradingMode::Paper).await;
    assert_eq!(ledger.starting_cash().await.unwrap(), dec!(750));
    assert_eq!(
        ledger.history(None, Some("LEDGER_OPENED")).await.unwrap().len(),
        1
    );
    ledger.close().await;
}

#[tokio::test]
async fn test_paper_and_live_are_isolated() {
    let dir = TempDir::new();
    let cfg = dir.config();

    let paper = open(&cfg, TradingMode::Paper).await;
    let live = open(&cfg, TradingMode::Live).await;

    paper
        .place(&BetRequest::new("m1", Side::Yes, dec!(100), dec!(0.5)))
        .await
        .unwrap();

    assert_eq!(paper.snapshot().await.unwrap().cash, dec!(400));
    assert_eq!(live.snapshot().await.unwrap().cash, dec!(500));
    assert!(live.bets().await.unwrap().is_empty());
    assert_eq!(live.snapshot().await.unwrap().mode, TradingMode::Live);
    assert!(cfg.db_path(TradingMode::Live).exists());

    paper.close().await;
    live.close().await;
}

#[tokio::test]
async fn test_one_lookup_per_market_and_rerun_is_safe() {
    let ledger = Ledger::in_memory(TradingMode::Paper, dec!(500)).await.unwrap();
    for _ in 0..3 {
        ledger
            .place(&BetRequest::new("shared", Side::Yes, dec!(10), dec!(0.25)))
            .await
            .unwrap();
    }
    let oracle = ScriptedOracle::new();
    oracle.resolve("shared", "yes");

    let resolver = Resolver::new(&ledger, &oracle, ResolverSettings::default());
    let pending = ledger.pending().await.unwrap();
    let first = resolver.reconcile(&pending).await.unwrap();
    assert_eq!(oracle.calls("shared"), 1);
    assert!(first
        .iter()
        .all(|r| matches!(r.outcome, ReconcileOutcome::Won { .. })));
    let cash_after = ledger.snapshot().await.unwrap().cash;
    assert_eq!(cash_after, dec!(590));

    // Re-running on the stale list settles nothing twice.
    let second = resolver.reconcile(&pending).await.unwrap();
    assert!(second
        .iter()
        .all(|r| matches!(r.outcome, ReconcileOutcome::Skipped { .. })));
    assert_eq!(ledger.snapshot().await.unwrap().cash, cash_after);
    assert_eq!(
        ledger.history(None, Some("BET_RESOLVED")).await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_oracle_outage_changes_nothing() {
    let ledger = Ledger::in_memory(TradingMode::Paper, dec!(500)).await.unwrap();
    ledger
        .place(&BetRequest::new("down", Side::No, dec!(25), dec!(0.6)))
        .await
        .unwrap();
    let before = ledger.bets().await.unwrap();

    let oracle = ScriptedOracle::new();
    oracle.fail("down", 503);

    let resolver = Resolver::new(&ledger, &oracle, ResolverSettings::default());
    let (results, summary) = resolver.run().await.unwrap();

    assert_eq!(summary.errors, 1);
    assert!(matches!(
        results[0].outcome,
        ReconcileOutcome::Error { kind: ErrorKind::ExternalUnavailable, retryable: true, .. }
    ));
    assert_eq!(ledger.bets().await.unwrap(), before);

    // Next run, the market has resolved.
    oracle.resolve("down", "NO");
    let (_, summary) = resolver.run().await.unwrap();
    assert_eq!(summary.won, 1);
    let bet = ledger.bet(before[0].id).await.unwrap();
    assert_eq!(bet.status, BetStatus::Won);
    assert_eq!(bet.payout, dec!(25) / dec!(0.4));
}

#[tokio::test]
async fn test_multi_outcome_market() {
    let ledger = Ledger::in_memory(TradingMode::Paper, dec!(500)).await.unwrap();
    let backer = ledger
        .place(
            &BetRequest::new("election", Side::Yes, dec!(30), dec!(0.40)).with_outcome("Harris"),
        )
        .await
        .unwrap();
    let fader = ledger
        .place(&BetRequest::new("election", Side::No, dec!(30), dec!(0.40)).with_outcome("Harris"))
        .await
        .unwrap();

    let oracle = ScriptedOracle::new();
    oracle.resolve("election", "Trump");

    let resolver = Resolver::new(&ledger, &oracle, ResolverSettings::default());
    resolver.run().await.unwrap();

    assert_eq!(ledger.bet(backer).await.unwrap().status, BetStatus::Lost);
    let fade = ledger.bet(fader).await.unwrap();
    assert_eq!(fade.status, BetStatus::Won);
    assert_eq!(fade.payout, dec!(50));
}

#[tokio::test]
async fn test_void_policies_end_to_end() {
    let oracle = ScriptedOracle::new();
    oracle.set("cancelled", MarketStatus::ClosedWithoutWinner);

    for (policy, expected_cash) in [(VoidPolicy::None, dec!(460)), (VoidPolicy::Stake, dec!(500))] {
        let ledger = Ledger::in_memory(TradingMode::Paper, dec!(500)).await.unwrap();
        ledger
            .place(&BetRequest::new("cancelled", Side::Yes, dec!(40), dec!(0.5)))
            .await
            .unwrap();

        let settings = ResolverSettings {
            void_policy: policy,
            ..Default::default()
        };
        let (_, summary) = Resolver::new(&ledger, &oracle, settings).run().await.unwrap();
        assert_eq!(summary.voided, 1);
        assert_eq!(ledger.snapshot().await.unwrap().cash, expected_cash);
        assert_eq!(ledger.replay_cash().await.unwrap(), expected_cash);
    }
}

#[tokio::test]
async fn test_reset_with_pending_keeps_audit_trail() {
    let ledger = Ledger::in_memory(TradingMode::Live, dec!(500)).await.unwrap();
    let a = ledger
        .place(&BetRequest::new("a", Side::Yes, dec!(10), dec!(0.5)))
        .await
        .unwrap();
    let b = ledger
        .place(&BetRequest::new("b", Side::Yes, dec!(10), dec!(0.5)))
        .await
        .unwrap();
    ledger.resolve(a, false, Decimal::ZERO).await.unwrap();

    let report = assert_ok!(ledger.reset(dec!(200), true).await);
    assert_eq!(report.pending_closed, 1);

    let archived_events = ledger.history(None, Some("BET_ARCHIVED")).await.unwrap();
    assert_eq!(archived_events.len(), 1);
    match &archived_events[0].event {
        LedgerEvent::BetArchived { bet_id, archive_id, amount, .. } => {
            assert_eq!(*bet_id, b);
            assert_eq!(Some(archive_id.clone()), report.archive_id);
            assert_eq!(*amount, dec!(10));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Old ids are gone from the live table but kept in the archive.
    let err = assert_err!(ledger.bet(a).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(ledger.archived_bets().await.unwrap().len(), 2);

    // Fresh bets start from the new cash.
    ledger
        .place(&BetRequest::new("c", Side::No, dec!(200), dec!(0.5)))
        .await
        .unwrap();
    let err = assert_err!(
        ledger
            .place(&BetRequest::new("d", Side::No, dec!(0.01), dec!(0.5)))
            .await
    );
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(ledger.replay_cash().await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
async fn test_resolver_payouts_replay_exactly() {
    let ledger = Ledger::in_memory(TradingMode::Paper, dec!(500)).await.unwrap();
    let book = [
        ("a", Side::Yes, dec!(20), dec!(0.7)),
        ("b", Side::Yes, dec!(10), dec!(0.3)),
        ("c", Side::Yes, dec!(7), dec!(0.3)),
        ("d", Side::No, dec!(13), dec!(0.3)),
        ("e", Side::Yes, dec!(11), dec!(0.9)),
        ("f", Side::No, dec!(3.33), dec!(0.9)),
    ];
    let oracle = ScriptedOracle::new();
    for (market, side, amount, price) in book {
        ledger
            .place(&BetRequest::new(market, side, amount, price))
            .await
            .unwrap();
        let winner = if side == Side::Yes { "YES" } else { "NO" };
        oracle.resolve(market, winner);
    }

    let resolver = Resolver::new(&ledger, &oracle, ResolverSettings::default());
    let (_, summary) = resolver.run().await.unwrap();
    assert_eq!(summary.won, 6);

    let stats = ledger.snapshot().await.unwrap();
    assert_eq!(ledger.replay_cash().await.unwrap(), stats.cash);
    for bet in ledger.bets().await.unwrap() {
        assert_eq!(bet.payout, bet.shares);
        assert!(bet.shares.normalize().scale() <= 8);
    }
}
