//! PAPERTRAIL: paper-trading ledger and bet resolver
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the ledger for the selected mode, and runs one subcommand.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn};

use papertrail::config::{AppConfig, DEFAULT_CONFIG_FILE};
use papertrail::engine::{Ledger, ReconcileOutcome, Resolver};
use papertrail::platforms::{build_oracle, Platform};
use papertrail::strategy::StakeSizer;
use papertrail::types::{BetRequest, PortfolioStats, Side, TradingMode};

const BANNER: &str = r#"
 ___  _   ___ ___ ___ _____ ___    _   ___ _
| _ \/_\ | _ \ __| _ \_   _| _ \  /_\ |_ _| |
|  _/ _ \|  _/ _||   / | | |   / / _ \ | || |__
|_|/_/ \_\_| |___|_|_\ |_| |_|_\/_/ \_\___|____|

  Paper-trading ledger for prediction markets
  v0.1.0
"#;

#[derive(Parser)]
#[command(name = "papertrail")]
#[command(about = "Paper-trading ledger and bet resolver for prediction markets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Portfolio to operate on (paper | live); defaults to the configured mode
    #[arg(short, long, global = true)]
    mode: Option<TradingMode>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new bet
    Place(PlaceArgs),

    /// Show portfolio statistics
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List pending bets
    Pending,

    /// Settle pending bets against the market oracle
    Resolve {
        /// Override the configured oracle platform
        #[arg(long)]
        platform: Option<Platform>,
    },

    /// Settle one bet by hand
    Settle {
        bet_id: i64,

        /// The bet won (omit for a loss)
        #[arg(long)]
        won: bool,

        /// Payout; defaults to the bet's shares if won, 0 if lost
        #[arg(long)]
        payout: Option<Decimal>,
    },

    /// Void one bet
    Void {
        bet_id: i64,

        /// Refund; defaults to the full stake
        #[arg(long)]
        refund: Option<Decimal>,
    },

    /// Show the audit log
    History {
        /// Number of entries
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Only this event type (e.g. BET_PLACED)
        #[arg(short, long)]
        kind: Option<String>,

        /// Show archived bets instead
        #[arg(long)]
        archived: bool,
    },

    /// Start the portfolio over
    Reset {
        /// New starting cash; defaults to the configured value
        #[arg(long)]
        starting_cash: Option<Decimal>,

        /// Drop bets instead of archiving them
        #[arg(long)]
        discard: bool,

        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
struct PlaceArgs {
    /// Market id on the oracle platform
    #[arg(long)]
    market: String,

    /// YES or NO
    #[arg(long)]
    side: Side,

    /// YES probability at entry, strictly between 0 and 1
    #[arg(long)]
    price: Decimal,

    #[command(flatten)]
    stake: StakeArgs,

    /// Outcome label bet on (multi-outcome markets)
    #[arg(long, default_value = "YES")]
    outcome: String,

    /// Market question
    #[arg(long, default_value = "")]
    description: String,

    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct StakeArgs {
    /// Fixed stake
    #[arg(long)]
    amount: Option<Decimal>,

    /// Stake as a fraction of current cash
    #[arg(long)]
    fraction: Option<Decimal>,

    /// Fractional-Kelly stake given this win probability for the side
    #[arg(long)]
    kelly: Option<Decimal>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cfg = AppConfig::load(&cli.config)?;
    cfg.apply_env_overrides()?;
    cfg.validate()?;

    let mode = cli.mode.unwrap_or(cfg.ledger.default_mode);
    let db_path = cfg.ledger.db_path(mode);
    let ledger = Ledger::open(&db_path, mode, cfg.ledger.starting_cash)
        .await
        .with_context(|| format!("Failed to open ledger at {}", db_path.display()))?;

    let result = run(cli.command, &cfg, &ledger).await;
    ledger.close().await;
    result
}

async fn run(command: Commands, cfg: &AppConfig, ledger: &Ledger) -> Result<()> {
    match command {
        Commands::Place(args) => place(args, cfg, ledger).await,
        Commands::Status { json } => {
            let stats = ledger.snapshot().await.context("Failed to compute portfolio")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_status(&stats);
            }
            Ok(())
        }
        Commands::Pending => {
            let pending = ledger.pending().await?;
            print_header(&format!("PENDING BETS ({})", pending.len()));
            if pending.is_empty() {
                println!("No pending bets.");
            }
            for bet in &pending {
                println!(
                    "#{:<5} {:<24} {:<8} {:<3} ${:>9.2} @ {:.3}  {}",
                    bet.id,
                    bet.market_id,
                    bet.outcome,
                    bet.side.as_str(),
                    bet.amount,
                    bet.price,
                    bet.short_description(40),
                );
            }
            Ok(())
        }
        Commands::Resolve { platform } => {
            let platform = platform.unwrap_or(cfg.resolver.platform);
            let oracle = build_oracle(platform, cfg.resolver.retry())?;
            let resolver = Resolver::new(ledger, oracle.as_ref(), cfg.resolver.settings());
            let (results, summary) = resolver.run().await.context("Reconcile run failed")?;

            print_header(&format!("RESOLVE ({platform})"));
            for result in &results {
                match result.outcome {
                    ReconcileOutcome::Skipped { .. } => {}
                    _ => println!("{result}"),
                }
            }
            println!("{summary}");
            print_status(&ledger.snapshot().await?);
            Ok(())
        }
        Commands::Settle {
            bet_id,
            won,
            payout,
        } => {
            let bet = ledger.bet(bet_id).await?;
            let payout = payout.unwrap_or(if won { bet.winning_payout() } else { Decimal::ZERO });
            let settled = ledger
                .resolve(bet_id, won, payout)
                .await
                .with_context(|| format!("Failed to settle bet {bet_id}"))?;
            println!("{settled}");
            println!("Profit: ${:+.2}", settled.profit);
            Ok(())
        }
        Commands::Void { bet_id, refund } => {
            let bet = ledger.bet(bet_id).await?;
            let voided = ledger
                .void(bet_id, refund.unwrap_or(bet.amount))
                .await
                .with_context(|| format!("Failed to void bet {bet_id}"))?;
            println!("{voided}");
            println!("Refund: ${:.2}", voided.payout);
            Ok(())
        }
        Commands::History {
            limit,
            kind,
            archived,
        } => {
            if archived {
                let archived = ledger.archived_bets().await?;
                print_header(&format!("ARCHIVED BETS ({})", archived.len()));
                for entry in &archived {
                    println!("{} | {}", entry.archive_id, entry.bet);
                }
            } else {
                let kind = kind.map(|k| k.to_uppercase());
                let entries = ledger.history(Some(limit), kind.as_deref()).await?;
                print_header("HISTORY");
                for entry in &entries {
                    println!("{entry}");
                }
            }
            Ok(())
        }
        Commands::Reset {
            starting_cash,
            discard,
            yes,
        } => {
            if !yes {
                anyhow::bail!("Refusing to reset {} portfolio without --yes", ledger.mode());
            }
            let cash = starting_cash.unwrap_or(cfg.ledger.starting_cash);
            let report = ledger.reset(cash, !discard).await.context("Reset failed")?;
            print_header(&format!("RESET {}", ledger.mode().as_str().to_uppercase()));
            println!(
                "Starting cash: ${:.2} -> ${:.2}",
                report.previous_starting_cash, report.new_starting_cash
            );
            println!(
                "Bets cleared: {} ({} pending closed)",
                report.bets_cleared, report.pending_closed
            );
            if let Some(archive_id) = &report.archive_id {
                println!("Archived under {archive_id}");
            }
            Ok(())
        }
    }
}

async fn place(args: PlaceArgs, cfg: &AppConfig, ledger: &Ledger) -> Result<()> {
    let sizer = StakeSizer::new(cfg.sizing.clone());
    let amount = match (args.stake.amount, args.stake.fraction, args.stake.kelly) {
        (Some(amount), _, _) => amount,
        (None, Some(fraction), _) => {
            let cash = ledger.snapshot().await?.cash;
            sizer
                .fraction_of_cash(cash, fraction)
                .with_context(|| format!("Stake below minimum at {fraction} of ${cash:.2}"))?
        }
        (None, None, Some(win_prob)) => {
            let cash = ledger.snapshot().await?.cash;
            sizer
                .kelly_stake(cash, win_prob, args.side, args.price)
                .map(|sized| sized.amount)
                .with_context(|| {
                    format!("No Kelly stake for {} at {} with p={win_prob}", args.side, args.price)
                })?
        }
        (None, None, None) => anyhow::bail!("One of --amount, --fraction or --kelly is required"),
    };

    let request = BetRequest::new(&args.market, args.side, amount, args.price)
        .with_outcome(&args.outcome)
        .with_description(&args.description)
        .with_notes(&args.notes);

    let bet_id = match ledger.place(&request).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, market = %args.market, "Bet not placed");
            return Err(e).context("Failed to place bet");
        }
    };

    let bet = ledger.bet(bet_id).await?;
    info!(bet_id, mode = %ledger.mode(), "Bet recorded");
    println!("{bet}");
    println!("Cash remaining: ${:.2}", ledger.snapshot().await?.cash);
    Ok(())
}

fn print_header(title: &str) {
    println!("\n{}", "=".repeat(70));
    println!("  {title}");
    println!("{}", "=".repeat(70));
}

fn print_status(stats: &PortfolioStats) {
    print_header(&format!("{} PORTFOLIO", stats.mode.as_str().to_uppercase()));
    println!("  Starting cash:    ${:>12.2}", stats.starting_cash);
    println!("  Cash:             ${:>12.2}", stats.cash);
    println!("  Pending invested: ${:>12.2}", stats.pending_invested);
    println!("  Total value:      ${:>12.2}", stats.total_value);
    println!("  Realized P&L:     ${:>12.2}", stats.realized_pnl);
    println!("  P&L:              ${:>12.2} ({:+.1}%)", stats.pnl(), stats.pnl_pct());
    println!(
        "  Bets: {} total | {} won | {} lost | {} voided | {} pending",
        stats.total_bets, stats.wins, stats.losses, stats.voided, stats.pending
    );
    println!("  Win rate: {:.1}%", stats.win_rate() * 100.0);
    println!("  Wagered:  ${:.2}", stats.total_wagered);
}

/// Initialise the `tracing` subscriber.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "papertrail=debug" } else { "papertrail=info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let json_logging = std::env::var("PAPERTRAIL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        if verbose {
            eprintln!("{BANNER}");
        }
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
