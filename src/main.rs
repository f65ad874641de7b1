//! Magnet Risk Engine - Main Entry Point
//!
//! One-shot risk calculations and historical backtests from the command line.
//! Every command prints its result as JSON on stdout; logs go to stderr and
//! `logs/`.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use magnet_risk_engine::backtest::{BacktestConfig, BacktestEngine, CsvBarLoader, DataLoader};
use magnet_risk_engine::config::Config;
use magnet_risk_engine::magnet::{MagnetState, TradeSetup};
use magnet_risk_engine::risk::{
    AccountState, LeverageEngine, MarketConditions, PositionSizer, SurvivalFuse,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Magnet Risk Engine CLI
#[derive(Parser)]
#[command(name = "magnet-risk-engine")]
#[command(version, about = "Survival-first leverage, fuse and position sizing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate magnet-aware leverage
    Leverage {
        /// Primary magnet price
        #[arg(long)]
        magnet_price: Decimal,

        /// Current market price
        #[arg(long)]
        price: Decimal,

        /// Magnet strength (0-100)
        #[arg(long)]
        strength: Decimal,

        #[arg(long, default_value = "0")]
        conflict: Decimal,

        #[arg(long, default_value = "0")]
        volatility: Decimal,

        /// Average true range
        #[arg(long)]
        atr: Decimal,
    },

    /// Size a position for a trade setup
    Size {
        #[arg(long)]
        equity: Decimal,

        /// Value of already open positions
        #[arg(long, default_value = "0")]
        open_value: Decimal,

        #[arg(long)]
        entry: Decimal,

        #[arg(long)]
        stop: Decimal,

        /// Magnet (target) price
        #[arg(long)]
        target: Decimal,

        /// Magnet tier (1-4)
        #[arg(long, default_value = "1")]
        tier: u8,

        #[arg(long)]
        leverage: Decimal,
    },

    /// Evaluate survival fuse triggers on a fresh fuse
    Fuse {
        #[arg(long)]
        volatility: Decimal,

        /// Account drawdown in %
        #[arg(long)]
        drawdown: Decimal,

        #[arg(long)]
        conflict: Decimal,

        #[arg(long)]
        primary_strength: Decimal,

        #[arg(long)]
        secondary_strength: Decimal,

        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        trend_aligned: bool,

        /// Liquidity score (0-100)
        #[arg(long)]
        liquidity: Decimal,
    },

    /// Run a backtest simulation on historical bars
    Backtest {
        /// Path to CSV data file
        #[arg(short, long)]
        data: String,

        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(short, long)]
        end: String,

        /// Initial equity for simulation
        #[arg(short = 'b', long, default_value = "430000")]
        initial_equity: Decimal,

        /// Probability of reaching the magnet before the stop
        #[arg(long, default_value = "0.65")]
        win_rate: f64,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Leave a tripped fuse in cooldown instead of re-arming it
        #[arg(long)]
        no_operator_reset: bool,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;

    match cli.command {
        Commands::Leverage {
            magnet_price,
            price,
            strength,
            conflict,
            volatility,
            atr,
        } => {
            let engine = LeverageEngine::new(config.leverage)?;
            let state = MagnetState {
                primary_magnet_price: magnet_price,
                current_price: price,
                magnet_strength: strength,
                conflict_index: conflict,
                volatility_pressure: volatility,
                atr,
            };
            print_json(&engine.calculate_leverage(&state))
        }
        Commands::Size {
            equity,
            open_value,
            entry,
            stop,
            target,
            tier,
            leverage,
        } => {
            let sizer = PositionSizer::new(config.sizing)?;
            let account = AccountState {
                equity,
                available_margin: equity,
                open_positions_value: open_value,
                ..Default::default()
            };
            let trade = TradeSetup {
                entry_price: entry,
                stop_price: stop,
                magnet_price: target,
                magnet_tier: tier,
                leverage,
            };
            print_json(&sizer.calculate_position_size(&account, &trade))
        }
        Commands::Fuse {
            volatility,
            drawdown,
            conflict,
            primary_strength,
            secondary_strength,
            trend_aligned,
            liquidity,
        } => {
            let mut fuse = SurvivalFuse::new(config.fuse)?;
            let conditions = MarketConditions {
                volatility_pressure: volatility,
                account_drawdown_pct: drawdown,
                conflict_index: conflict,
                primary_magnet_strength: primary_strength,
                secondary_magnet_strength: secondary_strength,
                trend_aligned,
                liquidity_score: liquidity,
            };
            print_json(&fuse.check_triggers(&conditions))
        }
        Commands::Backtest {
            data,
            start,
            end,
            initial_equity,
            win_rate,
            seed,
            no_operator_reset,
            output,
        } => {
            let backtest_config = BacktestConfig {
                initial_equity,
                win_rate,
                seed,
                operator_reset_on_cooldown: !no_operator_reset,
                ..Default::default()
            };
            run_backtest(config, backtest_config, &data, &start, &end, output.as_deref())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_backtest(
    config: Config,
    backtest_config: BacktestConfig,
    data_path: &str,
    start_str: &str,
    end_str: &str,
    output_dir: Option<&str>,
) -> Result<()> {
    let start_date = NaiveDate::parse_from_str(start_str, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid start date '{}': {}", start_str, e))?;
    let end_date = NaiveDate::parse_from_str(end_str, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid end date '{}': {}", end_str, e))?;

    let start = start_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid start time"))?
        .and_utc();
    let end = end_date
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| anyhow::anyhow!("Invalid end time"))?
        .and_utc();

    info!("📊 Loading data from: {}", data_path);
    let data_loader = CsvBarLoader::new(data_path)?;

    if let Some((data_start, data_end)) = data_loader.available_range() {
        info!(
            "   Data range: {} to {}",
            data_start.format("%Y-%m-%d"),
            data_end.format("%Y-%m-%d")
        );
    }
    info!("   Bars: {}", data_loader.len());
    info!("💰 Initial equity: ${:.2}", backtest_config.initial_equity);

    let engine = BacktestEngine::new(data_loader, config, backtest_config);
    let result = engine.run(start, end)?;

    eprintln!("\n{}", result.summary());

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
        result.equity_to_csv(&format!("{}/equity_curve.csv", dir))?;
        result.trades_to_csv(&format!("{}/trades.csv", dir))?;
        std::fs::write(
            format!("{}/metrics.json", dir),
            serde_json::to_string_pretty(&result.metrics)?,
        )?;
        info!("📁 Results saved to {}", dir);
    }

    print_json(&result.metrics)
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "magnet-risk.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("magnet_risk_engine=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stderr.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .init();

    Ok(())
}
