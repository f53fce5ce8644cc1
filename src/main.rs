//! sessionbot CLI: backtests, single decisions and configuration dump.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use sessionbot::backtest::{BacktestSimulator, MarketScenario, SyntheticDataGenerator};
use sessionbot::strategy::{build_strategies, SignalSet};
use sessionbot::{AppConfig, Bar, BarSeries, DecisionContext, DecisionEngine, SignalCombiner};

#[derive(Parser)]
#[command(name = "sessionbot", about = "Intraday session trading decisions and backtests")]
struct Cli {
    /// TOML configuration file, overridden by SESSIONBOT__* variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the pipeline over a JSON bar file or a synthetic scenario
    Backtest {
        /// JSON array of bars
        #[arg(long, conflicts_with = "scenario")]
        bars: Option<PathBuf>,

        /// Synthetic scenario: uptrend, downtrend, sideways, volatile, gaps, drawdown
        #[arg(long)]
        scenario: Option<String>,

        /// Number of synthetic bars
        #[arg(long, default_value_t = 2000)]
        num_bars: usize,

        #[arg(long, default_value_t = 15)]
        timeframe_minutes: i64,

        /// Seed for synthetic data
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Print the full report as JSON instead of the summary table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Evaluate the last bar of a JSON bar file
    Decide {
        /// JSON array of bars
        bars: PathBuf,

        #[arg(long, default_value_t = 15)]
        timeframe_minutes: i64,

        /// Account equity, defaults to the backtest initial capital
        #[arg(long)]
        capital: Option<f64>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Backtest {
            bars,
            scenario,
            num_bars,
            timeframe_minutes,
            seed,
            json,
        } => {
            let bars = match (bars, scenario) {
                (Some(path), _) => load_bars(&path)?,
                (None, Some(name)) => {
                    let Some(scenario) = MarketScenario::from_name(&name) else {
                        bail!("unknown scenario: {}", name);
                    };
                    SyntheticDataGenerator::new(seed).generate(scenario, num_bars, timeframe_minutes)
                }
                (None, None) => bail!("either --bars or --scenario is required"),
            };
            run_backtest(&config, bars, timeframe_minutes, json)
        }
        Commands::Decide {
            bars,
            timeframe_minutes,
            capital,
        } => decide(&config, load_bars(&bars)?, timeframe_minutes, capital),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sessionbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let bars: Vec<Bar> = serde_json::from_str(&raw).with_context(|| format!("invalid bar file {}", path.display()))?;
    tracing::info!("Loaded {} bars from {}", bars.len(), path.display());
    Ok(bars)
}

fn signals_for(config: &AppConfig, series: &BarSeries) -> Result<SignalSet> {
    let strategies = build_strategies(&config.strategies)?;
    Ok(SignalSet::from_strategies(&strategies, series)?)
}

fn run_backtest(config: &AppConfig, bars: Vec<Bar>, timeframe_minutes: i64, json: bool) -> Result<()> {
    let series = BarSeries::new(bars, timeframe_minutes * 60_000)?;
    let signals = signals_for(config, &series)?;

    let engine = DecisionEngine::new(&config.engine_config())?;
    let combiner = SignalCombiner::new(config.combiner.clone())?;
    let mut simulator =
        BacktestSimulator::new(config.backtest.clone(), engine, combiner)?.with_kelly(&config.sizing.kelly)?;

    let report = simulator.run(&series, &signals)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.metrics.print_report();
    }
    Ok(())
}

fn decide(config: &AppConfig, bars: Vec<Bar>, timeframe_minutes: i64, capital: Option<f64>) -> Result<()> {
    let series = BarSeries::new(bars, timeframe_minutes * 60_000)?;
    let signals = signals_for(config, &series)?;
    let mut combiner = SignalCombiner::new(config.combiner.clone())?;

    // Replay the combiner so hold-previous ties see their history
    let mut combined = None;
    for t in 0..series.len() {
        combined = Some(combiner.combine(&signals.view(t)?, &series.window(t)?)?);
    }
    let Some(combined) = combined else {
        bail!("bar file is empty");
    };

    let window = series.latest()?;
    let capital = capital.unwrap_or(config.backtest.initial_capital);
    let mut engine = DecisionEngine::new(&config.engine_config())?;
    let decision = engine.decide(&DecisionContext {
        symbol: &config.backtest.symbol,
        window,
        signal: &combined,
        capital,
        risk_pct: None,
    });

    let hypothetical = if combined.signal != 0 {
        engine.hypothetical_plan(&window, &combined, capital, None).ok()
    } else {
        None
    };

    let output = json!({
        "combined_signal": combined,
        "decision": decision,
        "hypothetical_plan": hypothetical,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
