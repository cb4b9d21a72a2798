//! ETF Rotation - Main Entry Point
//!
//! Backtests, parameter sweeps and one-off rankings over daily bar CSVs.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use etf_rotation::backtest::{
    BacktestConfig, BacktestEngine, CsvBarLoader, DataLoader, ParameterSpace, SweepRunner,
    DATE_FORMAT,
};
use etf_rotation::config::Config;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// ETF Rotation CLI
#[derive(Parser)]
#[command(name = "etf-rotation")]
#[command(version, about = "Momentum/volatility ETF rotation backtester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest simulation on historical data
    Backtest {
        /// Path to CSV bar file
        #[arg(short, long)]
        data: String,

        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(short, long)]
        end: String,

        /// Initial capital, overrides the configured value
        #[arg(short = 'c', long)]
        initial_capital: Option<Decimal>,

        /// Benchmark symbol, overrides the configured value
        #[arg(short, long)]
        benchmark: Option<String>,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run a parameter sweep optimization
    Sweep {
        /// Path to CSV bar file
        #[arg(short, long)]
        data: String,

        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(short, long)]
        end: String,

        /// Number of parallel backtests
        #[arg(short, long, default_value = "4")]
        parallelism: usize,

        /// Use minimal parameter space (faster, for testing)
        #[arg(long)]
        minimal: bool,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the ranking and target weights for one date
    Rank {
        /// Path to CSV bar file
        #[arg(short, long)]
        data: String,

        /// Ranking date (YYYY-MM-DD), defaults to the last date in the data
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    match cli.command {
        Commands::Backtest {
            data,
            start,
            end,
            initial_capital,
            benchmark,
            output,
        } => run_backtest(&data, &start, &end, initial_capital, benchmark, output.as_deref()),
        Commands::Sweep {
            data,
            start,
            end,
            parallelism,
            minimal,
            output,
        } => run_sweep(&data, &start, &end, parallelism, minimal, output.as_deref()).await,
        Commands::Rank { data, date } => run_rank(&data, date.as_deref()),
    }
}

/// Initialize stdout and rolling file logging.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "etf-rotation.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("etf_rotation=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!(
        "   Lookbacks: short {} / long {} bars",
        config.indicators.short_period, config.indicators.long_period
    );
    info!(
        "   Volume Weight: {:.0}%",
        config.scoring.volume_weight * dec!(100)
    );
    info!(
        "   Max Holdings: {} @ {:.0}% cap",
        config.allocation.max_candidates,
        config.allocation.per_instrument_cap * dec!(100)
    );
    info!("   Weighting: {:?}", config.allocation.weighting);
    info!("   Buy Basis: {:?}", config.allocation.buy_basis);
    info!("   Rebalance Every: {} bars", config.schedule.rebalance_days);
    info!(
        "   Costs: commission {} / slippage {}",
        config.broker.commission_rate, config.broker.slippage
    );
    info!(
        "   Benchmark: {}",
        config.broker.benchmark.as_deref().unwrap_or("none")
    );
}

fn parse_date(value: &str, label: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| anyhow::anyhow!("Invalid {} date '{}': {}", label, value, e))
}

fn load_data(data_path: &str) -> Result<CsvBarLoader> {
    info!("📊 Loading data from: {}", data_path);
    let data_loader = CsvBarLoader::new(data_path)?;

    if let Some((data_start, data_end)) = data_loader.available_range() {
        info!(
            "   Data range: {} to {}",
            data_start.format(DATE_FORMAT),
            data_end.format(DATE_FORMAT)
        );
    }

    info!("   Symbols: {}", data_loader.available_symbols().len());
    info!("   Trading days: {}", data_loader.len());

    Ok(data_loader)
}

/// Run a single backtest.
fn run_backtest(
    data_path: &str,
    start_str: &str,
    end_str: &str,
    initial_capital: Option<Decimal>,
    benchmark: Option<String>,
    output_dir: Option<&str>,
) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              BACKTEST MODE                                 ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let start = parse_date(start_str, "start")?;
    let end = parse_date(end_str, "end")?;

    let data_loader = load_data(data_path)?;

    let mut config = Config::load()?;
    if let Some(capital) = initial_capital {
        config.broker.initial_capital = capital;
    }
    if let Some(symbol) = benchmark {
        config.broker.benchmark = Some(symbol);
    }
    log_config(&config);

    info!("💰 Initial capital: ¥{:.2}", config.broker.initial_capital);
    info!("📅 Period: {} to {}", start_str, end_str);

    let mut engine = BacktestEngine::new(data_loader, config, BacktestConfig::default())?;
    let result = engine.run(start, end)?;

    println!("\n{}", result.summary());

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;

        let equity_path = format!("{}/equity_curve.csv", dir);
        result.equity_to_csv(&equity_path)?;
        info!("📁 Equity curve saved to: {}", equity_path);

        let result_path = format!("{}/result.json", dir);
        std::fs::write(&result_path, serde_json::to_string_pretty(&result)?)?;
        info!("📁 Full result saved to: {}", result_path);
    }

    Ok(())
}

/// Run a parameter sweep optimization.
async fn run_sweep(
    data_path: &str,
    start_str: &str,
    end_str: &str,
    parallelism: usize,
    minimal: bool,
    output_dir: Option<&str>,
) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║           PARAMETER SWEEP MODE                             ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let start = parse_date(start_str, "start")?;
    let end = parse_date(end_str, "end")?;

    let data_loader = load_data(data_path)?;
    let base_config = Config::load()?;

    let param_space = if minimal {
        info!("🔧 Using minimal parameter space (quick test)");
        ParameterSpace::minimal()
    } else {
        info!("🔧 Using full parameter space");
        ParameterSpace::default()
    };

    info!("   Combinations to test: {}", param_space.combination_count());
    info!("📅 Period: {} to {}", start_str, end_str);
    info!("⚡ Parallelism: {}", parallelism);

    // Equity curves are dropped to save memory across many runs
    let backtest_config = BacktestConfig {
        record_equity_curve: false,
        ..BacktestConfig::default()
    };

    let runner = SweepRunner::new(param_space, base_config, backtest_config, parallelism);
    let results = runner.run(data_loader, start, end).await?;

    println!("\n{}", results.summary());

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;

        let results_path = format!("{}/sweep_results.csv", dir);
        results.to_csv(&results_path)?;
        info!("📁 Sweep results saved to: {}", results_path);
    }

    Ok(())
}

/// Print one date's ranking without trading.
fn run_rank(data_path: &str, date_str: Option<&str>) -> Result<()> {
    let data_loader = load_data(data_path)?;
    let date = match date_str {
        Some(value) => parse_date(value, "ranking")?,
        None => data_loader
            .available_range()
            .map(|(_, last)| last)
            .ok_or_else(|| anyhow::anyhow!("No data loaded"))?,
    };

    let config = Config::load()?;
    let mut engine = BacktestEngine::new(data_loader, config, BacktestConfig::default())?;
    let report = engine.rank(date)?;

    println!("Ranking as of {}", report.date.format(DATE_FORMAT));
    println!("{:<4} {:<12} {:>12} {:>10}", "#", "SYMBOL", "SCORE", "WEIGHT");
    for (i, candidate) in report.candidates.iter().enumerate() {
        let weight = report
            .targets
            .get(&candidate.id)
            .map(|w| format!("{:.2}%", w * dec!(100)))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<4} {:<12} {:>12.4} {:>10}",
            i + 1,
            candidate.id,
            candidate.score,
            weight
        );
    }

    let ineligible = report.snapshots.len() - report.candidates.len();
    println!(
        "\n{} eligible, {} ineligible, {:.2}% invested",
        report.candidates.len(),
        ineligible,
        report.targets.values().copied().sum::<Decimal>() * dec!(100)
    );

    Ok(())
}
