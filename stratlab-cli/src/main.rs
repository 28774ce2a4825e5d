//! StratLab CLI: replay and sweep commands.
//!
//! Commands:
//! - `replay`: run one config over a bar file and a signal file
//! - `sweep`: run a grid of ATR/R parameters and print the best variants
//!
//! Logs go to stderr (`RUST_LOG` or `-v`); results go to stdout.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stratlab_core::EngineConfig;
use stratlab_runner::{run_grid, MarketData, ParamGrid, Replay, RunSummary, SweepResult};

#[derive(Parser)]
#[command(
    name = "stratlab",
    about = "StratLab CLI: bar-by-bar trade simulation"
)]
struct Cli {
    /// More log output on stderr (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Bar CSV: time,open,high,low,close,volume.
    #[arg(long)]
    bars: PathBuf,

    /// Signal CSV: time,type,price.
    #[arg(long)]
    signals: PathBuf,

    /// TOML engine config. Missing keys take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay one config and print a summary.
    Replay {
        #[command(flatten)]
        data: DataArgs,

        /// Print the full summary (trades and equity curve) as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a parameter grid and print the top variants by net PnL.
    Sweep {
        #[command(flatten)]
        data: DataArgs,

        /// Stop-loss ATR multiples (comma separated).
        #[arg(long, value_delimiter = ',')]
        stop_atr: Vec<f64>,

        /// Take-profit ATR multiples.
        #[arg(long, value_delimiter = ',')]
        target_atr: Vec<f64>,

        /// Trailing-stop ATR multiples.
        #[arg(long, value_delimiter = ',')]
        trailing_atr: Vec<f64>,

        /// Partial take-profit distances in R.
        #[arg(long, value_delimiter = ',')]
        partial_r: Vec<f64>,

        /// Break-even triggers in R.
        #[arg(long, value_delimiter = ',')]
        break_even_r: Vec<f64>,

        /// Number of variants to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Print ranked results as JSON (without trades).
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Replay { data, json } => run_replay(&data, json),
        Commands::Sweep {
            data,
            stop_atr,
            target_atr,
            trailing_atr,
            partial_r,
            break_even_r,
            top,
            json,
        } => {
            let grid = ParamGrid {
                stop_loss_atr: stop_atr,
                take_profit_atr: target_atr,
                trailing_atr,
                partial_take_profit_at_r: partial_r,
                break_even_at_r: break_even_r,
            };
            run_sweep(&data, &grid, top, json)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_data(args: &DataArgs) -> Result<(EngineConfig, MarketData)> {
    let config = load_config(args.config.as_deref())?;
    let data = MarketData::load(&args.bars, &args.signals).context("loading market data")?;
    Ok((config, data))
}

fn run_replay(args: &DataArgs, json: bool) -> Result<()> {
    let (config, data) = load_data(args)?;
    let mut replay = Replay::new(config, &data)?;
    replay.subscribe(|event| {
        tracing::debug!(kind = event.kind(), bar = event.bar_index(), "engine event");
        Ok(())
    });
    let summary = replay.finish()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn run_sweep(args: &DataArgs, grid: &ParamGrid, top: usize, json: bool) -> Result<()> {
    let (config, data) = load_data(args)?;
    let results = run_grid(&config, grid, &data)?;
    let shown = &results[..top.min(results.len())];

    if json {
        let rows: Vec<serde_json::Value> = shown.iter().map(sweep_row).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_ranking(shown, results.len());
    }
    Ok(())
}

fn sweep_row(result: &SweepResult) -> serde_json::Value {
    serde_json::json!({
        "rank": result.rank,
        "config": result.config,
        "net_pnl": result.summary.net_pnl(),
        "final_equity": result.summary.final_equity,
        "metrics": result.summary.metrics,
        "ledger_hash": result.summary.ledger_hash,
    })
}

fn print_summary(summary: &RunSummary) {
    let m = &summary.metrics;
    println!();
    println!("=== Replay Result ===");
    println!("Bars:           {}", summary.bar_count);
    println!(
        "Signals:        {} ({} unmatched)",
        summary.signal_count, summary.unmatched_signals
    );
    println!(
        "Trades:         {} ({} partial)",
        m.trade_count, m.partial_count
    );
    println!();
    println!("--- Performance ---");
    println!("Initial:        {:.2}", summary.initial_capital);
    println!("Final Equity:   {:.2}", summary.final_equity);
    println!("Net PnL:        {:.2}", summary.net_pnl());
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Avg Bars Held:  {:.1}", m.avg_bars_held);
    println!();
    println!("Config:         {}", summary.config_fingerprint);
    println!("Ledger:         {}", summary.ledger_hash);
    if summary.listener_failures > 0 {
        println!("WARNING: {} listener failures", summary.listener_failures);
    }
    println!();
}

fn print_ranking(results: &[SweepResult], total: usize) {
    println!();
    println!("=== Sweep: top {} of {} ===", results.len(), total);
    println!(
        "{:>4}  {:>6} {:>6} {:>6} {:>6} {:>6}  {:>12} {:>8} {:>7} {:>6}",
        "rank", "stop", "target", "trail", "partR", "beR", "net pnl", "maxdd%", "win%", "trades"
    );
    for r in results {
        let c = &r.config;
        let m = &r.summary.metrics;
        println!(
            "{:>4}  {:>6.2} {:>6.2} {:>6.2} {:>6.2} {:>6.2}  {:>12.2} {:>8.2} {:>7.1} {:>6}",
            r.rank,
            c.stop_loss_atr,
            c.take_profit_atr,
            c.trailing_atr,
            c.partial_take_profit_at_r,
            c.break_even_at_r,
            r.summary.net_pnl(),
            m.max_drawdown * 100.0,
            m.win_rate * 100.0,
            m.trade_count
        );
    }
    println!();
}
