//! StratLab Runner: data loading, replay, parameter grids, metrics.
//!
//! This crate builds on `stratlab-core` to provide:
//! - CSV loading of bars and signals, with signal-to-bar alignment
//! - Wilder ATR series for the engine's risk levels
//! - Step-by-step and run-to-end replay with ledger hashing
//! - Parallel parameter grid sweeps ranked by net PnL
//! - Performance metrics

pub mod data_loader;
pub mod indicators;
pub mod metrics;
pub mod replay;
pub mod sweep;

pub use data_loader::{align_signals, load_bars, load_signals, AlignedSignals, LoadError, MarketData};
pub use indicators::atr_series;
pub use metrics::PerformanceMetrics;
pub use replay::{run_to_end, Replay, RunError, RunSummary};
pub use sweep::{run_grid, ParamGrid, SweepResult};
