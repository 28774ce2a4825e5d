//! Replay driver: feeds loaded data through one engine.
//!
//! Two entry points:
//! - [`Replay`]: step-by-step driving, for callers that inspect state between bars.
//! - [`run_to_end`]: full run straight to a [`RunSummary`]. Used by the CLI and the grid.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::domain::Trade;
use stratlab_core::engine::{Engine, EngineEvent, EngineState, ListenerError, Subscription};
use stratlab_core::{ConfigError, EngineConfig};

use crate::data_loader::MarketData;
use crate::indicators::atr_series;
use crate::metrics::PerformanceMetrics;

/// Errors from the replay driver.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("no bars to replay")]
    NoBars,
    #[error("failed to serialize trade ledger: {0}")]
    Ledger(#[from] serde_json::Error),
}

/// Complete result of a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// BLAKE3 of the engine config.
    pub config_fingerprint: String,
    pub dataset_hash: String,
    pub bar_count: usize,
    pub signal_count: usize,
    pub unmatched_signals: usize,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub realized_pnl: f64,
    pub metrics: PerformanceMetrics,
    /// BLAKE3 of the serialized trade ledger; equal hashes mean identical runs.
    pub ledger_hash: String,
    pub listener_failures: usize,
    pub trades: Vec<Trade>,
    /// Mark-to-market equity (`equity + unrealized_pnl`) after each bar.
    pub equity_curve: Vec<f64>,
}

impl RunSummary {
    pub fn net_pnl(&self) -> f64 {
        self.final_equity - self.initial_capital
    }
}

/// One engine driven over borrowed market data.
#[derive(Debug)]
pub struct Replay<'a> {
    engine: Engine,
    data: &'a MarketData,
    cursor: usize,
    equity_curve: Vec<f64>,
}

impl<'a> Replay<'a> {
    /// Validate the config and build the ATR series for `data`.
    pub fn new(config: EngineConfig, data: &'a MarketData) -> Result<Self, RunError> {
        if data.is_empty() {
            return Err(RunError::NoBars);
        }
        let atr = atr_series(&data.bars, config.atr_period);
        let engine = Engine::new(config)?.with_atr(atr);
        Ok(Self {
            engine,
            data,
            cursor: 0,
            equity_curve: Vec::with_capacity(data.len()),
        })
    }

    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&EngineEvent) -> Result<(), ListenerError> + Send + 'static,
    {
        self.engine.subscribe(listener)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Index of the next bar to process.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.data.len()
    }

    /// Process the next bar. Returns `None` once every bar has been consumed.
    pub fn step(&mut self) -> Option<&EngineState> {
        let data = self.data;
        let index = self.cursor;
        let bar = data.bars.get(index)?;
        let signals = data.signals.get(index).map_or(&[][..], Vec::as_slice);
        self.cursor += 1;

        let state = self.engine.process_bar(bar, index, signals);
        self.equity_curve.push(state.marked_equity());
        Some(state)
    }

    /// Drain remaining bars, close any open position at the last valid bar
    /// and summarize.
    pub fn finish(mut self) -> Result<RunSummary, RunError> {
        while self.step().is_some() {}

        let data = self.data;
        let last_valid = data
            .bars
            .iter()
            .enumerate()
            .rev()
            .find(|(_, bar)| !bar.is_void());
        if let Some((index, bar)) = last_valid {
            if let Some(trade) = self.engine.close_position_at_market(bar, index) {
                tracing::debug!(id = %trade.id, pnl = trade.pnl, "closed at end of data");
            }
        }

        let state = self.engine.state();
        if let Some(last) = self.equity_curve.last_mut() {
            *last = state.marked_equity();
        }

        let config = self.engine.config();
        let ledger_hash = blake3::hash(&serde_json::to_vec(&state.trades)?)
            .to_hex()
            .to_string();
        let metrics =
            PerformanceMetrics::compute(&self.equity_curve, &state.trades, config.initial_capital);

        Ok(RunSummary {
            config_fingerprint: config.fingerprint(),
            dataset_hash: data.dataset_hash.clone(),
            bar_count: data.len(),
            signal_count: data.signal_count(),
            unmatched_signals: data.unmatched_signals,
            initial_capital: config.initial_capital,
            final_equity: state.equity,
            realized_pnl: state.realized_pnl,
            metrics,
            ledger_hash,
            listener_failures: self.engine.listener_failures(),
            trades: state.trades.clone(),
            equity_curve: self.equity_curve,
        })
    }
}

/// Replay `data` from the first bar to the last and summarize.
pub fn run_to_end(config: EngineConfig, data: &MarketData) -> Result<RunSummary, RunError> {
    Replay::new(config, data)?.finish()
}
