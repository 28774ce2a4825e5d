//! Parameter grid sweeps.
//!
//! One engine per variant, run in parallel with rayon. Variants share the
//! loaded market data read-only.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use stratlab_core::EngineConfig;

use crate::data_loader::MarketData;
use crate::replay::{run_to_end, RunError, RunSummary};

/// Parameter grid over the engine's risk settings.
///
/// Each list holds the values to try for one config field. An empty list
/// keeps the base config's value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    pub stop_loss_atr: Vec<f64>,
    pub take_profit_atr: Vec<f64>,
    pub trailing_atr: Vec<f64>,
    pub partial_take_profit_at_r: Vec<f64>,
    pub break_even_at_r: Vec<f64>,
}

/// `values`, or the single base value when `values` is empty.
fn axis(values: &[f64], base: f64) -> Vec<f64> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

impl ParamGrid {
    /// Returns the total number of configurations in this grid.
    pub fn size(&self) -> usize {
        [
            &self.stop_loss_atr,
            &self.take_profit_atr,
            &self.trailing_atr,
            &self.partial_take_profit_at_r,
            &self.break_even_at_r,
        ]
        .iter()
        .map(|v| v.len().max(1))
        .product()
    }

    /// Generates the cartesian product of the grid over `base`.
    ///
    /// Combinations that fail validation are skipped.
    pub fn generate_configs(&self, base: &EngineConfig) -> Vec<EngineConfig> {
        let mut configs = Vec::with_capacity(self.size());

        for &stop in &axis(&self.stop_loss_atr, base.stop_loss_atr) {
            for &target in &axis(&self.take_profit_atr, base.take_profit_atr) {
                for &trailing in &axis(&self.trailing_atr, base.trailing_atr) {
                    for &partial_r in &axis(&self.partial_take_profit_at_r, base.partial_take_profit_at_r) {
                        for &be_r in &axis(&self.break_even_at_r, base.break_even_at_r) {
                            let config = EngineConfig {
                                stop_loss_atr: stop,
                                take_profit_atr: target,
                                trailing_atr: trailing,
                                partial_take_profit_at_r: partial_r,
                                break_even_at_r: be_r,
                                ..base.clone()
                            };
                            match config.validate() {
                                Ok(()) => configs.push(config),
                                Err(err) => tracing::debug!(%err, "grid variant skipped"),
                            }
                        }
                    }
                }
            }
        }

        configs
    }
}

/// One ranked grid variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub rank: usize,
    pub config: EngineConfig,
    pub summary: RunSummary,
}

/// Run every grid variant over `data`, best net PnL first.
///
/// Ties are ordered by config fingerprint so the ranking is reproducible.
pub fn run_grid(
    base: &EngineConfig,
    grid: &ParamGrid,
    data: &MarketData,
) -> Result<Vec<SweepResult>, RunError> {
    let configs = grid.generate_configs(base);
    tracing::info!(variants = configs.len(), bars = data.len(), "sweep started");

    let mut results: Vec<(EngineConfig, RunSummary)> = configs
        .into_par_iter()
        .map(|config| run_to_end(config.clone(), data).map(|summary| (config, summary)))
        .collect::<Result<Vec<_>, _>>()?;

    results.sort_by(|(_, a), (_, b)| {
        b.net_pnl()
            .total_cmp(&a.net_pnl())
            .then_with(|| a.config_fingerprint.cmp(&b.config_fingerprint))
    });

    tracing::info!(variants = results.len(), "sweep finished");
    Ok(results
        .into_iter()
        .enumerate()
        .map(|(i, (config, summary))| SweepResult {
            rank: i + 1,
            config,
            summary,
        })
        .collect())
}
