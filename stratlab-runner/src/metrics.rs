//! Performance metrics: pure functions that compute run statistics.
//!
//! Every metric is a pure function: equity curve and/or trade list in, scalar out.
//! No dependencies on the replay driver or the engine.

use serde::{Deserialize, Serialize};
use stratlab_core::domain::Trade;

/// Aggregate performance metrics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    /// Ledger entries, partial slices included.
    pub trade_count: usize,
    pub partial_count: usize,
    pub avg_bars_held: f64,
}

impl PerformanceMetrics {
    /// Compute all metrics from an equity curve and trade list.
    pub fn compute(equity_curve: &[f64], trades: &[Trade], initial_capital: f64) -> Self {
        Self {
            total_return: total_return(equity_curve, initial_capital),
            max_drawdown: max_drawdown(equity_curve, initial_capital),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
            partial_count: trades.iter().filter(|t| t.is_partial).count(),
            avg_bars_held: avg_bars_held(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64], initial_capital: f64) -> f64 {
    let Some(&final_eq) = equity_curve.last() else {
        return 0.0;
    };
    if initial_capital <= 0.0 {
        return 0.0;
    }
    (final_eq - initial_capital) / initial_capital
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// The running peak starts at `initial_capital`, so entry commission charged
/// on the first bar already counts as drawdown.
pub fn max_drawdown(equity_curve: &[f64], initial_capital: f64) -> f64 {
    equity_curve
        .iter()
        .fold((initial_capital, 0.0_f64), |(peak, worst), &eq| {
            let peak = peak.max(eq);
            if peak > 0.0 {
                (peak, worst.min((eq - peak) / peak))
            } else {
                (peak, worst)
            }
        })
        .1
}

/// Win rate: fraction of ledger entries with positive net PnL.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Profit factor: gross profits / gross losses over ledger entries.
///
/// A partial slice and its remainder count as two entries. Capped at 100.0
/// when there are no losses.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let (gross_profit, gross_loss) = trades.iter().fold((0.0, 0.0), |(won, lost), t| {
        if t.pnl > 0.0 {
            (won + t.pnl, lost)
        } else {
            (won, lost - t.pnl)
        }
    });

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

pub fn avg_bars_held(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.bars_held as f64).sum::<f64>() / trades.len() as f64
}
