//! Engine state: the single owned record mutated bar by bar.

use serde::{Deserialize, Serialize};

use crate::domain::{Position, Trade};

/// Everything one simulation run knows.
///
/// `equity` holds realized value only: it starts at initial capital and moves
/// on entry commission and closes. Unrealized PnL is tracked alongside and
/// never folded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub position: Option<Position>,
    pub equity: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub trades: Vec<Trade>,
    /// Index of the last processed bar; `None` before the first bar.
    pub current_bar_index: Option<usize>,
    pub current_price: Option<f64>,
}

impl EngineState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            position: None,
            equity: initial_capital,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            trades: Vec::new(),
            current_bar_index: None,
            current_price: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Realized equity plus the open position's unrealized PnL.
    pub fn marked_equity(&self) -> f64 {
        self.equity + self.unrealized_pnl
    }

    /// Verify `equity == initial_capital + realized_pnl`.
    ///
    /// Returns the current equity. Panics in debug mode if the identity is violated.
    pub fn verify_equity(&self, initial_capital: f64) -> f64 {
        #[cfg(debug_assertions)]
        {
            let expected = initial_capital + self.realized_pnl;
            let tolerance = 1e-9 * expected.abs().max(1.0);
            assert!(
                (self.equity - expected).abs() <= tolerance,
                "equity accounting violated: equity={}, initial={initial_capital} + realized={} = {expected}",
                self.equity,
                self.realized_pnl
            );
        }
        #[cfg(not(debug_assertions))]
        let _ = initial_capital;

        self.equity
    }
}
