//! Trade: a completed (possibly partial) round trip.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::Direction;

/// Monotonic trade identifier, unique within one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a position (or a slice of it) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    PartialTakeProfit,
    TimeStop,
    Signal,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop-loss",
            ExitReason::TakeProfit => "take-profit",
            ExitReason::PartialTakeProfit => "partial-take-profit",
            ExitReason::TimeStop => "time-stop",
            ExitReason::Signal => "signal",
            ExitReason::EndOfData => "end-of-data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable ledger entry.
///
/// `fees` covers the exit commission plus this slice's share of the entry
/// commission; `pnl` is net of `fees`. `pnl_percent` is gross, relative to
/// entry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub direction: Direction,

    // ── Entry ──
    pub entry_bar: usize,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_bar: usize,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Size & PnL ──
    pub size: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub fees: f64,

    pub bars_held: usize,
    pub is_partial: bool,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
