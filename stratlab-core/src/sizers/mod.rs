//! Position sizing: turns equity and a signal into a fully specified entry.
//!
//! Sizing is equity-aware but signal-agnostic: it never decides whether to
//! trade, only how much and with which protective levels.
//!
//! # Formula
//! ```text
//! allocated   = equity * position_size_percent / 100
//! fill        = slippage(signal_price, entry side)
//! trade_value = allocated / (1 + commission_rate)
//! shares      = trade_value / fill
//! commission  = trade_value * commission_rate
//! ```
//!
//! Degenerate inputs (non-finite or non-positive allocation, fill or share
//! count) yield `None`: the entry is skipped without error.

pub mod levels;
pub mod slippage;

pub use levels::{compute_levels, RiskLevels};
pub use slippage::{apply_slippage, FillSide};

use chrono::NaiveDateTime;

use crate::config::EngineConfig;
use crate::domain::{Direction, Position};

/// A sized entry, ready to become the open position.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPlan {
    pub position: Position,
    /// Entry commission to deduct from equity at open.
    pub commission: f64,
    pub trade_value: f64,
}

/// Inputs for one entry decision.
#[derive(Debug, Clone, Copy)]
pub struct EntryRequest {
    pub equity: f64,
    pub signal_price: f64,
    pub direction: Direction,
    pub time: NaiveDateTime,
    pub bar_index: usize,
    /// ATR at the entry bar, if the series has a value there.
    pub atr: Option<f64>,
}

/// Size an entry. Returns `None` when the inputs cannot produce a position.
pub fn plan_entry(request: &EntryRequest, config: &EngineConfig) -> Option<EntryPlan> {
    let allocated = request.equity * config.position_size_percent / 100.0;
    if !allocated.is_finite() || allocated <= 0.0 {
        tracing::debug!(bar = request.bar_index, allocated, "entry skipped: no capital to allocate");
        return None;
    }

    let fill = apply_slippage(
        request.signal_price,
        FillSide::entry(request.direction),
        config.slippage_rate(),
    );
    let commission_rate = config.commission_rate();
    let trade_value = allocated / (1.0 + commission_rate);
    let shares = trade_value / fill;
    if !fill.is_finite() || fill <= 0.0 || !shares.is_finite() || shares <= 0.0 {
        tracing::debug!(bar = request.bar_index, fill, shares, "entry skipped: degenerate fill");
        return None;
    }

    let levels = compute_levels(fill, request.direction, config, request.atr);
    let commission = trade_value * commission_rate;

    let position = Position {
        direction: request.direction,
        entry_time: request.time,
        entry_bar: request.bar_index,
        entry_price: fill,
        size: shares,
        risk_per_share: levels.risk_per_share,
        stop_loss_price: levels.stop_loss,
        take_profit_price: levels.take_profit,
        partial_target_price: levels.partial_target,
        partial_taken: false,
        break_even_applied: false,
        extreme_price: fill,
        bars_in_trade: 0,
        entry_commission: commission,
        unrealized_pnl: 0.0,
        unrealized_pnl_percent: 0.0,
    };

    Some(EntryPlan {
        position,
        commission,
        trade_value,
    })
}
