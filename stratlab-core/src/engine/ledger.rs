//! Trade ledger: PnL settlement for full and partial closes.
//!
//! ```text
//! exit_value     = size * exit_price
//! entry_value    = size * entry_price
//! raw_pnl        = (exit_value - entry_value) * direction
//! exit_commission = exit_value * commission_rate
//! equity        += raw_pnl - exit_commission
//! realized_pnl  += raw_pnl - exit_commission
//! ```
//!
//! Entry commission is realized at open (both equity and realized PnL drop
//! by it), so `equity == initial_capital + realized_pnl` holds at all times.
//! Each trade's `fees` adds back its share of the entry commission, making
//! the ledger's `pnl` sum equal to realized PnL whenever the engine is flat.

use chrono::NaiveDateTime;

use super::state::EngineState;
use crate::domain::{ExitReason, Position, Trade, TradeId};
use crate::sizers::EntryPlan;

/// Where and why a close happens. `price` is the final, already slipped fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFill {
    pub bar_index: usize,
    pub time: NaiveDateTime,
    pub price: f64,
    pub reason: ExitReason,
}

/// PnL of closing `size` units of a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub raw_pnl: f64,
    pub exit_commission: f64,
    pub pnl_percent: f64,
}

/// Settle `size` units of `position` at `exit_price`.
pub fn settle(position: &Position, size: f64, exit_price: f64, commission_rate: f64) -> Settlement {
    let exit_value = size * exit_price;
    let entry_value = size * position.entry_price;
    let raw_pnl = (exit_value - entry_value) * position.direction.factor();
    let exit_commission = exit_value * commission_rate;
    let pnl_percent = if entry_value != 0.0 {
        raw_pnl / entry_value * 100.0
    } else {
        0.0
    };
    Settlement {
        raw_pnl,
        exit_commission,
        pnl_percent,
    }
}

/// Append-only trade bookkeeping with a monotonic id sequence.
#[derive(Debug, Clone)]
pub struct Ledger {
    next_id: u64,
    commission_rate: f64,
}

impl Ledger {
    pub fn new(commission_rate: f64) -> Self {
        Self {
            next_id: 1,
            commission_rate,
        }
    }

    /// Restart the id sequence.
    pub fn reset(&mut self) {
        self.next_id = 1;
    }

    fn allocate_id(&mut self) -> TradeId {
        let id = TradeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Install a sized entry and realize its commission.
    pub fn open(&self, state: &mut EngineState, plan: EntryPlan) {
        state.equity -= plan.commission;
        state.realized_pnl -= plan.commission;
        state.unrealized_pnl = 0.0;
        state.position = Some(plan.position);
    }

    /// Close the whole open position. Returns `None` when flat.
    pub fn close_full(&mut self, state: &mut EngineState, fill: ExitFill) -> Option<Trade> {
        let position = state.position.take()?;
        let settlement = settle(&position, position.size, fill.price, self.commission_rate);

        state.equity += settlement.raw_pnl - settlement.exit_commission;
        state.realized_pnl += settlement.raw_pnl - settlement.exit_commission;
        state.unrealized_pnl = 0.0;

        let fees = settlement.exit_commission + position.entry_commission;
        let trade = self.build_trade(&position, position.size, fill, settlement, fees, false);
        state.trades.push(trade.clone());
        Some(trade)
    }

    /// Close `percent` of the open size, leaving the rest open.
    ///
    /// Returns `None` when flat or when the slice would be empty or cover the
    /// whole position.
    pub fn close_partial(
        &mut self,
        state: &mut EngineState,
        fill: ExitFill,
        percent: f64,
    ) -> Option<Trade> {
        let fraction = percent / 100.0;
        if !(fraction > 0.0 && fraction < 1.0) {
            return None;
        }
        let commission_rate = self.commission_rate;
        let position = state.position.as_mut()?;

        let partial_size = position.size * fraction;
        let settlement = settle(position, partial_size, fill.price, commission_rate);
        let entry_share = position.entry_commission * fraction;

        position.size -= partial_size;
        position.entry_commission -= entry_share;
        position.partial_taken = true;
        let snapshot = position.clone();

        state.equity += settlement.raw_pnl - settlement.exit_commission;
        state.realized_pnl += settlement.raw_pnl - settlement.exit_commission;

        let fees = settlement.exit_commission + entry_share;
        let trade = self.build_trade(&snapshot, partial_size, fill, settlement, fees, true);
        state.trades.push(trade.clone());
        Some(trade)
    }

    fn build_trade(
        &mut self,
        position: &Position,
        size: f64,
        fill: ExitFill,
        settlement: Settlement,
        fees: f64,
        is_partial: bool,
    ) -> Trade {
        Trade {
            id: self.allocate_id(),
            direction: position.direction,
            entry_bar: position.entry_bar,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_bar: fill.bar_index,
            exit_time: fill.time,
            exit_price: fill.price,
            exit_reason: fill.reason,
            size,
            pnl: settlement.raw_pnl - fees,
            pnl_percent: settlement.pnl_percent,
            fees,
            bars_held: fill.bar_index.saturating_sub(position.entry_bar),
            is_partial,
        }
    }
}
