//! Bar processor: the per-bar state machine.
//!
//! Each call to [`Engine::process_bar`] runs three phases:
//!
//! 1. Position management, in fixed priority order: stop-loss, take-profit,
//!    partial take-profit, time stop, break-even, trailing stop, extreme
//!    update. Stop-loss is tested before take-profit, so a bar whose range
//!    covers both exits at the stop. OHLC bars cannot reveal which level
//!    traded first; this ordering is a fixed modeling assumption.
//! 2. Signal processing: entries when flat, exits and flips when open.
//! 3. Mark-to-market against the bar close.
//!
//! The engine is single-threaded and deterministic. Parallel parameter
//! searches run one `Engine` per variant.

use super::events::{EngineEvent, EventEmitter, ListenerError, StopUpdateCause, Subscription};
use super::ledger::{ExitFill, Ledger};
use super::ratchet::tighten;
use super::state::EngineState;
use crate::config::{ConfigError, EngineConfig, ExecutionModel, TradeDirection};
use crate::domain::{Bar, Direction, ExitReason, Position, Signal, Trade};
use crate::sizers::{apply_slippage, plan_entry, EntryRequest, FillSide};

/// One simulation run: config, owned state, ledger, and subscribers.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    state: EngineState,
    ledger: Ledger,
    emitter: EventEmitter,
    /// Index-aligned ATR supplied by the caller.
    atr: Vec<Option<f64>>,
    /// Signals waiting for the next bar's open (`NextBarOpen` only).
    pending: Vec<Signal>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            state: EngineState::new(config.initial_capital),
            ledger: Ledger::new(config.commission_rate()),
            emitter: EventEmitter::new(),
            atr: Vec::new(),
            pending: Vec::new(),
            config,
        })
    }

    /// Attach an index-aligned ATR series.
    pub fn with_atr(mut self, series: Vec<Option<f64>>) -> Self {
        self.atr = series;
        self
    }

    pub fn set_atr(&mut self, series: Vec<Option<f64>>) {
        self.atr = series;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Borrowed view of the current state.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> EngineState {
        self.state.clone()
    }

    /// Copy of the open position, if any.
    pub fn position(&self) -> Option<Position> {
        self.state.position.clone()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.state.trades
    }

    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&EngineEvent) -> Result<(), ListenerError> + Send + 'static,
    {
        self.emitter.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, handle: Subscription) -> bool {
        self.emitter.unsubscribe(handle)
    }

    pub fn listener_failures(&self) -> usize {
        self.emitter.failures()
    }

    /// Back to flat at initial capital. Subscribers and the ATR series stay.
    pub fn reset(&mut self) {
        self.state = EngineState::new(self.config.initial_capital);
        self.ledger.reset();
        self.pending.clear();
    }

    /// Advance the simulation by one bar.
    ///
    /// Must be called once per bar in increasing `bar_index` order.
    pub fn process_bar(&mut self, bar: &Bar, bar_index: usize, signals: &[Signal]) -> &EngineState {
        self.state.current_bar_index = Some(bar_index);
        if bar.is_void() {
            tracing::debug!(bar = bar_index, "void bar skipped");
            return &self.state;
        }
        self.state.current_price = Some(bar.close);
        tracing::trace!(bar = bar_index, close = bar.close, signals = signals.len(), "process bar");

        let atr = self.atr_at(bar_index);
        self.manage_position(bar, bar_index, atr);
        self.process_signals(bar, bar_index, signals, atr);
        self.mark_to_market(bar.close);

        &self.state
    }

    /// Liquidate at the (slipped) bar close, tagged `end-of-data`.
    ///
    /// Queued next-bar-open signals are discarded. A void bar has no price
    /// to close at, so the position is left open and `None` is returned.
    pub fn close_position_at_market(&mut self, bar: &Bar, bar_index: usize) -> Option<Trade> {
        if bar.is_void() {
            tracing::debug!(bar = bar_index, "market close skipped on void bar");
            return None;
        }
        self.pending.clear();
        self.state.current_bar_index = Some(bar_index);
        self.state.current_price = Some(bar.close);
        let trade = self.close_at(bar, bar_index, bar.close, ExitReason::EndOfData);
        self.state.unrealized_pnl = 0.0;
        trade
    }

    fn atr_at(&self, bar_index: usize) -> Option<f64> {
        self.atr
            .get(bar_index)
            .copied()
            .flatten()
            .filter(|v| v.is_finite() && *v > 0.0)
    }

    // ── Phase 1: position management ────────────────────────────────

    fn manage_position(&mut self, bar: &Bar, bar_index: usize, atr: Option<f64>) {
        let Some(position) = self.state.position.as_mut() else {
            return;
        };
        position.bars_in_trade += 1;
        let direction = position.direction;

        if let Some(stop) = position.stop_loss_price {
            if direction.stop_touched(bar, stop) {
                self.close_at(bar, bar_index, stop, ExitReason::StopLoss);
                return;
            }
        }

        if let Some(target) = position.take_profit_price {
            if direction.target_touched(bar, target) {
                self.close_at(bar, bar_index, target, ExitReason::TakeProfit);
                return;
            }
        }

        if !position.partial_taken {
            if let Some(level) = position.partial_target_price {
                if direction.target_touched(bar, level) {
                    self.partial_close(bar, bar_index, level);
                }
            }
        }

        if self.time_stop_due(bar) {
            self.close_at(bar, bar_index, bar.close, ExitReason::TimeStop);
            return;
        }

        let mut updates = Vec::new();
        let Some(position) = self.state.position.as_mut() else {
            return;
        };

        if !position.break_even_applied
            && position.risk_per_share > 0.0
            && self.config.break_even_at_r > 0.0
        {
            let trigger = position.risk_per_share * self.config.break_even_at_r;
            let advance = (direction.favorable_extreme(bar) - position.entry_price) * direction.factor();
            if advance >= trigger {
                position.break_even_applied = true;
                let previous = position.stop_loss_price;
                if let Some(stop) = tighten(direction, previous, position.entry_price) {
                    position.stop_loss_price = Some(stop);
                    updates.push((previous, stop, StopUpdateCause::BreakEven));
                }
            }
        }

        if self.config.trailing_atr > 0.0 {
            if let Some(atr) = atr {
                let candidate = position.extreme_price - direction.factor() * atr * self.config.trailing_atr;
                let previous = position.stop_loss_price;
                if let Some(stop) = tighten(direction, previous, candidate) {
                    position.stop_loss_price = Some(stop);
                    updates.push((previous, stop, StopUpdateCause::Trailing));
                }
            }
        }

        position.update_extreme(bar);

        for (previous, stop, cause) in updates {
            tracing::debug!(bar = bar_index, ?previous, stop, ?cause, "stop updated");
            self.emitter.emit(&EngineEvent::StopUpdated {
                bar_index,
                previous,
                stop,
                cause,
            });
        }
    }

    fn time_stop_due(&self, bar: &Bar) -> bool {
        let limit = self.config.time_stop_bars;
        match &self.state.position {
            Some(position) if limit > 0 => {
                position.bars_in_trade >= limit
                    && !position.partial_taken
                    && position.is_losing_at(bar.close)
            }
            _ => false,
        }
    }

    // ── Phase 2: signals ────────────────────────────────────────────

    fn process_signals(&mut self, bar: &Bar, bar_index: usize, signals: &[Signal], atr: Option<f64>) {
        match self.config.execution_model {
            ExecutionModel::SignalPrice => {
                for signal in signals {
                    self.apply_signal(bar, bar_index, signal.direction(), signal.price, atr);
                }
            }
            ExecutionModel::BarClose => {
                for signal in signals {
                    self.apply_signal(bar, bar_index, signal.direction(), bar.close, atr);
                }
            }
            ExecutionModel::NextBarOpen => {
                let due = std::mem::replace(&mut self.pending, signals.to_vec());
                for signal in &due {
                    self.apply_signal(bar, bar_index, signal.direction(), bar.open, atr);
                }
            }
        }
    }

    fn apply_signal(
        &mut self,
        bar: &Bar,
        bar_index: usize,
        direction: Direction,
        price: f64,
        atr: Option<f64>,
    ) {
        let open = self
            .state
            .position
            .as_ref()
            .map(|p| (p.direction, p.entry_bar));

        match open {
            None => {
                if self.config.trade_direction.allows(direction) {
                    self.open_position(bar, bar_index, direction, price, atr);
                }
            }
            Some((current, _)) if current == direction => {}
            Some((_, entry_bar)) => {
                if entry_bar == bar_index && !self.config.allow_same_bar_exit {
                    tracing::trace!(bar = bar_index, "same-bar exit signal ignored");
                    return;
                }
                if self.close_at(bar, bar_index, price, ExitReason::Signal).is_none() {
                    return;
                }
                if self.config.trade_direction == TradeDirection::Both {
                    self.open_position(bar, bar_index, direction, price, atr);
                }
            }
        }
    }

    fn open_position(
        &mut self,
        bar: &Bar,
        bar_index: usize,
        direction: Direction,
        price: f64,
        atr: Option<f64>,
    ) {
        let request = EntryRequest {
            equity: self.state.equity,
            signal_price: price,
            direction,
            time: bar.time,
            bar_index,
            atr,
        };
        let Some(plan) = plan_entry(&request, &self.config) else {
            return;
        };

        let position = plan.position.clone();
        self.ledger.open(&mut self.state, plan);
        tracing::debug!(
            bar = bar_index,
            ?direction,
            price = position.entry_price,
            size = position.size,
            "position opened"
        );
        self.emitter.emit(&EngineEvent::PositionOpened {
            bar_index,
            position,
        });
    }

    // ── Exits ───────────────────────────────────────────────────────

    /// Slipped exit price, or `None` when it is not a usable fill.
    fn exit_price(&self, direction: Direction, level: f64, bar_index: usize) -> Option<f64> {
        let price = apply_slippage(level, FillSide::exit(direction), self.config.slippage_rate());
        if price.is_finite() && price > 0.0 {
            Some(price)
        } else {
            tracing::debug!(bar = bar_index, level, "unusable exit price, position kept");
            None
        }
    }

    /// Close the whole position at `level`, slipped against the trader.
    ///
    /// Returns `None` and keeps the position when the fill is not finite and positive.
    fn close_at(&mut self, bar: &Bar, bar_index: usize, level: f64, reason: ExitReason) -> Option<Trade> {
        let direction = self.state.position.as_ref()?.direction;
        let fill = ExitFill {
            bar_index,
            time: bar.time,
            price: self.exit_price(direction, level, bar_index)?,
            reason,
        };
        let trade = self.ledger.close_full(&mut self.state, fill)?;
        self.state.verify_equity(self.config.initial_capital);
        tracing::debug!(
            bar = bar_index,
            id = %trade.id,
            reason = %reason,
            pnl = trade.pnl,
            "position closed"
        );
        self.emitter.emit(&EngineEvent::PositionClosed {
            bar_index,
            trade: trade.clone(),
        });
        Some(trade)
    }

    fn partial_close(&mut self, bar: &Bar, bar_index: usize, level: f64) {
        let Some(direction) = self.state.position.as_ref().map(|p| p.direction) else {
            return;
        };
        let Some(price) = self.exit_price(direction, level, bar_index) else {
            return;
        };
        let fill = ExitFill {
            bar_index,
            time: bar.time,
            price,
            reason: ExitReason::PartialTakeProfit,
        };
        let percent = self.config.partial_take_profit_percent;
        let Some(trade) = self.ledger.close_partial(&mut self.state, fill, percent) else {
            return;
        };
        let Some(remaining) = self.state.position.clone() else {
            return;
        };
        tracing::debug!(bar = bar_index, id = %trade.id, size = trade.size, "partial closed");
        self.emitter.emit(&EngineEvent::PartialClosed {
            bar_index,
            trade,
            remaining,
        });
    }

    // ── Phase 3: mark-to-market ─────────────────────────────────────

    fn mark_to_market(&mut self, close: f64) {
        self.state.unrealized_pnl = match self.state.position.as_mut() {
            Some(position) => position.mark(close),
            None => 0.0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskMode;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use std::sync::{Arc, Mutex};

    fn t(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(i as i64)
    }

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(t(i), open, high, low, close, 1_000.0)
    }

    fn flat_bar(i: usize, price: f64) -> Bar {
        bar(i, price, price + 0.5, price - 0.5, price)
    }

    fn frictionless() -> EngineConfig {
        EngineConfig {
            commission_percent: 0.0,
            slippage_bps: 0.0,
            risk_mode: RiskMode::Atr,
            stop_loss_atr: 0.0,
            take_profit_atr: 0.0,
            ..EngineConfig::new(1_000.0)
        }
    }

    #[test]
    fn opens_on_buy_and_marks_to_market() {
        let mut engine = Engine::new(frictionless()).unwrap();
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        let position = engine.position().unwrap();
        assert_eq!(position.size, 10.0);
        assert_eq!(position.entry_bar, 0);

        let state = engine.process_bar(&flat_bar(1, 105.0), 1, &[]);
        assert_eq!(state.unrealized_pnl, 50.0);
        assert_eq!(state.position.as_ref().unwrap().bars_in_trade, 1);
        assert_eq!(state.equity, 1_000.0);
        assert_eq!(state.marked_equity(), 1_050.0);
    }

    #[test]
    fn stop_loss_wins_tie_with_take_profit() {
        let config = EngineConfig {
            stop_loss_atr: 1.0,
            take_profit_atr: 1.0,
            ..frictionless()
        };
        let mut engine = Engine::new(config).unwrap().with_atr(vec![Some(2.0); 4]);
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        // Range 97..103 covers both the 98 stop and the 102 target.
        engine.process_bar(&bar(1, 100.0, 103.0, 97.0, 100.0), 1, &[]);
        let trade = &engine.trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, 98.0);
        assert!(engine.state().is_flat());
    }

    #[test]
    fn same_bar_exit_is_ignored_unless_allowed() {
        let mut engine = Engine::new(frictionless()).unwrap();
        let signals = [Signal::buy(t(0), 100.0), Signal::sell(t(0), 101.0)];
        engine.process_bar(&flat_bar(0, 100.0), 0, &signals);
        assert!(engine.position().unwrap().is_long());
        assert!(engine.trades().is_empty());

        let config = EngineConfig {
            allow_same_bar_exit: true,
            ..frictionless()
        };
        let mut engine = Engine::new(config).unwrap();
        engine.process_bar(&flat_bar(0, 100.0), 0, &signals);
        assert_eq!(engine.trades().len(), 1);
        assert!(engine.position().unwrap().is_short());
    }

    #[test]
    fn flip_only_when_both_directions_allowed() {
        let mut both = Engine::new(frictionless()).unwrap();
        both.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        both.process_bar(&flat_bar(1, 110.0), 1, &[Signal::sell(t(1), 110.0)]);
        assert_eq!(both.trades()[0].exit_reason, ExitReason::Signal);
        assert!(both.position().unwrap().is_short());

        let config = EngineConfig {
            trade_direction: TradeDirection::Long,
            ..frictionless()
        };
        let mut long_only = Engine::new(config).unwrap();
        long_only.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        long_only.process_bar(&flat_bar(1, 110.0), 1, &[Signal::sell(t(1), 110.0)]);
        assert_eq!(long_only.trades().len(), 1);
        assert!(long_only.state().is_flat());

        // A sell while flat cannot open a short in long-only mode.
        long_only.process_bar(&flat_bar(2, 110.0), 2, &[Signal::sell(t(2), 110.0)]);
        assert!(long_only.state().is_flat());
    }

    #[test]
    fn time_stop_closes_losing_position() {
        let config = EngineConfig {
            time_stop_bars: 2,
            ..frictionless()
        };
        let mut engine = Engine::new(config).unwrap();
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        engine.process_bar(&flat_bar(1, 99.0), 1, &[]);
        assert!(engine.position().is_some());
        engine.process_bar(&flat_bar(2, 98.0), 2, &[]);
        let trade = &engine.trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::TimeStop);
        assert_eq!(trade.exit_price, 98.0);
    }

    #[test]
    fn time_stop_spares_winning_position() {
        let config = EngineConfig {
            time_stop_bars: 1,
            ..frictionless()
        };
        let mut engine = Engine::new(config).unwrap();
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        engine.process_bar(&flat_bar(1, 101.0), 1, &[]);
        engine.process_bar(&flat_bar(2, 102.0), 2, &[]);
        assert!(engine.position().is_some());
    }

    #[test]
    fn break_even_moves_stop_to_entry() {
        let config = EngineConfig {
            stop_loss_atr: 1.0,
            break_even_at_r: 1.0,
            ..frictionless()
        };
        let mut engine = Engine::new(config).unwrap().with_atr(vec![Some(5.0); 4]);
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        assert_eq!(engine.position().unwrap().stop_loss_price, Some(95.0));

        engine.process_bar(&bar(1, 101.0, 105.5, 100.5, 104.0), 1, &[]);
        let position = engine.position().unwrap();
        assert!(position.break_even_applied);
        assert_eq!(position.stop_loss_price, Some(100.0));
    }

    #[test]
    fn trailing_stop_ratchets_from_extreme() {
        let config = EngineConfig {
            trailing_atr: 2.0,
            ..frictionless()
        };
        let mut engine = Engine::new(config).unwrap().with_atr(vec![Some(1.0); 5]);
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        // Trailing implies an initial stop at 98.
        assert_eq!(engine.position().unwrap().stop_loss_price, Some(98.0));

        engine.process_bar(&bar(1, 100.0, 104.0, 99.5, 103.0), 1, &[]);
        // Candidate uses the extreme before this bar's update: 100 - 2 = 98.
        assert_eq!(engine.position().unwrap().stop_loss_price, Some(98.0));
        assert_eq!(engine.position().unwrap().extreme_price, 104.0);

        engine.process_bar(&bar(2, 103.0, 103.5, 102.5, 103.0), 2, &[]);
        assert_eq!(engine.position().unwrap().stop_loss_price, Some(102.0));
    }

    #[test]
    fn next_bar_open_defers_fill() {
        let config = EngineConfig {
            execution_model: ExecutionModel::NextBarOpen,
            ..frictionless()
        };
        let mut engine = Engine::new(config).unwrap();
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        assert!(engine.state().is_flat());

        engine.process_bar(&bar(1, 125.0, 126.0, 124.0, 125.0), 1, &[]);
        let position = engine.position().unwrap();
        assert_eq!(position.entry_price, 125.0);
        assert_eq!(position.entry_bar, 1);
    }

    #[test]
    fn bar_close_model_uses_close() {
        let config = EngineConfig {
            execution_model: ExecutionModel::BarClose,
            ..frictionless()
        };
        let mut engine = Engine::new(config).unwrap();
        engine.process_bar(&bar(0, 99.0, 101.0, 98.0, 100.0), 0, &[Signal::buy(t(0), 42.0)]);
        assert_eq!(engine.position().unwrap().entry_price, 100.0);
    }

    #[test]
    fn end_of_data_close_leaves_engine_flat() {
        let mut engine = Engine::new(frictionless()).unwrap();
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        let trade = engine.close_position_at_market(&flat_bar(1, 102.0), 1).unwrap();
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert!(engine.state().is_flat());
        assert_eq!(engine.state().unrealized_pnl, 0.0);
        assert!(engine.close_position_at_market(&flat_bar(1, 102.0), 1).is_none());
    }

    #[test]
    fn reset_restores_initial_state_and_keeps_listeners() {
        let count = Arc::new(Mutex::new(0));
        let mut engine = Engine::new(frictionless()).unwrap();
        let counter = Arc::clone(&count);
        engine.subscribe(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        engine.close_position_at_market(&flat_bar(1, 90.0), 1);
        engine.reset();
        assert_eq!(engine.snapshot(), EngineState::new(1_000.0));

        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        engine.close_position_at_market(&flat_bar(1, 100.0), 1);
        assert_eq!(engine.trades()[0].id.0, 1);
        assert_eq!(*count.lock().unwrap(), 4);
    }

    #[test]
    fn failing_listener_does_not_abort_processing() {
        let mut engine = Engine::new(frictionless()).unwrap();
        engine.subscribe(|_| Err(ListenerError::new("listener down")));
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        assert!(engine.position().is_some());
        assert_eq!(engine.listener_failures(), 1);
    }

    #[test]
    fn degenerate_signal_price_skips_entry_silently() {
        let events = Arc::new(Mutex::new(0));
        let mut engine = Engine::new(frictionless()).unwrap();
        let counter = Arc::clone(&events);
        engine.subscribe(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), f64::NAN)]);
        engine.process_bar(&flat_bar(1, 100.0), 1, &[Signal::buy(t(1), 0.0)]);
        assert!(engine.state().is_flat());
        assert_eq!(*events.lock().unwrap(), 0);
    }

    #[test]
    fn non_finite_exit_price_keeps_position_open() {
        let mut engine = Engine::new(frictionless()).unwrap();
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);

        let state = engine.process_bar(&flat_bar(1, 101.0), 1, &[Signal::sell(t(1), f64::NAN)]);
        assert!(state.position.as_ref().unwrap().is_long());
        assert!(state.trades.is_empty());
        assert_eq!(state.equity, 1_000.0);
        assert_eq!(state.realized_pnl, 0.0);

        engine.process_bar(&flat_bar(2, 102.0), 2, &[Signal::sell(t(2), f64::INFINITY)]);
        assert!(engine.position().unwrap().is_long());
        assert!(engine.trades().is_empty());

        // A usable price later still closes and flips.
        engine.process_bar(&flat_bar(3, 103.0), 3, &[Signal::sell(t(3), 103.0)]);
        assert_eq!(engine.trades().len(), 1);
        assert_eq!(engine.trades()[0].pnl, 30.0);
        assert!(engine.position().unwrap().is_short());
    }

    #[test]
    fn market_close_on_void_bar_keeps_position() {
        let mut engine = Engine::new(frictionless()).unwrap();
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);

        let void = Bar::new(t(1), f64::NAN, f64::NAN, f64::NAN, f64::NAN, 0.0);
        assert!(engine.close_position_at_market(&void, 1).is_none());
        assert!(engine.position().is_some());
        assert_eq!(engine.state().equity, 1_000.0);
        assert_eq!(engine.state().current_price, Some(100.0));

        let trade = engine.close_position_at_market(&flat_bar(2, 101.0), 2).unwrap();
        assert_eq!(trade.pnl, 10.0);
        assert_eq!(engine.state().equity, 1_010.0);
    }

    #[test]
    fn set_atr_replaces_series_for_later_entries() {
        let config = EngineConfig {
            stop_loss_atr: 1.0,
            ..frictionless()
        };
        let mut engine = Engine::new(config).unwrap().with_atr(vec![Some(2.0); 2]);
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        assert_eq!(engine.position().unwrap().stop_loss_price, Some(98.0));

        engine.reset();
        engine.set_atr(vec![Some(4.0); 2]);
        engine.process_bar(&flat_bar(0, 100.0), 0, &[Signal::buy(t(0), 100.0)]);
        assert_eq!(engine.position().unwrap().stop_loss_price, Some(96.0));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            initial_capital: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(Engine::new(config).is_err());
    }
}
