//! Position: the single open trade the engine may hold.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::bar::Bar;

/// Side of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short.
    pub fn factor(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Whether a bar's range reaches a protective stop at `level`.
    /// Long stops sit below price, short stops above.
    pub fn stop_touched(self, bar: &Bar, level: f64) -> bool {
        match self {
            Direction::Long => bar.low <= level,
            Direction::Short => bar.high >= level,
        }
    }

    /// Whether a bar's range reaches a profit level (target or partial).
    pub fn target_touched(self, bar: &Bar, level: f64) -> bool {
        match self {
            Direction::Long => bar.high >= level,
            Direction::Short => bar.low <= level,
        }
    }

    /// The bar's most favorable price for this side.
    pub fn favorable_extreme(self, bar: &Bar) -> f64 {
        match self {
            Direction::Long => bar.high,
            Direction::Short => bar.low,
        }
    }
}

/// An open position.
///
/// Optional levels are `None` when not configured, never a sentinel price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    pub entry_time: NaiveDateTime,
    pub entry_bar: usize,
    /// Fill price including slippage.
    pub entry_price: f64,
    /// Remaining open size. Only ever decreases, via partial close.
    pub size: f64,
    pub risk_per_share: f64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub partial_target_price: Option<f64>,
    pub partial_taken: bool,
    pub break_even_applied: bool,
    /// Max high (long) or min low (short) since entry.
    pub extreme_price: f64,
    pub bars_in_trade: usize,
    /// Entry commission attributable to the remaining size.
    pub entry_commission: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Short
    }

    pub fn entry_value(&self) -> f64 {
        self.size * self.entry_price
    }

    /// Revalue against `price` and store the result on the position.
    pub fn mark(&mut self, price: f64) -> f64 {
        let pnl = (price - self.entry_price) * self.size * self.direction.factor();
        let basis = self.entry_value();
        self.unrealized_pnl = pnl;
        self.unrealized_pnl_percent = if basis != 0.0 { pnl / basis * 100.0 } else { 0.0 };
        pnl
    }

    /// True when `price` is on the losing side of the entry.
    pub fn is_losing_at(&self, price: f64) -> bool {
        (price - self.entry_price) * self.direction.factor() < 0.0
    }

    /// Extend the since-entry extreme with this bar's range.
    pub fn update_extreme(&mut self, bar: &Bar) {
        self.extreme_price = match self.direction {
            Direction::Long => self.extreme_price.max(bar.high),
            Direction::Short => self.extreme_price.min(bar.low),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn position(direction: Direction) -> Position {
        Position {
            direction,
            entry_time: t0(),
            entry_bar: 0,
            entry_price: 100.0,
            size: 10.0,
            risk_per_share: 5.0,
            stop_loss_price: None,
            take_profit_price: None,
            partial_target_price: None,
            partial_taken: false,
            break_even_applied: false,
            extreme_price: 100.0,
            bars_in_trade: 0,
            entry_commission: 0.0,
            unrealized_pnl: 0.0,
            unrealized_pnl_percent: 0.0,
        }
    }

    #[test]
    fn mark_long_and_short() {
        let mut long = position(Direction::Long);
        assert_eq!(long.mark(110.0), 100.0);
        assert!((long.unrealized_pnl_percent - 10.0).abs() < 1e-12);

        let mut short = position(Direction::Short);
        assert_eq!(short.mark(110.0), -100.0);
        assert!(short.is_losing_at(110.0));
        assert!(!short.is_losing_at(90.0));
    }

    #[test]
    fn touch_tests_are_inclusive() {
        let bar = Bar::new(t0(), 100.0, 105.0, 95.0, 100.0, 0.0);
        assert!(Direction::Long.stop_touched(&bar, 95.0));
        assert!(Direction::Long.target_touched(&bar, 105.0));
        assert!(Direction::Short.stop_touched(&bar, 105.0));
        assert!(Direction::Short.target_touched(&bar, 95.0));
        assert!(!Direction::Long.stop_touched(&bar, 94.99));
    }

    #[test]
    fn extreme_only_moves_favorably() {
        let mut long = position(Direction::Long);
        long.update_extreme(&Bar::new(t0(), 100.0, 104.0, 99.0, 101.0, 0.0));
        long.update_extreme(&Bar::new(t0(), 100.0, 102.0, 97.0, 98.0, 0.0));
        assert_eq!(long.extreme_price, 104.0);

        let mut short = position(Direction::Short);
        short.update_extreme(&Bar::new(t0(), 100.0, 101.0, 96.0, 97.0, 0.0));
        short.update_extreme(&Bar::new(t0(), 100.0, 103.0, 98.0, 102.0, 0.0));
        assert_eq!(short.extreme_price, 96.0);
    }
}
