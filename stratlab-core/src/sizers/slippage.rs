//! Slippage: adverse offset applied to every fill.
//!
//! Buys fill higher, sells fill lower, by a fixed fraction of the requested
//! price. Zero or non-finite rates leave the price untouched.

use crate::domain::Direction;

/// Side of a single fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillSide {
    Buy,
    Sell,
}

impl FillSide {
    /// Side of the fill that opens a position.
    pub fn entry(direction: Direction) -> Self {
        match direction {
            Direction::Long => FillSide::Buy,
            Direction::Short => FillSide::Sell,
        }
    }

    /// Side of the fill that closes a position.
    pub fn exit(direction: Direction) -> Self {
        match direction {
            Direction::Long => FillSide::Sell,
            Direction::Short => FillSide::Buy,
        }
    }
}

/// Move `price` against the trader by `rate` (fraction, e.g. 0.0005 = 5 bps).
pub fn apply_slippage(price: f64, side: FillSide, rate: f64) -> f64 {
    if !rate.is_finite() || rate == 0.0 {
        return price;
    }
    match side {
        FillSide::Buy => price * (1.0 + rate),
        FillSide::Sell => price * (1.0 - rate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_fills_higher_sell_fills_lower() {
        let buy = apply_slippage(100.0, FillSide::Buy, 0.001);
        let sell = apply_slippage(100.0, FillSide::Sell, 0.001);
        assert!((buy - 100.1).abs() < 1e-10);
        assert!((sell - 99.9).abs() < 1e-10);
    }

    #[test]
    fn zero_and_non_finite_rates_are_no_ops() {
        assert_eq!(apply_slippage(100.0, FillSide::Buy, 0.0), 100.0);
        assert_eq!(apply_slippage(100.0, FillSide::Sell, f64::NAN), 100.0);
        assert_eq!(apply_slippage(100.0, FillSide::Buy, f64::INFINITY), 100.0);
    }

    #[test]
    fn entry_and_exit_sides_mirror() {
        assert_eq!(FillSide::entry(Direction::Long), FillSide::Buy);
        assert_eq!(FillSide::exit(Direction::Long), FillSide::Sell);
        assert_eq!(FillSide::entry(Direction::Short), FillSide::Sell);
        assert_eq!(FillSide::exit(Direction::Short), FillSide::Buy);
    }
}
