//! Protective and profit levels fixed at entry.
//!
//! # Formula
//! ```text
//! percentage mode: stop   = fill * (1 - dir * stop_loss_percent / 100)
//!                  target = fill * (1 + dir * take_profit_percent / 100)
//! atr mode:        stop   = fill - dir * stop_loss_atr * ATR
//!                           (or trailing_atr * ATR when no fixed stop)
//!                  target = fill + dir * take_profit_atr * ATR
//! risk_per_share = |fill - stop|
//! partial        = fill + dir * risk_per_share * partial_take_profit_at_r
//! ```
//!
//! # Example
//! - Long fill: $100.00, ATR $2.00
//! - Stop 2x ATR → $96.00, target 4x ATR → $108.00
//! - Risk per share: $4.00; partial at 1R → $104.00

use crate::config::{EngineConfig, RiskMode};
use crate::domain::Direction;

/// Levels computed for one entry. Absent levels are `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLevels {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub partial_target: Option<f64>,
    pub risk_per_share: f64,
}

/// Derive stop, target and partial levels for a fill.
///
/// In ATR mode an absent, non-finite or non-positive ATR leaves the ATR
/// levels unset; the entry itself still proceeds.
pub fn compute_levels(
    fill_price: f64,
    direction: Direction,
    config: &EngineConfig,
    atr: Option<f64>,
) -> RiskLevels {
    let dir = direction.factor();

    let (stop_loss, take_profit) = match config.risk_mode {
        RiskMode::Percentage => {
            let stop = (config.stop_loss_enabled && config.stop_loss_percent > 0.0)
                .then(|| fill_price * (1.0 - dir * config.stop_loss_percent / 100.0));
            let target = (config.take_profit_enabled && config.take_profit_percent > 0.0)
                .then(|| fill_price * (1.0 + dir * config.take_profit_percent / 100.0));
            (stop, target)
        }
        RiskMode::Atr => match atr.filter(|a| a.is_finite() && *a > 0.0) {
            Some(atr) => {
                let stop_distance = if config.stop_loss_atr > 0.0 {
                    Some(config.stop_loss_atr * atr)
                } else if config.trailing_atr > 0.0 {
                    Some(config.trailing_atr * atr)
                } else {
                    None
                };
                let stop = stop_distance.map(|d| fill_price - dir * d);
                let target = (config.take_profit_atr > 0.0)
                    .then(|| fill_price + dir * config.take_profit_atr * atr);
                (stop, target)
            }
            None => (None, None),
        },
    };

    let risk_per_share = stop_loss.map_or(0.0, |s| (fill_price - s).abs());

    let partial_enabled = risk_per_share > 0.0
        && config.partial_take_profit_at_r > 0.0
        && config.partial_take_profit_percent > 0.0
        && config.partial_take_profit_percent < 100.0;
    let partial_target = partial_enabled
        .then(|| fill_price + dir * risk_per_share * config.partial_take_profit_at_r);

    RiskLevels {
        stop_loss,
        take_profit,
        partial_target,
        risk_per_share,
    }
}
