//! Signal: an externally generated buy/sell instruction.
//!
//! The engine trusts signal values as-is; it never generates or filters them
//! beyond the configured trade direction.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::position::Direction;

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Buy,
    Sell,
}

impl SignalKind {
    /// The position direction this signal would open.
    pub fn direction(self) -> Direction {
        match self {
            SignalKind::Buy => Direction::Long,
            SignalKind::Sell => Direction::Short,
        }
    }
}

/// A single signal attached to a bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub time: NaiveDateTime,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub price: f64,
}

impl Signal {
    pub fn buy(time: NaiveDateTime, price: f64) -> Self {
        Self {
            time,
            kind: SignalKind::Buy,
            price,
        }
    }

    pub fn sell(time: NaiveDateTime, price: f64) -> Self {
        Self {
            time,
            kind: SignalKind::Sell,
            price,
        }
    }

    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }
}
