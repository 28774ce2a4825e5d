//! Domain types for StratLab

pub mod bar;
pub mod position;
pub mod signal;
pub mod trade;

pub use bar::Bar;
pub use position::{Direction, Position};
pub use signal::{Signal, SignalKind};
pub use trade::{ExitReason, Trade, TradeId};
