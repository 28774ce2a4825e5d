//! StratLab Core: bar-by-bar trade simulation engine.
//!
//! This crate contains the heart of the strategy simulator:
//! - Domain types (bars, signals, positions, trades)
//! - Engine configuration with TOML loading and validation
//! - Risk/sizing calculator (share count, fill price, stop/target/partial levels)
//! - Bar processor state machine with a fixed exit priority order
//! - Trade ledger with full and partial close PnL settlement
//! - Fault-isolated lifecycle event emitter
//!
//! The engine performs no I/O and no indicator computation; callers supply
//! bars, signals and an index-aligned ATR series.

pub mod config;
pub mod domain;
pub mod engine;
pub mod sizers;

pub use config::{ConfigError, EngineConfig, ExecutionModel, RiskMode, TradeDirection};
pub use engine::{Engine, EngineEvent, EngineState};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: data types are Send + Sync and the engine is Send,
    /// so parameter searches can move one engine per variant onto a worker.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<EngineConfig>();
        require_sync::<EngineConfig>();
        require_send::<EngineState>();
        require_sync::<EngineState>();
        require_send::<EngineEvent>();
        require_sync::<EngineEvent>();

        require_send::<Engine>();
    }

    /// Architecture contract: sizing never sees the engine or its listeners.
    #[test]
    fn sizing_is_a_pure_function_of_its_inputs() {
        fn _check(
            request: &sizers::EntryRequest,
            config: &EngineConfig,
        ) -> Option<sizers::EntryPlan> {
            sizers::plan_entry(request, config)
        }
    }
}
