//! Simulation engine: bar-by-bar position state machine and its supporting pieces.
//!
//! Per bar the processor runs three phases:
//!
//! 1. Position management: exits in fixed priority, then stop ratchets
//! 2. Signal processing: entries, signal exits, flips
//! 3. Mark-to-market: unrealized PnL against the close

pub mod events;
pub mod ledger;
pub mod processor;
pub mod ratchet;
pub mod state;

pub use events::{EngineEvent, EventEmitter, Listener, ListenerError, StopUpdateCause, Subscription};
pub use ledger::{settle, ExitFill, Ledger, Settlement};
pub use processor::Engine;
pub use state::EngineState;
