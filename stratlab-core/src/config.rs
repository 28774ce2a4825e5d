//! Engine configuration: immutable for the lifetime of one run.
//!
//! Every field has a default, so TOML files only need to list overrides:
//!
//! ```toml
//! initial_capital = 25000.0
//! risk_mode = "atr"
//! stop_loss_atr = 1.5
//! trailing_atr = 3.0
//! trade_direction = "long"
//! execution_model = "next-bar-open"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::domain::Direction;

/// Errors raised while loading or validating an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// How stop and target distances are derived at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskMode {
    /// Fixed percentage of the entry fill.
    Percentage,
    /// Multiples of the ATR value at the entry bar.
    Atr,
}

/// Which price a signal fills at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionModel {
    /// The price carried by the signal.
    SignalPrice,
    /// The close of the bar the signal arrives on.
    BarClose,
    /// Queued and filled at the open of the next processed bar.
    NextBarOpen,
}

/// Which sides may be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradeDirection {
    Long,
    Short,
    Both,
}

impl TradeDirection {
    pub fn allows(self, direction: Direction) -> bool {
        match self {
            TradeDirection::Both => true,
            TradeDirection::Long => direction == Direction::Long,
            TradeDirection::Short => direction == Direction::Short,
        }
    }
}

/// Configuration for a single simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// Share of current equity allocated per entry, in percent.
    pub position_size_percent: f64,
    /// Commission per side, in percent of traded value.
    pub commission_percent: f64,
    pub slippage_bps: f64,

    /// Lookback of the ATR series the caller supplies. The engine does not
    /// compute ATR; the runner uses this to build the series.
    pub atr_period: usize,
    pub risk_mode: RiskMode,

    // ── ATR mode ──
    pub stop_loss_atr: f64,
    pub take_profit_atr: f64,
    pub trailing_atr: f64,

    // ── Percentage mode ──
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub stop_loss_enabled: bool,
    pub take_profit_enabled: bool,

    // ── Trade management ──
    /// Partial target distance in R-multiples of the initial risk.
    pub partial_take_profit_at_r: f64,
    /// Share of the open size closed at the partial target, in percent.
    pub partial_take_profit_percent: f64,
    /// Favorable move, in R, that moves the stop to entry.
    pub break_even_at_r: f64,
    /// Close losing positions after this many bars. 0 disables.
    pub time_stop_bars: usize,

    pub execution_model: ExecutionModel,
    pub allow_same_bar_exit: bool,
    pub trade_direction: TradeDirection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            position_size_percent: 100.0,
            commission_percent: 0.1,
            slippage_bps: 0.0,
            atr_period: 14,
            risk_mode: RiskMode::Atr,
            stop_loss_atr: 2.0,
            take_profit_atr: 4.0,
            trailing_atr: 0.0,
            stop_loss_percent: 2.0,
            take_profit_percent: 4.0,
            stop_loss_enabled: true,
            take_profit_enabled: true,
            partial_take_profit_at_r: 0.0,
            partial_take_profit_percent: 0.0,
            break_even_at_r: 0.0,
            time_stop_bars: 0,
            execution_model: ExecutionModel::SignalPrice,
            allow_same_bar_exit: false,
            trade_direction: TradeDirection::Both,
        }
    }
}

impl EngineConfig {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values no run could interpret. Degenerate-but-meaningful values
    /// (e.g. a 0 % position size) pass and simply produce skipped entries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(invalid("initial_capital", "must be finite and > 0"));
        }

        let non_negative = [
            ("position_size_percent", self.position_size_percent),
            ("commission_percent", self.commission_percent),
            ("slippage_bps", self.slippage_bps),
            ("stop_loss_atr", self.stop_loss_atr),
            ("take_profit_atr", self.take_profit_atr),
            ("trailing_atr", self.trailing_atr),
            ("stop_loss_percent", self.stop_loss_percent),
            ("take_profit_percent", self.take_profit_percent),
            ("partial_take_profit_at_r", self.partial_take_profit_at_r),
            ("partial_take_profit_percent", self.partial_take_profit_percent),
            ("break_even_at_r", self.break_even_at_r),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("must be finite and >= 0, got {value}")));
            }
        }

        if self.partial_take_profit_percent > 100.0 {
            return Err(invalid(
                "partial_take_profit_percent",
                format!("must be <= 100, got {}", self.partial_take_profit_percent),
            ));
        }
        if self.atr_period == 0 {
            return Err(invalid("atr_period", "must be >= 1"));
        }
        Ok(())
    }

    /// Commission per side as a fraction.
    pub fn commission_rate(&self) -> f64 {
        self.commission_percent / 100.0
    }

    /// Slippage as a fraction of price.
    pub fn slippage_rate(&self) -> f64 {
        self.slippage_bps / 10_000.0
    }

    /// Deterministic BLAKE3 hex digest of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
