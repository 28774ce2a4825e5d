//! CSV loading for bars and signals.
//!
//! Bar files carry `time,open,high,low,close,volume`; signal files carry
//! `time,type,price`. Times are `YYYY-MM-DD` or a full datetime
//! (`YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD HH:MM:SS`).
//!
//! Bars must be strictly increasing in time and OHLC-sane. Rows with a
//! `NaN` price are kept as void bars; the engine skips them.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;

use stratlab_core::domain::{Bar, Signal, SignalKind};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },

    #[error("{origin} line {line}: unrecognized time '{value}'")]
    Time {
        origin: String,
        line: u64,
        value: String,
    },

    #[error("{origin} line {line}: bar at {time} does not follow {previous}")]
    Unsorted {
        origin: String,
        line: u64,
        time: NaiveDateTime,
        previous: NaiveDateTime,
    },

    #[error("{origin} line {line}: inconsistent OHLC (open {open}, high {high}, low {low}, close {close})")]
    InsaneBar {
        origin: String,
        line: u64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("{origin}: no bars")]
    Empty { origin: String },
}

#[derive(Debug, Deserialize)]
struct BarRow {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    time: String,
    #[serde(rename = "type")]
    kind: SignalKind,
    price: f64,
}

/// Parse `YYYY-MM-DD` (midnight) or a `T`/space separated datetime.
pub fn parse_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn open_file(path: &Path) -> Result<std::fs::File, LoadError> {
    std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_reader<R: io::Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(input)
}

/// Load and validate a bar file.
pub fn load_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>, LoadError> {
    let path = path.as_ref();
    let bars = read_bars(open_file(path)?, &path.display().to_string())?;
    tracing::info!(path = %path.display(), bars = bars.len(), "bars loaded");
    Ok(bars)
}

/// Parse bars from any reader. `origin` labels errors.
pub fn read_bars<R: io::Read>(input: R, origin: &str) -> Result<Vec<Bar>, LoadError> {
    let mut reader = csv_reader(input);
    let mut bars: Vec<Bar> = Vec::new();

    for result in reader.deserialize::<BarRow>() {
        let row = result.map_err(|source| LoadError::Csv {
            origin: origin.to_string(),
            source,
        })?;
        // Header is line 1.
        let line = bars.len() as u64 + 2;
        let time = parse_time(&row.time).ok_or_else(|| LoadError::Time {
            origin: origin.to_string(),
            line,
            value: row.time.clone(),
        })?;

        if let Some(previous) = bars.last().map(|b| b.time) {
            if time <= previous {
                return Err(LoadError::Unsorted {
                    origin: origin.to_string(),
                    line,
                    time,
                    previous,
                });
            }
        }

        let bar = Bar::new(
            time,
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume.unwrap_or(0.0),
        );
        if !bar.is_void() && !bar.is_sane() {
            return Err(LoadError::InsaneBar {
                origin: origin.to_string(),
                line,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            });
        }
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(LoadError::Empty {
            origin: origin.to_string(),
        });
    }
    Ok(bars)
}

/// Load a signal file. An empty file is a valid, signal-free strategy.
pub fn load_signals(path: impl AsRef<Path>) -> Result<Vec<Signal>, LoadError> {
    let path = path.as_ref();
    let signals = read_signals(open_file(path)?, &path.display().to_string())?;
    tracing::info!(path = %path.display(), signals = signals.len(), "signals loaded");
    Ok(signals)
}

pub fn read_signals<R: io::Read>(input: R, origin: &str) -> Result<Vec<Signal>, LoadError> {
    let mut reader = csv_reader(input);
    let mut signals = Vec::new();

    for result in reader.deserialize::<SignalRow>() {
        let row = result.map_err(|source| LoadError::Csv {
            origin: origin.to_string(),
            source,
        })?;
        let line = signals.len() as u64 + 2;
        let time = parse_time(&row.time).ok_or_else(|| LoadError::Time {
            origin: origin.to_string(),
            line,
            value: row.time.clone(),
        })?;
        signals.push(Signal {
            time,
            kind: row.kind,
            price: row.price,
        });
    }
    Ok(signals)
}

/// Signals grouped by bar index.
#[derive(Debug, Clone, Default)]
pub struct AlignedSignals {
    /// One entry per bar, in file order within a bar.
    pub per_bar: Vec<Vec<Signal>>,
    /// Signals whose time matched no bar.
    pub unmatched: usize,
}

/// Attach each signal to the bar with the same timestamp.
pub fn align_signals(bars: &[Bar], signals: &[Signal]) -> AlignedSignals {
    let index: HashMap<NaiveDateTime, usize> =
        bars.iter().enumerate().map(|(i, b)| (b.time, i)).collect();

    let mut per_bar = vec![Vec::new(); bars.len()];
    let mut unmatched = 0;
    for signal in signals {
        match index.get(&signal.time) {
            Some(&i) => per_bar[i].push(signal.clone()),
            None => unmatched += 1,
        }
    }

    if unmatched > 0 {
        tracing::warn!(unmatched, "signals without a matching bar were dropped");
    }
    AlignedSignals { per_bar, unmatched }
}

/// Bars plus their aligned signals, ready to replay.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub bars: Vec<Bar>,
    pub signals: Vec<Vec<Signal>>,
    pub unmatched_signals: usize,
    /// BLAKE3 over the bar data.
    pub dataset_hash: String,
}

impl MarketData {
    pub fn new(bars: Vec<Bar>, signals: &[Signal]) -> Self {
        let aligned = align_signals(&bars, signals);
        let dataset_hash = dataset_hash(&bars);
        Self {
            bars,
            signals: aligned.per_bar,
            unmatched_signals: aligned.unmatched,
            dataset_hash,
        }
    }

    pub fn load(bars_path: impl AsRef<Path>, signals_path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let bars = load_bars(bars_path)?;
        let signals = load_signals(signals_path)?;
        Ok(Self::new(bars, &signals))
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.iter().map(Vec::len).sum()
    }
}

fn dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(bar.time.to_string().as_bytes());
        for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
