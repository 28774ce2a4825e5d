//! Average True Range series for the engine.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (EMA with alpha = 1/period), seeded with the
//! mean of the first `period` true ranges. TR[0] has no previous close and
//! is left out of the seed, so the first value lands at index `period`.

use stratlab_core::domain::Bar;

/// True Range per bar. `NaN` where the bar or the previous close is void.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let range = bar.high - bar.low;
        let value = match i.checked_sub(1).map(|p| bars[p].close) {
            Some(pc) => range.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
            None => range,
        };
        // f64::max drops NaN operands, so propagate voids explicitly.
        let void = bar.is_void() || i.checked_sub(1).is_some_and(|p| bars[p].close.is_nan());
        tr.push(if void { f64::NAN } else { value });
    }
    tr
}

/// Wilder ATR aligned to `bars`; `None` during warm-up and on void bars.
///
/// A void bar does not reset the smoothing: the next valid true range
/// continues from the last smoothed value.
pub fn atr_series(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() <= period {
        return out;
    }

    let tr = true_range(bars);
    let alpha = 1.0 / period as f64;
    let mut seed_sum = 0.0;
    let mut seed_count = 0;
    let mut prev: Option<f64> = None;

    for (i, &value) in tr.iter().enumerate().skip(1) {
        if value.is_nan() {
            continue;
        }
        match prev {
            None => {
                seed_sum += value;
                seed_count += 1;
                if seed_count == period {
                    let seed = seed_sum / period as f64;
                    prev = Some(seed);
                    out[i] = Some(seed);
                }
            }
            Some(p) => {
                let smoothed = alpha * value + (1.0 - alpha) * p;
                prev = Some(smoothed);
                out[i] = Some(smoothed);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars_from(hlc: &[(f64, f64, f64)]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        hlc.iter()
            .enumerate()
            .map(|(i, &(h, l, c))| Bar::new(start + Duration::days(i as i64), c, h, l, c, 0.0))
            .collect()
    }

    #[test]
    fn true_range_uses_previous_close() {
        let bars = bars_from(&[(11.0, 9.0, 10.0), (15.0, 12.0, 14.0), (14.5, 13.5, 14.0)]);
        let tr = true_range(&bars);
        assert_eq!(tr[0], 2.0);
        // Gap up: |15 - 10| beats 15 - 12.
        assert_eq!(tr[1], 5.0);
        assert_eq!(tr[2], 1.0);
    }

    #[test]
    fn warm_up_then_wilder_smoothing() {
        let bars = bars_from(&[
            (11.0, 9.0, 10.0),
            (12.0, 10.0, 11.0),
            (13.0, 11.0, 12.0),
            (16.0, 12.0, 15.0),
        ]);
        let atr = atr_series(&bars, 2);
        assert_eq!(atr[0], None);
        assert_eq!(atr[1], None);
        // Seed = mean(TR[1], TR[2]) = mean(2, 2).
        assert_eq!(atr[2], Some(2.0));
        // 0.5 * 4 + 0.5 * 2.
        assert_eq!(atr[3], Some(3.0));
    }

    #[test]
    fn void_bar_yields_none_without_reset() {
        let mut bars = bars_from(&[
            (11.0, 9.0, 10.0),
            (12.0, 10.0, 11.0),
            (13.0, 11.0, 12.0),
            (13.0, 11.0, 12.0),
            (14.0, 12.0, 13.0),
        ]);
        bars[3] = Bar::new(bars[3].time, f64::NAN, f64::NAN, f64::NAN, f64::NAN, 0.0);
        let atr = atr_series(&bars, 2);
        assert_eq!(atr[2], Some(2.0));
        assert_eq!(atr[3], None);
        // Bar 4's previous close is void, so its TR is void too.
        assert_eq!(atr[4], None);
    }

    #[test]
    fn short_input_is_all_warm_up() {
        let bars = bars_from(&[(11.0, 9.0, 10.0), (12.0, 10.0, 11.0)]);
        assert!(atr_series(&bars, 14).iter().all(Option::is_none));
        assert!(atr_series(&bars, 0).iter().all(Option::is_none));
    }
}
