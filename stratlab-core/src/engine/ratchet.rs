//! Ratchet invariant enforcement
//!
//! **Core Rule:** Stops may tighten, never loosen (even if ATR expands).
//!
//! - Long positions: stop can only rise
//! - Short positions: stop can only fall
//!
//! Both break-even and trailing updates go through [`tighten`].

use crate::domain::Direction;

/// Whether `proposed` is strictly tighter than `current` for this side.
/// With no current stop, any finite level counts as tightening.
pub fn is_tighter(direction: Direction, current: Option<f64>, proposed: f64) -> bool {
    if !proposed.is_finite() {
        return false;
    }
    match current {
        None => true,
        Some(current) => match direction {
            Direction::Long => proposed > current,
            Direction::Short => proposed < current,
        },
    }
}

/// Return the new stop if `proposed` tightens `current`, else `None`.
///
/// # Example
/// ```
/// use stratlab_core::domain::Direction;
/// use stratlab_core::engine::ratchet::tighten;
///
/// // Tightening: $95 → $100 (allowed)
/// assert_eq!(tighten(Direction::Long, Some(95.0), 100.0), Some(100.0));
///
/// // Loosening: $100 → $90 (blocked)
/// assert_eq!(tighten(Direction::Long, Some(100.0), 90.0), None);
/// ```
pub fn tighten(direction: Direction, current: Option<f64>, proposed: f64) -> Option<f64> {
    is_tighter(direction, current, proposed).then_some(proposed)
}
