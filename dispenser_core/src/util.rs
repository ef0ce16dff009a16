//! Common time and value helpers for dispenser_core.

use std::time::{Duration, Instant};

/// Seconds per minute; flow rates are litres/minute, ticks are in seconds.
pub const SECS_PER_MIN: f64 = 60.0;

/// True when `period` has elapsed since `last`, or when nothing has run yet.
#[inline]
pub fn is_due(now: Instant, last: Option<Instant>, period: Duration) -> bool {
    last.is_none_or(|t| now.saturating_duration_since(t) >= period)
}

/// Seconds between `prev` and `now`; zero without a previous timestamp or
/// if the clock went backwards.
#[inline]
pub fn elapsed_secs(prev: Option<Instant>, now: Instant) -> f64 {
    prev.map_or(0.0, |p| now.saturating_duration_since(p).as_secs_f64())
}

/// Floor at zero; NaN and infinities read as zero.
#[inline]
pub fn non_negative(v: f32) -> f32 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

#[inline]
pub fn non_negative_f64(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

/// Clamp into `[min, max]`; NaN maps to `min`.
#[inline]
pub fn clamp_range(v: f32, min: f32, max: f32) -> f32 {
    if v.is_nan() { min } else { v.clamp(min, max) }
}
