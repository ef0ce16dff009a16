//! Centered smoothing of a raw sample stream.
//!
//! `FlowFilter` keeps a fixed-capacity window of the most recent samples.
//! Until the window is full it is *filling* and reports 0.0; once full it
//! slides one-in-one-out and reports the smoother's center-tap output,
//! bounded by the window's own range and floored at zero. The caller's schedule is never held up while filling.

use std::collections::VecDeque;

use crate::config::SmootherKind;
use crate::error::BuildError;

/// Output while the window is still filling.
pub const FILLING_OUTPUT: f32 = 0.0;

/// Estimates the value at the center of a full, odd-length window.
pub trait Smoother {
    fn center_tap(&self, window: &[f32]) -> f32;
}

/// Quadratic Savitzky-Golay smoother evaluated at the center sample.
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    coeffs: Vec<f32>,
}

impl SavitzkyGolay {
    pub fn new(window: usize) -> Result<Self, BuildError> {
        if window == 0 || window % 2 == 0 {
            return Err(BuildError::InvalidConfig(
                "savitzky-golay window must be odd and >= 1",
            ));
        }
        Ok(Self {
            coeffs: sg_quadratic_center(window),
        })
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coeffs
    }
}

/// Center-point weights of a least-squares quadratic fit over `2n+1` points:
/// `c_i = (3(3n²+3n-1) - 15i²) / ((2n+1)(4n²+4n-3))` for `i` in `-n..=n`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn sg_quadratic_center(window: usize) -> Vec<f32> {
    let n = (window / 2) as f64;
    let num0 = 3.0 * (3.0 * n * n + 3.0 * n - 1.0);
    let den = (2.0 * n + 1.0) * (4.0 * n * n + 4.0 * n - 3.0);
    (0..window)
        .map(|k| {
            let i = k as f64 - n;
            ((num0 - 15.0 * i * i) / den) as f32
        })
        .collect()
}

impl Smoother for SavitzkyGolay {
    fn center_tap(&self, window: &[f32]) -> f32 {
        if window.len() == self.coeffs.len() {
            dot(&self.coeffs, window)
        } else {
            dot(&sg_quadratic_center(window.len()), window)
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Plain mean of the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovingAverage;

impl Smoother for MovingAverage {
    #[allow(clippy::cast_precision_loss)]
    fn center_tap(&self, window: &[f32]) -> f32 {
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<f32>() / window.len() as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    Filling { have: usize, need: usize },
    Steady,
}

pub struct FlowFilter {
    window: VecDeque<f32>,
    capacity: usize,
    smoother: Box<dyn Smoother + Send>,
    last: f32,
}

impl std::fmt::Debug for FlowFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowFilter")
            .field("len", &self.window.len())
            .field("capacity", &self.capacity)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl FlowFilter {
    pub fn new(capacity: usize, smoother: impl Smoother + Send + 'static) -> Result<Self, BuildError> {
        if capacity == 0 || capacity % 2 == 0 {
            return Err(BuildError::InvalidConfig(
                "filter window must be odd and >= 1",
            ));
        }
        Ok(Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            smoother: Box::new(smoother),
            last: FILLING_OUTPUT,
        })
    }

    pub fn with_kind(capacity: usize, kind: SmootherKind) -> Result<Self, BuildError> {
        match kind {
            SmootherKind::SavitzkyGolay => Self::new(capacity, SavitzkyGolay::new(capacity)?),
            SmootherKind::MovingAverage => Self::new(capacity, MovingAverage),
        }
    }

    /// Push one raw sample and return the filtered value.
    ///
    /// Non-finite samples are dropped and the previous output is repeated.
    pub fn observe(&mut self, raw: f32) -> f32 {
        if !raw.is_finite() {
            tracing::trace!(raw, "non-finite sample dropped");
            return self.last;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(raw);
        if self.window.len() < self.capacity {
            self.last = FILLING_OUTPUT;
            return self.last;
        }
        let window = self.window.make_contiguous();
        let (lo, hi) = window
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let y = self.smoother.center_tap(window);
        // Edge taps of a quadratic fit are negative, so one spike can throw
        // the estimate outside the samples it came from.
        self.last = if y.is_finite() { y.clamp(lo, hi).max(0.0) } else { 0.0 };
        self.last
    }

    pub fn phase(&self) -> FilterPhase {
        if self.window.len() < self.capacity {
            FilterPhase::Filling {
                have: self.window.len(),
                need: self.capacity,
            }
        } else {
            FilterPhase::Steady
        }
    }

    /// Last value returned by `observe`.
    pub fn last(&self) -> f32 {
        self.last
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all samples and go back to filling.
    pub fn reset(&mut self) {
        self.window.clear();
        self.last = FILLING_OUTPUT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(5, &[-3.0, 12.0, 17.0, 12.0, -3.0], 35.0)]
    #[case(7, &[-2.0, 3.0, 6.0, 7.0, 6.0, 3.0, -2.0], 21.0)]
    fn sg_weights_match_tables(#[case] n: usize, #[case] num: &[f32], #[case] den: f32) {
        let sg = SavitzkyGolay::new(n).unwrap();
        for (c, k) in sg.coefficients().iter().zip(num) {
            assert!((c - k / den).abs() < 1e-6, "{c} vs {}", k / den);
        }
        let sum: f32 = sg.coefficients().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn sg_preserves_a_parabola_at_center() {
        let sg = SavitzkyGolay::new(9).unwrap();
        let w: Vec<f32> = (-4..=4).map(|i| 1.0 + 0.5 * i as f32 + 0.25 * (i * i) as f32).collect();
        assert!((sg.center_tap(&w) - 1.0).abs() < 1e-5);
    }

    #[rstest]
    #[case(0)]
    #[case(4)]
    fn even_or_zero_windows_are_rejected(#[case] n: usize) {
        assert!(FlowFilter::with_kind(n, SmootherKind::SavitzkyGolay).is_err());
        assert!(FlowFilter::with_kind(n, SmootherKind::MovingAverage).is_err());
    }

    #[test]
    fn filling_reports_zero_then_steady() {
        let mut f = FlowFilter::with_kind(5, SmootherKind::MovingAverage).unwrap();
        for i in 0..4 {
            assert_eq!(f.observe(6.0), FILLING_OUTPUT);
            assert_eq!(f.phase(), FilterPhase::Filling { have: i + 1, need: 5 });
        }
        assert!((f.observe(6.0) - 6.0).abs() < 1e-6);
        assert_eq!(f.phase(), FilterPhase::Steady);
        assert_eq!(f.len(), 5);
        // sliding keeps the length fixed
        f.observe(6.0);
        assert_eq!(f.len(), f.capacity());
    }

    #[test]
    fn window_of_one_passes_samples_through() {
        let mut f = FlowFilter::with_kind(1, SmootherKind::SavitzkyGolay).unwrap();
        assert!((f.observe(3.5) - 3.5).abs() < 1e-6);
        assert!((f.observe(1.25) - 1.25).abs() < 1e-6);
    }

    #[test]
    fn negative_output_is_floored() {
        let mut f = FlowFilter::with_kind(3, SmootherKind::MovingAverage).unwrap();
        for _ in 0..3 {
            f.observe(-2.0);
        }
        assert_eq!(f.last(), 0.0);
    }

    #[rstest]
    #[case(&[-873_055.4, -1e-6, -1e-6, -1e-6, -1e-6], 0.0)]
    #[case(&[500.0, 6.0, 6.0, 6.0, 6.0], 6.0)]
    #[case(&[6.0, 6.0, 6.0, 6.0, -500.0], 6.0)]
    fn edge_spike_cannot_leave_the_window_range(#[case] samples: &[f32], #[case] floor: f32) {
        let mut f = FlowFilter::with_kind(5, SmootherKind::SavitzkyGolay).unwrap();
        let mut y = 0.0;
        for &s in samples {
            y = f.observe(s);
        }
        let hi = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!(y >= floor, "{y}");
        assert!(y <= hi.max(0.0), "{y} above window max {hi}");
    }

    #[test]
    fn non_finite_samples_are_skipped() {
        let mut f = FlowFilter::with_kind(3, SmootherKind::MovingAverage).unwrap();
        for _ in 0..3 {
            f.observe(4.0);
        }
        assert_eq!(f.observe(f32::NAN), 4.0);
        assert_eq!(f.len(), 3);
        assert_eq!(f.observe(f32::INFINITY), 4.0);
    }

    #[test]
    fn reset_returns_to_filling() {
        let mut f = FlowFilter::with_kind(3, SmootherKind::MovingAverage).unwrap();
        for _ in 0..3 {
            f.observe(4.0);
        }
        f.reset();
        assert!(f.is_empty());
        assert_eq!(f.last(), FILLING_OUTPUT);
        assert_eq!(f.phase(), FilterPhase::Filling { have: 0, need: 3 });
    }
}
