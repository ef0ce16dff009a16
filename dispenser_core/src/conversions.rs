//! `From` implementations bridging `dispenser_config` types to
//! `dispenser_core` types.

use std::time::Duration;

use dispenser_traits::Color;

use crate::calibration::LoopCalibration;
use crate::config::{DisplayCfg, EncoderCfg, LedPolicy, SensorCfg, SmootherKind, TimingCfg};

// ── Timing ───────────────────────────────────────────────────────────────────

impl From<&dispenser_config::Timing> for TimingCfg {
    fn from(c: &dispenser_config::Timing) -> Self {
        Self {
            control_period: Duration::from_millis(c.control_period_ms),
            persist_period: Duration::from_millis(c.persist_period_ms),
            idle_sleep: Duration::from_millis(c.idle_sleep_ms),
        }
    }
}

// ── Encoder ──────────────────────────────────────────────────────────────────

fn led_color(c: dispenser_config::LedColor) -> Color {
    use dispenser_config::LedColor as L;
    match c {
        L::Off => Color::Off,
        L::Red => Color::Red,
        L::Green => Color::Green,
        L::Blue => Color::Blue,
        L::Amber => Color::Amber,
    }
}

impl From<&dispenser_config::LedCfg> for LedPolicy {
    fn from(c: &dispenser_config::LedCfg) -> Self {
        Self {
            open: led_color(c.open),
            closed: led_color(c.closed),
            busy: led_color(c.busy),
            safe: led_color(c.safe),
        }
    }
}

impl From<&dispenser_config::EncoderCfg> for EncoderCfg {
    fn from(c: &dispenser_config::EncoderCfg) -> Self {
        Self {
            min: c.min_l,
            max: c.max_l,
            step: c.step_l,
            poll_period: Duration::from_millis(c.poll_period_ms),
            led: (&c.led).into(),
        }
    }
}

// ── Sensor ───────────────────────────────────────────────────────────────────

impl From<dispenser_config::SmootherKind> for SmootherKind {
    fn from(c: dispenser_config::SmootherKind) -> Self {
        match c {
            dispenser_config::SmootherKind::SavitzkyGolay => Self::SavitzkyGolay,
            dispenser_config::SmootherKind::MovingAverage => Self::MovingAverage,
        }
    }
}

/// Inline gain/offset only; a `csv` path has to be fitted by the caller
/// (see `dispenser_config::load_calibration_csv`).
impl From<&dispenser_config::LoopCalibrationCfg> for LoopCalibration {
    fn from(c: &dispenser_config::LoopCalibrationCfg) -> Self {
        Self::new(c.gain, c.offset)
    }
}

impl From<dispenser_config::LinearFit> for LoopCalibration {
    fn from(f: dispenser_config::LinearFit) -> Self {
        Self::new(f.gain, f.offset)
    }
}

impl From<&dispenser_config::SensorCfg> for SensorCfg {
    fn from(c: &dispenser_config::SensorCfg) -> Self {
        Self {
            sample_period: Duration::from_millis(c.sample_period_ms),
            flow_window: c.flow_window,
            temp_window: c.temp_window,
            smoother: c.smoother.into(),
            flow: (&c.flow).into(),
            temperature: (&c.temperature).into(),
        }
    }
}

// ── Display ──────────────────────────────────────────────────────────────────

impl From<&dispenser_config::DisplayCfg> for DisplayCfg {
    fn from(c: &dispenser_config::DisplayCfg) -> Self {
        Self {
            value_period: Duration::from_millis(c.value_period_ms),
            dial_period: Duration::from_millis(c.dial_period_ms),
            dial_max: c.dial_max,
        }
    }
}
