//! Configuration types for the dispenser runtime.
//!
//! These are the runtime configuration structs used by the port adapters
//! and the main loop. They are separate from the TOML-deserialized config
//! in `dispenser_config`; see `conversions` for the mapping.

use std::time::Duration;

use dispenser_traits::Color;

use crate::calibration::LoopCalibration;
use crate::ports::Indicator;

/// Main-loop cadences.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    /// Each channel ticks at most once per control period.
    pub control_period: Duration,
    /// Remaining volumes are considered for saving once per persist period.
    pub persist_period: Duration,
    /// Sleep between scheduler polls that did not tick.
    pub idle_sleep: Duration,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            control_period: Duration::from_millis(10),
            persist_period: Duration::from_millis(2000),
            idle_sleep: Duration::from_millis(1),
        }
    }
}

/// Which color the encoder indicator shows for each state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPolicy {
    pub open: Color,
    pub closed: Color,
    pub busy: Color,
    pub safe: Color,
}

impl LedPolicy {
    pub fn color(&self, indicator: Indicator) -> Color {
        match indicator {
            Indicator::Open => self.open,
            Indicator::Closed => self.closed,
            Indicator::Busy => self.busy,
            Indicator::Safe => self.safe,
        }
    }
}

impl Default for LedPolicy {
    fn default() -> Self {
        Self {
            open: Color::Blue,
            closed: Color::Green,
            busy: Color::Amber,
            safe: Color::Red,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncoderCfg {
    /// Lower bound of the settable volume (litres).
    pub min: f32,
    /// Upper bound of the settable volume (litres).
    pub max: f32,
    /// Litres per detent. Values read back from the device snap to this grid.
    pub step: f32,
    pub poll_period: Duration,
    pub led: LedPolicy,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 80.0,
            step: 0.25,
            poll_period: Duration::from_millis(100),
            led: LedPolicy::default(),
        }
    }
}

/// Smoothing operation applied to a full filter window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmootherKind {
    #[default]
    SavitzkyGolay,
    MovingAverage,
}

#[derive(Debug, Clone)]
pub struct SensorCfg {
    pub sample_period: Duration,
    pub flow_window: usize,
    pub temp_window: usize,
    pub smoother: SmootherKind,
    pub flow: LoopCalibration,
    pub temperature: LoopCalibration,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(100),
            flow_window: 31,
            temp_window: 15,
            smoother: SmootherKind::SavitzkyGolay,
            flow: LoopCalibration::FLOW_16BIT,
            temperature: LoopCalibration::TEMPERATURE_16BIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisplayCfg {
    /// Refresh period for volume, volume color and temperature.
    pub value_period: Duration,
    /// Refresh period for flow text and the dial.
    pub dial_period: Duration,
    /// Highest dial position.
    pub dial_max: u8,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            value_period: Duration::from_millis(100),
            dial_period: Duration::from_millis(500),
            dial_max: 31,
        }
    }
}
