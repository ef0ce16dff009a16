//! Infallible ports consumed by `ChannelController`.
//!
//! Driver errors are resolved inside the adapters that implement these
//! traits (`RelayValve`, `EncoderInput`, `FlowSensor`, `StatusDisplay`), so a
//! control cycle only ever sees plain values.

use std::time::Instant;

/// What the encoder's indicator should communicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Open,
    Closed,
    /// Startup, while persisted state is restored.
    Busy,
    /// After shutdown with the valve closed.
    Safe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Idle,
    Dispensing,
}

pub trait Valve {
    fn is_open(&self) -> bool;
    fn open(&mut self);
    fn close(&mut self);
    /// Return to the closed state.
    fn reset(&mut self);
}

/// Value plus the three latches, each read (and cleared) exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EncoderSnapshot {
    pub value: f32,
    pub button: bool,
    pub double_click: bool,
    pub change: bool,
}

pub trait Encoder {
    /// Service the device if its poll period has elapsed.
    fn poll(&mut self, now: Instant);
    fn value(&self) -> f32;
    /// Out-of-range values are clamped, never rejected.
    fn set_value(&mut self, litres: f32);
    /// Read and clear the button latch.
    fn button(&mut self) -> bool;
    /// Read and clear the double-click latch.
    fn double_click(&mut self) -> bool;
    /// Read and clear the change latch (the operator turned the knob).
    fn change(&mut self) -> bool;
    fn indicate(&mut self, indicator: Indicator);
    fn reset(&mut self);

    fn snapshot(&mut self) -> EncoderSnapshot {
        EncoderSnapshot {
            value: self.value(),
            button: self.button(),
            double_click: self.double_click(),
            change: self.change(),
        }
    }
}

/// Filtered flow (litres/minute) and temperature (°C).
pub trait Sensor {
    /// Take a sample if the sampling period has elapsed.
    fn tick(&mut self, now: Instant);
    fn flow_rate(&self) -> f32;
    fn temperature(&self) -> f32;
    fn reset(&mut self);
}

pub trait Display {
    fn set_volume(&mut self, litres: f32);
    fn set_flow(&mut self, litres_per_min: f32);
    fn set_temperature(&mut self, celsius: f32);
    fn set_mode(&mut self, mode: DisplayMode);
    /// Push pending refreshes whose period has elapsed.
    fn tick(&mut self, now: Instant);
    fn reset(&mut self);
}
