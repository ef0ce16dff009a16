//! Test doubles for the channel ports.
//!
//! Each mock shares its state through a cloneable handle, so a test can
//! hand the mock to a `ChannelController` and still script or inspect it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::ports::{Display, DisplayMode, Encoder, Indicator, Sensor, Valve};
use crate::util::clamp_range;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct ValveState {
    pub open: bool,
    pub resets: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockValve(Arc<Mutex<ValveState>>);

impl MockValve {
    pub fn new(open: bool) -> Self {
        let v = Self::default();
        lock(&v.0).open = open;
        v
    }

    pub fn open_now(&self) -> bool {
        lock(&self.0).open
    }

    pub fn resets(&self) -> usize {
        lock(&self.0).resets
    }
}

impl Valve for MockValve {
    fn is_open(&self) -> bool {
        lock(&self.0).open
    }
    fn open(&mut self) {
        lock(&self.0).open = true;
    }
    fn close(&mut self) {
        lock(&self.0).open = false;
    }
    fn reset(&mut self) {
        let mut s = lock(&self.0);
        s.open = false;
        s.resets += 1;
    }
}

#[derive(Debug)]
pub struct EncoderState {
    pub value: f32,
    pub min: f32,
    pub max: f32,
    pub button: bool,
    pub double_click: bool,
    pub change: bool,
    pub indicator: Option<Indicator>,
    pub resets: usize,
}

/// Encoder whose latches are raised directly by the test.
#[derive(Debug, Clone)]
pub struct MockEncoder(Arc<Mutex<EncoderState>>);

impl Default for MockEncoder {
    fn default() -> Self {
        Self::with_range(0.0, 80.0)
    }
}

impl MockEncoder {
    pub fn with_range(min: f32, max: f32) -> Self {
        Self(Arc::new(Mutex::new(EncoderState {
            value: min,
            min,
            max,
            button: false,
            double_click: false,
            change: false,
            indicator: None,
            resets: 0,
        })))
    }

    /// Operator turns the knob to `litres`.
    pub fn turn_to(&self, litres: f32) {
        let mut s = lock(&self.0);
        s.value = clamp_range(litres, s.min, s.max);
        s.change = true;
    }

    /// One complete button press.
    pub fn press(&self) {
        lock(&self.0).button = true;
    }

    pub fn double_click_now(&self) {
        lock(&self.0).double_click = true;
    }

    pub fn shown_value(&self) -> f32 {
        lock(&self.0).value
    }

    pub fn indicator(&self) -> Option<Indicator> {
        lock(&self.0).indicator
    }

    pub fn resets(&self) -> usize {
        lock(&self.0).resets
    }
}

impl Encoder for MockEncoder {
    fn poll(&mut self, _now: Instant) {}
    fn value(&self) -> f32 {
        lock(&self.0).value
    }
    fn set_value(&mut self, litres: f32) {
        let mut s = lock(&self.0);
        s.value = clamp_range(litres, s.min, s.max);
    }
    fn button(&mut self) -> bool {
        std::mem::take(&mut lock(&self.0).button)
    }
    fn double_click(&mut self) -> bool {
        std::mem::take(&mut lock(&self.0).double_click)
    }
    fn change(&mut self) -> bool {
        std::mem::take(&mut lock(&self.0).change)
    }
    fn indicate(&mut self, indicator: Indicator) {
        lock(&self.0).indicator = Some(indicator);
    }
    fn reset(&mut self) {
        let mut s = lock(&self.0);
        s.value = clamp_range(0.0, s.min, s.max);
        s.button = false;
        s.double_click = false;
        s.change = false;
        s.resets += 1;
    }
}

#[derive(Debug, Default)]
pub struct SensorState {
    pub flow: f32,
    pub temperature: f32,
    pub ticks: usize,
    pub resets: usize,
}

/// Sensor reporting whatever flow and temperature the test sets. `reset`
/// zeroes both, like a real filter restarting from empty.
#[derive(Debug, Clone, Default)]
pub struct MockSensor(Arc<Mutex<SensorState>>);

impl MockSensor {
    pub fn steady(flow: f32, temperature: f32) -> Self {
        let s = Self::default();
        s.set(flow, temperature);
        s
    }

    pub fn set(&self, flow: f32, temperature: f32) {
        let mut s = lock(&self.0);
        s.flow = flow;
        s.temperature = temperature;
    }

    pub fn resets(&self) -> usize {
        lock(&self.0).resets
    }
}

impl Sensor for MockSensor {
    fn tick(&mut self, _now: Instant) {
        lock(&self.0).ticks += 1;
    }
    fn flow_rate(&self) -> f32 {
        lock(&self.0).flow
    }
    fn temperature(&self) -> f32 {
        lock(&self.0).temperature
    }
    fn reset(&mut self) {
        let mut s = lock(&self.0);
        s.flow = 0.0;
        s.temperature = 0.0;
        s.resets += 1;
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DisplayState {
    pub volume: f32,
    pub flow: f32,
    pub temperature: f32,
    pub mode: DisplayMode,
    pub ticks: usize,
    pub resets: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockDisplay(Arc<Mutex<DisplayState>>);

impl MockDisplay {
    pub fn state(&self) -> DisplayState {
        lock(&self.0).clone()
    }
}

impl Display for MockDisplay {
    fn set_volume(&mut self, litres: f32) {
        lock(&self.0).volume = litres;
    }
    fn set_flow(&mut self, litres_per_min: f32) {
        lock(&self.0).flow = litres_per_min;
    }
    fn set_temperature(&mut self, celsius: f32) {
        lock(&self.0).temperature = celsius;
    }
    fn set_mode(&mut self, mode: DisplayMode) {
        lock(&self.0).mode = mode;
    }
    fn tick(&mut self, _now: Instant) {
        lock(&self.0).ticks += 1;
    }
    fn reset(&mut self) {
        let mut s = lock(&self.0);
        let ticks = s.ticks;
        let resets = s.resets + 1;
        *s = DisplayState {
            ticks,
            resets,
            ..DisplayState::default()
        };
    }
}
