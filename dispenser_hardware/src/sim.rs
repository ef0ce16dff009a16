//! Simulated encoder, current-loop receiver and display sink.
//!
//! Used by the CLI when built without the `hardware` feature, and by tests
//! that need scriptable devices.

use std::collections::{HashMap, VecDeque};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dispenser_traits::{
    AdcReceiver, Color, DisplayCommand, DisplayField, DisplaySink, EncoderDevice, EncoderStatus,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::HwError;

type DynResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

// ── Encoder ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct EncoderSim {
    value: f32,
    rotated: bool,
    double_push: bool,
    pressed: bool,
    script: VecDeque<bool>,
    led: Option<Color>,
}

/// Operator-side handle to a simulated encoder: turn the knob, push the
/// button, and observe what the controller wrote back.
#[derive(Debug, Clone, Default)]
pub struct SimEncoderHandle(Arc<Mutex<EncoderSim>>);

impl SimEncoderHandle {
    fn lock(&self) -> Result<MutexGuard<'_, EncoderSim>, HwError> {
        self.0.lock().map_err(|_| HwError::BusPoisoned)
    }

    /// Turn the knob until the device reads `value`.
    pub fn rotate_to(&self, value: f32) {
        if let Ok(mut s) = self.lock() {
            s.value = value;
            s.rotated = true;
        }
    }

    pub fn double_push(&self) {
        if let Ok(mut s) = self.lock() {
            s.double_push = true;
        }
    }

    /// Hold the button down (`true`) or let it go (`false`).
    pub fn hold(&self, pressed: bool) {
        if let Ok(mut s) = self.lock() {
            s.pressed = pressed;
        }
    }

    /// Queue a full click: released, pressed, released on successive polls.
    pub fn click(&self) {
        if let Ok(mut s) = self.lock() {
            s.script.extend([false, true, false]);
        }
    }

    pub fn value(&self) -> f32 {
        self.lock().map(|s| s.value).unwrap_or_default()
    }

    pub fn led(&self) -> Option<Color> {
        self.lock().ok().and_then(|s| s.led)
    }
}

#[derive(Debug, Default)]
pub struct SimulatedEncoder {
    state: SimEncoderHandle,
}

impl SimulatedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> SimEncoderHandle {
        self.state.clone()
    }
}

impl EncoderDevice for SimulatedEncoder {
    fn status(&mut self) -> DynResult<EncoderStatus> {
        let mut s = self.state.lock()?;
        let status = EncoderStatus {
            rotated: s.rotated,
            double_push: s.double_push,
        };
        s.rotated = false;
        s.double_push = false;
        Ok(status)
    }

    fn button_pressed(&mut self) -> DynResult<bool> {
        let mut s = self.state.lock()?;
        let level = match s.script.pop_front() {
            Some(level) => level,
            None => s.pressed,
        };
        Ok(level)
    }

    fn read_value(&mut self) -> DynResult<f32> {
        Ok(self.state.lock()?.value)
    }

    fn write_value(&mut self, value: f32) -> DynResult<()> {
        self.state.lock()?.value = value;
        Ok(())
    }

    fn set_led(&mut self, color: Color) -> DynResult<()> {
        let mut s = self.state.lock()?;
        if s.led != Some(color) {
            tracing::debug!(?color, "encoder led (simulated)");
        }
        s.led = Some(color);
        Ok(())
    }
}

// ── Current-loop receiver ────────────────────────────────────────────────────

/// One simulated current-loop input: a steady engineering value plus
/// Gaussian noise, expressed as raw counts through the inverse of the
/// receiver's linear calibration.
#[derive(Debug, Clone)]
pub struct SimChannel {
    value: f32,
    noise_sd: f32,
    gain: f32,
    offset: f32,
    gate: Option<Arc<AtomicBool>>,
}

impl SimChannel {
    /// `gain`/`offset` describe `value = gain * raw + offset`.
    pub fn new(value: f32, gain: f32, offset: f32) -> Self {
        Self {
            value,
            noise_sd: 0.0,
            gain,
            offset,
            gate: None,
        }
    }

    pub fn with_noise(mut self, sd: f32) -> Self {
        self.noise_sd = sd.max(0.0);
        self
    }

    /// Read zero (plus noise) unless `gate` is set, e.g. a relay handle.
    pub fn gated_by(mut self, gate: Arc<AtomicBool>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn to_raw(&self, noise: f64) -> i32 {
        let open = self.gate.as_ref().is_none_or(|g| g.load(Ordering::Relaxed));
        let base = if open { self.value } else { 0.0 };
        let v = f64::from(base) + f64::from(self.noise_sd) * noise;
        if self.gain == 0.0 {
            return 0;
        }
        ((v - f64::from(self.offset)) / f64::from(self.gain)).round() as i32
    }
}

pub struct SimulatedCurrentLoop {
    channels: HashMap<u8, SimChannel>,
    rng: StdRng,
}

impl SimulatedCurrentLoop {
    pub fn new(seed: u64) -> Self {
        Self {
            channels: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_channel(mut self, channel: u8, sim: SimChannel) -> Self {
        self.channels.insert(channel, sim);
        self
    }

    /// Standard normal sample via Box-Muller.
    fn gaussian(&mut self) -> f64 {
        let u1: f64 = 1.0 - self.rng.gen_range(0.0..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);
        (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
    }
}

impl AdcReceiver for SimulatedCurrentLoop {
    fn read_raw(&mut self, channel: u8) -> DynResult<i32> {
        let noise = self.gaussian();
        let sim = self
            .channels
            .get(&channel)
            .ok_or_else(|| HwError::Bus(format!("nothing wired to channel {channel}")))?;
        let raw = sim.to_raw(noise);
        tracing::trace!(channel, raw, "current loop sample (simulated)");
        Ok(raw)
    }
}

// ── Display ──────────────────────────────────────────────────────────────────

const DISPLAY_LOG_CAP: usize = 256;

/// Shared view of the commands a `RecordingDisplay` received, oldest first.
#[derive(Debug, Clone, Default)]
pub struct DisplayLog(Arc<Mutex<VecDeque<DisplayCommand>>>);

impl DisplayLog {
    pub fn commands(&self) -> Vec<DisplayCommand> {
        self.0
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recent text written to `field`.
    pub fn last_text(&self, field: DisplayField) -> Option<String> {
        self.0.lock().ok().and_then(|log| {
            log.iter().rev().find_map(|cmd| match cmd {
                DisplayCommand::Text { field: f, text } if *f == field => Some(text.clone()),
                _ => None,
            })
        })
    }

    pub fn clear(&self) {
        if let Ok(mut log) = self.0.lock() {
            log.clear();
        }
    }
}

/// Display sink that logs every command and keeps a bounded history.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    label: String,
    log: DisplayLog,
}

impl RecordingDisplay {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            log: DisplayLog::default(),
        }
    }

    pub fn log(&self) -> DisplayLog {
        self.log.clone()
    }
}

impl DisplaySink for RecordingDisplay {
    fn send(&mut self, cmd: &DisplayCommand) -> DynResult<()> {
        tracing::trace!(display = %self.label, ?cmd, "display command (simulated)");
        let mut log = self.log.0.lock().map_err(|_| HwError::BusPoisoned)?;
        if log.len() == DISPLAY_LOG_CAP {
            log.pop_front();
        }
        log.push_back(cmd.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_status_bits_clear_on_read() {
        let mut enc = SimulatedEncoder::new();
        let h = enc.handle();
        h.rotate_to(12.5);
        h.double_push();
        let first = enc.status().unwrap();
        assert!(first.rotated && first.double_push);
        assert_eq!(enc.status().unwrap(), EncoderStatus::default());
        assert_eq!(enc.read_value().unwrap(), 12.5);
    }

    #[test]
    fn scripted_click_plays_before_held_level() {
        let mut enc = SimulatedEncoder::new();
        let h = enc.handle();
        h.hold(true);
        h.click();
        let levels: Vec<bool> = (0..4).map(|_| enc.button_pressed().unwrap()).collect();
        assert_eq!(levels, vec![false, true, false, true]);
    }

    #[test]
    fn current_loop_inverts_calibration_without_noise() {
        let mut adc = SimulatedCurrentLoop::new(7).with_channel(0, SimChannel::new(6.0, 0.01, -1.0));
        // 6.0 = 0.01 * raw - 1.0  =>  raw = 700
        assert_eq!(adc.read_raw(0).unwrap(), 700);
        assert!(adc.read_raw(3).is_err());
    }

    #[test]
    fn gated_channel_reads_zero_when_closed() {
        let gate = Arc::new(AtomicBool::new(false));
        let mut adc = SimulatedCurrentLoop::new(1)
            .with_channel(0, SimChannel::new(6.0, 0.01, 0.0).gated_by(gate.clone()));
        assert_eq!(adc.read_raw(0).unwrap(), 0);
        gate.store(true, Ordering::Relaxed);
        assert_eq!(adc.read_raw(0).unwrap(), 600);
    }

    #[test]
    fn recording_display_keeps_bounded_history() {
        let mut sink = RecordingDisplay::new("test");
        let log = sink.log();
        for i in 0..(DISPLAY_LOG_CAP + 10) {
            sink.send(&DisplayCommand::Dial { position: (i % 32) as u8 })
                .unwrap();
        }
        assert_eq!(log.commands().len(), DISPLAY_LOG_CAP);
        sink.send(&DisplayCommand::Text {
            field: DisplayField::Flow,
            text: "06.00".into(),
        })
        .unwrap();
        assert_eq!(log.last_text(DisplayField::Flow).as_deref(), Some("06.00"));
        assert_eq!(log.last_text(DisplayField::Volume), None);
    }
}
