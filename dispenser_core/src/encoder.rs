//! `Encoder` port over a rotary encoder driver.
//!
//! The device is serviced at most once per poll period. Each poll:
//! 1. reads the event bits;
//! 2. on rotation, adopts the device value (snapped and clamped) and raises
//!    `change`, otherwise pushes a pending local value to the device;
//! 3. raises `double_click` on a device-reported double push;
//! 4. feeds the button level through [`ButtonLatch`].
//!
//! Driver errors are logged and the poll carries on with "no event".

use std::time::Instant;

use dispenser_traits::{Color, EncoderDevice, EncoderStatus};
use tracing::{debug, warn};

use crate::config::EncoderCfg;
use crate::hw_error::map_hw_error;
use crate::ports::{Encoder, Indicator};
use crate::util::{clamp_range, is_due};

/// Edge detector for the push button.
///
/// A press registers on the down edge, and only after the button has been
/// seen up. Holding the button across any number of polls yields one press;
/// an up, down, up cycle yields exactly one. The latch starts disarmed so a
/// button held during startup does not count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonLatch {
    armed: bool,
}

impl ButtonLatch {
    /// Feed one sampled level; returns `true` on a registered press.
    pub fn update(&mut self, down: bool) -> bool {
        let fired = down && self.armed;
        self.armed = !down;
        fired
    }
}

#[derive(Debug)]
pub struct EncoderInput<D> {
    device: D,
    cfg: EncoderCfg,
    value: f32,
    /// Local value not yet written to the device.
    dirty: bool,
    button: bool,
    double_click: bool,
    change: bool,
    latch: ButtonLatch,
    last_poll: Option<Instant>,
    shown: Option<Color>,
}

impl<D: EncoderDevice> EncoderInput<D> {
    pub fn new(device: D, cfg: EncoderCfg) -> Self {
        let value = clamp_range(0.0, cfg.min, cfg.max);
        Self {
            device,
            cfg,
            value,
            dirty: true,
            button: false,
            double_click: false,
            change: false,
            latch: ButtonLatch::default(),
            last_poll: None,
            shown: None,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// True while a local value is waiting to be written to the device.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn clamp(&self, v: f32) -> f32 {
        clamp_range(v, self.cfg.min, self.cfg.max)
    }

    fn snap(&self, v: f32) -> f32 {
        if self.cfg.step > 0.0 && v.is_finite() {
            (v / self.cfg.step).round() * self.cfg.step
        } else {
            v
        }
    }

    fn read_status(&mut self) -> EncoderStatus {
        self.device.status().unwrap_or_else(|e| {
            warn!(error = %map_hw_error(&*e), "encoder status read failed");
            EncoderStatus::default()
        })
    }

    fn adopt_device_value(&mut self) {
        match self.device.read_value() {
            Ok(raw) => {
                let v = self.clamp(self.snap(raw));
                debug!(raw, value = v, "encoder turned");
                self.value = v;
                self.change = true;
                // write back when snapping or clamping moved it
                self.dirty = v != raw;
            }
            Err(e) => warn!(error = %map_hw_error(&*e), "encoder value read failed"),
        }
    }

    fn push_value(&mut self) {
        match self.device.write_value(self.value) {
            Ok(()) => self.dirty = false,
            Err(e) => warn!(error = %map_hw_error(&*e), "encoder value write failed; will retry"),
        }
    }
}

impl<D: EncoderDevice> Encoder for EncoderInput<D> {
    fn poll(&mut self, now: Instant) {
        if !is_due(now, self.last_poll, self.cfg.poll_period) {
            return;
        }
        self.last_poll = Some(now);

        let status = self.read_status();
        if status.rotated {
            self.adopt_device_value();
        } else if self.dirty {
            self.push_value();
        }
        if status.double_push {
            self.double_click = true;
        }
        match self.device.button_pressed() {
            Ok(down) => {
                if self.latch.update(down) {
                    self.button = true;
                }
            }
            Err(e) => warn!(error = %map_hw_error(&*e), "encoder button read failed"),
        }
    }

    fn value(&self) -> f32 {
        self.value
    }

    fn set_value(&mut self, litres: f32) {
        let v = self.clamp(litres);
        if v != self.value {
            self.value = v;
            self.dirty = true;
        }
    }

    fn button(&mut self) -> bool {
        std::mem::take(&mut self.button)
    }

    fn double_click(&mut self) -> bool {
        std::mem::take(&mut self.double_click)
    }

    fn change(&mut self) -> bool {
        std::mem::take(&mut self.change)
    }

    fn indicate(&mut self, indicator: Indicator) {
        let color = self.cfg.led.color(indicator);
        if self.shown == Some(color) {
            return;
        }
        match self.device.set_led(color) {
            Ok(()) => self.shown = Some(color),
            Err(e) => warn!(?indicator, error = %map_hw_error(&*e), "encoder indicator write failed"),
        }
    }

    fn reset(&mut self) {
        self.value = self.clamp(0.0);
        self.dirty = true;
        self.button = false;
        self.double_click = false;
        self.change = false;
        self.latch = ButtonLatch::default();
        self.last_poll = None;
        self.shown = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispenser_hardware::SimulatedEncoder;
    use std::time::Duration;

    fn input() -> (EncoderInput<SimulatedEncoder>, dispenser_hardware::SimEncoderHandle) {
        let dev = SimulatedEncoder::new();
        let h = dev.handle();
        (EncoderInput::new(dev, EncoderCfg::default()), h)
    }

    #[test]
    fn latch_fires_once_per_press() {
        let mut l = ButtonLatch::default();
        // held from startup: ignored until released
        assert!(!l.update(true));
        assert!(!l.update(false));
        assert!(l.update(true));
        assert!(!l.update(true));
        assert!(!l.update(true));
        assert!(!l.update(false));
        assert!(!l.update(false));
        assert!(l.update(true));
    }

    #[test]
    fn rotation_sets_value_and_change_once() {
        let (mut enc, h) = input();
        let t0 = Instant::now();
        h.rotate_to(12.3);
        enc.poll(t0);
        assert_eq!(enc.value(), 12.25);
        assert!(enc.change());
        assert!(!enc.change());
    }

    #[test]
    fn rotation_past_max_is_clamped_and_written_back() {
        let (mut enc, h) = input();
        let t0 = Instant::now();
        h.rotate_to(95.0);
        enc.poll(t0);
        assert_eq!(enc.value(), 80.0);
        assert!(enc.is_dirty());
        enc.poll(t0 + Duration::from_millis(100));
        assert_eq!(h.value(), 80.0);
        assert!(!enc.is_dirty());
    }

    #[test]
    fn local_value_is_pushed_on_next_poll() {
        let (mut enc, h) = input();
        let t0 = Instant::now();
        enc.poll(t0);
        enc.set_value(7.5);
        assert_eq!(h.value(), 0.0);
        // not due yet
        enc.poll(t0 + Duration::from_millis(50));
        assert_eq!(h.value(), 0.0);
        enc.poll(t0 + Duration::from_millis(100));
        assert_eq!(h.value(), 7.5);
        assert!(!enc.change(), "local writes are not operator changes");
    }

    #[test]
    fn set_value_clamps_out_of_range() {
        let (mut enc, _h) = input();
        enc.set_value(-4.0);
        assert_eq!(enc.value(), 0.0);
        enc.set_value(1e9);
        assert_eq!(enc.value(), 80.0);
        enc.set_value(f32::NAN);
        assert_eq!(enc.value(), 0.0);
    }

    #[test]
    fn double_push_latches() {
        let (mut enc, h) = input();
        h.double_push();
        enc.poll(Instant::now());
        let snap = enc.snapshot();
        assert!(snap.double_click);
        assert!(!snap.button);
        assert!(!enc.double_click());
    }

    #[test]
    fn held_button_registers_one_press() {
        let (mut enc, h) = input();
        let t0 = Instant::now();
        enc.poll(t0);
        h.hold(true);
        let mut presses = 0;
        for i in 1..6 {
            enc.poll(t0 + Duration::from_millis(100 * i));
            presses += usize::from(enc.button());
        }
        assert_eq!(presses, 1);
    }

    #[test]
    fn indicator_writes_only_on_change() {
        let (mut enc, h) = input();
        enc.indicate(Indicator::Busy);
        assert_eq!(h.led(), Some(Color::Amber));
        enc.indicate(Indicator::Open);
        assert_eq!(h.led(), Some(Color::Blue));
        enc.indicate(Indicator::Closed);
        assert_eq!(h.led(), Some(Color::Green));
        enc.indicate(Indicator::Safe);
        assert_eq!(h.led(), Some(Color::Red));
    }

    #[test]
    fn reset_clears_latches_and_value() {
        let (mut enc, h) = input();
        let t0 = Instant::now();
        h.rotate_to(20.0);
        h.double_push();
        enc.poll(t0);
        enc.reset();
        let snap = enc.snapshot();
        assert_eq!(snap, Default::default());
        // reset forgets the poll time, so the zero goes out immediately
        enc.poll(t0 + Duration::from_millis(1));
        assert_eq!(h.value(), 0.0);
    }
}
