//! Per-channel control state machine.
//!
//! `tick` runs three phases in a fixed order:
//!
//! - **Read**: valve state, filtered flow and temperature, encoder snapshot.
//! - **Update**: manual override or volume integration, button toggle,
//!   auto-shutoff, double-click reset.
//! - **Write**: valve, encoder value and indicator, display.
//!
//! Invariants after every tick: `remaining >= 0`, and `remaining == 0`
//! implies the valve is commanded closed. Auto-shutoff is sticky until a new
//! target is set through the encoder.

use std::time::Instant;

use tracing::{debug, info, info_span};

use crate::ports::{Display, DisplayMode, Encoder, Indicator, Sensor, Valve};
use crate::util::{SECS_PER_MIN, elapsed_secs, non_negative, non_negative_f64};

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    pub name: String,
    /// Litres left to dispense. Integrated in f64; narrowed only where it
    /// leaves the controller.
    pub remaining: f64,
    pub open: bool,
    /// °C
    pub temperature: f32,
    /// Filtered flow this tick and last tick, litres/minute.
    pub flow: f64,
    pub prev_flow: f64,
    pub prev_tick: Option<Instant>,
}

impl ChannelState {
    fn new(name: String) -> Self {
        Self {
            name,
            remaining: 0.0,
            open: false,
            temperature: 0.0,
            flow: 0.0,
            prev_flow: 0.0,
            prev_tick: None,
        }
    }
}

pub struct ChannelController<V, E, S, D> {
    state: ChannelState,
    valve: V,
    encoder: E,
    sensor: S,
    display: D,
}

impl<V, E, S, D> ChannelController<V, E, S, D>
where
    V: Valve,
    E: Encoder,
    S: Sensor,
    D: Display,
{
    pub fn new(name: impl Into<String>, valve: V, encoder: E, sensor: S, display: D) -> Self {
        Self {
            state: ChannelState::new(name.into()),
            valve,
            encoder,
            sensor,
            display,
        }
    }

    /// Run one control cycle at `now`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn tick(&mut self, now: Instant) {
        let span = info_span!("channel", name = %self.state.name);
        let _enter = span.enter();

        self.encoder.poll(now);
        self.sensor.tick(now);

        // Read
        self.state.open = self.valve.is_open();
        self.state.temperature = self.sensor.temperature();
        self.state.prev_flow = self.state.flow;
        self.state.flow = f64::from(self.sensor.flow_rate());
        let input = self.encoder.snapshot();

        // Update
        let was_open = self.state.open;
        if input.change {
            self.state.remaining = f64::from(non_negative(input.value));
            info!(remaining_l = self.state.remaining, "volume set");
        } else {
            let avg_lpm =
                (non_negative_f64(self.state.flow) + non_negative_f64(self.state.prev_flow)) / 2.0;
            let dt = elapsed_secs(self.state.prev_tick, now);
            self.state.remaining -= avg_lpm / SECS_PER_MIN * dt;
        }
        if input.button {
            self.state.open = !self.state.open;
        }
        if self.state.remaining <= 0.0 {
            if self.state.open || was_open {
                info!("volume reached zero; valve closed");
            }
            self.state.remaining = 0.0;
            self.state.open = false;
        }
        if input.double_click {
            self.reset();
        }
        if self.state.open != was_open {
            let what = if self.state.open {
                "dispensing started"
            } else {
                "dispensing stopped"
            };
            info!(remaining_l = self.state.remaining, "{what}");
        }

        // Write
        if self.state.open {
            self.valve.open();
            self.encoder.indicate(Indicator::Open);
        } else {
            self.valve.close();
            self.encoder.indicate(Indicator::Closed);
        }
        let shown = self.state.remaining as f32;
        self.encoder.set_value(shown);
        self.display.set_mode(if self.state.open {
            DisplayMode::Dispensing
        } else {
            DisplayMode::Idle
        });
        self.display.set_volume(shown);
        self.display.set_flow(self.state.flow as f32);
        self.display.set_temperature(self.state.temperature);
        self.display.tick(now);

        debug!(
            remaining_l = self.state.remaining,
            flow_lpm = self.state.flow,
            open = self.state.open,
            "tick"
        );
        self.state.prev_tick = Some(now);
    }

    /// Zero the channel and reset every collaborator. Idempotent.
    pub fn reset(&mut self) {
        info!(channel = %self.state.name, "channel reset");
        self.state.remaining = 0.0;
        self.state.open = false;
        self.state.flow = 0.0;
        self.state.prev_flow = 0.0;
        self.state.temperature = 0.0;
        self.valve.reset();
        self.encoder.reset();
        self.display.reset();
        self.sensor.reset();
    }

    /// Adopt a volume restored from storage and show it on the encoder.
    #[allow(clippy::cast_possible_truncation)]
    pub fn restore_remaining(&mut self, litres: f32) {
        self.state.remaining = f64::from(non_negative(litres));
        self.encoder.set_value(self.state.remaining as f32);
        info!(channel = %self.state.name, remaining_l = self.state.remaining, "volume restored");
    }

    pub fn indicate(&mut self, indicator: Indicator) {
        self.encoder.indicate(indicator);
    }

    /// Close the valve and show the safe indicator.
    pub fn shutdown(&mut self) {
        self.state.open = false;
        self.valve.close();
        self.encoder.indicate(Indicator::Safe);
        info!(channel = %self.state.name, remaining_l = self.state.remaining, "channel shut down");
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn remaining(&self) -> f64 {
        self.state.remaining
    }

    pub fn is_open(&self) -> bool {
        self.state.open
    }

    pub fn flow(&self) -> f64 {
        self.state.flow
    }

    pub fn temperature(&self) -> f32 {
        self.state.temperature
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn valve(&self) -> &V {
        &self.valve
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}

/// What the main loop needs from a channel.
pub trait Channel {
    fn name(&self) -> &str;
    fn tick(&mut self, now: Instant);
    fn remaining(&self) -> f64;
    fn is_open(&self) -> bool;
    fn restore_remaining(&mut self, litres: f32);
    fn indicate(&mut self, indicator: Indicator);
    fn shutdown(&mut self);
}

impl<V, E, S, D> Channel for ChannelController<V, E, S, D>
where
    V: Valve,
    E: Encoder,
    S: Sensor,
    D: Display,
{
    fn name(&self) -> &str {
        ChannelController::name(self)
    }
    fn tick(&mut self, now: Instant) {
        ChannelController::tick(self, now);
    }
    fn remaining(&self) -> f64 {
        ChannelController::remaining(self)
    }
    fn is_open(&self) -> bool {
        ChannelController::is_open(self)
    }
    fn restore_remaining(&mut self, litres: f32) {
        ChannelController::restore_remaining(self, litres);
    }
    fn indicate(&mut self, indicator: Indicator) {
        ChannelController::indicate(self, indicator);
    }
    fn shutdown(&mut self) {
        ChannelController::shutdown(self);
    }
}
