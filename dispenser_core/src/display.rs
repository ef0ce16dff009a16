//! `Display` port over a display command sink.
//!
//! Setters only record values and mark what needs repainting. `tick` pushes
//! pending refreshes at two cadences: volume, volume color and temperature
//! every value period; flow text and the dial every dial period.

use std::time::Instant;

use dispenser_traits::{Color, DisplayCommand, DisplayField, DisplaySink};
use tracing::warn;

use crate::config::DisplayCfg;
use crate::hw_error::map_hw_error;
use crate::ports::{Display, DisplayMode};
use crate::util::{is_due, non_negative};

/// Two decimals, zero padded to width 5: `5.25` renders as `"05.25"`.
pub fn format_value(v: f32) -> String {
    format!("{:05.2}", non_negative(v))
}

/// Dial position for a flow rate: half-litre-per-minute steps, capped.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn dial_position(flow: f32, dial_max: u8) -> u8 {
    (non_negative(flow) * 2.0).floor().min(f32::from(dial_max)) as u8
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    volume: bool,
    color: bool,
    temperature: bool,
    flow: bool,
}

impl Pending {
    const ALL: Self = Self {
        volume: true,
        color: true,
        temperature: true,
        flow: true,
    };
}

#[derive(Debug)]
pub struct StatusDisplay<S> {
    sink: S,
    cfg: DisplayCfg,
    volume: f32,
    flow: f32,
    temperature: f32,
    mode: DisplayMode,
    pending: Pending,
    dial: Option<u8>,
    last_value_refresh: Option<Instant>,
    last_dial_refresh: Option<Instant>,
}

impl<S: DisplaySink> StatusDisplay<S> {
    pub fn new(sink: S, cfg: DisplayCfg) -> Self {
        Self {
            sink,
            cfg,
            volume: 0.0,
            flow: 0.0,
            temperature: 0.0,
            mode: DisplayMode::Idle,
            pending: Pending::ALL,
            dial: None,
            last_value_refresh: None,
            last_dial_refresh: None,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Send one command; `false` leaves the refresh pending for next time.
    fn send(&mut self, cmd: DisplayCommand) -> bool {
        match self.sink.send(&cmd) {
            Ok(()) => true,
            Err(e) => {
                warn!(?cmd, error = %map_hw_error(&*e), "display refresh failed");
                false
            }
        }
    }

    fn refresh_values(&mut self) {
        if self.pending.color {
            let color = match self.mode {
                DisplayMode::Dispensing => Color::Red,
                DisplayMode::Idle => Color::Green,
            };
            self.pending.color = !self.send(DisplayCommand::Color {
                field: DisplayField::Volume,
                color,
            });
        }
        if self.pending.volume {
            self.pending.volume = !self.send(DisplayCommand::Text {
                field: DisplayField::Volume,
                text: format_value(self.volume),
            });
        }
        if self.pending.temperature {
            self.pending.temperature = !self.send(DisplayCommand::Text {
                field: DisplayField::Temperature,
                text: format!("{} °C", format_value(self.temperature)),
            });
        }
    }

    fn refresh_dial(&mut self) {
        if self.pending.flow {
            self.pending.flow = !self.send(DisplayCommand::Text {
                field: DisplayField::Flow,
                text: format_value(self.flow),
            });
        }
        let position = dial_position(self.flow, self.cfg.dial_max);
        if self.dial != Some(position) && self.send(DisplayCommand::Dial { position }) {
            self.dial = Some(position);
        }
    }
}

fn set_marking(slot: &mut f32, pending: &mut bool, v: f32) {
    let v = non_negative(v);
    if *slot != v {
        *slot = v;
        *pending = true;
    }
}

impl<S: DisplaySink> Display for StatusDisplay<S> {
    fn set_volume(&mut self, litres: f32) {
        set_marking(&mut self.volume, &mut self.pending.volume, litres);
    }

    fn set_flow(&mut self, litres_per_min: f32) {
        set_marking(&mut self.flow, &mut self.pending.flow, litres_per_min);
    }

    fn set_temperature(&mut self, celsius: f32) {
        set_marking(&mut self.temperature, &mut self.pending.temperature, celsius);
    }

    fn set_mode(&mut self, mode: DisplayMode) {
        if self.mode != mode {
            self.mode = mode;
            self.pending.color = true;
        }
    }

    fn tick(&mut self, now: Instant) {
        if is_due(now, self.last_value_refresh, self.cfg.value_period) {
            self.last_value_refresh = Some(now);
            self.refresh_values();
        }
        if is_due(now, self.last_dial_refresh, self.cfg.dial_period) {
            self.last_dial_refresh = Some(now);
            self.refresh_dial();
        }
    }

    fn reset(&mut self) {
        self.volume = 0.0;
        self.flow = 0.0;
        self.temperature = 0.0;
        self.mode = DisplayMode::Idle;
        self.pending = Pending::ALL;
        self.dial = None;
        self.last_value_refresh = None;
        self.last_dial_refresh = None;
    }
}
