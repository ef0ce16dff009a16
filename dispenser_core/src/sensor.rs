//! `Sensor` port over a current-loop receiver.

use std::time::{Duration, Instant};

use dispenser_traits::AdcReceiver;
use tracing::{trace, warn};

use crate::calibration::LoopCalibration;
use crate::config::SensorCfg;
use crate::error::BuildError;
use crate::filter::FlowFilter;
use crate::hw_error::map_hw_error;
use crate::ports::Sensor;
use crate::util::is_due;

/// Receiver inputs carrying one channel's flow and temperature loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopInputs {
    pub flow: u8,
    pub temperature: u8,
}

/// Samples flow and temperature once per sample period, converts counts to
/// engineering units, and smooths each stream through its own `FlowFilter`.
/// A failed read skips that sample and keeps the previous filtered value.
#[derive(Debug)]
pub struct FlowSensor<A> {
    adc: A,
    inputs: LoopInputs,
    flow_cal: LoopCalibration,
    temp_cal: LoopCalibration,
    flow_filter: FlowFilter,
    temp_filter: FlowFilter,
    sample_period: Duration,
    last_sample: Option<Instant>,
    flow: f32,
    temperature: f32,
}

impl<A: AdcReceiver> FlowSensor<A> {
    pub fn new(adc: A, inputs: LoopInputs, cfg: &SensorCfg) -> Result<Self, BuildError> {
        Ok(Self {
            adc,
            inputs,
            flow_cal: cfg.flow,
            temp_cal: cfg.temperature,
            flow_filter: FlowFilter::with_kind(cfg.flow_window, cfg.smoother)?,
            temp_filter: FlowFilter::with_kind(cfg.temp_window, cfg.smoother)?,
            sample_period: cfg.sample_period,
            last_sample: None,
            flow: 0.0,
            temperature: 0.0,
        })
    }

    pub fn flow_filter(&self) -> &FlowFilter {
        &self.flow_filter
    }

    fn sample(&mut self, input: u8, cal: LoopCalibration) -> Option<f32> {
        match self.adc.read_raw(input) {
            Ok(raw) => {
                let v = cal.apply(raw);
                trace!(input, raw, value = v, "loop sample");
                Some(v)
            }
            Err(e) => {
                warn!(input, error = %map_hw_error(&*e), "sensor read failed; keeping last value");
                None
            }
        }
    }
}

impl<A: AdcReceiver> Sensor for FlowSensor<A> {
    fn tick(&mut self, now: Instant) {
        if !is_due(now, self.last_sample, self.sample_period) {
            return;
        }
        self.last_sample = Some(now);

        if let Some(v) = self.sample(self.inputs.flow, self.flow_cal) {
            self.flow = self.flow_filter.observe(v);
        }
        if let Some(v) = self.sample(self.inputs.temperature, self.temp_cal) {
            self.temperature = self.temp_filter.observe(v);
        }
    }

    fn flow_rate(&self) -> f32 {
        self.flow
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn reset(&mut self) {
        self.flow_filter.reset();
        self.temp_filter.reset();
        self.flow = 0.0;
        self.temperature = 0.0;
        self.last_sample = None;
    }
}
