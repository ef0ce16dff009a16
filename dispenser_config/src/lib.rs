#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration parsing for the dispenser.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section has defaults, so an empty document is a working config.
//! - The calibration CSV loader enforces headers and fits a line through
//!   the points by ordinary least squares.
use std::collections::HashSet;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timing {
    /// Control cycle period; each channel ticks at most once per period.
    pub control_period_ms: u64,
    /// How often remaining volumes are considered for persistence.
    pub persist_period_ms: u64,
    /// Sleep between scheduler polls.
    pub idle_sleep_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            control_period_ms: 10,
            persist_period_ms: 2000,
            idle_sleep_ms: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    Off,
    Red,
    Green,
    Blue,
    Amber,
}

/// Indicator colors per valve state. Deployed boards disagree on which
/// color means "open", so both are configurable.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedCfg {
    pub open: LedColor,
    pub closed: LedColor,
    /// Shown while persisted state is being restored.
    pub busy: LedColor,
    /// Shown after shutdown, when the valves are closed.
    pub safe: LedColor,
}

impl Default for LedCfg {
    fn default() -> Self {
        Self {
            open: LedColor::Blue,
            closed: LedColor::Green,
            busy: LedColor::Amber,
            safe: LedColor::Red,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EncoderCfg {
    pub min_l: f32,
    pub max_l: f32,
    /// Litres per detent; values read from the device snap to this grid.
    pub step_l: f32,
    pub poll_period_ms: u64,
    pub led: LedCfg,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            min_l: 0.0,
            max_l: 80.0,
            step_l: 0.25,
            poll_period_ms: 100,
            led: LedCfg::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmootherKind {
    #[default]
    SavitzkyGolay,
    MovingAverage,
}

/// Linear current-loop calibration: `value = gain * raw + offset`.
///
/// When `csv` is set the line is fitted from that file instead and
/// `gain`/`offset` are ignored.
#[derive(Debug, Deserialize, Clone)]
pub struct LoopCalibrationCfg {
    pub gain: f64,
    pub offset: f64,
    #[serde(default)]
    pub csv: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorCfg {
    pub sample_period_ms: u64,
    pub flow_window: usize,
    pub temp_window: usize,
    pub smoother: SmootherKind,
    /// 0.9..15 L/min across 4..20 mA at 16-bit resolution.
    pub flow: LoopCalibrationCfg,
    /// -25..125 °C across 4..20 mA at 16-bit resolution.
    pub temperature: LoopCalibrationCfg,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            sample_period_ms: 100,
            flow_window: 31,
            temp_window: 15,
            smoother: SmootherKind::SavitzkyGolay,
            flow: LoopCalibrationCfg {
                gain: 0.000_602_781_008_4,
                offset: -2.625_000_000_9,
                csv: None,
            },
            temperature: LoopCalibrationCfg {
                gain: 0.006_412_563_919,
                offset: -62.500_000_005_5,
                csv: None,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayCfg {
    /// Volume, temperature and mode refresh period.
    pub value_period_ms: u64,
    /// Flow text and dial refresh period.
    pub dial_period_ms: u64,
    pub dial_max: u8,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            value_period_ms: 100,
            dial_period_ms: 500,
            dial_max: 31,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersistenceCfg {
    /// File standing in for the non-volatile region.
    pub path: String,
}

impl Default for PersistenceCfg {
    fn default() -> Self {
        Self {
            path: "dispenser_state.bin".into(),
        }
    }
}

/// Wiring of one channel.
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelCfg {
    /// BCM pin driving the valve relay.
    pub valve_pin: u8,
    pub flow_channel: u8,
    pub temp_channel: u8,
    pub encoder_address: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Channels {
    pub left: ChannelCfg,
    pub right: ChannelCfg,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            left: ChannelCfg {
                valve_pin: 17,
                flow_channel: 0,
                temp_channel: 1,
                encoder_address: 0x36,
            },
            right: ChannelCfg {
                valve_pin: 27,
                flow_channel: 2,
                temp_channel: 3,
                encoder_address: 0x37,
            },
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub timing: Timing,
    pub encoder: EncoderCfg,
    pub sensor: SensorCfg,
    pub display: DisplayCfg,
    pub persistence: PersistenceCfg,
    pub channels: Channels,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,value
///
/// Example:
/// raw,value
/// 6554,1.325
/// 32768,17.127
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub value: f64,
}

/// Fitted line `value = gain * raw + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub gain: f64,
    pub offset: f64,
}

impl LinearFit {
    /// Ordinary least squares over all rows. Raw values must be strictly
    /// monotonic so a transposed or duplicated row is caught early.
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }

        let mut dir: i8 = 0;
        for (i, pair) in rows.windows(2).enumerate() {
            let d = pair[1].raw - pair[0].raw;
            if d == 0 {
                eyre::bail!(
                    "calibration rows have duplicate raw values at index {} and {}",
                    i,
                    i + 1
                );
            }
            let step_dir = if d > 0 { 1 } else { -1 };
            if dir == 0 {
                dir = step_dir;
            } else if dir != step_dir {
                eyre::bail!(
                    "calibration raw values must be monotonic (strictly increasing or strictly decreasing)"
                );
            }
        }
        if let Some(bad) = rows.iter().position(|r| !r.value.is_finite()) {
            eyre::bail!("calibration row {} has a non-finite value", bad);
        }

        #[allow(clippy::cast_precision_loss)]
        let n = rows.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let mean_x = rows.iter().map(|r| r.raw as f64).sum::<f64>() / n;
        let mean_y = rows.iter().map(|r| r.value).sum::<f64>() / n;
        let (mut sxx, mut sxy) = (0.0f64, 0.0f64);
        for r in rows {
            #[allow(clippy::cast_precision_loss)]
            let x = r.raw as f64 - mean_x;
            let y = r.value - mean_y;
            sxx += x * x;
            sxy += x * y;
        }
        if !sxx.is_finite() || sxx == 0.0 {
            eyre::bail!("calibration cannot determine slope (degenerate raw variance)");
        }
        let gain = sxy / sxx;
        if !gain.is_finite() || gain == 0.0 {
            eyre::bail!("calibration produced an unusable slope ({gain})");
        }
        Ok(Self {
            gain,
            offset: mean_y - gain * mean_x,
        })
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<LinearFit> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != ["raw", "value"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,value', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }

    LinearFit::from_rows(&rows)
}

fn check_window(key: &str, n: usize) -> eyre::Result<()> {
    if n == 0 || n % 2 == 0 {
        eyre::bail!("{key} must be odd and >= 1 (got {n})");
    }
    Ok(())
}

fn check_calibration(key: &str, cal: &LoopCalibrationCfg) -> eyre::Result<()> {
    if cal.csv.is_some() {
        return Ok(());
    }
    if !cal.gain.is_finite() || cal.gain == 0.0 {
        eyre::bail!("{key}.gain must be finite and non-zero");
    }
    if !cal.offset.is_finite() {
        eyre::bail!("{key}.offset must be finite");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Timing
        if self.timing.control_period_ms == 0 {
            eyre::bail!("timing.control_period_ms must be >= 1");
        }
        if self.timing.persist_period_ms < self.timing.control_period_ms {
            eyre::bail!("timing.persist_period_ms must be >= timing.control_period_ms");
        }
        if self.timing.idle_sleep_ms > self.timing.control_period_ms {
            eyre::bail!("timing.idle_sleep_ms must be <= timing.control_period_ms");
        }

        // Encoder
        let enc = &self.encoder;
        if !enc.min_l.is_finite() || enc.min_l < 0.0 {
            eyre::bail!("encoder.min_l must be finite and >= 0");
        }
        if !enc.max_l.is_finite() || enc.max_l <= enc.min_l {
            eyre::bail!("encoder.max_l must be finite and > encoder.min_l");
        }
        if !enc.step_l.is_finite() || enc.step_l <= 0.0 {
            eyre::bail!("encoder.step_l must be > 0");
        }
        if enc.poll_period_ms == 0 {
            eyre::bail!("encoder.poll_period_ms must be >= 1");
        }
        if enc.led.open == enc.led.closed {
            eyre::bail!("encoder.led.open and encoder.led.closed must differ");
        }

        // Sensor
        if self.sensor.sample_period_ms == 0 {
            eyre::bail!("sensor.sample_period_ms must be >= 1");
        }
        check_window("sensor.flow_window", self.sensor.flow_window)?;
        check_window("sensor.temp_window", self.sensor.temp_window)?;
        check_calibration("sensor.flow", &self.sensor.flow)?;
        check_calibration("sensor.temperature", &self.sensor.temperature)?;

        // Display
        if self.display.value_period_ms == 0 {
            eyre::bail!("display.value_period_ms must be >= 1");
        }
        if self.display.dial_period_ms == 0 {
            eyre::bail!("display.dial_period_ms must be >= 1");
        }
        if self.display.dial_max == 0 {
            eyre::bail!("display.dial_max must be >= 1");
        }

        // Persistence
        if self.persistence.path.trim().is_empty() {
            eyre::bail!("persistence.path must not be empty");
        }

        // Channels: nothing may be wired twice
        let (l, r) = (&self.channels.left, &self.channels.right);
        if l.valve_pin == r.valve_pin {
            eyre::bail!("channels.left.valve_pin and channels.right.valve_pin must differ");
        }
        if l.encoder_address == r.encoder_address {
            eyre::bail!(
                "channels.left.encoder_address and channels.right.encoder_address must differ"
            );
        }
        let inputs = [l.flow_channel, l.temp_channel, r.flow_channel, r.temp_channel];
        if inputs.iter().collect::<HashSet<_>>().len() != inputs.len() {
            eyre::bail!("channels.*.flow_channel and channels.*.temp_channel must all differ");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
