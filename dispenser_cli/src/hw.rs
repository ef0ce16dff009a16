//! Hardware assembly: config mapping, simulated (or GPIO) drivers, and the
//! two channel controllers wired over them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use dispenser_config::{ChannelCfg, Config, LoopCalibrationCfg};
use dispenser_core::error::{DispenserError, Result};
use dispenser_core::{
    ChannelController, DisplayCfg, EncoderCfg, EncoderInput, FlowSensor, LoopCalibration, LoopInputs,
    PersistenceStore, RelayValve, SensorCfg, StatusDisplay,
};
use dispenser_hardware::{
    FileNvm, SharedBus, SimChannel, SimEncoderHandle, SimulatedCurrentLoop, SimulatedEncoder,
};
use dispenser_traits::{DisplayCommand, DisplaySink, Relay};
use eyre::WrapErr;
use tracing::debug;

/// Simulated temperature on every channel, in °C.
const SIM_TEMPERATURE_C: f32 = 21.5;
const SIM_SEED: u64 = 0x5EED;

pub type Receiver = SharedBus<SimulatedCurrentLoop>;
pub type Controller = ChannelController<
    RelayValve<Box<dyn Relay + Send>>,
    EncoderInput<SimulatedEncoder>,
    FlowSensor<Receiver>,
    StatusDisplay<LogDisplay>,
>;

/// Display sink that reports every refresh as a debug event.
#[derive(Debug)]
pub struct LogDisplay {
    channel: &'static str,
}

impl DisplaySink for LogDisplay {
    fn send(
        &mut self,
        cmd: &DisplayCommand,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match cmd {
            DisplayCommand::Text { field, text } => {
                debug!(channel = self.channel, ?field, text = %text, "display text");
            }
            DisplayCommand::Color { field, color } => {
                debug!(channel = self.channel, ?field, ?color, "display color");
            }
            DisplayCommand::Dial { position } => {
                debug!(channel = self.channel, position, "display dial");
            }
        }
        Ok(())
    }
}

/// Knobs for the simulated plant, read from the environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimKnobs {
    /// Flow while a valve is open, L/min.
    pub flow_lpm: f32,
    /// Standard deviation of the flow and temperature noise.
    pub noise: f32,
    /// Click both encoders once at startup.
    pub press: bool,
}

impl SimKnobs {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            flow_lpm: env_f32("DISPENSER_SIM_FLOW_LPM", 6.0)?,
            noise: env_f32("DISPENSER_SIM_NOISE", 0.2)?,
            press: std::env::var("DISPENSER_SIM_PRESS").is_ok_and(|v| v == "1"),
        })
    }
}

fn env_f32(key: &str, default: f32) -> Result<f32> {
    match std::env::var(key) {
        Ok(v) => match v.trim().parse::<f32>() {
            Ok(x) if x.is_finite() && x >= 0.0 => Ok(x),
            _ => Err(DispenserError::Config(format!(
                "{key} must be a non-negative number, got {v:?}"
            ))
            .into()),
        },
        Err(_) => Ok(default),
    }
}

/// Resolve `p` against the directory holding the config file.
pub fn resolve(base: &Path, p: &str) -> PathBuf {
    let p = Path::new(p);
    if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}

fn calibration(base: &Path, cfg: &LoopCalibrationCfg, key: &str) -> Result<LoopCalibration> {
    match cfg.csv.as_deref() {
        Some(csv) => {
            let path = resolve(base, csv);
            let fit = dispenser_config::load_calibration_csv(&path)
                .wrap_err_with(|| format!("load {key} calibration CSV"))?;
            Ok(fit.into())
        }
        None => Ok(cfg.into()),
    }
}

/// Runtime sensor settings with any CSV calibrations fitted.
pub fn sensor_cfg(cfg: &Config, base: &Path) -> Result<SensorCfg> {
    let mut sensor: SensorCfg = (&cfg.sensor).into();
    sensor.flow = calibration(base, &cfg.sensor.flow, "sensor.flow")?;
    sensor.temperature = calibration(base, &cfg.sensor.temperature, "sensor.temperature")?;
    Ok(sensor)
}

pub fn open_store(cfg: &Config, base: &Path) -> PersistenceStore<FileNvm> {
    PersistenceStore::new(FileNvm::new(resolve(base, &cfg.persistence.path)))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod gpio {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use dispenser_hardware::gpio::GpioRelay;
    use dispenser_traits::Relay;

    /// GPIO relay that also publishes its state so the simulated flow
    /// meter can follow the real valve.
    pub struct MirroredRelay {
        inner: GpioRelay,
        state: Arc<AtomicBool>,
    }

    impl MirroredRelay {
        pub fn new(inner: GpioRelay) -> Self {
            Self {
                inner,
                state: Arc::new(AtomicBool::new(false)),
            }
        }

        pub fn handle(&self) -> Arc<AtomicBool> {
            self.state.clone()
        }
    }

    impl Relay for MirroredRelay {
        fn set_energized(
            &mut self,
            on: bool,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.inner.set_energized(on)?;
            self.state.store(on, Ordering::Relaxed);
            Ok(())
        }

        fn is_energized(
            &self,
        ) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
            self.inner.is_energized()
        }
    }
}

fn valve_relay(ch: &ChannelCfg) -> Result<(Box<dyn Relay + Send>, Arc<AtomicBool>)> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let relay = dispenser_hardware::gpio::GpioRelay::new(ch.valve_pin, false)
            .wrap_err_with(|| format!("open valve relay on GPIO {}", ch.valve_pin))?;
        let mirrored = gpio::MirroredRelay::new(relay);
        let gate = mirrored.handle();
        Ok((Box::new(mirrored), gate))
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        debug!(pin = ch.valve_pin, "using simulated valve relay");
        let relay = dispenser_hardware::SimulatedRelay::new();
        let gate = relay.handle();
        Ok((Box::new(relay), gate))
    }
}

/// Both channels plus handles onto their simulated encoders.
pub struct Stack {
    pub left: Controller,
    pub right: Controller,
    pub encoders: [SimEncoderHandle; 2],
    pub receiver: Receiver,
}

struct ChannelParts {
    relay: Box<dyn Relay + Send>,
    gate: Arc<AtomicBool>,
    encoder: SimulatedEncoder,
}

fn parts(ch: &ChannelCfg) -> Result<ChannelParts> {
    let (relay, gate) = valve_relay(ch)?;
    debug!(address = ch.encoder_address, "using simulated encoder");
    Ok(ChannelParts {
        relay,
        gate,
        encoder: SimulatedEncoder::new(),
    })
}

/// Assemble both channels over the configured drivers. `base` is the
/// directory relative paths in the config are resolved against.
pub fn build_stack(cfg: &Config, base: &Path, knobs: &SimKnobs) -> Result<Stack> {
    let sensor = sensor_cfg(cfg, base)?;
    let encoder: EncoderCfg = (&cfg.encoder).into();
    let display: DisplayCfg = (&cfg.display).into();

    let (lc, rc) = (&cfg.channels.left, &cfg.channels.right);
    let (left, right) = (parts(lc)?, parts(rc)?);

    let flow = |cal: LoopCalibration, gate: &Arc<AtomicBool>| {
        SimChannel::new(knobs.flow_lpm, cal.gain as f32, cal.offset as f32)
            .with_noise(knobs.noise)
            .gated_by(gate.clone())
    };
    let temp = |cal: LoopCalibration| {
        SimChannel::new(SIM_TEMPERATURE_C, cal.gain as f32, cal.offset as f32)
            .with_noise(knobs.noise)
    };
    let receiver = SharedBus::new(
        SimulatedCurrentLoop::new(SIM_SEED)
            .with_channel(lc.flow_channel, flow(sensor.flow, &left.gate))
            .with_channel(lc.temp_channel, temp(sensor.temperature))
            .with_channel(rc.flow_channel, flow(sensor.flow, &right.gate))
            .with_channel(rc.temp_channel, temp(sensor.temperature)),
    );

    let encoders = [left.encoder.handle(), right.encoder.handle()];
    let controller = |name: &'static str, ch: &ChannelCfg, p: ChannelParts| -> Result<Controller> {
        let inputs = LoopInputs {
            flow: ch.flow_channel,
            temperature: ch.temp_channel,
        };
        let flow_sensor = FlowSensor::new(receiver.clone(), inputs, &sensor)
            .map_err(|e| DispenserError::Config(e.to_string()))?;
        Ok(ChannelController::new(
            name,
            RelayValve::new(p.relay),
            EncoderInput::new(p.encoder, encoder.clone()),
            flow_sensor,
            StatusDisplay::new(LogDisplay { channel: name }, display.clone()),
        ))
    };

    Ok(Stack {
        left: controller("left", lc, left)?,
        right: controller("right", rc, right)?,
        encoders,
        receiver: receiver.clone(),
    })
}
