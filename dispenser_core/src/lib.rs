#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core dispensing logic (hardware-agnostic).
//!
//! This crate tracks the volume left to dispense on each of two channels
//! and drives a valve, a rotary encoder and a status display to match. All
//! hardware goes through the driver traits in `dispenser_traits`.
//!
//! ## Architecture
//!
//! - **Ports** (`ports`): infallible `Valve`, `Encoder`, `Sensor` and
//!   `Display` traits seen by the control logic.
//! - **Adapters**: `RelayValve`, `EncoderInput`, `FlowSensor` and
//!   `StatusDisplay` implement the ports over fallible drivers, resolving
//!   every driver error to a logged default.
//! - **Filtering** (`filter`): `FlowFilter` with a filling/steady window and
//!   pluggable `Smoother`s.
//! - **Control** (`channel`): `ChannelController`, the per-channel
//!   read/update/write state machine.
//! - **Persistence** (`persist`): the 8-byte record of remaining volumes.
//! - **Main loop** (`runner`): `Dispenser` schedules ticks and saves.

pub mod calibration;
pub mod channel;
pub mod config;
pub mod conversions;
pub mod display;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod hw_error;
pub mod mocks;
pub mod persist;
pub mod ports;
pub mod runner;
pub mod sensor;
pub mod util;
pub mod valve;

pub use calibration::LoopCalibration;
pub use channel::{Channel, ChannelController, ChannelState};
pub use config::{DisplayCfg, EncoderCfg, LedPolicy, SensorCfg, SmootherKind, TimingCfg};
pub use display::StatusDisplay;
pub use encoder::{ButtonLatch, EncoderInput};
pub use error::{BuildError, DecodeError, DispenserError, LoadError, Result};
pub use filter::{FilterPhase, FlowFilter, MovingAverage, SavitzkyGolay, Smoother};
pub use persist::{Loaded, PersistedRecord, PersistenceStore};
pub use ports::{Display, DisplayMode, Encoder, EncoderSnapshot, Indicator, Sensor, Valve};
pub use runner::{ChannelSummary, Dispenser, PollOutcome, RunSummary};
pub use sensor::{FlowSensor, LoopInputs};
pub use valve::RelayValve;
