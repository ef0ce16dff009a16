//! Drivers for the dispenser: simulated devices for development and tests,
//! non-volatile storage backends, serialized bus access, and (behind the
//! `hardware` feature) GPIO relays on a Raspberry Pi.

pub mod bus;
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod nvm;
pub mod sim;

pub use bus::SharedBus;
pub use nvm::{FileNvm, MemoryNvm};
pub use sim::{
    DisplayLog, RecordingDisplay, SimChannel, SimEncoderHandle, SimulatedCurrentLoop,
    SimulatedEncoder,
};

use dispenser_traits::Relay;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Simulated valve relay. The energized state is shared through `handle()`
/// so a simulated flow meter can follow the valve.
#[derive(Debug, Default)]
pub struct SimulatedRelay {
    energized: Arc<AtomicBool>,
}

impl SimulatedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Arc<AtomicBool> {
        self.energized.clone()
    }
}

impl Relay for SimulatedRelay {
    fn set_energized(&mut self, on: bool) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let was = self.energized.swap(on, Ordering::Relaxed);
        if was != on {
            tracing::debug!(on, "relay switched (simulated)");
        }
        Ok(())
    }

    fn is_energized(&self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.energized.load(Ordering::Relaxed))
    }
}
