//! Valve relays on Raspberry Pi GPIO.

use rppal::gpio::{Gpio, OutputPin};
use tracing::debug;

use dispenser_traits::Relay;

use crate::error::{HwError, Result};

pub struct GpioRelay {
    pin: OutputPin,
    active_low: bool,
}

impl GpioRelay {
    /// Claim BCM pin `bcm` as a relay output, de-energized.
    pub fn new(bcm: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(bcm)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        let mut relay = Self { pin, active_low };
        relay.drive(false);
        Ok(relay)
    }

    fn drive(&mut self, on: bool) {
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

impl Relay for GpioRelay {
    fn set_energized(
        &mut self,
        on: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.drive(on);
        debug!(pin = self.pin.pin(), on, "relay switched");
        Ok(())
    }

    fn is_energized(&self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.pin.is_set_high() != self.active_low)
    }
}
