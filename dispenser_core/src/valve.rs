//! `Valve` port over a relay driver.

use dispenser_traits::Relay;
use tracing::warn;

use crate::hw_error::map_hw_error;
use crate::ports::Valve;

/// Drives a relay and reads the valve state back from it.
///
/// A failed switch is logged and leaves the valve as it was; `is_open` then
/// reports what the relay says, so the controller sees the real state on its
/// next cycle. If the relay cannot be read either, the last commanded state
/// is reported.
#[derive(Debug)]
pub struct RelayValve<R> {
    relay: R,
    commanded: bool,
}

impl<R: Relay> RelayValve<R> {
    pub fn new(relay: R) -> Self {
        Self {
            relay,
            commanded: false,
        }
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    fn drive(&mut self, open: bool) {
        match self.relay.set_energized(open) {
            Ok(()) => self.commanded = open,
            Err(e) => warn!(open, error = %map_hw_error(&*e), "valve relay switch failed"),
        }
    }
}

impl<R: Relay> Valve for RelayValve<R> {
    fn is_open(&self) -> bool {
        match self.relay.is_energized() {
            Ok(on) => on,
            Err(e) => {
                warn!(error = %map_hw_error(&*e), "valve relay read failed; using commanded state");
                self.commanded
            }
        }
    }

    fn open(&mut self) {
        self.drive(true);
    }

    fn close(&mut self) {
        self.drive(false);
    }

    fn reset(&mut self) {
        self.drive(false);
    }
}
