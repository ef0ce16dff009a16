//! Serialized access to a bus shared by several channels' drivers.
//!
//! Both channels' encoders and the current-loop receiver sit on one I2C bus.
//! `SharedBus<T>` hands out cloneable handles; each driver call holds the
//! lock for exactly that call, so a multi-step transaction such as "select
//! ADC channel, then convert" can never interleave with another channel's.

use std::sync::{Arc, Mutex};

use dispenser_traits::{
    AdcReceiver, Color, DisplayCommand, DisplaySink, EncoderDevice, EncoderStatus, Nvm, Relay,
};

use crate::error::{HwError, Result};

pub struct SharedBus<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> SharedBus<T> {
    pub fn new(device: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    /// Run one transaction with exclusive access to the device.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.inner.lock().map_err(|_| HwError::BusPoisoned)?;
        Ok(f(&mut guard))
    }
}

type DynResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

impl<T: AdcReceiver> AdcReceiver for SharedBus<T> {
    fn read_raw(&mut self, channel: u8) -> DynResult<i32> {
        self.transaction(|adc| adc.read_raw(channel))?
    }
}

impl<T: EncoderDevice> EncoderDevice for SharedBus<T> {
    fn status(&mut self) -> DynResult<EncoderStatus> {
        self.transaction(|enc| enc.status())?
    }
    fn button_pressed(&mut self) -> DynResult<bool> {
        self.transaction(|enc| enc.button_pressed())?
    }
    fn read_value(&mut self) -> DynResult<f32> {
        self.transaction(|enc| enc.read_value())?
    }
    fn write_value(&mut self, value: f32) -> DynResult<()> {
        self.transaction(|enc| enc.write_value(value))?
    }
    fn set_led(&mut self, color: Color) -> DynResult<()> {
        self.transaction(|enc| enc.set_led(color))?
    }
}

impl<T: Relay> Relay for SharedBus<T> {
    fn set_energized(&mut self, on: bool) -> DynResult<()> {
        self.transaction(|relay| relay.set_energized(on))?
    }
    fn is_energized(&self) -> DynResult<bool> {
        self.transaction(|relay| relay.is_energized())?
    }
}

impl<T: DisplaySink> DisplaySink for SharedBus<T> {
    fn send(&mut self, cmd: &DisplayCommand) -> DynResult<()> {
        self.transaction(|sink| sink.send(cmd))?
    }
}

impl<T: Nvm> Nvm for SharedBus<T> {
    fn read(&mut self, len: usize) -> DynResult<Vec<u8>> {
        self.transaction(|nvm| nvm.read(len))?
    }
    fn write(&mut self, bytes: &[u8]) -> DynResult<()> {
        self.transaction(|nvm| nvm.write(bytes))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(i32);

    impl AdcReceiver for Counter {
        fn read_raw(&mut self, channel: u8) -> DynResult<i32> {
            self.0 += 1;
            Ok(self.0 * 10 + i32::from(channel))
        }
    }

    #[test]
    fn clones_drive_the_same_device() {
        let mut a = SharedBus::new(Counter(0));
        let mut b = a.clone();
        assert_eq!(a.read_raw(1).unwrap(), 11);
        assert_eq!(b.read_raw(2).unwrap(), 22);
        assert_eq!(a.read_raw(3).unwrap(), 33);
    }

    #[test]
    fn poisoned_bus_reports_typed_error() {
        let bus = SharedBus::new(Counter(0));
        let poisoner = bus.clone();
        let _ = std::thread::spawn(move || {
            let _: Result<()> = poisoner.transaction(|_| panic!("transaction blew up"));
        })
        .join();
        let mut handle = bus.clone();
        let err = handle.read_raw(0).expect_err("poisoned lock must fail");
        assert!(err.to_string().contains("poisoned"));
    }
}
