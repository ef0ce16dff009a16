//! Driver-level hardware traits shared across the dispenser stack.
//!
//! Everything here is fallible and returns boxed errors so that drivers can
//! surface whatever their bus or OS layer produces. The control logic in
//! `dispenser_core` never sees these errors directly: its port adapters
//! resolve them to defaults before a control cycle observes them.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Colors understood by both the encoder's RGB indicator and the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Off,
    Red,
    Green,
    Blue,
    Amber,
}

impl Color {
    /// PWM levels for an RGB LED at the brightness the encoder boards use.
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Color::Off => (0x00, 0x00, 0x00),
            Color::Red => (0x25, 0x00, 0x00),
            Color::Green => (0x00, 0x25, 0x00),
            Color::Blue => (0x00, 0x00, 0x25),
            Color::Amber => (0x25, 0x15, 0x00),
        }
    }
}

/// Binary output driving a valve relay.
pub trait Relay {
    fn set_energized(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn is_energized(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Event bits reported by a rotary encoder since the previous status read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStatus {
    /// The knob was turned (either direction); the device holds a new value.
    pub rotated: bool,
    /// The device detected a double push on its own push switch.
    pub double_push: bool,
}

/// Rotary encoder with an RGB indicator and a separate push-button input.
pub trait EncoderDevice {
    /// Read and clear the device's event bits.
    fn status(&mut self) -> Result<EncoderStatus, Box<dyn std::error::Error + Send + Sync>>;
    /// Current button level; `true` while held down.
    fn button_pressed(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    fn read_value(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
    fn write_value(&mut self, value: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn set_led(&mut self, color: Color) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Multi-channel current-loop receiver. One call selects the channel and
/// performs a single conversion.
pub trait AdcReceiver {
    fn read_raw(&mut self, channel: u8) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fields on the status display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayField {
    Volume,
    Flow,
    Temperature,
}

/// A single refresh instruction for the status display. Encoding it for the
/// wire is the sink's job.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayCommand {
    Text { field: DisplayField, text: String },
    Color { field: DisplayField, color: Color },
    Dial { position: u8 },
}

pub trait DisplaySink {
    fn send(&mut self, cmd: &DisplayCommand) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Small non-volatile region addressed from offset 0.
pub trait Nvm {
    /// Read up to `len` bytes. Fewer bytes (possibly none) means the region
    /// holds less than requested. A store sized to exactly one record may
    /// return all of it instead, so a wrong-sized record can be rejected.
    fn read(&mut self, len: usize) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
    /// Overwrite the region starting at offset 0.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: Relay + ?Sized> Relay for Box<T> {
    fn set_energized(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_energized(on)
    }
    fn is_energized(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).is_energized()
    }
}

impl<T: EncoderDevice + ?Sized> EncoderDevice for Box<T> {
    fn status(&mut self) -> Result<EncoderStatus, Box<dyn std::error::Error + Send + Sync>> {
        (**self).status()
    }
    fn button_pressed(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).button_pressed()
    }
    fn read_value(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_value()
    }
    fn write_value(&mut self, value: f32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write_value(value)
    }
    fn set_led(&mut self, color: Color) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_led(color)
    }
}

impl<T: AdcReceiver + ?Sized> AdcReceiver for Box<T> {
    fn read_raw(&mut self, channel: u8) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_raw(channel)
    }
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn send(&mut self, cmd: &DisplayCommand) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send(cmd)
    }
}

impl<T: Nvm + ?Sized> Nvm for Box<T> {
    fn read(&mut self, len: usize) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(len)
    }
    fn write(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write(bytes)
    }
}
