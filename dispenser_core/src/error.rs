use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DispenserError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for device")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Why a persisted record's bytes could not be turned into volumes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("record must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("{channel} volume is not finite")]
    NonFinite { channel: &'static str },
    #[error("{channel} volume is negative ({value})")]
    Negative { channel: &'static str, value: f32 },
}

/// Why `PersistenceStore::try_load` produced no record. Both variants end in
/// the same zero default, but they are logged differently.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error("no prior record")]
    NoRecord,
    #[error("stored record is corrupt: {0}")]
    Decode(#[from] DecodeError),
    #[error("storage read failed: {0}")]
    Io(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
