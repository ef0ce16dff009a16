//! Remaining volumes across power loss.
//!
//! The record is two little-endian `f32`s at offset 0 (left, then right),
//! 8 bytes with no checksum. Anything that does not decode to two finite,
//! non-negative volumes is treated as absent and both channels start at 0.

use dispenser_traits::Nvm;
use eyre::WrapErr;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, DispenserError, LoadError, Result};
use crate::hw_error::map_hw_error;

pub const RECORD_LEN: usize = 8;

/// Byte value of erased storage.
const ERASED: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PersistedRecord {
    pub left_l: f32,
    pub right_l: f32,
}

impl PersistedRecord {
    pub fn new(left_l: f32, right_l: f32) -> Self {
        Self { left_l, right_l }
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[..4].copy_from_slice(&self.left_l.to_le_bytes());
        out[4..].copy_from_slice(&self.right_l.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        let Ok(raw) = <[u8; RECORD_LEN]>::try_from(bytes) else {
            return Err(DecodeError::Length {
                expected: RECORD_LEN,
                actual: bytes.len(),
            });
        };
        let [a0, a1, a2, a3, b0, b1, b2, b3] = raw;
        let left_l = check("left", f32::from_le_bytes([a0, a1, a2, a3]))?;
        let right_l = check("right", f32::from_le_bytes([b0, b1, b2, b3]))?;
        Ok(Self { left_l, right_l })
    }
}

fn check(channel: &'static str, value: f32) -> std::result::Result<f32, DecodeError> {
    if !value.is_finite() {
        return Err(DecodeError::NonFinite { channel });
    }
    if value < 0.0 {
        return Err(DecodeError::Negative { channel, value });
    }
    Ok(value)
}

/// Result of `PersistenceStore::load`: always a usable record, plus the
/// reason a default was used instead of stored data.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub record: PersistedRecord,
    pub fallback: Option<LoadError>,
}

impl Loaded {
    pub fn used_default(&self) -> bool {
        self.fallback.is_some()
    }
}

#[derive(Debug)]
pub struct PersistenceStore<N> {
    nvm: N,
}

impl<N: Nvm> PersistenceStore<N> {
    pub fn new(nvm: N) -> Self {
        Self { nvm }
    }

    pub fn nvm(&self) -> &N {
        &self.nvm
    }

    /// Read the stored record, telling "nothing stored" apart from "stored
    /// but unusable".
    pub fn try_load(&mut self) -> std::result::Result<PersistedRecord, LoadError> {
        let bytes = self
            .nvm
            .read(RECORD_LEN)
            .map_err(|e| LoadError::Io(map_hw_error(&*e).to_string()))?;
        if bytes.is_empty() || bytes.iter().all(|&b| b == ERASED) {
            return Err(LoadError::NoRecord);
        }
        Ok(PersistedRecord::decode(&bytes)?)
    }

    /// Stored record, or zeros. Never fails; the fallback reason is logged
    /// and returned alongside.
    pub fn load(&mut self) -> Loaded {
        match self.try_load() {
            Ok(record) => {
                info!(left_l = record.left_l, right_l = record.right_l, "state loaded");
                Loaded {
                    record,
                    fallback: None,
                }
            }
            Err(LoadError::NoRecord) => {
                info!("no saved state; starting from zero");
                Loaded {
                    record: PersistedRecord::default(),
                    fallback: Some(LoadError::NoRecord),
                }
            }
            Err(e) => {
                warn!(error = %e, "saved state unusable; starting from zero");
                Loaded {
                    record: PersistedRecord::default(),
                    fallback: Some(e),
                }
            }
        }
    }

    /// Overwrite the stored record in place.
    pub fn save(&mut self, record: PersistedRecord) -> Result<()> {
        self.nvm
            .write(&record.encode())
            .map_err(|e| DispenserError::Persistence(map_hw_error(&*e).to_string()))
            .wrap_err("failed to write persisted record")?;
        debug!(left_l = record.left_l, right_l = record.right_l, "state saved");
        Ok(())
    }
}
