//! Non-volatile storage backends for the persisted volume record.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dispenser_traits::Nvm;

use crate::error::HwError;

type DynResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Byte value of erased flash.
pub const ERASED: u8 = 0xFF;

/// In-memory NVM region. Clones share the same bytes, which lets a test
/// inspect or corrupt what the store wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryNvm {
    bytes: Arc<Mutex<Vec<u8>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryNvm {
    /// Region holding nothing at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Region of `len` erased bytes, as found on a fresh microcontroller.
    pub fn erased(len: usize) -> Self {
        Self::from_bytes(vec![ERASED; len])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(bytes)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Make subsequent writes fail until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}

impl Nvm for MemoryNvm {
    fn read(&mut self, len: usize) -> DynResult<Vec<u8>> {
        let bytes = self.bytes.lock().map_err(|_| HwError::BusPoisoned)?;
        Ok(bytes.iter().take(len).copied().collect())
    }

    fn write(&mut self, data: &[u8]) -> DynResult<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Box::new(HwError::Io(std::io::Error::other(
                "simulated nvm write failure",
            ))));
        }
        let mut bytes = self.bytes.lock().map_err(|_| HwError::BusPoisoned)?;
        if bytes.len() < data.len() {
            bytes.resize(data.len(), ERASED);
        }
        bytes[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// File-backed NVM for hosts without a dedicated non-volatile region.
///
/// Writes go to a sibling temp file that is synced and renamed over the
/// target, so a reader sees either the old record or the new one.
#[derive(Debug, Clone)]
pub struct FileNvm {
    path: PathBuf,
}

impl FileNvm {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Nvm for FileNvm {
    /// The file holds exactly one record, so the whole file is returned
    /// whatever `len` asks for. A file of the wrong size then fails to decode
    /// instead of being silently truncated.
    fn read(&mut self, _len: usize) -> DynResult<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(buf) => Ok(buf),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> DynResult<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(HwError::Io)?;
        }
        write_atomic(&self.path, bytes).map_err(HwError::Io)?;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}
