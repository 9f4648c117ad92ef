//! Non-volatile byte storage (EEPROM).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use r2_packet::{ErrorCode, Fault};
use thiserror::Error;

/// Number of addressable bytes.
pub const STORAGE_SIZE: usize = 1024;

/// Errors from non-volatile storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Address outside the storage.
    #[error("address {0} is outside the storage")]
    OutOfRange(u16),

    /// Backing file failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<&StorageError> for Fault {
    fn from(err: &StorageError) -> Self {
        let info = match err {
            StorageError::OutOfRange(address) => *address as u8,
            StorageError::Io(_) => 0,
        };
        Fault::new(ErrorCode::Storage, info)
    }
}

/// Byte-addressed storage that survives a restart.
pub trait NonVolatileStorage: Send {
    /// Read one byte.
    fn read(&mut self, address: u16) -> Result<u8, StorageError>;

    /// Write one byte.
    fn write(&mut self, address: u16, value: u8) -> Result<(), StorageError>;

    /// Write only if the stored value differs. Returns whether a write happened.
    fn update(&mut self, address: u16, value: u8) -> Result<bool, StorageError> {
        if self.read(address)? == value {
            return Ok(false);
        }
        self.write(address, value)?;
        Ok(true)
    }
}

fn check(address: u16) -> Result<usize, StorageError> {
    let index = address as usize;
    if index >= STORAGE_SIZE {
        return Err(StorageError::OutOfRange(address));
    }
    Ok(index)
}

/// Zero-initialised in-memory storage.
///
/// Clones share the same bytes, which lets a test drop a router and build a
/// new one on the same storage to simulate a reboot.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    bytes: Arc<Mutex<Vec<u8>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryStorage {
    /// Create zeroed storage.
    pub fn new() -> Self {
        MemoryStorage {
            bytes: Arc::new(Mutex::new(vec![0; STORAGE_SIZE])),
            writes: Arc::new(Mutex::new(0)),
        }
    }

    /// Number of physical writes performed.
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl NonVolatileStorage for MemoryStorage {
    fn read(&mut self, address: u16) -> Result<u8, StorageError> {
        let index = check(address)?;
        Ok(self.bytes.lock()[index])
    }

    fn write(&mut self, address: u16, value: u8) -> Result<(), StorageError> {
        let index = check(address)?;
        self.bytes.lock()[index] = value;
        *self.writes.lock() += 1;
        Ok(())
    }
}

/// Storage backed by a fixed-size file, written through on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    file: File,
}

impl FileStorage {
    /// Open or create the backing file, zero-filling it to `STORAGE_SIZE`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if (file.metadata()?.len() as usize) < STORAGE_SIZE {
            file.set_len(STORAGE_SIZE as u64)?;
        }
        Ok(FileStorage { path, file })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NonVolatileStorage for FileStorage {
    fn read(&mut self, address: u16) -> Result<u8, StorageError> {
        let index = check(address)?;
        let mut byte = [0u8; 1];
        self.file.seek(SeekFrom::Start(index as u64))?;
        self.file.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn write(&mut self, address: u16, value: u8) -> Result<(), StorageError> {
        let index = check(address)?;
        self.file.seek(SeekFrom::Start(index as u64))?;
        self.file.write_all(&[value])?;
        self.file.sync_data()?;
        Ok(())
    }
}
