//! Non-volatile byte region
//!
//! The credential layout lives in a fixed 512-byte region with an
//! explicit commit step, the way EEPROM-class parts behave: writes land
//! in a working copy and only `commit` makes them durable.
//!
//! [`FileRegion`] backs the region with a file so the agent survives
//! restarts on ordinary hosts. [`MemRegion`] keeps it purely in memory.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Region size in bytes
pub const REGION_SIZE: usize = 512;

/// Byte value an erased region is flooded with
pub const ERASED: u8 = 0xFF;

/// Fixed-size byte storage with an explicit commit step.
///
/// `write` only mutates the working copy; nothing is durable until
/// `commit` returns. Reads always observe the working copy.
pub trait NvRegion {
    fn read_at(&self, offset: usize, out: &mut [u8]);
    fn write_at(&mut self, offset: usize, data: &[u8]);
    fn commit(&mut self) -> io::Result<()>;
}

/// In-memory region. Starts erased.
#[derive(Debug)]
pub struct MemRegion {
    bytes: [u8; REGION_SIZE],
}

impl MemRegion {
    pub fn new() -> Self {
        Self {
            bytes: [ERASED; REGION_SIZE],
        }
    }
}

impl Default for MemRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl NvRegion for MemRegion {
    fn read_at(&self, offset: usize, out: &mut [u8]) {
        out.copy_from_slice(&self.bytes[offset..offset + out.len()]);
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn commit(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// File-backed region.
///
/// Opening loads any existing content into the working copy; a short or
/// missing file reads as erased bytes. `commit` rewrites the whole
/// region and fsyncs — 512 bytes, so there is no point being clever.
pub struct FileRegion {
    file: File,
    bytes: [u8; REGION_SIZE],
}

impl FileRegion {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut bytes = [ERASED; REGION_SIZE];
        let mut existing = Vec::new();
        file.read_to_end(&mut existing)?;
        let n = existing.len().min(REGION_SIZE);
        bytes[..n].copy_from_slice(&existing[..n]);

        Ok(Self { file, bytes })
    }
}

impl NvRegion for FileRegion {
    fn read_at(&self, offset: usize, out: &mut [u8]) {
        out.copy_from_slice(&self.bytes[offset..offset + out.len()]);
    }

    fn write_at(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn commit(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.bytes)?;
        self.file.sync_all()?;
        Ok(())
    }
}
