use crate::errors::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Bounds-checked access to a memory-mapped ELF file. x86-64 ELF files are
/// always little-endian so the accessors decode only that.
pub struct Reader {
    path: PathBuf,
    bytes: Mmap,
}

impl Reader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // This is unsafe because it has undefined behavior if the underlying
        // file is modified while the memory map is in use.
        let bytes = unsafe { Mmap::map(&file) }.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Reader {
            path: path.to_path_buf(),
            bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bad(&self, reason: &'static str) -> Error {
        Error::BadFormat {
            path: self.path.clone(),
            reason,
        }
    }

    pub fn slice(&self, offset: usize, size: usize) -> Result<&[u8]> {
        self.bytes
            .get(offset..offset + size)
            .ok_or_else(|| self.bad("offset past the end of the file"))
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn read_half(&self, offset: usize) -> Result<u16> {
        let slice = self.slice(offset, 2)?;
        Ok(u16::from_le_bytes(slice.try_into().unwrap()))
    }

    pub fn read_word(&self, offset: usize) -> Result<u32> {
        let slice = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes(slice.try_into().unwrap()))
    }

    pub fn read_xword(&self, offset: usize) -> Result<u64> {
        let slice = self.slice(offset, 8)?;
        Ok(u64::from_le_bytes(slice.try_into().unwrap()))
    }

    /// Read a NUL-terminated string. The offset can point into the middle
    /// of a string table entry.
    pub fn read_str(&self, offset: usize) -> Result<&str> {
        let tail = self
            .bytes
            .get(offset..)
            .ok_or_else(|| self.bad("string offset past the end of the file"))?;
        let len = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| self.bad("unterminated string"))?;
        std::str::from_utf8(&tail[..len]).map_err(|_| self.bad("string is not UTF-8"))
    }
}
