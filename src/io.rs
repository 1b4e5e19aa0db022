//! Sequential typed readers over the on-disk data files
//!
//! Every input starts with an 8-byte [`Fingerprint`]. The reader verifies
//! it on open, then exposes the rest of the file as a forward-only cursor
//! of little-endian counts and bulk entry runs. Sizing and populating are
//! two independent passes; both walk a file strictly front to back.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use crate::error::{DatastoreError, Result};
use crate::types::Pod;

/// Magic prefix of every data file
pub const FINGERPRINT_MAGIC: [u8; 4] = *b"OSRN";

/// File format identification header.
///
/// `magic` and `major` gate compatibility; `minor` and `patch` are
/// informational.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub magic: [u8; 4],
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub reserved: u8,
}

unsafe impl Pod for Fingerprint {}

impl Fingerprint {
    /// Fingerprint written by the current toolchain
    pub fn current() -> Self {
        Self {
            magic: FINGERPRINT_MAGIC,
            major: 1,
            minor: 0,
            patch: 0,
            reserved: 0,
        }
    }

    /// Whether a file carrying `self` can be consumed by this build
    pub fn is_compatible(&self) -> bool {
        self.magic == FINGERPRINT_MAGIC && self.major == Self::current().major
    }

    pub fn to_bytes(self) -> [u8; 8] {
        [
            self.magic[0],
            self.magic[1],
            self.magic[2],
            self.magic[3],
            self.major,
            self.minor,
            self.patch,
            self.reserved,
        ]
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            major: bytes[4],
            minor: bytes[5],
            patch: bytes[6],
            reserved: bytes[7],
        }
    }
}

/// Whether [`FileReader::open`] demands a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintCheck {
    Verify,
    Skip,
}

/// Forward-only typed cursor over one data file.
#[derive(Debug)]
pub struct FileReader {
    path: PathBuf,
    reader: BufReader<File>,
    payload_size: u64,
}

impl FileReader {
    /// Open `path`, verifying its fingerprint unless told to skip.
    pub fn open(path: impl AsRef<Path>, check: FingerprintCheck) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| DatastoreError::io(&path, e))?;
        let total_size = file
            .metadata()
            .map_err(|e| DatastoreError::io(&path, e))?
            .len();
        let mut reader = BufReader::new(file);

        let payload_size = match check {
            FingerprintCheck::Verify => {
                let mut bytes = [0u8; 8];
                reader
                    .read_exact(&mut bytes)
                    .map_err(|_| DatastoreError::fingerprint_mismatch(&path))?;
                if !Fingerprint::from_bytes(bytes).is_compatible() {
                    return Err(DatastoreError::fingerprint_mismatch(&path));
                }
                total_size - size_of::<Fingerprint>() as u64
            }
            FingerprintCheck::Skip => total_size,
        };

        Ok(Self {
            path,
            reader,
            payload_size,
        })
    }

    /// Payload size in bytes, excluding the fingerprint
    pub fn size(&self) -> u64 {
        self.payload_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a little-endian unsigned 64-bit length prefix
    pub fn read_element_count(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        self.reader
            .read_exact(&mut bytes)
            .map_err(|e| DatastoreError::io(&self.path, e))?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read a little-endian unsigned 32-bit value
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.reader
            .read_exact(&mut bytes)
            .map_err(|e| DatastoreError::io(&self.path, e))?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Read a length prefix and skip the vector body, returning the length.
    ///
    /// This is the sizing-pass primitive: it leaves the cursor at the next
    /// prefix without touching the entries.
    pub fn read_vector_size<T: Pod>(&mut self) -> Result<u64> {
        let count = self.read_element_count()?;
        self.skip::<T>(count)?;
        Ok(count)
    }

    /// Advance past `count` entries of `T`
    pub fn skip<T: Pod>(&mut self, count: u64) -> Result<()> {
        let bytes = count * size_of::<T>() as u64;
        self.reader
            .seek(SeekFrom::Current(bytes as i64))
            .map_err(|e| DatastoreError::io(&self.path, e))?;
        Ok(())
    }

    /// Copy `dst.len()` entries into `dst`, failing on a short read
    pub fn read_into<T: Pod>(&mut self, dst: &mut [T]) -> Result<()> {
        // Pod guarantees every bit pattern of T is valid.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(dst.as_mut_ptr().cast::<u8>(), std::mem::size_of_val(dst))
        };
        self.reader
            .read_exact(bytes)
            .map_err(|e| DatastoreError::io(&self.path, e))
    }
}
