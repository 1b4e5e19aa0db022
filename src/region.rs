//! Named shared memory segments and their double-buffer identities
//!
//! Regions are POSIX shared memory objects: created and sized by the
//! publisher, mapped read-only by any number of clients, unlinked once a
//! newer snapshot is live. `shm_unlink` already defers reclamation until
//! the last descriptor closes; [`SharedRegion::wait_for_detach`] tells the
//! publisher when that point is reached. The convention making that work:
//! every client holds a shared `flock` on the segment descriptor for as
//! long as the mapping is alive (see [`SharedRegion::lock_attached`]), so
//! an exclusive `flock` succeeds exactly when the publisher is the last
//! holder.

use std::fs::File;
use std::os::fd::AsRawFd;

use memmap2::{MmapMut, MmapOptions};
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

use crate::error::{DatastoreError, Result};

/// Which of the two double-buffer slots a name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionId {
    /// Sentinel: no snapshot has ever been published
    None,
    Region1,
    Region2,
}

impl RegionId {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionId::None => "REGION_NONE",
            RegionId::Region1 => "REGION_1",
            RegionId::Region2 => "REGION_2",
        }
    }

    /// Raw value stored in the monitor cell
    pub fn to_raw(self) -> u32 {
        match self {
            RegionId::None => 0,
            RegionId::Region1 => 1,
            RegionId::Region2 => 2,
        }
    }

    /// Decode a monitor cell value; unknown values collapse to `None`
    pub fn from_raw(raw: u32) -> RegionId {
        match raw {
            1 => RegionId::Region1,
            2 => RegionId::Region2,
            _ => RegionId::None,
        }
    }

    /// The slot a new snapshot goes into while `self` is live
    pub fn next(self) -> RegionId {
        match self {
            RegionId::Region2 | RegionId::None => RegionId::Region1,
            RegionId::Region1 => RegionId::Region2,
        }
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attached named shared memory segment.
pub struct SharedRegion {
    name: String,
    file: File,
    mmap: MmapMut,
}

impl SharedRegion {
    /// Create a segment of exactly `bytes` bytes.
    ///
    /// Fails if the name already exists; the publisher removes stale
    /// segments before calling this.
    pub fn create(name: &str, bytes: u64) -> Result<Self> {
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o644),
        )
        .map_err(|errno| DatastoreError::allocation_failed(bytes, format!("{name}: {errno}")))?;
        let file = File::from(fd);

        ftruncate(&file, bytes as i64)
            .map_err(|errno| DatastoreError::allocation_failed(bytes, format!("{name}: {errno}")))?;

        let mmap = unsafe { MmapOptions::new().len(bytes as usize).map_mut(&file) }
            .map_err(|e| DatastoreError::allocation_failed(bytes, e))?;

        Ok(Self {
            name: name.to_string(),
            file,
            mmap,
        })
    }

    /// Attach to an existing segment
    pub fn open(name: &str) -> Result<Self> {
        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty())
            .map_err(|_| DatastoreError::region_absent(name))?;
        let file = File::from(fd);
        let bytes = file
            .metadata()
            .map_err(|e| DatastoreError::io(name, e))?
            .len();
        let mmap = unsafe { MmapOptions::new().len(bytes as usize).map_mut(&file) }
            .map_err(|e| DatastoreError::io(name, e))?;

        Ok(Self {
            name: name.to_string(),
            file,
            mmap,
        })
    }

    /// Probe for a segment without keeping it attached
    pub fn exists(name: &str) -> bool {
        match shm_open(name, OFlag::O_RDONLY, Mode::empty()) {
            Ok(fd) => {
                drop(File::from(fd));
                true
            }
            Err(_) => false,
        }
    }

    /// Unlink a segment by name.
    ///
    /// The kernel reclaims the memory only after the last attached process
    /// closes its descriptor; current mappings stay valid.
    pub fn remove(name: &str) -> Result<()> {
        shm_unlink(name).map_err(|_| DatastoreError::region_absent(name))
    }

    /// Block until this process is the only one still holding the segment.
    ///
    /// Clients hold a shared lock on their descriptor (see
    /// [`SharedRegion::lock_attached`]); taking the exclusive lock
    /// therefore returns once every client has detached.
    pub fn wait_for_detach(&self) -> Result<()> {
        loop {
            let rc = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(DatastoreError::io(&self.name, err));
        }
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        Ok(())
    }

    /// Client-side: mark this attachment so the publisher can wait for it.
    ///
    /// Held for the lifetime of the mapping; released automatically when
    /// the region is dropped (closing the descriptor drops the lock).
    pub fn lock_attached(&self) -> Result<()> {
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_SH) };
        if rc != 0 {
            return Err(DatastoreError::io(&self.name, std::io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.mmap.len()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("size", &self.mmap.len())
            .finish()
    }
}

/// Ask the kernel to keep this process's pages resident.
///
/// Best effort; the publisher logs a warning when it fails (e.g. missing
/// CAP_IPC_LOCK or a tight RLIMIT_MEMLOCK).
pub fn lock_process_memory() -> bool {
    #[cfg(target_os = "linux")]
    {
        let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
        rc == 0
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
