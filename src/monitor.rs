//! The monitor: one tiny named cell announcing the live region
//!
//! The cell holds `{region, timestamp}` guarded by a process-shared mutex,
//! plus a broadcast event that wakes every client after a flip. Writing the
//! cell is the single linearization point of publication: clients read it
//! under the mutex, remember the region, release, and map that region.
//!
//! Segment layout, fixed offsets:
//!
//! ```text
//! [0 .. 128)    process-shared mutex state
//! [128 .. 256)  broadcast event state
//! [256 .. )     MonitorCell { region: u32, timestamp: u32 }
//! ```

use std::fs::File;
use std::mem::size_of;
use std::time::Duration;

use memmap2::{MmapMut, MmapOptions};
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use raw_sync::events::{Event, EventImpl, EventInit, EventState};
use raw_sync::locks::{LockGuard, LockImpl, LockInit, Mutex};
use raw_sync::Timeout;

use crate::error::{DatastoreError, Result};
use crate::region::RegionId;

// Generous spans for the pthread-backed primitives; both are far larger
// than any libc's state on supported platforms.
const MUTEX_SPAN: usize = 128;
const EVENT_SPAN: usize = 128;

const SEGMENT_SIZE: usize = MUTEX_SPAN + EVENT_SPAN + size_of::<MonitorCell>();

/// Raw in-segment representation of the announcement
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct MonitorCell {
    region: u32,
    timestamp: u32,
}

/// Snapshot of the announcement, decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionStamp {
    pub region: RegionId,
    pub timestamp: u32,
}

impl RegionStamp {
    pub const INITIAL: RegionStamp = RegionStamp {
        region: RegionId::None,
        timestamp: 0,
    };
}

/// Attached monitor segment.
pub struct Monitor {
    name: String,
    mutex: Box<dyn LockImpl>,
    event: Box<dyn EventImpl>,
    cell: *mut MonitorCell,
    _mmap: MmapMut,
    _file: File,
}

// The raw pointers target process-shared memory guarded by the embedded
// mutex; the struct itself carries no thread affinity.
unsafe impl Send for Monitor {}

impl Monitor {
    /// Attach to the named monitor, creating and initializing it with
    /// `initial` if it does not exist yet.
    pub fn open_or_create(name: &str, initial: RegionStamp) -> Result<Self> {
        match shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o644),
        ) {
            Ok(fd) => Self::initialize(name, File::from(fd), initial),
            Err(nix::errno::Errno::EEXIST) => Self::attach(name),
            Err(errno) => Err(DatastoreError::monitor(format!("{name}: {errno}"))),
        }
    }

    fn initialize(name: &str, file: File, initial: RegionStamp) -> Result<Self> {
        ftruncate(&file, SEGMENT_SIZE as i64)
            .map_err(|errno| DatastoreError::monitor(format!("{name}: {errno}")))?;
        let mut mmap = unsafe { MmapOptions::new().len(SEGMENT_SIZE).map_mut(&file) }
            .map_err(DatastoreError::monitor)?;
        let base = mmap.as_mut_ptr();
        let cell = unsafe { base.add(MUTEX_SPAN + EVENT_SPAN).cast::<MonitorCell>() };

        unsafe {
            cell.write(MonitorCell {
                region: initial.region.to_raw(),
                timestamp: initial.timestamp,
            });
        }
        let (mutex, _) =
            unsafe { Mutex::new(base, cell.cast()) }.map_err(DatastoreError::monitor)?;
        let (event, _) = unsafe { Event::new(base.add(MUTEX_SPAN), false) }
            .map_err(DatastoreError::monitor)?;

        Ok(Self {
            name: name.to_string(),
            mutex,
            event,
            cell,
            _mmap: mmap,
            _file: file,
        })
    }

    fn attach(name: &str) -> Result<Self> {
        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty())
            .map_err(|errno| DatastoreError::monitor(format!("{name}: {errno}")))?;
        let file = File::from(fd);
        let mut mmap = unsafe { MmapOptions::new().len(SEGMENT_SIZE).map_mut(&file) }
            .map_err(DatastoreError::monitor)?;
        let base = mmap.as_mut_ptr();
        let cell = unsafe { base.add(MUTEX_SPAN + EVENT_SPAN).cast::<MonitorCell>() };

        let (mutex, _) =
            unsafe { Mutex::from_existing(base, cell.cast()) }.map_err(DatastoreError::monitor)?;
        let (event, _) = unsafe { Event::from_existing(base.add(MUTEX_SPAN)) }
            .map_err(DatastoreError::monitor)?;

        Ok(Self {
            name: name.to_string(),
            mutex,
            event,
            cell,
            _mmap: mmap,
            _file: file,
        })
    }

    /// Destroy the named monitor segment.
    ///
    /// Used to recover from a mutex abandoned by a dead process; clients
    /// attached to the old segment will not see further notifications.
    pub fn remove(name: &str) -> Result<()> {
        shm_unlink(name).map_err(|errno| DatastoreError::monitor(format!("{name}: {errno}")))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the announcement without taking the mutex.
    ///
    /// Sound only while concurrent writers are excluded some other way;
    /// the publisher holds the datastore file lock, which serializes every
    /// writer of this cell.
    pub fn peek(&self) -> RegionStamp {
        let cell = unsafe { self.cell.read_volatile() };
        RegionStamp {
            region: RegionId::from_raw(cell.region),
            timestamp: cell.timestamp,
        }
    }

    /// Acquire the mutex, waiting forever
    pub fn lock(&self) -> Result<MonitorGuard<'_>> {
        let guard = self.mutex.lock().map_err(DatastoreError::monitor)?;
        Ok(MonitorGuard {
            _guard: guard,
            cell: self.cell,
        })
    }

    /// Acquire the mutex, giving up after `max_wait`
    pub fn lock_timeout(&self, max_wait: Duration) -> Result<MonitorGuard<'_>> {
        let guard = self
            .mutex
            .try_lock(Timeout::Val(max_wait))
            .map_err(|_| DatastoreError::MonitorStuck {
                after_seconds: max_wait.as_secs(),
            })?;
        Ok(MonitorGuard {
            _guard: guard,
            cell: self.cell,
        })
    }

    /// Wake every process blocked in [`Monitor::wait`]
    pub fn notify_all(&self) -> Result<()> {
        self.event
            .set(EventState::Signaled)
            .map_err(DatastoreError::monitor)
    }

    /// Client-side: block until the publisher announces a new region.
    ///
    /// The event is manual-reset; a waiter consumes the wakeup by calling
    /// this again after re-reading the cell.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = match timeout {
            Some(duration) => Timeout::Val(duration),
            None => Timeout::Infinite,
        };
        self.event.wait(timeout).map_err(DatastoreError::monitor)?;
        self.event
            .set(EventState::Clear)
            .map_err(DatastoreError::monitor)
    }
}

/// Exclusive access to the announcement cell, released on drop.
pub struct MonitorGuard<'a> {
    _guard: LockGuard<'a>,
    cell: *mut MonitorCell,
}

impl MonitorGuard<'_> {
    pub fn stamp(&self) -> RegionStamp {
        let cell = unsafe { self.cell.read_volatile() };
        RegionStamp {
            region: RegionId::from_raw(cell.region),
            timestamp: cell.timestamp,
        }
    }

    pub fn set_stamp(&mut self, stamp: RegionStamp) {
        unsafe {
            self.cell.write_volatile(MonitorCell {
                region: stamp.region.to_raw(),
                timestamp: stamp.timestamp,
            });
        }
    }
}
