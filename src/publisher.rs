//! The publish protocol: size, allocate, populate, flip, retire
//!
//! One publisher invocation is single-threaded; concurrent invocations are
//! serialized by an advisory file lock. The monitor update is the single
//! linearization point: every write to the new region, canaries included,
//! happens before the locked update, and the old region is only marked for
//! removal afterwards, so a client racing the flip still finds a valid
//! snapshot on either side.

use std::fs::OpenOptions;
use std::mem::size_of;
use std::time::Duration;

use nix::fcntl::{Flock, FlockArg};
use tracing::{info, warn};

use crate::error::{DatastoreError, Result};
use crate::layout::DataLayout;
use crate::monitor::{Monitor, RegionStamp};
use crate::region::{lock_process_memory, RegionId, SharedRegion};
use crate::storage_config::StorageConfig;
use crate::{populator, sizer};

/// Publishes a dataset into shared memory and retires the previous
/// snapshot.
pub struct Publisher {
    config: StorageConfig,
}

impl Publisher {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Run one publish cycle.
    ///
    /// `max_wait` bounds the wait for the monitor mutex; `None` waits
    /// forever. On a bounded timeout the monitor is assumed abandoned,
    /// destroyed, and recreated; clients attached to the old monitor will
    /// not be notified and must restart.
    ///
    /// Returns the stamp now visible to clients.
    pub fn run(&self, max_wait: Option<Duration>) -> Result<RegionStamp> {
        if let Some(path) = self.config.missing_mandatory_files().first() {
            return Err(DatastoreError::io(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "mandatory input file missing",
                ),
            ));
        }

        let lock_path = self.config.lock_file_path();
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| DatastoreError::io(&lock_path, e))?;

        let _datastore_lock = match Flock::lock(lock_file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((contended_file, _)) => {
                warn!("data update in progress, waiting until it finishes");
                let lock = Flock::lock(contended_file, FlockArg::LockExclusive)
                    .map_err(|(_, errno)| DatastoreError::io(&lock_path, errno.into()))?;
                warn!("previous data update finished");
                lock
            }
        };

        if !lock_process_memory() {
            warn!("could not lock process pages into RAM");
        }

        // The file lock serializes writers, so the stamp can be read
        // without the monitor mutex.
        let monitor_name = self.config.monitor_name();
        let mut monitor = Monitor::open_or_create(&monitor_name, RegionStamp::INITIAL)?;
        let mut in_use_region = monitor.peek().region;
        let next_timestamp = monitor.peek().timestamp.wrapping_add(1);
        let next_region = in_use_region.next();

        // A prior crashed publish may have left the target slot behind; we
        // wait for detach at the end of every run, so anything here is
        // stale by construction.
        let next_name = self.config.region_name(next_region);
        if SharedRegion::exists(&next_name) {
            warn!(region = %next_region, "old shared memory region still exists, removing");
            SharedRegion::remove(&next_name)?;
        }

        info!(region = %next_region, "loading data");
        let mut layout = DataLayout::new();
        sizer::populate_layout(&self.config, &mut layout)?;

        let region_size = size_of::<DataLayout>() as u64 + layout.size();
        info!(bytes = region_size, "allocating shared memory");
        let mut region = SharedRegion::create(&next_name, region_size)?;

        unsafe { layout.write_to(region.as_mut_ptr()) };
        let payload = &mut region.as_mut_slice()[size_of::<DataLayout>()..];
        populator::populate_data(&self.config, &layout, payload)?;
        unsafe { layout.verify(region.as_ptr().add(size_of::<DataLayout>()))? };

        let next_stamp = RegionStamp {
            region: next_region,
            timestamp: next_timestamp,
        };

        let mut stamped = false;
        let mut reset_monitor = false;
        if let Some(duration) = max_wait {
            match monitor.lock_timeout(duration) {
                Ok(mut guard) => {
                    guard.set_stamp(next_stamp);
                    stamped = true;
                }
                Err(DatastoreError::MonitorStuck { after_seconds }) => {
                    warn!(
                        after_seconds,
                        "could not acquire current region lock, removing locked monitor and \
                         creating a new one; all currently attached processes will not receive \
                         notifications and must be restarted"
                    );
                    reset_monitor = true;
                }
                Err(other) => return Err(other),
            }
        }
        if reset_monitor {
            Monitor::remove(&monitor_name)?;
            in_use_region = RegionId::None;
            monitor = Monitor::open_or_create(&monitor_name, RegionStamp::INITIAL)?;
        }
        if !stamped {
            let mut guard = monitor.lock()?;
            guard.set_stamp(next_stamp);
        }

        info!(
            region = %next_region,
            timestamp = next_timestamp,
            "all data loaded, notifying clients"
        );
        monitor.notify_all()?;

        // Retire the previous snapshot: grab a handle first so we can wait
        // for every client to let go after the unlink.
        if in_use_region != RegionId::None {
            let old_name = self.config.region_name(in_use_region);
            if SharedRegion::exists(&old_name) {
                info!(region = %in_use_region, "marking old shared memory region for removal");
                let old_region = SharedRegion::open(&old_name)?;
                SharedRegion::remove(&old_name)?;
                info!("waiting for clients to detach");
                old_region.wait_for_detach()?;
            }
        }

        info!("all clients switched");
        Ok(next_stamp)
    }
}
