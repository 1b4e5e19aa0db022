//! Error types for the datastore

use std::path::PathBuf;

use crate::layout::BlockId;

/// Result type alias for datastore operations
pub type Result<T> = std::result::Result<T, DatastoreError>;

/// Which canary of a block failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanarySide {
    Start,
    End,
}

impl std::fmt::Display for CanarySide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanarySide::Start => f.write_str("start"),
            CanarySide::End => f.write_str("end"),
        }
    }
}

/// Fatal conditions of a publish run
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    /// Input file is missing its fingerprint or carries an incompatible one
    #[error("fingerprint mismatch: {} is not a compatible data file", .path.display())]
    FingerprintMismatch { path: PathBuf },

    /// Unreadable file, short read, or any other I/O failure
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An input declares more parallel metrics than the layout carries
    #[error("only {max} metrics are supported at the same time, found {found}")]
    TooManyMetrics { found: u64, max: usize },

    /// Turns-vs-graph connectivity mismatch between two input files
    #[error(
        "connectivity checksum {rhs} in {} does not equal checksum {lhs} in {}",
        .rhs_path.display(),
        .lhs_path.display()
    )]
    ChecksumMismatch {
        lhs_path: PathBuf,
        lhs: u32,
        rhs_path: PathBuf,
        rhs: u32,
    },

    /// A block canary does not match the expected tag
    #[error("{side} canary of block {block:?} corrupted")]
    CanaryCorrupt { block: BlockId, side: CanarySide },

    /// The OS refused to create or size a shared memory segment
    #[error("failed to allocate shared memory region of {bytes} bytes: {message}")]
    RegionAllocationFailed { bytes: u64, message: String },

    /// Bounded wait on the monitor mutex timed out
    #[error("could not acquire region lock after {after_seconds} seconds")]
    MonitorStuck { after_seconds: u64 },

    /// Named shared memory region does not exist
    #[error("shared memory region not found: {name}")]
    RegionAbsent { name: String },

    /// Failure inside the interprocess lock or event layer
    #[error("monitor synchronization error: {message}")]
    Monitor { message: String },
}

impl DatastoreError {
    /// I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn fingerprint_mismatch(path: impl Into<PathBuf>) -> Self {
        Self::FingerprintMismatch { path: path.into() }
    }

    pub fn region_absent(name: impl Into<String>) -> Self {
        Self::RegionAbsent { name: name.into() }
    }

    /// Wrap an opaque error from the interprocess lock layer
    pub fn monitor(message: impl std::fmt::Display) -> Self {
        Self::Monitor {
            message: message.to_string(),
        }
    }

    pub fn allocation_failed(bytes: u64, message: impl std::fmt::Display) -> Self {
        Self::RegionAllocationFailed {
            bytes,
            message: message.to_string(),
        }
    }
}
