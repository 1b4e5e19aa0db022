//! # osrm-datastore - Shared Memory Snapshot Publisher
//!
//! Publishes pre-computed routing data files into a process-wide shared
//! memory region so that any number of query processes can map the whole
//! dataset read-only at zero copy cost, while the publisher atomically
//! swaps in new snapshots without disturbing running readers.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       Publisher                           │
//! ├───────────────────────────────────────────────────────────┤
//! │ data files ──▶ Sizer ──▶ DataLayout ──▶ SharedRegion      │
//! │ data files ──▶ Populator ──▶ payload + canaries           │
//! │                    Monitor {region, timestamp} flip       │
//! └───────────────────────────────────────────────────────────┘
//!               │                              │
//!               ▼                              ▼
//! ┌──────────────────────┐       ┌──────────────────────────┐
//! │ REGION_1 / REGION_2  │◀─────▶│  query processes (mmap)  │
//! │  (double buffered)   │       │  wake on monitor event   │
//! └──────────────────────┘       └──────────────────────────┘
//! ```
//!
//! Every published region starts with a bitwise copy of [`DataLayout`];
//! from that prefix a client recomputes the offset of each typed block.
//! Blocks are bracketed by canaries so stray writes and publisher/client
//! enumeration drift are caught at map time rather than during a query.

pub mod block;
pub mod error;
pub mod io;
pub mod layout;
pub mod monitor;
pub mod populator;
pub mod publisher;
pub mod region;
pub mod sizer;
pub mod storage_config;
pub mod types;
pub mod vector_view;

pub use block::{make_block, Block};
pub use error::{CanarySide, DatastoreError, Result};
pub use io::{FileReader, Fingerprint, FingerprintCheck};
pub use layout::{BlockId, DataLayout, CANARY, MAX_METRICS, NUM_BLOCKS};
pub use monitor::{Monitor, MonitorGuard, RegionStamp};
pub use publisher::Publisher;
pub use region::{RegionId, SharedRegion};
pub use storage_config::{FileKind, StorageConfig};
pub use vector_view::{VectorView, VectorViewMut};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
