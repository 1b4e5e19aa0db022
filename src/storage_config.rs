//! Locations of the on-disk inputs and the derived shared object names

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::region::RegionId;

/// One of the on-disk artifacts the publisher consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Names,
    TurnLaneStrings,
    Turns,
    EbgNodes,
    ChGraph,
    RamIndex,
    Properties,
    Timestamp,
    TurnWeightPenalties,
    TurnDurationPenalties,
    NbgNodes,
    Geometry,
    DatasourceNames,
    IntersectionClassData,
    TurnLaneData,
    ManeuverOverrides,
    Partition,
    Cells,
    CellMetrics,
    MldGraph,
    FileIndex,
}

impl FileKind {
    /// Extension appended to the dataset base path
    pub fn suffix(self) -> &'static str {
        match self {
            FileKind::Names => ".osrm.names",
            FileKind::TurnLaneStrings => ".osrm.tls",
            FileKind::Turns => ".osrm.edges",
            FileKind::EbgNodes => ".osrm.ebg_nodes",
            FileKind::ChGraph => ".osrm.hsgr",
            FileKind::RamIndex => ".osrm.ramIndex",
            FileKind::Properties => ".osrm.properties",
            FileKind::Timestamp => ".osrm.timestamp",
            FileKind::TurnWeightPenalties => ".osrm.turn_weight_penalties",
            FileKind::TurnDurationPenalties => ".osrm.turn_duration_penalties",
            FileKind::NbgNodes => ".osrm.nbg_nodes",
            FileKind::Geometry => ".osrm.geometry",
            FileKind::DatasourceNames => ".osrm.datasource_names",
            FileKind::IntersectionClassData => ".osrm.icd",
            FileKind::TurnLaneData => ".osrm.tld",
            FileKind::ManeuverOverrides => ".osrm.maneuver_overrides",
            FileKind::Partition => ".osrm.partition",
            FileKind::Cells => ".osrm.cells",
            FileKind::CellMetrics => ".osrm.cell_metrics",
            FileKind::MldGraph => ".osrm.mldgr",
            FileKind::FileIndex => ".osrm.fileIndex",
        }
    }

    /// Files a publish cannot run without. The contraction hierarchy and
    /// the multi-level partition bundles are each optional as a whole.
    pub fn is_mandatory(self) -> bool {
        !matches!(
            self,
            FileKind::ChGraph
                | FileKind::Partition
                | FileKind::Cells
                | FileKind::CellMetrics
                | FileKind::MldGraph
        )
    }

    pub const ALL: [FileKind; 21] = [
        FileKind::Names,
        FileKind::TurnLaneStrings,
        FileKind::Turns,
        FileKind::EbgNodes,
        FileKind::ChGraph,
        FileKind::RamIndex,
        FileKind::Properties,
        FileKind::Timestamp,
        FileKind::TurnWeightPenalties,
        FileKind::TurnDurationPenalties,
        FileKind::NbgNodes,
        FileKind::Geometry,
        FileKind::DatasourceNames,
        FileKind::IntersectionClassData,
        FileKind::TurnLaneData,
        FileKind::ManeuverOverrides,
        FileKind::Partition,
        FileKind::Cells,
        FileKind::CellMetrics,
        FileKind::MldGraph,
        FileKind::FileIndex,
    ];
}

/// Where a dataset lives on disk and how its shared objects are named.
///
/// `base_path` is the common prefix of all input files, e.g.
/// `/data/germany.osrm`; each [`FileKind`] appends its suffix. The
/// `dataset_name` namespaces every process-wide object so that several
/// datasets can be published side by side on one host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    base_path: PathBuf,
    dataset_name: String,
}

impl StorageConfig {
    /// Default dataset name, matching the well-known object names
    pub const DEFAULT_DATASET: &'static str = "osrm";

    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            dataset_name: Self::DEFAULT_DATASET.to_string(),
        }
    }

    pub fn with_dataset_name(mut self, dataset_name: impl Into<String>) -> Self {
        self.dataset_name = dataset_name.into();
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    /// Path of one input file
    pub fn path(&self, kind: FileKind) -> PathBuf {
        let mut joined = OsString::from(self.base_path.as_os_str());
        joined.push(kind.suffix());
        PathBuf::from(joined)
    }

    /// Whether `kind` is present on disk
    pub fn has(&self, kind: FileKind) -> bool {
        self.path(kind).exists()
    }

    /// Check that every mandatory input exists, reporting the missing ones
    pub fn missing_mandatory_files(&self) -> Vec<PathBuf> {
        FileKind::ALL
            .iter()
            .filter(|kind| kind.is_mandatory() && !self.has(**kind))
            .map(|kind| self.path(*kind))
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.missing_mandatory_files().is_empty()
    }

    /// Shared memory name of a data region slot
    pub fn region_name(&self, region: RegionId) -> String {
        match region {
            RegionId::Region1 => format!("/{}-region-1", self.dataset_name),
            RegionId::Region2 => format!("/{}-region-2", self.dataset_name),
            RegionId::None => format!("/{}-region-none", self.dataset_name),
        }
    }

    /// Shared memory name of the monitor cell
    pub fn monitor_name(&self) -> String {
        format!("/{}-region", self.dataset_name)
    }

    /// Advisory lock serializing publisher invocations
    pub fn lock_file_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("{}-datastore.lock", self.dataset_name))
    }
}
