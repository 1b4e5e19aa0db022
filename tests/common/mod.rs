//! Shared fixtures: write a tiny but complete dataset to disk
//!
//! The canned vectors below are the source of truth for round-trip
//! assertions; every writer mirrors the exact on-disk format the sizing
//! and populating passes walk.

#![allow(dead_code)]

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::mem::size_of;
use std::path::Path;

use osrm_datastore::io::Fingerprint;
use osrm_datastore::types::*;
use osrm_datastore::{populator, sizer, DataLayout, FileKind, StorageConfig};

/// Connectivity checksum embedded in the turns file
pub const CONNECTIVITY_CHECKSUM: u32 = 0x5EED_1234;
/// Graph checksum stored in the contraction hierarchy file
pub const CH_GRAPH_CHECKSUM: u32 = 0x00C0_FFEE;

pub fn names_payload() -> &'static [u8] {
    b"main streetbroadway5th avenue"
}

pub fn lane_description_offsets() -> Vec<u32> {
    vec![0, 2, 5]
}

pub fn lane_description_masks() -> Vec<u16> {
    vec![1, 2, 4, 8]
}

pub fn pre_turn_bearings() -> Vec<TurnBearing> {
    vec![TurnBearing(10), TurnBearing(45), TurnBearing(90), TurnBearing(135)]
}

pub fn post_turn_bearings() -> Vec<TurnBearing> {
    vec![TurnBearing(12), TurnBearing(50), TurnBearing(95), TurnBearing(140)]
}

pub fn turn_instructions() -> Vec<TurnInstruction> {
    vec![
        TurnInstruction { instruction_type: 1, direction_modifier: 0 },
        TurnInstruction { instruction_type: 2, direction_modifier: 3 },
        TurnInstruction { instruction_type: 1, direction_modifier: 6 },
        TurnInstruction { instruction_type: 4, direction_modifier: 0 },
    ]
}

pub fn lane_data_ids() -> Vec<LaneDataId> {
    vec![0, 1, 0, 2]
}

pub fn entry_class_ids() -> Vec<EntryClassId> {
    vec![0, 1, 1, 0]
}

pub fn edge_based_nodes() -> Vec<EdgeBasedNode> {
    vec![
        EdgeBasedNode { geometry_id: 1, component_id: 0, annotation_id: 0, flags: 0 },
        EdgeBasedNode { geometry_id: 2, component_id: 0, annotation_id: 1, flags: 1 },
        EdgeBasedNode { geometry_id: 3, component_id: 1, annotation_id: 0, flags: 0 },
    ]
}

pub fn annotations() -> Vec<NodeBasedEdgeAnnotation> {
    vec![
        NodeBasedEdgeAnnotation { name_id: 0, lane_description_id: 0, class_data: 1, travel_mode: 1 },
        NodeBasedEdgeAnnotation { name_id: 11, lane_description_id: 1, class_data: 0, travel_mode: 2 },
    ]
}

pub fn ch_nodes() -> Vec<ChGraphNode> {
    vec![
        ChGraphNode { first_edge: 0 },
        ChGraphNode { first_edge: 2 },
        ChGraphNode { first_edge: 4 },
    ]
}

pub fn ch_edges() -> Vec<ChGraphEdge> {
    vec![
        ChGraphEdge { target: 1, turn_id: 0, weight: 100, duration: 90, flags: 0b001 },
        ChGraphEdge { target: 2, turn_id: 1, weight: 250, duration: 210, flags: 0b010 },
        ChGraphEdge { target: 0, turn_id: 2, weight: 40, duration: 35, flags: 0b011 },
        ChGraphEdge { target: 1, turn_id: 3, weight: 700, duration: 650, flags: 0b101 },
    ]
}

pub fn ch_edge_filters() -> Vec<Vec<EdgeFilterBlock>> {
    vec![vec![0b1111, 0, 0, 1], vec![0b1010, 1, 0, 0]]
}

pub fn rtree_nodes() -> Vec<RTreeNode> {
    let mut first = RTreeNode::default();
    first.minimum_bounding_rectangle = Rectangle { min_lon: -100, max_lon: 100, min_lat: -50, max_lat: 50 };
    first.child_count = 2;
    first.children[0] = 1;
    first.children[1] = 2;
    let mut second = RTreeNode::default();
    second.child_count = 1;
    second.children[0] = 3;
    vec![first, second]
}

pub fn rtree_levels() -> Vec<u64> {
    vec![1, 2]
}

pub fn profile_properties() -> ProfileProperties {
    ProfileProperties {
        traffic_signal_penalty: 20,
        u_turn_penalty: 200,
        ..ProfileProperties::default()
    }
}

pub fn timestamp_payload() -> &'static [u8] {
    b"2026-08-02T00:00:00Z"
}

pub fn turn_weight_penalties() -> Vec<TurnPenalty> {
    vec![10, -5, 7]
}

pub fn turn_duration_penalties() -> Vec<TurnPenalty> {
    vec![100, 200, 300]
}

pub fn coordinates() -> Vec<Coordinate> {
    vec![
        Coordinate { lon: 13_400_000, lat: 52_500_000 },
        Coordinate { lon: 13_400_100, lat: 52_500_050 },
        Coordinate { lon: 13_400_200, lat: 52_500_100 },
        Coordinate { lon: 13_400_300, lat: 52_500_150 },
        Coordinate { lon: 13_400_400, lat: 52_500_200 },
    ]
}

pub fn osm_id_blocks() -> Vec<PackedOsmIdsBlock> {
    vec![0x0123_4567_89AB_CDEF, 0x0011_2233_4455_6677]
}

pub fn geometry_indices() -> Vec<u32> {
    vec![0, 2, 4]
}

pub fn geometry_nodes() -> Vec<NodeId> {
    vec![1, 2, 3, 4, 5, 6]
}

pub fn geometry_fwd_weight_blocks() -> Vec<PackedSegmentBlock> {
    vec![0xAAAA, 0xBBBB, 0xCCCC]
}

pub fn geometry_rev_weight_blocks() -> Vec<PackedSegmentBlock> {
    vec![0xDDDD, 0xEEEE, 0xFFFF]
}

pub fn geometry_fwd_duration_blocks() -> Vec<PackedSegmentBlock> {
    vec![0x1111, 0x2222]
}

// Deliberately one block longer than the forward list: only the weight
// pair is required to agree, so the passes must size and copy each
// duration side from its own prefix.
pub fn geometry_rev_duration_blocks() -> Vec<PackedSegmentBlock> {
    vec![0x3333, 0x4444, 0x5555]
}

pub fn geometry_fwd_datasources() -> Vec<DatasourceId> {
    vec![0, 0, 1, 1, 0, 2]
}

pub fn geometry_rev_datasources() -> Vec<DatasourceId> {
    vec![2, 0, 1, 0, 0, 1]
}

pub fn datasources() -> Datasources {
    let mut sources = Datasources::default();
    sources.lengths[0] = 11;
    sources.names[..11].copy_from_slice(b"lua profile");
    sources.lengths[1] = 7;
    sources.names[MAX_DATASOURCE_NAME_LENGTH..MAX_DATASOURCE_NAME_LENGTH + 7]
        .copy_from_slice(b"traffic");
    sources
}

pub fn bearing_values() -> Vec<DiscreteBearing> {
    vec![0, 90, 180, 270]
}

pub fn bearing_class_ids() -> Vec<BearingClassId> {
    vec![0, 1]
}

pub fn bearing_offsets() -> Vec<u32> {
    vec![0, 2]
}

pub fn bearing_blocks() -> Vec<RangeTableBlock> {
    vec![RangeTableBlock { diffs: [1; 16] }]
}

pub fn entry_classes() -> Vec<EntryClass> {
    vec![EntryClass(0b0001), EntryClass(0b0110)]
}

pub fn lane_tuples() -> Vec<LaneTupleIdPair> {
    vec![
        LaneTupleIdPair { lanes_in_turn: 2, first_lane_from_right: 0, lane_description_id: 0 },
        LaneTupleIdPair { lanes_in_turn: 1, first_lane_from_right: 1, lane_description_id: 1 },
    ]
}

pub fn maneuver_overrides() -> Vec<ManeuverOverride> {
    vec![ManeuverOverride {
        node_sequence_offset_begin: 0,
        node_sequence_offset_end: 3,
        instruction_node: 2,
        override_type: 1,
        direction: 4,
        _pad: [0; 2],
    }]
}

pub fn maneuver_nodes() -> Vec<NodeId> {
    vec![1, 2, 3]
}

pub fn level_data() -> LevelData {
    let mut data = LevelData::default();
    data.num_levels = 2;
    data.lidx_to_offset[1] = 8;
    data.lidx_to_mask[0] = 0xFF;
    data.lidx_to_mask[1] = 0xFF00;
    data
}

pub fn partition_ids() -> Vec<PartitionId> {
    vec![0x0100, 0x0101, 0x0201, 0x0200]
}

pub fn cell_children() -> Vec<CellId> {
    vec![0, 2]
}

pub fn cell_source_boundary() -> Vec<NodeId> {
    vec![0, 2]
}

pub fn cell_destination_boundary() -> Vec<NodeId> {
    vec![1]
}

pub fn cells() -> Vec<CellData> {
    vec![
        CellData {
            value_offset: 0,
            source_boundary_offset: 0,
            destination_boundary_offset: 0,
            num_source_nodes: 2,
            num_destination_nodes: 1,
        },
        CellData {
            value_offset: 2,
            source_boundary_offset: 2,
            destination_boundary_offset: 1,
            num_source_nodes: 0,
            num_destination_nodes: 0,
        },
    ]
}

pub fn cell_level_offsets() -> Vec<u64> {
    vec![0, 2]
}

pub fn cell_weights() -> Vec<EdgeWeight> {
    vec![1, 2, 3]
}

pub fn cell_durations() -> Vec<EdgeDuration> {
    vec![4, 5, 6]
}

pub fn mld_nodes() -> Vec<MldGraphNode> {
    vec![
        MldGraphNode { first_edge: 0 },
        MldGraphNode { first_edge: 1 },
        MldGraphNode { first_edge: 2 },
    ]
}

pub fn mld_edges() -> Vec<MldGraphEdge> {
    vec![
        MldGraphEdge { target: 1, turn_id: 0, weight: 120, duration: 110, distance: 900 },
        MldGraphEdge { target: 2, turn_id: 1, weight: 80, duration: 75, distance: 600 },
    ]
}

pub fn mld_node_offsets() -> Vec<MldEdgeOffset> {
    vec![0, 1, 2]
}

fn bytes_of<T: Pod>(value: &T) -> &[u8] {
    unsafe { std::slice::from_raw_parts((value as *const T).cast::<u8>(), size_of::<T>()) }
}

fn entry_bytes<T: Pod>(entries: &[T]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(entries.as_ptr().cast::<u8>(), std::mem::size_of_val(entries)) }
}

fn open_with_fingerprint(path: &Path) -> io::Result<BufWriter<File>> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&Fingerprint::current().to_bytes())?;
    Ok(writer)
}

fn write_count(writer: &mut impl Write, count: u64) -> io::Result<()> {
    writer.write_all(&count.to_le_bytes())
}

fn write_vector<T: Pod>(writer: &mut impl Write, entries: &[T]) -> io::Result<()> {
    write_count(writer, entries.len() as u64)?;
    writer.write_all(entry_bytes(entries))
}

/// Writes the complete canned dataset under one base path.
pub struct DatasetBuilder {
    with_ch: bool,
    with_mld: bool,
    ch_connectivity: u32,
    mld_connectivity: u32,
    ch_metrics: u64,
    cell_metric_count: u64,
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self {
            with_ch: true,
            with_mld: true,
            ch_connectivity: CONNECTIVITY_CHECKSUM,
            mld_connectivity: CONNECTIVITY_CHECKSUM,
            ch_metrics: ch_edge_filters().len() as u64,
            cell_metric_count: 1,
        }
    }

    pub fn without_ch(mut self) -> Self {
        self.with_ch = false;
        self
    }

    pub fn without_mld(mut self) -> Self {
        self.with_mld = false;
        self
    }

    pub fn ch_connectivity(mut self, checksum: u32) -> Self {
        self.ch_connectivity = checksum;
        self
    }

    pub fn mld_connectivity(mut self, checksum: u32) -> Self {
        self.mld_connectivity = checksum;
        self
    }

    /// Declared metric count in the contraction hierarchy file; counts
    /// beyond the canned filters only write the declared number.
    pub fn ch_metrics(mut self, count: u64) -> Self {
        self.ch_metrics = count;
        self
    }

    pub fn cell_metric_count(mut self, count: u64) -> Self {
        self.cell_metric_count = count;
        self
    }

    pub fn write(&self, base: &Path) -> io::Result<StorageConfig> {
        let config = StorageConfig::new(base);

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::Names))?;
            writer.write_all(names_payload())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::TurnLaneStrings))?;
            write_vector(&mut writer, &lane_description_offsets())?;
            write_vector(&mut writer, &lane_description_masks())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::Turns))?;
            write_count(&mut writer, pre_turn_bearings().len() as u64)?;
            write_vector(&mut writer, &pre_turn_bearings())?;
            write_vector(&mut writer, &post_turn_bearings())?;
            write_vector(&mut writer, &turn_instructions())?;
            write_vector(&mut writer, &lane_data_ids())?;
            write_vector(&mut writer, &entry_class_ids())?;
            writer.write_all(&CONNECTIVITY_CHECKSUM.to_le_bytes())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::EbgNodes))?;
            write_count(&mut writer, edge_based_nodes().len() as u64)?;
            write_count(&mut writer, annotations().len() as u64)?;
            writer.write_all(entry_bytes(&edge_based_nodes()))?;
            writer.write_all(entry_bytes(&annotations()))?;
        }

        if self.with_ch {
            let mut writer = open_with_fingerprint(&config.path(FileKind::ChGraph))?;
            writer.write_all(&CH_GRAPH_CHECKSUM.to_le_bytes())?;
            write_vector(&mut writer, &ch_nodes())?;
            write_vector(&mut writer, &ch_edges())?;
            write_count(&mut writer, self.ch_metrics)?;
            let filters = ch_edge_filters();
            for index in 0..self.ch_metrics.min(filters.len() as u64) {
                write_vector(&mut writer, &filters[index as usize])?;
            }
            writer.write_all(&self.ch_connectivity.to_le_bytes())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::RamIndex))?;
            write_vector(&mut writer, &rtree_nodes())?;
            write_vector(&mut writer, &rtree_levels())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::Properties))?;
            writer.write_all(bytes_of(&profile_properties()))?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::Timestamp))?;
            writer.write_all(timestamp_payload())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::TurnWeightPenalties))?;
            write_vector(&mut writer, &turn_weight_penalties())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::TurnDurationPenalties))?;
            write_vector(&mut writer, &turn_duration_penalties())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::NbgNodes))?;
            write_vector(&mut writer, &coordinates())?;
            write_count(&mut writer, coordinates().len() as u64)?;
            write_vector(&mut writer, &osm_id_blocks())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::Geometry))?;
            write_vector(&mut writer, &geometry_indices())?;
            write_vector(&mut writer, &geometry_nodes())?;
            write_count(&mut writer, geometry_nodes().len() as u64)?;
            write_vector(&mut writer, &geometry_fwd_weight_blocks())?;
            write_count(&mut writer, geometry_nodes().len() as u64)?;
            write_vector(&mut writer, &geometry_rev_weight_blocks())?;
            write_count(&mut writer, geometry_nodes().len() as u64)?;
            write_vector(&mut writer, &geometry_fwd_duration_blocks())?;
            write_count(&mut writer, geometry_nodes().len() as u64)?;
            write_vector(&mut writer, &geometry_rev_duration_blocks())?;
            write_vector(&mut writer, &geometry_fwd_datasources())?;
            write_vector(&mut writer, &geometry_rev_datasources())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::DatasourceNames))?;
            writer.write_all(bytes_of(&datasources()))?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::IntersectionClassData))?;
            write_vector(&mut writer, &bearing_values())?;
            write_vector(&mut writer, &bearing_class_ids())?;
            writer.write_all(&(bearing_values().len() as u32).to_le_bytes())?;
            write_vector(&mut writer, &bearing_offsets())?;
            write_vector(&mut writer, &bearing_blocks())?;
            write_vector(&mut writer, &entry_classes())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::TurnLaneData))?;
            write_vector(&mut writer, &lane_tuples())?;
        }

        {
            let mut writer = open_with_fingerprint(&config.path(FileKind::ManeuverOverrides))?;
            write_vector(&mut writer, &maneuver_overrides())?;
            write_vector(&mut writer, &maneuver_nodes())?;
        }

        if self.with_mld {
            {
                let mut writer = open_with_fingerprint(&config.path(FileKind::Partition))?;
                writer.write_all(bytes_of(&level_data()))?;
                write_vector(&mut writer, &partition_ids())?;
                write_vector(&mut writer, &cell_children())?;
            }

            {
                let mut writer = open_with_fingerprint(&config.path(FileKind::Cells))?;
                write_vector(&mut writer, &cell_source_boundary())?;
                write_vector(&mut writer, &cell_destination_boundary())?;
                write_vector(&mut writer, &cells())?;
                write_vector(&mut writer, &cell_level_offsets())?;
            }

            {
                let mut writer = open_with_fingerprint(&config.path(FileKind::CellMetrics))?;
                write_count(&mut writer, self.cell_metric_count)?;
                for _ in 0..self.cell_metric_count.min(osrm_datastore::MAX_METRICS as u64 + 1) {
                    write_vector(&mut writer, &cell_weights())?;
                    write_vector(&mut writer, &cell_durations())?;
                }
            }

            {
                let mut writer = open_with_fingerprint(&config.path(FileKind::MldGraph))?;
                write_vector(&mut writer, &mld_nodes())?;
                write_vector(&mut writer, &mld_edges())?;
                write_vector(&mut writer, &mld_node_offsets())?;
                writer.write_all(&self.mld_connectivity.to_le_bytes())?;
            }
        }

        // Only the path of the on-disk index is published; any content
        // will do.
        std::fs::write(config.path(FileKind::FileIndex), b"leaf nodes stay on disk")?;

        Ok(config)
    }
}

/// Run both passes against a heap buffer, returning the layout and the
/// backing storage (kept alive by the caller; `u64` for alignment).
pub fn size_and_populate(config: &StorageConfig) -> osrm_datastore::Result<(DataLayout, Vec<u64>)> {
    let mut layout = DataLayout::new();
    sizer::populate_layout(config, &mut layout)?;
    let mut buffer = vec![0u64; layout.size() as usize / 8 + 1];
    {
        let payload = unsafe {
            std::slice::from_raw_parts_mut(buffer.as_mut_ptr().cast::<u8>(), buffer.len() * 8)
        };
        populator::populate_data(config, &layout, payload)?;
    }
    Ok((layout, buffer))
}
