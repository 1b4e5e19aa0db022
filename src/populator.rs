//! Populating pass: copy every input into its layout-assigned position
//!
//! Re-opens each file independently of the sizing pass and mirrors its
//! read order exactly, so length prefixes and skipped runs line up. Every
//! block is touched through [`DataLayout::block_view_mut`], which stamps
//! both canaries even when the block is empty; absent optional inputs get
//! their canaries stamped explicitly so a verify pass accepts the whole
//! region.
//!
//! While writing turn data the populator collects the connectivity
//! checksum of the turns file and compares it against the one embedded in
//! each graph file. A mismatch aborts the publish before any client could
//! learn about the region.

use std::mem::align_of;

use tracing::info;

use crate::error::{DatastoreError, Result};
use crate::io::{FileReader, FingerprintCheck};
use crate::layout::{BlockId, DataLayout, MAX_METRICS};
use crate::storage_config::{FileKind, StorageConfig};
use crate::types::{
    BearingClassId, CellData, CellId, ChGraphEdge, ChGraphNode, Coordinate, Datasources,
    DatasourceId, DiscreteBearing, EdgeBasedNode, EdgeDuration, EdgeFilterBlock, EdgeWeight,
    EntryClass, EntryClassId, LaneDataId, LaneTupleIdPair, LevelData, ManeuverOverride,
    MldEdgeOffset, MldGraphEdge, MldGraphNode, NodeBasedEdgeAnnotation, NodeId, PackedOsmIdsBlock,
    PackedSegmentBlock, PartitionId, Pod, ProfileProperties, RTreeNode, RangeTableBlock,
    TurnBearing, TurnInstruction, TurnPenalty,
};

/// Read one count-prefixed vector straight into its block.
fn read_vector_into<T: Pod>(
    reader: &mut FileReader,
    layout: &DataLayout,
    base: *mut u8,
    id: BlockId,
) -> Result<()> {
    let count = reader.read_element_count()?;
    let mut entries = unsafe { layout.block_view_mut::<T>(base, id) };
    debug_assert_eq!(count, entries.len() as u64);
    reader.read_into(&mut entries)
}

/// Copy all input payloads into the region payload area.
///
/// `payload` must start right after the layout prefix and span at least
/// [`DataLayout::size`] bytes.
pub fn populate_data(
    config: &StorageConfig,
    layout: &DataLayout,
    payload: &mut [u8],
) -> Result<()> {
    assert!(payload.len() as u64 >= layout.size());
    assert_eq!(payload.as_ptr() as usize % align_of::<u64>(), 0);
    let base = payload.as_mut_ptr();

    let turns_connectivity_checksum: u32;

    // Path of the on-disk r-tree portion, NUL padded to the block end.
    {
        let index_path = std::path::absolute(config.path(FileKind::FileIndex))
            .map_err(|e| DatastoreError::io(config.path(FileKind::FileIndex), e))?;
        let bytes = index_path.as_os_str().as_encoded_bytes();
        let mut entries = unsafe { layout.block_view_mut::<u8>(base, BlockId::FileIndexPath) };
        debug_assert!(entries.len() >= bytes.len());
        entries.fill(0);
        entries[..bytes.len()].copy_from_slice(bytes);
    }

    {
        let mut reader = FileReader::open(config.path(FileKind::Names), FingerprintCheck::Verify)?;
        let mut entries = unsafe { layout.block_view_mut::<u8>(base, BlockId::NameCharData) };
        debug_assert_eq!(reader.size(), entries.len() as u64);
        reader.read_into(&mut entries)?;
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::TurnLaneData), FingerprintCheck::Verify)?;
        read_vector_into::<LaneTupleIdPair>(&mut reader, layout, base, BlockId::TurnLaneData)?;
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::TurnLaneStrings), FingerprintCheck::Verify)?;
        read_vector_into::<u32>(&mut reader, layout, base, BlockId::LaneDescriptionOffsets)?;
        read_vector_into::<u16>(&mut reader, layout, base, BlockId::LaneDescriptionMasks)?;
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::EbgNodes), FingerprintCheck::Verify)?;
        let nodes_number = reader.read_element_count()?;
        let annotations_number = reader.read_element_count()?;
        let mut nodes =
            unsafe { layout.block_view_mut::<EdgeBasedNode>(base, BlockId::EdgeBasedNodeData) };
        debug_assert_eq!(nodes_number, nodes.len() as u64);
        reader.read_into(&mut nodes)?;
        let mut annotations =
            unsafe { layout.block_view_mut::<NodeBasedEdgeAnnotation>(base, BlockId::AnnotationData) };
        debug_assert_eq!(annotations_number, annotations.len() as u64);
        reader.read_into(&mut annotations)?;
    }

    // Turn data: five parallel arrays, then the connectivity checksum that
    // links this file to the query graphs.
    {
        let mut reader = FileReader::open(config.path(FileKind::Turns), FingerprintCheck::Verify)?;
        reader.read_element_count()?; // number of original edges
        read_vector_into::<TurnBearing>(&mut reader, layout, base, BlockId::PreTurnBearing)?;
        read_vector_into::<TurnBearing>(&mut reader, layout, base, BlockId::PostTurnBearing)?;
        read_vector_into::<TurnInstruction>(&mut reader, layout, base, BlockId::TurnInstruction)?;
        read_vector_into::<LaneDataId>(&mut reader, layout, base, BlockId::LaneDataId)?;
        read_vector_into::<EntryClassId>(&mut reader, layout, base, BlockId::EntryClassId)?;
        turns_connectivity_checksum = reader.read_u32()?;
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::Geometry), FingerprintCheck::Verify)?;
        read_vector_into::<u32>(&mut reader, layout, base, BlockId::GeometriesIndex)?;
        read_vector_into::<NodeId>(&mut reader, layout, base, BlockId::GeometriesNodeList)?;
        reader.read_element_count()?; // number of segments
        read_vector_into::<PackedSegmentBlock>(&mut reader, layout, base, BlockId::GeometriesFwdWeightList)?;
        reader.read_element_count()?;
        read_vector_into::<PackedSegmentBlock>(&mut reader, layout, base, BlockId::GeometriesRevWeightList)?;
        reader.read_element_count()?;
        read_vector_into::<PackedSegmentBlock>(&mut reader, layout, base, BlockId::GeometriesFwdDurationList)?;
        reader.read_element_count()?;
        read_vector_into::<PackedSegmentBlock>(&mut reader, layout, base, BlockId::GeometriesRevDurationList)?;
        read_vector_into::<DatasourceId>(&mut reader, layout, base, BlockId::GeometriesFwdDatasourcesList)?;
        read_vector_into::<DatasourceId>(&mut reader, layout, base, BlockId::GeometriesRevDatasourcesList)?;
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::DatasourceNames), FingerprintCheck::Verify)?;
        let mut entries =
            unsafe { layout.block_view_mut::<Datasources>(base, BlockId::DatasourcesNames) };
        reader.read_into(&mut entries)?;
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::NbgNodes), FingerprintCheck::Verify)?;
        read_vector_into::<Coordinate>(&mut reader, layout, base, BlockId::CoordinateList)?;
        reader.read_element_count()?; // number of packed ids
        read_vector_into::<PackedOsmIdsBlock>(&mut reader, layout, base, BlockId::OsmNodeIdList)?;
    }

    {
        let mut reader = FileReader::open(
            config.path(FileKind::TurnWeightPenalties),
            FingerprintCheck::Verify,
        )?;
        read_vector_into::<TurnPenalty>(&mut reader, layout, base, BlockId::TurnWeightPenalties)?;
    }

    {
        let mut reader = FileReader::open(
            config.path(FileKind::TurnDurationPenalties),
            FingerprintCheck::Verify,
        )?;
        read_vector_into::<TurnPenalty>(&mut reader, layout, base, BlockId::TurnDurationPenalties)?;
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::Timestamp), FingerprintCheck::Verify)?;
        let mut entries = unsafe { layout.block_view_mut::<u8>(base, BlockId::Timestamp) };
        debug_assert_eq!(reader.size(), entries.len() as u64);
        reader.read_into(&mut entries)?;
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::RamIndex), FingerprintCheck::Verify)?;
        read_vector_into::<RTreeNode>(&mut reader, layout, base, BlockId::RSearchTree)?;
        read_vector_into::<u64>(&mut reader, layout, base, BlockId::RSearchTreeLevels)?;
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::Properties), FingerprintCheck::Verify)?;
        let mut entries =
            unsafe { layout.block_view_mut::<ProfileProperties>(base, BlockId::Properties) };
        reader.read_into(&mut entries)?;
    }

    {
        let mut reader = FileReader::open(
            config.path(FileKind::IntersectionClassData),
            FingerprintCheck::Verify,
        )?;
        read_vector_into::<DiscreteBearing>(&mut reader, layout, base, BlockId::BearingValues)?;
        read_vector_into::<BearingClassId>(&mut reader, layout, base, BlockId::BearingClassId)?;
        reader.read_u32()?; // sum of range lengths
        read_vector_into::<u32>(&mut reader, layout, base, BlockId::BearingOffsets)?;
        read_vector_into::<RangeTableBlock>(&mut reader, layout, base, BlockId::BearingBlocks)?;
        read_vector_into::<EntryClass>(&mut reader, layout, base, BlockId::EntryClass)?;
    }

    if config.has(FileKind::ChGraph) {
        let path = config.path(FileKind::ChGraph);
        let mut reader = FileReader::open(&path, FingerprintCheck::Verify)?;
        let checksum = reader.read_u32()?;
        let mut checksum_block =
            unsafe { layout.block_view_mut::<u32>(base, BlockId::ChGraphChecksum) };
        checksum_block[0] = checksum;
        read_vector_into::<ChGraphNode>(&mut reader, layout, base, BlockId::ChGraphNodeList)?;
        read_vector_into::<ChGraphEdge>(&mut reader, layout, base, BlockId::ChGraphEdgeList)?;
        let num_metrics = reader.read_element_count()? as usize;
        for index in 0..num_metrics.min(MAX_METRICS) {
            read_vector_into::<EdgeFilterBlock>(&mut reader, layout, base, BlockId::ch_edge_filter(index))?;
        }
        for index in num_metrics..MAX_METRICS {
            unsafe { layout.block_view_mut::<EdgeFilterBlock>(base, BlockId::ch_edge_filter(index)) };
        }
        let graph_connectivity_checksum = reader.read_u32()?;
        if graph_connectivity_checksum != turns_connectivity_checksum {
            return Err(DatastoreError::ChecksumMismatch {
                lhs_path: config.path(FileKind::Turns),
                lhs: turns_connectivity_checksum,
                rhs_path: path,
                rhs: graph_connectivity_checksum,
            });
        }
    } else {
        unsafe {
            layout.block_view_mut::<u32>(base, BlockId::ChGraphChecksum);
            layout.block_view_mut::<ChGraphNode>(base, BlockId::ChGraphNodeList);
            layout.block_view_mut::<ChGraphEdge>(base, BlockId::ChGraphEdgeList);
            for index in 0..MAX_METRICS {
                layout.block_view_mut::<EdgeFilterBlock>(base, BlockId::ch_edge_filter(index));
            }
        }
    }

    if config.has(FileKind::Partition) {
        let mut reader =
            FileReader::open(config.path(FileKind::Partition), FingerprintCheck::Verify)?;
        let mut entries = unsafe { layout.block_view_mut::<LevelData>(base, BlockId::MldLevelData) };
        reader.read_into(&mut entries)?;
        read_vector_into::<PartitionId>(&mut reader, layout, base, BlockId::MldPartition)?;
        read_vector_into::<CellId>(&mut reader, layout, base, BlockId::MldCellToChildren)?;
    } else {
        unsafe {
            layout.block_view_mut::<LevelData>(base, BlockId::MldLevelData);
            layout.block_view_mut::<PartitionId>(base, BlockId::MldPartition);
            layout.block_view_mut::<CellId>(base, BlockId::MldCellToChildren);
        }
    }

    if config.has(FileKind::Cells) {
        let mut reader = FileReader::open(config.path(FileKind::Cells), FingerprintCheck::Verify)?;
        read_vector_into::<NodeId>(&mut reader, layout, base, BlockId::MldCellSourceBoundary)?;
        read_vector_into::<NodeId>(&mut reader, layout, base, BlockId::MldCellDestinationBoundary)?;
        read_vector_into::<CellData>(&mut reader, layout, base, BlockId::MldCells)?;
        read_vector_into::<u64>(&mut reader, layout, base, BlockId::MldCellLevelOffsets)?;
    } else {
        unsafe {
            layout.block_view_mut::<NodeId>(base, BlockId::MldCellSourceBoundary);
            layout.block_view_mut::<NodeId>(base, BlockId::MldCellDestinationBoundary);
            layout.block_view_mut::<CellData>(base, BlockId::MldCells);
            layout.block_view_mut::<u64>(base, BlockId::MldCellLevelOffsets);
        }
    }

    if config.has(FileKind::CellMetrics) {
        let mut reader =
            FileReader::open(config.path(FileKind::CellMetrics), FingerprintCheck::Verify)?;
        let num_metrics = reader.read_element_count()? as usize;
        for index in 0..num_metrics.min(MAX_METRICS) {
            read_vector_into::<EdgeWeight>(&mut reader, layout, base, BlockId::mld_cell_weights(index))?;
            read_vector_into::<EdgeDuration>(&mut reader, layout, base, BlockId::mld_cell_durations(index))?;
        }
        for index in num_metrics..MAX_METRICS {
            unsafe {
                layout.block_view_mut::<EdgeWeight>(base, BlockId::mld_cell_weights(index));
                layout.block_view_mut::<EdgeDuration>(base, BlockId::mld_cell_durations(index));
            }
        }
    } else {
        unsafe {
            for index in 0..MAX_METRICS {
                layout.block_view_mut::<EdgeWeight>(base, BlockId::mld_cell_weights(index));
                layout.block_view_mut::<EdgeDuration>(base, BlockId::mld_cell_durations(index));
            }
        }
    }

    if config.has(FileKind::MldGraph) {
        let path = config.path(FileKind::MldGraph);
        let mut reader = FileReader::open(&path, FingerprintCheck::Verify)?;
        read_vector_into::<MldGraphNode>(&mut reader, layout, base, BlockId::MldGraphNodeList)?;
        read_vector_into::<MldGraphEdge>(&mut reader, layout, base, BlockId::MldGraphEdgeList)?;
        read_vector_into::<MldEdgeOffset>(&mut reader, layout, base, BlockId::MldGraphNodeToOffset)?;
        let graph_connectivity_checksum = reader.read_u32()?;
        if graph_connectivity_checksum != turns_connectivity_checksum {
            return Err(DatastoreError::ChecksumMismatch {
                lhs_path: config.path(FileKind::Turns),
                lhs: turns_connectivity_checksum,
                rhs_path: path,
                rhs: graph_connectivity_checksum,
            });
        }
    } else {
        unsafe {
            layout.block_view_mut::<MldGraphNode>(base, BlockId::MldGraphNodeList);
            layout.block_view_mut::<MldGraphEdge>(base, BlockId::MldGraphEdgeList);
            layout.block_view_mut::<MldEdgeOffset>(base, BlockId::MldGraphNodeToOffset);
        }
    }

    {
        let mut reader = FileReader::open(
            config.path(FileKind::ManeuverOverrides),
            FingerprintCheck::Verify,
        )?;
        read_vector_into::<ManeuverOverride>(&mut reader, layout, base, BlockId::ManeuverOverrides)?;
        read_vector_into::<NodeId>(&mut reader, layout, base, BlockId::ManeuverOverrideNodeSequences)?;
    }

    info!(
        checksum = turns_connectivity_checksum,
        "all data copied into the region"
    );
    Ok(())
}
