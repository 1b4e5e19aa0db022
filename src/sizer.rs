//! Sizing pass: walk every input once and fill in the block counts
//!
//! The walk order inside each file must match the populating pass exactly,
//! because both passes replay the same sequence of length prefixes and
//! skips. Optional inputs that are absent still set zero-sized blocks for
//! their whole family; the block enumeration is fixed ABI.

use tracing::info;

use crate::block::make_block;
use crate::error::{DatastoreError, Result};
use crate::io::{FileReader, FingerprintCheck};
use crate::layout::{BlockId, DataLayout, MAX_METRICS};
use crate::storage_config::{FileKind, StorageConfig};
use crate::types::{
    BearingClassId, CellData, CellId, ChGraphEdge, ChGraphNode, Coordinate, Datasources,
    DiscreteBearing, EdgeBasedNode, EdgeDuration, EdgeFilterBlock, EdgeWeight, EntryClass,
    LaneDataId, LaneTupleIdPair, LevelData, ManeuverOverride, MldEdgeOffset, MldGraphEdge,
    MldGraphNode, NodeBasedEdgeAnnotation, NodeId, PackedOsmIdsBlock, PackedSegmentBlock,
    PartitionId, ProfileProperties, RTreeNode, RangeTableBlock, TurnBearing, TurnInstruction,
    TurnPenalty,
};

/// Examine all data files and record how many entries of which type each
/// block holds. After this returns, `layout` answers every sizing query.
pub fn populate_layout(config: &StorageConfig, layout: &mut DataLayout) -> Result<()> {
    // The on-disk r-tree is not loaded; only its absolute path is
    // published, NUL terminator included.
    {
        let index_path = std::path::absolute(config.path(FileKind::FileIndex))
            .map_err(|e| DatastoreError::io(config.path(FileKind::FileIndex), e))?;
        let path_len = index_path.as_os_str().len() as u64;
        layout.set_block(BlockId::FileIndexPath, make_block::<u8>(path_len + 1));
    }

    {
        let names_path = config.path(FileKind::Names);
        info!(path = %names_path.display(), "loading names");
        let reader = FileReader::open(&names_path, FingerprintCheck::Verify)?;
        layout.set_block(BlockId::NameCharData, make_block::<u8>(reader.size()));
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::TurnLaneStrings), FingerprintCheck::Verify)?;
        let num_offsets = reader.read_vector_size::<u32>()?;
        let num_masks = reader.read_vector_size::<u16>()?;
        layout.set_block(BlockId::LaneDescriptionOffsets, make_block::<u32>(num_offsets));
        layout.set_block(BlockId::LaneDescriptionMasks, make_block::<u16>(num_masks));
    }

    // All five turn data blocks are parallel arrays over the same edges.
    {
        let mut reader = FileReader::open(config.path(FileKind::Turns), FingerprintCheck::Verify)?;
        let number_of_original_edges = reader.read_element_count()?;
        layout.set_block(
            BlockId::PreTurnBearing,
            make_block::<TurnBearing>(number_of_original_edges),
        );
        layout.set_block(
            BlockId::PostTurnBearing,
            make_block::<TurnBearing>(number_of_original_edges),
        );
        layout.set_block(
            BlockId::TurnInstruction,
            make_block::<TurnInstruction>(number_of_original_edges),
        );
        layout.set_block(
            BlockId::LaneDataId,
            make_block::<LaneDataId>(number_of_original_edges),
        );
        layout.set_block(
            BlockId::EntryClassId,
            make_block::<crate::types::EntryClassId>(number_of_original_edges),
        );
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::EbgNodes), FingerprintCheck::Verify)?;
        let nodes_number = reader.read_element_count()?;
        let annotations_number = reader.read_element_count()?;
        layout.set_block(
            BlockId::EdgeBasedNodeData,
            make_block::<EdgeBasedNode>(nodes_number),
        );
        layout.set_block(
            BlockId::AnnotationData,
            make_block::<NodeBasedEdgeAnnotation>(annotations_number),
        );
    }

    if config.has(FileKind::ChGraph) {
        let mut reader = FileReader::open(config.path(FileKind::ChGraph), FingerprintCheck::Verify)?;
        reader.skip::<u32>(1)?; // checksum
        let num_nodes = reader.read_vector_size::<ChGraphNode>()?;
        let num_edges = reader.read_vector_size::<ChGraphEdge>()?;
        let num_metrics = reader.read_element_count()?;

        if num_metrics as usize > MAX_METRICS {
            return Err(DatastoreError::TooManyMetrics {
                found: num_metrics,
                max: MAX_METRICS,
            });
        }

        layout.set_block(BlockId::ChGraphChecksum, make_block::<u32>(1));
        layout.set_block(BlockId::ChGraphNodeList, make_block::<ChGraphNode>(num_nodes));
        layout.set_block(BlockId::ChGraphEdgeList, make_block::<ChGraphEdge>(num_edges));
        for index in 0..num_metrics as usize {
            layout.set_block(
                BlockId::ch_edge_filter(index),
                make_block::<EdgeFilterBlock>(num_edges),
            );
        }
        for index in num_metrics as usize..MAX_METRICS {
            layout.set_block(BlockId::ch_edge_filter(index), make_block::<EdgeFilterBlock>(0));
        }
    } else {
        layout.set_block(BlockId::ChGraphChecksum, make_block::<u32>(0));
        layout.set_block(BlockId::ChGraphNodeList, make_block::<ChGraphNode>(0));
        layout.set_block(BlockId::ChGraphEdgeList, make_block::<ChGraphEdge>(0));
        for index in 0..MAX_METRICS {
            layout.set_block(BlockId::ch_edge_filter(index), make_block::<EdgeFilterBlock>(0));
        }
    }

    {
        let mut reader = FileReader::open(config.path(FileKind::RamIndex), FingerprintCheck::Verify)?;
        let tree_size = reader.read_element_count()?;
        layout.set_block(BlockId::RSearchTree, make_block::<RTreeNode>(tree_size));
        reader.skip::<RTreeNode>(tree_size)?;
        let tree_levels_size = reader.read_element_count()?;
        layout.set_block(BlockId::RSearchTreeLevels, make_block::<u64>(tree_levels_size));
    }

    layout.set_block(BlockId::Properties, make_block::<ProfileProperties>(1));

    {
        let reader = FileReader::open(config.path(FileKind::Timestamp), FingerprintCheck::Verify)?;
        layout.set_block(BlockId::Timestamp, make_block::<u8>(reader.size()));
    }

    {
        let mut reader = FileReader::open(
            config.path(FileKind::TurnWeightPenalties),
            FingerprintCheck::Verify,
        )?;
        let number_of_penalties = reader.read_element_count()?;
        layout.set_block(
            BlockId::TurnWeightPenalties,
            make_block::<TurnPenalty>(number_of_penalties),
        );
    }

    {
        let mut reader = FileReader::open(
            config.path(FileKind::TurnDurationPenalties),
            FingerprintCheck::Verify,
        )?;
        let number_of_penalties = reader.read_element_count()?;
        layout.set_block(
            BlockId::TurnDurationPenalties,
            make_block::<TurnPenalty>(number_of_penalties),
        );
    }

    // Coordinates and packed OSM ids come out of the same file.
    {
        let mut reader = FileReader::open(config.path(FileKind::NbgNodes), FingerprintCheck::Verify)?;
        let coordinate_list_size = reader.read_element_count()?;
        layout.set_block(
            BlockId::CoordinateList,
            make_block::<Coordinate>(coordinate_list_size),
        );
        reader.skip::<Coordinate>(coordinate_list_size)?;
        reader.skip::<u64>(1)?; // packed id count
        let num_id_blocks = reader.read_element_count()?;
        layout.set_block(
            BlockId::OsmNodeIdList,
            make_block::<PackedOsmIdsBlock>(num_id_blocks),
        );
    }

    {
        let mut reader = FileReader::open(config.path(FileKind::Geometry), FingerprintCheck::Verify)?;
        let number_of_geometries_indices = reader.read_vector_size::<u32>()?;
        layout.set_block(
            BlockId::GeometriesIndex,
            make_block::<u32>(number_of_geometries_indices),
        );

        let number_of_compressed_geometries = reader.read_vector_size::<NodeId>()?;
        layout.set_block(
            BlockId::GeometriesNodeList,
            make_block::<NodeId>(number_of_compressed_geometries),
        );

        reader.read_element_count()?; // number of segments
        let number_of_segment_weight_blocks = reader.read_vector_size::<PackedSegmentBlock>()?;

        reader.read_element_count()?; // number of segments
        let number_of_rev_weight_blocks = reader.read_vector_size::<PackedSegmentBlock>()?;
        if number_of_rev_weight_blocks != number_of_segment_weight_blocks {
            return Err(DatastoreError::io(
                config.path(FileKind::Geometry),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "forward and reverse weight block counts differ",
                ),
            ));
        }

        reader.read_element_count()?; // number of segments
        let number_of_fwd_duration_blocks = reader.read_vector_size::<PackedSegmentBlock>()?;

        // Unlike the weight pair, the duration pair carries no equality
        // requirement; each side is sized from its own prefix.
        reader.read_element_count()?; // number of segments
        let number_of_rev_duration_blocks = reader.read_vector_size::<PackedSegmentBlock>()?;

        layout.set_block(
            BlockId::GeometriesFwdWeightList,
            make_block::<PackedSegmentBlock>(number_of_segment_weight_blocks),
        );
        layout.set_block(
            BlockId::GeometriesRevWeightList,
            make_block::<PackedSegmentBlock>(number_of_segment_weight_blocks),
        );
        layout.set_block(
            BlockId::GeometriesFwdDurationList,
            make_block::<PackedSegmentBlock>(number_of_fwd_duration_blocks),
        );
        layout.set_block(
            BlockId::GeometriesRevDurationList,
            make_block::<PackedSegmentBlock>(number_of_rev_duration_blocks),
        );
        layout.set_block(
            BlockId::GeometriesFwdDatasourcesList,
            make_block::<crate::types::DatasourceId>(number_of_compressed_geometries),
        );
        layout.set_block(
            BlockId::GeometriesRevDatasourcesList,
            make_block::<crate::types::DatasourceId>(number_of_compressed_geometries),
        );
    }

    layout.set_block(BlockId::DatasourcesNames, make_block::<Datasources>(1));

    {
        let mut reader = FileReader::open(
            config.path(FileKind::IntersectionClassData),
            FingerprintCheck::Verify,
        )?;
        let num_discrete_bearings = reader.read_vector_size::<DiscreteBearing>()?;
        layout.set_block(
            BlockId::BearingValues,
            make_block::<DiscreteBearing>(num_discrete_bearings),
        );

        let num_bearing_classes = reader.read_vector_size::<BearingClassId>()?;
        layout.set_block(
            BlockId::BearingClassId,
            make_block::<BearingClassId>(num_bearing_classes),
        );

        reader.skip::<u32>(1)?; // sum of range lengths
        let bearing_offsets = reader.read_vector_size::<u32>()?;
        let bearing_blocks = reader.read_vector_size::<RangeTableBlock>()?;
        layout.set_block(BlockId::BearingOffsets, make_block::<u32>(bearing_offsets));
        layout.set_block(
            BlockId::BearingBlocks,
            make_block::<RangeTableBlock>(bearing_blocks),
        );

        let num_entry_classes = reader.read_vector_size::<EntryClass>()?;
        layout.set_block(BlockId::EntryClass, make_block::<EntryClass>(num_entry_classes));
    }

    {
        let mut reader =
            FileReader::open(config.path(FileKind::TurnLaneData), FingerprintCheck::Verify)?;
        let lane_tuple_count = reader.read_element_count()?;
        layout.set_block(
            BlockId::TurnLaneData,
            make_block::<LaneTupleIdPair>(lane_tuple_count),
        );
    }

    {
        let mut reader = FileReader::open(
            config.path(FileKind::ManeuverOverrides),
            FingerprintCheck::Verify,
        )?;
        let number_of_overrides = reader.read_vector_size::<ManeuverOverride>()?;
        layout.set_block(
            BlockId::ManeuverOverrides,
            make_block::<ManeuverOverride>(number_of_overrides),
        );
        let number_of_nodes = reader.read_vector_size::<NodeId>()?;
        layout.set_block(
            BlockId::ManeuverOverrideNodeSequences,
            make_block::<NodeId>(number_of_nodes),
        );
    }

    if config.has(FileKind::Partition) {
        let mut reader = FileReader::open(config.path(FileKind::Partition), FingerprintCheck::Verify)?;
        reader.skip::<LevelData>(1)?;
        layout.set_block(BlockId::MldLevelData, make_block::<LevelData>(1));
        let partition_entries_count = reader.read_vector_size::<PartitionId>()?;
        layout.set_block(
            BlockId::MldPartition,
            make_block::<PartitionId>(partition_entries_count),
        );
        let children_entries_count = reader.read_vector_size::<CellId>()?;
        layout.set_block(
            BlockId::MldCellToChildren,
            make_block::<CellId>(children_entries_count),
        );
    } else {
        layout.set_block(BlockId::MldLevelData, make_block::<LevelData>(0));
        layout.set_block(BlockId::MldPartition, make_block::<PartitionId>(0));
        layout.set_block(BlockId::MldCellToChildren, make_block::<CellId>(0));
    }

    if config.has(FileKind::Cells) {
        let mut reader = FileReader::open(config.path(FileKind::Cells), FingerprintCheck::Verify)?;
        let source_node_count = reader.read_vector_size::<NodeId>()?;
        layout.set_block(
            BlockId::MldCellSourceBoundary,
            make_block::<NodeId>(source_node_count),
        );
        let destination_node_count = reader.read_vector_size::<NodeId>()?;
        layout.set_block(
            BlockId::MldCellDestinationBoundary,
            make_block::<NodeId>(destination_node_count),
        );
        let cell_count = reader.read_vector_size::<CellData>()?;
        layout.set_block(BlockId::MldCells, make_block::<CellData>(cell_count));
        let level_offsets_count = reader.read_vector_size::<u64>()?;
        layout.set_block(
            BlockId::MldCellLevelOffsets,
            make_block::<u64>(level_offsets_count),
        );
    } else {
        layout.set_block(BlockId::MldCellSourceBoundary, make_block::<NodeId>(0));
        layout.set_block(BlockId::MldCellDestinationBoundary, make_block::<NodeId>(0));
        layout.set_block(BlockId::MldCells, make_block::<CellData>(0));
        layout.set_block(BlockId::MldCellLevelOffsets, make_block::<u64>(0));
    }

    if config.has(FileKind::CellMetrics) {
        let mut reader =
            FileReader::open(config.path(FileKind::CellMetrics), FingerprintCheck::Verify)?;
        let num_metrics = reader.read_element_count()?;

        if num_metrics as usize > MAX_METRICS {
            return Err(DatastoreError::TooManyMetrics {
                found: num_metrics,
                max: MAX_METRICS,
            });
        }

        for index in 0..num_metrics as usize {
            let weights_count = reader.read_vector_size::<EdgeWeight>()?;
            layout.set_block(
                BlockId::mld_cell_weights(index),
                make_block::<EdgeWeight>(weights_count),
            );
            let durations_count = reader.read_vector_size::<EdgeDuration>()?;
            layout.set_block(
                BlockId::mld_cell_durations(index),
                make_block::<EdgeDuration>(durations_count),
            );
        }
        for index in num_metrics as usize..MAX_METRICS {
            layout.set_block(BlockId::mld_cell_weights(index), make_block::<EdgeWeight>(0));
            layout.set_block(
                BlockId::mld_cell_durations(index),
                make_block::<EdgeDuration>(0),
            );
        }
    } else {
        for index in 0..MAX_METRICS {
            layout.set_block(BlockId::mld_cell_weights(index), make_block::<EdgeWeight>(0));
            layout.set_block(
                BlockId::mld_cell_durations(index),
                make_block::<EdgeDuration>(0),
            );
        }
    }

    if config.has(FileKind::MldGraph) {
        let mut reader = FileReader::open(config.path(FileKind::MldGraph), FingerprintCheck::Verify)?;
        let num_nodes = reader.read_vector_size::<MldGraphNode>()?;
        let num_edges = reader.read_vector_size::<MldGraphEdge>()?;
        let num_node_offsets = reader.read_vector_size::<MldEdgeOffset>()?;
        layout.set_block(BlockId::MldGraphNodeList, make_block::<MldGraphNode>(num_nodes));
        layout.set_block(BlockId::MldGraphEdgeList, make_block::<MldGraphEdge>(num_edges));
        layout.set_block(
            BlockId::MldGraphNodeToOffset,
            make_block::<MldEdgeOffset>(num_node_offsets),
        );
    } else {
        layout.set_block(BlockId::MldGraphNodeList, make_block::<MldGraphNode>(0));
        layout.set_block(BlockId::MldGraphEdgeList, make_block::<MldGraphEdge>(0));
        layout.set_block(BlockId::MldGraphNodeToOffset, make_block::<MldEdgeOffset>(0));
    }

    Ok(())
}
