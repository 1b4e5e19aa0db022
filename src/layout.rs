//! Region layout: the fixed block enumeration and its offset arithmetic
//!
//! The layout is a plain-old-data table of [`Block`] descriptors, one per
//! [`BlockId`]. A bitwise copy of it prefixes every published region, and
//! clients compiled against the same enumeration recompute identical
//! offsets from it. The enumeration order *is* the physical order of the
//! payload, so reordering variants is an ABI break.
//!
//! Every block is bracketed by a 4-byte [`CANARY`]. The publisher stamps
//! both sides while writing; readers verify both sides and fail with a
//! block-identified error on mismatch.

use std::mem::size_of;
use std::ptr;

use crate::block::Block;
use crate::error::{CanarySide, DatastoreError, Result};
use crate::types::Pod;
use crate::vector_view::{VectorView, VectorViewMut};

/// Tag stamped before and after every block
pub const CANARY: [u8; 4] = *b"ORSM";

/// Number of parallel metric arrays carried for both the contraction
/// hierarchy edge filters and the partition cell metrics
pub const MAX_METRICS: usize = 8;

/// Identifier of one block inside the shared region.
///
/// The declaration order defines the physical order of the payload and is
/// shared ABI between publisher and clients.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockId {
    NameCharData = 0,
    EdgeBasedNodeData,
    AnnotationData,
    ChGraphNodeList,
    ChGraphEdgeList,
    ChEdgeFilter0,
    ChEdgeFilter1,
    ChEdgeFilter2,
    ChEdgeFilter3,
    ChEdgeFilter4,
    ChEdgeFilter5,
    ChEdgeFilter6,
    ChEdgeFilter7,
    CoordinateList,
    OsmNodeIdList,
    TurnInstruction,
    EntryClassId,
    RSearchTree,
    RSearchTreeLevels,
    GeometriesIndex,
    GeometriesNodeList,
    GeometriesFwdWeightList,
    GeometriesRevWeightList,
    GeometriesFwdDurationList,
    GeometriesRevDurationList,
    GeometriesFwdDatasourcesList,
    GeometriesRevDatasourcesList,
    ChGraphChecksum,
    Timestamp,
    FileIndexPath,
    DatasourcesNames,
    Properties,
    BearingClassId,
    BearingOffsets,
    BearingBlocks,
    BearingValues,
    EntryClass,
    LaneDataId,
    PreTurnBearing,
    PostTurnBearing,
    TurnLaneData,
    LaneDescriptionOffsets,
    LaneDescriptionMasks,
    TurnWeightPenalties,
    TurnDurationPenalties,
    MldLevelData,
    MldPartition,
    MldCellToChildren,
    MldCellWeights0,
    MldCellWeights1,
    MldCellWeights2,
    MldCellWeights3,
    MldCellWeights4,
    MldCellWeights5,
    MldCellWeights6,
    MldCellWeights7,
    MldCellDurations0,
    MldCellDurations1,
    MldCellDurations2,
    MldCellDurations3,
    MldCellDurations4,
    MldCellDurations5,
    MldCellDurations6,
    MldCellDurations7,
    MldCellSourceBoundary,
    MldCellDestinationBoundary,
    MldCells,
    MldCellLevelOffsets,
    MldGraphNodeList,
    MldGraphEdgeList,
    MldGraphNodeToOffset,
    ManeuverOverrides,
    ManeuverOverrideNodeSequences,
}

/// Number of blocks in the region
pub const NUM_BLOCKS: usize = 73;

impl BlockId {
    /// All blocks in physical order
    pub const ALL: [BlockId; NUM_BLOCKS] = [
        BlockId::NameCharData,
        BlockId::EdgeBasedNodeData,
        BlockId::AnnotationData,
        BlockId::ChGraphNodeList,
        BlockId::ChGraphEdgeList,
        BlockId::ChEdgeFilter0,
        BlockId::ChEdgeFilter1,
        BlockId::ChEdgeFilter2,
        BlockId::ChEdgeFilter3,
        BlockId::ChEdgeFilter4,
        BlockId::ChEdgeFilter5,
        BlockId::ChEdgeFilter6,
        BlockId::ChEdgeFilter7,
        BlockId::CoordinateList,
        BlockId::OsmNodeIdList,
        BlockId::TurnInstruction,
        BlockId::EntryClassId,
        BlockId::RSearchTree,
        BlockId::RSearchTreeLevels,
        BlockId::GeometriesIndex,
        BlockId::GeometriesNodeList,
        BlockId::GeometriesFwdWeightList,
        BlockId::GeometriesRevWeightList,
        BlockId::GeometriesFwdDurationList,
        BlockId::GeometriesRevDurationList,
        BlockId::GeometriesFwdDatasourcesList,
        BlockId::GeometriesRevDatasourcesList,
        BlockId::ChGraphChecksum,
        BlockId::Timestamp,
        BlockId::FileIndexPath,
        BlockId::DatasourcesNames,
        BlockId::Properties,
        BlockId::BearingClassId,
        BlockId::BearingOffsets,
        BlockId::BearingBlocks,
        BlockId::BearingValues,
        BlockId::EntryClass,
        BlockId::LaneDataId,
        BlockId::PreTurnBearing,
        BlockId::PostTurnBearing,
        BlockId::TurnLaneData,
        BlockId::LaneDescriptionOffsets,
        BlockId::LaneDescriptionMasks,
        BlockId::TurnWeightPenalties,
        BlockId::TurnDurationPenalties,
        BlockId::MldLevelData,
        BlockId::MldPartition,
        BlockId::MldCellToChildren,
        BlockId::MldCellWeights0,
        BlockId::MldCellWeights1,
        BlockId::MldCellWeights2,
        BlockId::MldCellWeights3,
        BlockId::MldCellWeights4,
        BlockId::MldCellWeights5,
        BlockId::MldCellWeights6,
        BlockId::MldCellWeights7,
        BlockId::MldCellDurations0,
        BlockId::MldCellDurations1,
        BlockId::MldCellDurations2,
        BlockId::MldCellDurations3,
        BlockId::MldCellDurations4,
        BlockId::MldCellDurations5,
        BlockId::MldCellDurations6,
        BlockId::MldCellDurations7,
        BlockId::MldCellSourceBoundary,
        BlockId::MldCellDestinationBoundary,
        BlockId::MldCells,
        BlockId::MldCellLevelOffsets,
        BlockId::MldGraphNodeList,
        BlockId::MldGraphEdgeList,
        BlockId::MldGraphNodeToOffset,
        BlockId::ManeuverOverrides,
        BlockId::ManeuverOverrideNodeSequences,
    ];

    /// Position of this block in the physical order
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<BlockId> {
        BlockId::ALL.get(index).copied()
    }

    /// Edge filter block of metric `index`, `index < MAX_METRICS`
    pub fn ch_edge_filter(index: usize) -> BlockId {
        debug_assert!(index < MAX_METRICS);
        BlockId::ALL[BlockId::ChEdgeFilter0.index() + index]
    }

    /// Cell weight block of metric `index`, `index < MAX_METRICS`
    pub fn mld_cell_weights(index: usize) -> BlockId {
        debug_assert!(index < MAX_METRICS);
        BlockId::ALL[BlockId::MldCellWeights0.index() + index]
    }

    /// Cell duration block of metric `index`, `index < MAX_METRICS`
    pub fn mld_cell_durations(index: usize) -> BlockId {
        debug_assert!(index < MAX_METRICS);
        BlockId::ALL[BlockId::MldCellDurations0.index() + index]
    }
}

#[inline]
fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// Table of block descriptors, bitwise-copied to byte 0 of every region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLayout {
    blocks: [Block; NUM_BLOCKS],
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLayout {
    /// Empty layout; every block must be set before sizing queries
    pub fn new() -> Self {
        Self {
            blocks: [Block::default(); NUM_BLOCKS],
        }
    }

    /// Record the descriptor for `id`
    pub fn set_block(&mut self, id: BlockId, block: Block) {
        self.blocks[id.index()] = block;
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Number of entries in block `id`
    #[inline]
    pub fn entries(&self, id: BlockId) -> u64 {
        self.blocks[id.index()].num_entries
    }

    /// Payload bytes of block `id`
    #[inline]
    pub fn block_size(&self, id: BlockId) -> u64 {
        self.blocks[id.index()].byte_size
    }

    /// Upper bound on the payload area size.
    ///
    /// Exact padding depends on rounding against the base pointer, which is
    /// unknown until the segment exists, so allocation budgets a full
    /// alignment per block instead. Offsets are never derived from this;
    /// they replay the rounding in [`DataLayout::aligned_offset`].
    pub fn size(&self) -> u64 {
        self.blocks
            .iter()
            .map(|block| {
                debug_assert!(block.entry_align > 0, "block was never set");
                2 * CANARY.len() as u64 + block.byte_size + u64::from(block.entry_align)
            })
            .sum()
    }

    /// Byte offset of the payload of `id` relative to the payload base.
    ///
    /// Replays canary/padding/payload advances for every earlier block, so
    /// the result is exact for any base aligned to the largest entry
    /// alignment (mapped segments are page aligned).
    pub fn aligned_offset(&self, id: BlockId) -> usize {
        let mut offset = 0usize;
        for block in &self.blocks[..id.index()] {
            offset += CANARY.len();
            offset = align_up(offset, block.entry_align as usize);
            offset += block.byte_size as usize;
            offset += CANARY.len();
        }
        let block = &self.blocks[id.index()];
        offset += CANARY.len();
        align_up(offset, block.entry_align as usize)
    }

    /// Offset one past the end canary of the last block
    pub fn end_of_blocks(&self) -> usize {
        let last = BlockId::ALL[NUM_BLOCKS - 1];
        self.aligned_offset(last) + self.block_size(last) as usize + CANARY.len()
    }

    /// Payload pointer of `id`, stamping both canaries.
    ///
    /// # Safety
    ///
    /// `base` must point at a writable payload area of at least
    /// [`DataLayout::size`] bytes, aligned to the largest entry alignment,
    /// and every block of the layout must have been set.
    pub unsafe fn write_block_ptr<T: Pod>(&self, base: *mut u8, id: BlockId) -> *mut T {
        let offset = self.aligned_offset(id);
        let payload = base.add(offset);
        let byte_size = self.block_size(id) as usize;
        ptr::copy_nonoverlapping(CANARY.as_ptr(), payload.sub(CANARY.len()), CANARY.len());
        ptr::copy_nonoverlapping(CANARY.as_ptr(), payload.add(byte_size), CANARY.len());
        payload.cast()
    }

    /// Payload pointer of `id`, verifying both canaries.
    ///
    /// # Safety
    ///
    /// `base` must point at a readable payload area laid out by this
    /// layout (same enumeration, same descriptors).
    pub unsafe fn read_block_ptr<T: Pod>(&self, base: *const u8, id: BlockId) -> Result<*const T> {
        self.check_canaries(base, id)?;
        Ok(base.add(self.aligned_offset(id)).cast())
    }

    /// Mutable typed view over the payload of `id`, stamping canaries.
    ///
    /// # Safety
    ///
    /// Same contract as [`DataLayout::write_block_ptr`]; additionally the
    /// caller must not hold another live reference into the same block.
    pub unsafe fn block_view_mut<'a, T: Pod>(
        &self,
        base: *mut u8,
        id: BlockId,
    ) -> VectorViewMut<'a, T> {
        let data = self.write_block_ptr::<T>(base, id);
        VectorViewMut::from_raw_parts(data, self.entries(id) as usize)
    }

    /// Read-only typed view over the payload of `id`, verifying canaries.
    ///
    /// # Safety
    ///
    /// Same contract as [`DataLayout::read_block_ptr`].
    pub unsafe fn block_view<'a, T: Pod>(
        &self,
        base: *const u8,
        id: BlockId,
    ) -> Result<VectorView<'a, T>> {
        let data = self.read_block_ptr::<T>(base, id)?;
        Ok(VectorView::from_raw_parts(data, self.entries(id) as usize))
    }

    fn check_canaries(&self, base: *const u8, id: BlockId) -> Result<()> {
        let offset = self.aligned_offset(id);
        let byte_size = self.block_size(id) as usize;
        let start = unsafe { std::slice::from_raw_parts(base.add(offset - CANARY.len()), CANARY.len()) };
        if start != CANARY {
            return Err(DatastoreError::CanaryCorrupt {
                block: id,
                side: CanarySide::Start,
            });
        }
        let end = unsafe { std::slice::from_raw_parts(base.add(offset + byte_size), CANARY.len()) };
        if end != CANARY {
            return Err(DatastoreError::CanaryCorrupt {
                block: id,
                side: CanarySide::End,
            });
        }
        Ok(())
    }

    /// Verify both canaries of every block.
    ///
    /// The publisher runs this against a freshly populated region before
    /// announcing it; clients may run it after mapping.
    ///
    /// # Safety
    ///
    /// `base` must point at a readable payload area laid out by this
    /// layout.
    pub unsafe fn verify(&self, base: *const u8) -> Result<()> {
        for id in BlockId::ALL {
            self.check_canaries(base, id)?;
        }
        Ok(())
    }

    /// Copy the descriptor table to `dst` bitwise.
    ///
    /// # Safety
    ///
    /// `dst` must be writable for `size_of::<DataLayout>()` bytes.
    pub unsafe fn write_to(&self, dst: *mut u8) {
        ptr::copy_nonoverlapping((self as *const DataLayout).cast::<u8>(), dst, size_of::<DataLayout>());
    }

    /// Read a descriptor table back from `src` bitwise.
    ///
    /// # Safety
    ///
    /// `src` must be readable for `size_of::<DataLayout>()` bytes and hold
    /// a table written by [`DataLayout::write_to`].
    pub unsafe fn read_from(src: *const u8) -> DataLayout {
        ptr::read_unaligned(src.cast::<DataLayout>())
    }
}
