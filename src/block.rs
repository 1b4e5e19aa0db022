//! Block descriptors: one typed run of entries inside the shared region

use std::mem::{align_of, size_of};

/// Descriptor of one contiguous run of equally-typed entries.
///
/// Stored bitwise inside the region prefix, so the field order and widths
/// are ABI. A zero-entry block is legal; it still owns two canaries and
/// possibly alignment padding inside the region.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Block {
    /// Number of entries in the block
    pub num_entries: u64,
    /// Total payload bytes, `num_entries * entry_size`
    pub byte_size: u64,
    /// Size of one entry in bytes
    pub entry_size: u32,
    /// Alignment requirement of one entry, power of two
    pub entry_align: u32,
}

/// Describe a run of `num_entries` values of type `T`
pub fn make_block<T>(num_entries: u64) -> Block {
    Block {
        num_entries,
        byte_size: num_entries * size_of::<T>() as u64,
        entry_size: size_of::<T>() as u32,
        entry_align: align_of::<T>() as u32,
    }
}
