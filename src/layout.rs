//! # Slot Layout Computation
//!
//! This module computes the in-memory footprint of every composite value kind:
//! sizes, alignments, and member offsets. The results are declarative offset
//! tables consumed uniformly by the record and variant fields; nothing in the
//! crate relies on the host language's own struct layout for serialized data.
//!
//! ## Footprint rules
//!
//! | Kind        | Slot encoding                                            |
//! |-------------|----------------------------------------------------------|
//! | Leaf scalar | little-endian fixed width, alignment = width             |
//! | Record      | child slots at padded offsets, max child alignment       |
//! | Fixed array | item slots at stride `item_size`                         |
//! | Collection  | 16-byte heap handle `{offset: u64, len: u64}`            |
//! | Nullable    | presence byte, then the padded item slot                 |
//! | Variant     | payload area, then a 4-byte-aligned trailing `u32` tag   |
//! | Bitset      | `ceil(n/64)` little-endian u64 words                     |
//!
//! Every computed size is a multiple of the computed alignment so that arrays
//! of values can be addressed by stride without per-item padding.

/// Heap-handle slot size for variable-length kinds (vector, set, string).
pub const COLLECTION_SLOT_SIZE: usize = 16;
/// Heap-handle slot alignment.
pub const COLLECTION_SLOT_ALIGN: usize = 8;

/// Rounds `n` up to the next multiple of `align`. `align` must be a power of
/// two.
pub fn align_up(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

/// Computed footprint of a record value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    /// Byte offset of each member slot, in declaration order.
    pub offsets: Vec<usize>,
    /// Total padded size; a multiple of `align`.
    pub size: usize,
    /// Maximum member alignment (1 for an empty record).
    pub align: usize,
}

/// Walks the member `(size, align)` pairs in declaration order, inserting
/// padding before each member so that its offset satisfies its alignment.
pub fn record_layout(members: &[(usize, usize)]) -> RecordLayout {
    let mut offsets = Vec::with_capacity(members.len());
    let mut offset = 0usize;
    let mut max_align = 1usize;

    for &(size, align) in members {
        offset = align_up(offset, align);
        offsets.push(offset);
        offset += size;
        max_align = max_align.max(align);
    }

    RecordLayout {
        offsets,
        size: align_up(offset, max_align),
        align: max_align,
    }
}

/// Computed footprint of a variant value.
///
/// The payload area starts at offset 0 and is large enough for the widest
/// arm. The 1-based discriminant is a `u32` stored after the payload at the
/// next 4-byte boundary; tag value 0 is reserved for "no active value". This
/// is the crate's own convention, pinned by tests, and deliberately not
/// derived from any host-language union representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantLayout {
    /// Size of the payload area (maximum arm size).
    pub payload_size: usize,
    /// Byte offset of the `u32` tag.
    pub tag_offset: usize,
    /// Total padded size; a multiple of `align`.
    pub size: usize,
    /// `max(arm alignments, 4)`.
    pub align: usize,
}

pub fn variant_layout(arms: &[(usize, usize)]) -> VariantLayout {
    let payload_size = arms.iter().map(|&(size, _)| size).max().unwrap_or(0);
    let align = arms
        .iter()
        .map(|&(_, align)| align)
        .max()
        .unwrap_or(1)
        .max(4);
    let tag_offset = align_up(payload_size, 4);

    VariantLayout {
        payload_size,
        tag_offset,
        size: align_up(tag_offset + 4, align),
        align,
    }
}

/// Footprint of a nullable value: presence byte at offset 0, item slot at the
/// returned offset. Returns `(item_offset, size, align)`.
pub fn nullable_layout(item_size: usize, item_align: usize) -> (usize, usize, usize) {
    let item_offset = align_up(1, item_align);
    let align = item_align.max(1);
    (item_offset, align_up(item_offset + item_size, align), align)
}

/// Number of u64 words backing an `n`-bit bitset.
pub fn bitset_words(n_bits: usize) -> usize {
    n_bits.div_ceil(64)
}
