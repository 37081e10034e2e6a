//! # Columns
//!
//! A column is a flat, single-typed, append-only storage channel with
//! positional random read access. Fields own their columns; a [`Column`]
//! handle pairs a backend column id with the element codec configuration
//! needed to pack and unpack elements, and performs global-to-cluster index
//! translation through the connected collaborator.
//!
//! ## Column types
//!
//! Encodings are grouped by category, `#[repr(u8)]` for single-byte
//! discriminants:
//!
//! | Category | Types | Packed size |
//! |----------|-------|-------------|
//! | Flags    | Bit | 1 |
//! | Payload  | Byte, Char | 1 |
//! | Signed   | Int8..Int64, SplitInt16..SplitInt64 | 1-8 |
//! | Unsigned | UInt8..UInt64 | 1-8 |
//! | Real     | Real32/64, SplitReal32/64 | 4-8 |
//! | Offsets  | Index32/64, SplitIndex32/64 | 4-8 |
//! | Tags     | Switch | 12 |
//!
//! Split variants negotiate a byte-transposed page layout with the backend;
//! at element granularity they pack identically to their plain counterparts.

pub mod element;

pub use element::ElementClass;

use crate::pages::{ColumnId, FieldId, SharedSink, SharedSource};
use eyre::Result;
use smallvec::SmallVec;

/// Global monotonic entry index.
pub type EntryIndex = u64;

/// An element position expressed relative to a storage cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterIndex {
    pub cluster: u64,
    pub index: u64,
}

impl ClusterIndex {
    /// Sentinel meaning "no such element" (e.g. an absent nullable item).
    pub const INVALID: ClusterIndex = ClusterIndex {
        cluster: u64::MAX,
        index: u64::MAX,
    };

    pub fn new(cluster: u64, index: u64) -> Self {
        Self { cluster, index }
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for ClusterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.cluster, self.index)
    }
}

/// On-disk element encoding of one column.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bit = 0,
    Byte = 1,
    Char = 2,

    Int8 = 10,
    Int16 = 11,
    Int32 = 12,
    Int64 = 13,
    SplitInt16 = 14,
    SplitInt32 = 15,
    SplitInt64 = 16,

    UInt8 = 20,
    UInt16 = 21,
    UInt32 = 22,
    UInt64 = 23,

    Real32 = 30,
    Real64 = 31,
    SplitReal32 = 32,
    SplitReal64 = 33,

    Index32 = 40,
    Index64 = 41,
    SplitIndex32 = 42,
    SplitIndex64 = 43,

    Switch = 50,
}

impl ColumnType {
    /// Size of one packed element in bytes.
    pub fn packed_size(&self) -> usize {
        match self {
            ColumnType::Bit | ColumnType::Byte | ColumnType::Char | ColumnType::Int8
            | ColumnType::UInt8 => 1,
            ColumnType::Int16 | ColumnType::SplitInt16 | ColumnType::UInt16 => 2,
            ColumnType::Int32
            | ColumnType::SplitInt32
            | ColumnType::UInt32
            | ColumnType::Real32
            | ColumnType::SplitReal32
            | ColumnType::Index32
            | ColumnType::SplitIndex32 => 4,
            ColumnType::Int64
            | ColumnType::SplitInt64
            | ColumnType::UInt64
            | ColumnType::Real64
            | ColumnType::SplitReal64
            | ColumnType::Index64
            | ColumnType::SplitIndex64 => 8,
            ColumnType::Switch => element::SWITCH_ELEMENT_SIZE,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(
            self,
            ColumnType::SplitInt16
                | ColumnType::SplitInt32
                | ColumnType::SplitInt64
                | ColumnType::SplitReal32
                | ColumnType::SplitReal64
                | ColumnType::SplitIndex32
                | ColumnType::SplitIndex64
        )
    }

    /// The plain counterpart of a split encoding; identity otherwise.
    pub fn plain(&self) -> ColumnType {
        match self {
            ColumnType::SplitInt16 => ColumnType::Int16,
            ColumnType::SplitInt32 => ColumnType::Int32,
            ColumnType::SplitInt64 => ColumnType::Int64,
            ColumnType::SplitReal32 => ColumnType::Real32,
            ColumnType::SplitReal64 => ColumnType::Real64,
            ColumnType::SplitIndex32 => ColumnType::Index32,
            ColumnType::SplitIndex64 => ColumnType::Index64,
            other => *other,
        }
    }

    /// Whether this encoding carries cluster-size counters (offset columns).
    pub fn is_index(&self) -> bool {
        matches!(
            self,
            ColumnType::Index32
                | ColumnType::Index64
                | ColumnType::SplitIndex32
                | ColumnType::SplitIndex64
        )
    }
}

enum Backend {
    Sink(SharedSink),
    Source(SharedSource),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sink(_) => write!(f, "Sink"),
            Backend::Source(_) => write!(f, "Source"),
        }
    }
}

type PackedBuf = SmallVec<[u8; element::SWITCH_ELEMENT_SIZE]>;

/// A connected handle over one physical column.
///
/// Created only during field connect; a column belongs to exactly one of a
/// sink or a source for its whole lifetime. Write calls on a source-connected
/// column (and vice versa) are programmer errors and fail loudly.
#[derive(Debug)]
pub struct Column {
    ty: ColumnType,
    class: ElementClass,
    /// Width of the in-memory slot this column packs from / unpacks into.
    mem_len: usize,
    index: u32,
    id: ColumnId,
    backend: Backend,
    n_appended: u64,
}

impl Column {
    pub fn connect_sink(
        field: FieldId,
        index: u32,
        ty: ColumnType,
        class: ElementClass,
        mem_len: usize,
        first_entry: EntryIndex,
        sink: &SharedSink,
    ) -> Result<Column> {
        let id = sink.lock().create_column(field, index, ty, first_entry)?;
        Ok(Column {
            ty,
            class,
            mem_len,
            index,
            id,
            backend: Backend::Sink(sink.clone()),
            n_appended: 0,
        })
    }

    pub fn connect_source(
        field: FieldId,
        index: u32,
        ty: ColumnType,
        class: ElementClass,
        mem_len: usize,
        source: &SharedSource,
    ) -> Result<Column> {
        let id = source.lock().open_column(field, index, ty)?;
        Ok(Column {
            ty,
            class,
            mem_len,
            index,
            id,
            backend: Backend::Source(source.clone()),
            n_appended: 0,
        })
    }

    pub fn ty(&self) -> ColumnType {
        self.ty
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn packed_size(&self) -> usize {
        self.ty.packed_size()
    }

    fn sink(&self) -> Result<&SharedSink> {
        match &self.backend {
            Backend::Sink(sink) => Ok(sink),
            Backend::Source(_) => eyre::bail!("column {} is not connected to a sink", self.id),
        }
    }

    fn source(&self) -> Result<&SharedSource> {
        match &self.backend {
            Backend::Source(source) => Ok(source),
            Backend::Sink(_) => eyre::bail!("column {} is not connected to a source", self.id),
        }
    }

    /// Packs one in-memory slot and appends it. Returns the packed size.
    pub fn append_slot(&mut self, slot: &[u8]) -> Result<usize> {
        debug_assert_eq!(slot.len(), self.mem_len);
        let mut packed: PackedBuf = smallvec::smallvec![0u8; self.ty.packed_size()];
        element::pack(self.ty, self.class, slot, &mut packed)?;
        self.sink()?.lock().append(self.id, &packed)?;
        self.n_appended += 1;
        Ok(packed.len())
    }

    /// Appends a cluster-size counter (offset column element).
    pub fn append_index(&mut self, value: u64) -> Result<usize> {
        let slot = value.to_le_bytes();
        let mut packed: PackedBuf = smallvec::smallvec![0u8; self.ty.packed_size()];
        element::pack(self.ty, ElementClass::Index, &slot, &mut packed)?;
        self.sink()?.lock().append(self.id, &packed)?;
        self.n_appended += 1;
        Ok(packed.len())
    }

    /// Appends a switch element for a variant tag column.
    pub fn append_switch(&mut self, item_index: u64, tag: u32) -> Result<usize> {
        let packed = element::pack_switch(item_index, tag);
        self.sink()?.lock().append(self.id, &packed)?;
        self.n_appended += 1;
        Ok(packed.len())
    }

    /// Number of elements appended through this handle.
    pub fn n_appended(&self) -> u64 {
        self.n_appended
    }

    /// Reads one element into an in-memory slot, width-adapting if needed.
    pub fn read_slot(&self, global: u64, slot: &mut [u8]) -> Result<()> {
        debug_assert_eq!(slot.len(), self.mem_len);
        let mut packed: PackedBuf = smallvec::smallvec![0u8; self.ty.packed_size()];
        self.source()?.lock().read(self.id, global, &mut packed)?;
        element::unpack(self.ty, self.class, &packed, slot)
    }

    pub fn read_slot_at(&self, at: ClusterIndex, slot: &mut [u8]) -> Result<()> {
        let global = self.globalize(at)?;
        self.read_slot(global, slot)
    }

    /// Reads an offset-column element as a cluster-size counter.
    pub fn read_index(&self, global: u64) -> Result<u64> {
        let mut slot = [0u8; 8];
        let mut packed: PackedBuf = smallvec::smallvec![0u8; self.ty.packed_size()];
        self.source()?.lock().read(self.id, global, &mut packed)?;
        element::unpack(self.ty, ElementClass::Index, &packed, &mut slot)?;
        Ok(u64::from_le_bytes(slot))
    }

    pub fn read_switch(&self, global: u64) -> Result<(u64, u32)> {
        let mut packed = [0u8; element::SWITCH_ELEMENT_SIZE];
        self.source()?.lock().read(self.id, global, &mut packed)?;
        element::unpack_switch(&packed)
    }

    /// Vectorized read of `count` packed elements starting at `first`.
    /// Returns the number of elements produced.
    pub fn read_range_packed(
        &self,
        first: ClusterIndex,
        count: u64,
        out: &mut [u8],
    ) -> Result<u64> {
        self.source()?.lock().read_range(self.id, first, count, out)
    }

    pub fn n_elements(&self) -> Result<u64> {
        self.source()?.lock().n_elements(self.id)
    }

    pub fn locate(&self, global: u64) -> Result<ClusterIndex> {
        self.source()?.lock().locate(self.id, global)
    }

    pub fn globalize(&self, at: ClusterIndex) -> Result<u64> {
        self.source()?.lock().globalize(self.id, at)
    }

    /// Start position and item count of the collection stored at `global`.
    /// Only meaningful on offset columns.
    pub fn collection_info(&self, global: u64) -> Result<(ClusterIndex, u64)> {
        self.source()?.lock().collection_info(self.id, global)
    }

    pub fn collection_info_at(&self, at: ClusterIndex) -> Result<(ClusterIndex, u64)> {
        let global = self.globalize(at)?;
        self.collection_info(global)
    }
}
