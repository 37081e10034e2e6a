//! # Fields
//!
//! A field translates read and write calls from/to underlying columns
//! to/from in-memory values. It knows a semantic type, owns zero or more
//! sub-fields, owns zero or more backing columns, and knows how to
//! construct, fill, append, and read values of its type in raw slot/heap
//! buffers. Simple types map to a single column; composite types resolve to
//! sub-field trees whose leaves own the columns.
//!
//! ## Kinds
//!
//! The field hierarchy is a closed set of tagged variants:
//!
//! | Kind        | Columns              | Sub-fields      |
//! |-------------|----------------------|-----------------|
//! | Leaf        | 1 scalar             | none            |
//! | String      | offset + char        | none            |
//! | Record      | none                 | members         |
//! | Vector      | offset               | item            |
//! | Proxied/Set | offset               | item            |
//! | Array       | none                 | item            |
//! | Nullable    | mask or offset       | item            |
//! | Variant     | switch               | arms            |
//! | Cardinality | borrowed offset      | none            |
//! | Bitset      | bit                  | none            |
//! | Enum/Atomic | none (item's)        | underlying      |
//!
//! ## Lifecycle
//!
//! ```text
//! [*] --> Unconnected --> ConnectedToSink ----
//!              |      |                      |
//!              |      --> ConnectedToSource ---> [*]
//!              |                             |
//!              -------------------------------
//! ```
//!
//! A field connects to exactly one of a page sink or a page source, exactly
//! once; entering a new session requires a fresh [`Field::clone_renamed`]
//! copy with unconnected columns.

mod connect;
mod io;
mod leaf;
mod proxied;


pub use leaf::LeafKind;
pub use proxied::{CollectionAdapter, IterStrategy, StridedCursor};

use crate::column::{Column, ColumnType};
use crate::layout::{self, COLLECTION_SLOT_ALIGN, COLLECTION_SLOT_SIZE};
use crate::pages::FieldId;
use crate::value::{ValueBuf, ValueMut};
use eyre::Result;
use smallvec::SmallVec;
use tracing::trace;

/// Type-property bitmask values. Traits determine fast paths: a field whose
/// mappable bit is set and which has no read callbacks bypasses composite
/// dispatch entirely.
pub mod traits {
    /// The all-zero slot is a valid default value; default construction is a
    /// plain zero-fill.
    pub const TRIVIALLY_CONSTRUCTIBLE: u32 = 0x01;
    /// The value owns no heap payload; releasing the slot releases
    /// everything.
    pub const TRIVIALLY_DESTRUCTIBLE: u32 = 0x02;
    /// Slot bytes are identical to the packed column element.
    pub const MAPPABLE: u32 = 0x04;
    /// Shorthand for both trivial bits.
    pub const TRIVIAL: u32 = TRIVIALLY_CONSTRUCTIBLE | TRIVIALLY_DESTRUCTIBLE;
}

/// The role of a field in the data model structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    Leaf,
    Record,
    Collection,
}

/// Connection state machine; both connected states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    ConnectedToSink,
    ConnectedToSource,
}

/// On-disk encoding mode of a nullable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullableMode {
    /// Bit mask column plus a default-constructed item for every absent
    /// entry; item storage stays 1:1 with entries.
    Dense,
    /// Offset column; items are stored only for present entries.
    Sparse,
}

/// Per-kind state of a field. Counters named `n_written` are per-cluster
/// running totals, reset by [`Field::commit_cluster`].
#[derive(Debug, Clone)]
pub enum FieldKind {
    Leaf(LeafKind),
    String {
        n_written: u64,
    },
    Record {
        offsets: Vec<usize>,
    },
    Vector {
        n_written: u64,
    },
    Proxied {
        strategy: IterStrategy,
        n_written: u64,
    },
    Set {
        n_written: u64,
    },
    Array {
        len: usize,
    },
    Nullable {
        mode: NullableMode,
        n_written: u64,
        default_item: Option<ValueBuf>,
    },
    Variant {
        tag_offset: usize,
        payload_size: usize,
        n_written: Vec<u64>,
    },
    Cardinality {
        /// Qualified name of the collection field whose offset column backs
        /// the reads.
        of: String,
        wide: bool,
    },
    Bitset {
        n_bits: usize,
    },
    Enum,
    Atomic,
}

/// Post-read hook; invoked after every non-simple read, in registration
/// order, with the freshly populated value.
pub type ReadCallback = Box<dyn Fn(ValueMut<'_>) + Send + Sync>;

/// The column sets a field can be stored as. The first serialization entry
/// is the write default; reading additionally accepts the extra lists.
#[derive(Debug, Clone, Copy)]
pub struct Representations {
    pub serialization: &'static [&'static [ColumnType]],
    pub deserialization_extra: &'static [&'static [ColumnType]],
}

impl Representations {
    pub const NONE: Representations = Representations {
        serialization: &[],
        deserialization_extra: &[],
    };

    pub fn default_types(&self) -> &'static [ColumnType] {
        self.serialization[0]
    }

    /// Whether `types` is acceptable when connecting to a page source.
    pub fn accepts_for_read(&self, types: &[ColumnType]) -> bool {
        self.serialization
            .iter()
            .chain(self.deserialization_extra.iter())
            .any(|list| *list == types)
    }
}

const OFFSET_REPS: Representations = Representations {
    serialization: &[
        &[ColumnType::SplitIndex64],
        &[ColumnType::Index64],
        &[ColumnType::SplitIndex32],
        &[ColumnType::Index32],
    ],
    deserialization_extra: &[],
};

const STRING_REPS: Representations = Representations {
    serialization: &[
        &[ColumnType::SplitIndex64, ColumnType::Char],
        &[ColumnType::Index64, ColumnType::Char],
        &[ColumnType::SplitIndex32, ColumnType::Char],
        &[ColumnType::Index32, ColumnType::Char],
    ],
    deserialization_extra: &[],
};

const NULLABLE_REPS: Representations = Representations {
    serialization: &[
        &[ColumnType::Bit],
        &[ColumnType::SplitIndex64],
        &[ColumnType::Index64],
        &[ColumnType::SplitIndex32],
        &[ColumnType::Index32],
    ],
    deserialization_extra: &[],
};

const NULLABLE_SPARSE_DEFAULT: usize = 1;

const VARIANT_REPS: Representations = Representations {
    serialization: &[&[ColumnType::Switch]],
    deserialization_extra: &[],
};

const BIT_REPS: Representations = Representations {
    serialization: &[&[ColumnType::Bit]],
    deserialization_extra: &[],
};

/// Read-only: never written through, accepts any stored offset encoding.
const CARDINALITY_REPS: Representations = Representations {
    serialization: &[],
    deserialization_extra: &[
        &[ColumnType::SplitIndex64],
        &[ColumnType::Index64],
        &[ColumnType::SplitIndex32],
        &[ColumnType::Index32],
    ],
};

/// A node mapping one semantic type to columns; the central abstraction.
pub struct Field {
    name: String,
    type_name: String,
    type_version: u32,
    structure: Structure,
    kind: FieldKind,
    pub(crate) sub_fields: Vec<Field>,
    pub(crate) columns: SmallVec<[Column; 2]>,
    traits: u32,
    state: ConnectionState,
    on_disk_id: Option<FieldId>,
    on_disk_type_version: Option<u32>,
    repr_chosen: Option<usize>,
    read_callbacks: Vec<ReadCallback>,
    description: String,
    value_size: usize,
    align: usize,
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("structure", &self.structure)
            .field("state", &self.state)
            .field("traits", &self.traits)
            .field("value_size", &self.value_size)
            .field("sub_fields", &self.sub_fields)
            .finish_non_exhaustive()
    }
}

/// Checks a candidate field name: non-empty and free of the qualified-name
/// separator.
pub fn ensure_valid_field_name(name: &str) -> Result<()> {
    eyre::ensure!(!name.is_empty(), "field name cannot be empty");
    eyre::ensure!(
        !name.contains('.'),
        "field name '{}' must not contain '.'",
        name
    );
    Ok(())
}

impl Field {
    fn base(
        name: String,
        type_name: String,
        structure: Structure,
        kind: FieldKind,
        sub_fields: Vec<Field>,
        traits: u32,
        value_size: usize,
        align: usize,
    ) -> Field {
        Field {
            name,
            type_name,
            type_version: 0,
            structure,
            kind,
            sub_fields,
            columns: SmallVec::new(),
            traits,
            state: ConnectionState::Unconnected,
            on_disk_id: None,
            on_disk_type_version: None,
            repr_chosen: None,
            read_callbacks: Vec::new(),
            description: String::new(),
            value_size,
            align,
        }
    }

    /// A scalar field over one column.
    pub fn leaf(name: impl Into<String>, kind: LeafKind) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        Ok(Self::base(
            name,
            kind.type_name().to_string(),
            Structure::Leaf,
            FieldKind::Leaf(kind),
            Vec::new(),
            traits::TRIVIAL | traits::MAPPABLE,
            kind.size(),
            kind.align(),
        ))
    }

    /// Variable-length UTF-8 string: offset column plus char payload column.
    pub fn string(name: impl Into<String>) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        Ok(Self::base(
            name,
            "string".to_string(),
            Structure::Leaf,
            FieldKind::String { n_written: 0 },
            Vec::new(),
            traits::TRIVIALLY_CONSTRUCTIBLE,
            COLLECTION_SLOT_SIZE,
            COLLECTION_SLOT_ALIGN,
        ))
    }

    /// An untyped record: members stored consecutively at padded offsets.
    /// Members are default-constructed, appended, and read in declaration
    /// order (and torn down in the same order).
    pub fn record(
        name: impl Into<String>,
        type_name: impl Into<String>,
        members: Vec<Field>,
    ) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        let layout = layout::record_layout(
            &members
                .iter()
                .map(|m| (m.value_size, m.align))
                .collect::<Vec<_>>(),
        );
        let mut member_traits = traits::TRIVIAL;
        for m in &members {
            member_traits &= m.traits;
        }
        Ok(Self::base(
            name,
            type_name.into(),
            Structure::Record,
            FieldKind::Record {
                offsets: layout.offsets,
            },
            members,
            member_traits & !traits::MAPPABLE,
            layout.size,
            layout.align,
        ))
    }

    /// A variable-length homogeneous collection over one shared item field.
    pub fn vector(name: impl Into<String>, item: Field) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        let type_name = format!("vec<{}>", item.type_name);
        Ok(Self::base(
            name,
            type_name,
            Structure::Collection,
            FieldKind::Vector { n_written: 0 },
            vec![item.renamed_item()],
            traits::TRIVIALLY_CONSTRUCTIBLE,
            COLLECTION_SLOT_SIZE,
            COLLECTION_SLOT_ALIGN,
        ))
    }

    /// A set: contiguous collection with set-of-items semantics at the
    /// literal level.
    pub fn set(name: impl Into<String>, item: Field) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        let type_name = format!("set<{}>", item.type_name);
        Ok(Self::base(
            name,
            type_name,
            Structure::Collection,
            FieldKind::Set { n_written: 0 },
            vec![item.renamed_item()],
            traits::TRIVIALLY_CONSTRUCTIBLE,
            COLLECTION_SLOT_SIZE,
            COLLECTION_SLOT_ALIGN,
        ))
    }

    /// A generic iterable collection accessed through an adapter. The
    /// iteration strategy is fixed at construction: contiguous stride
    /// (preferred, no adapter calls per element) or cursor (adapter-driven).
    pub fn proxied(
        name: impl Into<String>,
        type_name: impl Into<String>,
        item: Field,
        strategy: IterStrategy,
    ) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        Ok(Self::base(
            name,
            type_name.into(),
            Structure::Collection,
            FieldKind::Proxied {
                strategy,
                n_written: 0,
            },
            vec![item.renamed_item()],
            traits::TRIVIALLY_CONSTRUCTIBLE,
            COLLECTION_SLOT_SIZE,
            COLLECTION_SLOT_ALIGN,
        ))
    }

    /// A fixed-length array; no offset column, static footprint
    /// `item_size * len`.
    pub fn array(name: impl Into<String>, item: Field, len: usize) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        eyre::ensure!(len > 0, "array field '{}' must have nonzero length", name);
        let type_name = format!("array<{}, {}>", item.type_name, len);
        let value_size = item.value_size * len;
        let align = item.align;
        let item_traits = item.traits;
        Ok(Self::base(
            name,
            type_name,
            Structure::Leaf,
            FieldKind::Array { len },
            vec![item.renamed_item()],
            item_traits & traits::TRIVIAL,
            value_size,
            align,
        ))
    }

    /// An optional value. The encoding defaults to dense when the item slot
    /// is at most 4 bytes, sparse otherwise; override with
    /// [`set_dense`](Self::set_dense) / [`set_sparse`](Self::set_sparse)
    /// before connecting.
    pub fn nullable(name: impl Into<String>, item: Field) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        let type_name = format!("option<{}>", item.type_name);
        let (_, size, align) = layout::nullable_layout(item.value_size, item.align);
        let mode = if item.value_size <= 4 {
            NullableMode::Dense
        } else {
            NullableMode::Sparse
        };
        let field_traits =
            traits::TRIVIALLY_CONSTRUCTIBLE | (item.traits & traits::TRIVIALLY_DESTRUCTIBLE);
        let mut field = Self::base(
            name,
            type_name,
            Structure::Collection,
            FieldKind::Nullable {
                mode,
                n_written: 0,
                default_item: None,
            },
            vec![item.renamed_item()],
            field_traits,
            size,
            align,
        );
        field.repr_chosen = Some(match mode {
            NullableMode::Dense => 0,
            NullableMode::Sparse => NULLABLE_SPARSE_DEFAULT,
        });
        Ok(field)
    }

    /// A tagged union. Arms are the sub-fields in declared order; the stored
    /// tag is their 1-based position, 0 being reserved for "no active
    /// value".
    pub fn variant(name: impl Into<String>, arms: Vec<Field>) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        eyre::ensure!(
            !arms.is_empty(),
            "variant field '{}' needs at least one arm",
            name
        );
        eyre::ensure!(
            arms.len() <= u32::MAX as usize - 1,
            "variant field '{}' has too many arms",
            name
        );
        let layout = layout::variant_layout(
            &arms
                .iter()
                .map(|a| (a.value_size, a.align))
                .collect::<Vec<_>>(),
        );
        let type_name = format!(
            "variant<{}>",
            arms.iter()
                .map(|a| a.type_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut arm_traits = traits::TRIVIALLY_DESTRUCTIBLE;
        for a in &arms {
            arm_traits &= a.traits;
        }
        let n_arms = arms.len();
        let arms = arms
            .into_iter()
            .enumerate()
            .map(|(i, a)| a.renamed(format!("_{}", i)))
            .collect();
        Ok(Self::base(
            name,
            type_name,
            Structure::Record,
            FieldKind::Variant {
                tag_offset: layout.tag_offset,
                payload_size: layout.payload_size,
                n_written: vec![0; n_arms],
            },
            arms,
            arm_traits,
            layout.size,
            layout.align,
        ))
    }

    /// A fixed bit count stored as a boolean-array column, one element per
    /// bit. Known to be write- and read-amplified; kept deliberately.
    pub fn bitset(name: impl Into<String>, n_bits: usize) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        eyre::ensure!(n_bits > 0, "bitset field '{}' must have nonzero size", name);
        Ok(Self::base(
            name,
            format!("bitset<{}>", n_bits),
            Structure::Leaf,
            FieldKind::Bitset { n_bits },
            Vec::new(),
            traits::TRIVIAL,
            layout::bitset_words(n_bits) * 8,
            8,
        ))
    }

    /// A derived, read-only view of a collection's per-entry item count,
    /// 32-bit flavor. `of` is the qualified name of the collection field
    /// whose principal offset column backs the reads.
    pub fn cardinality32(name: impl Into<String>, of: impl Into<String>) -> Result<Field> {
        Self::cardinality(name.into(), of.into(), false)
    }

    /// 64-bit flavor of [`cardinality32`](Self::cardinality32).
    pub fn cardinality64(name: impl Into<String>, of: impl Into<String>) -> Result<Field> {
        Self::cardinality(name.into(), of.into(), true)
    }

    fn cardinality(name: String, of: String, wide: bool) -> Result<Field> {
        ensure_valid_field_name(&name)?;
        let (size, type_name) = if wide {
            (8, "cardinality64")
        } else {
            (4, "cardinality32")
        };
        Ok(Self::base(
            name,
            type_name.to_string(),
            Structure::Leaf,
            FieldKind::Cardinality { of, wide },
            Vec::new(),
            traits::TRIVIAL,
            size,
            size,
        ))
    }

    /// An enumeration over an integer underlying field; all operations
    /// delegate to it and the literal surface is the ordinal.
    pub fn enumeration(
        name: impl Into<String>,
        type_name: impl Into<String>,
        underlying: Field,
    ) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        eyre::ensure!(
            matches!(
                underlying.kind,
                FieldKind::Leaf(
                    LeafKind::I8
                        | LeafKind::I16
                        | LeafKind::I32
                        | LeafKind::I64
                        | LeafKind::U8
                        | LeafKind::U16
                        | LeafKind::U32
                        | LeafKind::U64
                )
            ),
            "enum field '{}' requires an integer underlying field",
            name
        );
        let value_size = underlying.value_size;
        let align = underlying.align;
        let underlying_traits = underlying.traits;
        Ok(Self::base(
            name,
            type_name.into(),
            Structure::Leaf,
            FieldKind::Enum,
            vec![underlying.renamed_item()],
            underlying_traits & traits::TRIVIAL,
            value_size,
            align,
        ))
    }

    /// An atomically-wrapped value; transparent delegation to the inner
    /// field, whose serialized form is identical.
    pub fn atomic(name: impl Into<String>, inner: Field) -> Result<Field> {
        let name = name.into();
        ensure_valid_field_name(&name)?;
        let type_name = format!("atomic<{}>", inner.type_name);
        let value_size = inner.value_size;
        let align = inner.align;
        let inner_traits = inner.traits;
        Ok(Self::base(
            name,
            type_name,
            Structure::Leaf,
            FieldKind::Atomic,
            vec![inner.renamed_item()],
            inner_traits & traits::TRIVIAL,
            value_size,
            align,
        ))
    }

    fn renamed_item(self) -> Field {
        self.renamed("_0".to_string())
    }

    fn renamed(mut self, name: String) -> Field {
        self.name = name;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Evolution counter of the semantic type; persisted in the descriptor.
    pub fn type_version(&self) -> u32 {
        self.type_version
    }

    pub(crate) fn set_type_version(&mut self, version: u32) {
        self.type_version = version;
    }

    pub fn structure(&self) -> Structure {
        self.structure
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut FieldKind {
        &mut self.kind
    }

    pub fn traits(&self) -> u32 {
        self.traits
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Bytes taken by one value of this field's type.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Slot alignment; always a power of two and a divisor of
    /// [`value_size`](Self::value_size) (or 1).
    pub fn alignment(&self) -> usize {
        self.align
    }

    pub fn sub_fields(&self) -> &[Field] {
        &self.sub_fields
    }

    /// On-disk identifier; valid only once connected.
    pub fn on_disk_id(&self) -> Option<FieldId> {
        self.on_disk_id
    }

    pub(crate) fn set_on_disk_id(&mut self, id: FieldId) {
        self.on_disk_id = Some(id);
    }

    /// Type version found in the descriptor; only after connecting to a
    /// page source.
    pub fn on_disk_type_version(&self) -> Option<u32> {
        self.on_disk_type_version
    }

    pub(crate) fn set_on_disk_type_version(&mut self, version: u32) {
        self.on_disk_type_version = Some(version);
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// A field is simple iff it is mappable and has no read callbacks;
    /// simple fields bypass composite dispatch on read and bulk reads.
    pub fn is_simple(&self) -> bool {
        self.traits & traits::MAPPABLE != 0 && self.read_callbacks.is_empty()
    }

    pub(crate) fn principal(&self) -> Result<&Column> {
        self.columns
            .first()
            .ok_or_else(|| eyre::eyre!("field '{}' has no principal column", self.name))
    }

    /// Number of elements stored in the principal column; read side only.
    pub fn n_elements(&self) -> Result<u64> {
        self.principal()?.n_elements()
    }

    pub(crate) fn representations(&self) -> Representations {
        match &self.kind {
            FieldKind::Leaf(kind) => kind.representations(),
            FieldKind::String { .. } => STRING_REPS,
            FieldKind::Vector { .. } | FieldKind::Proxied { .. } | FieldKind::Set { .. } => {
                OFFSET_REPS
            }
            FieldKind::Nullable { .. } => NULLABLE_REPS,
            FieldKind::Variant { .. } => VARIANT_REPS,
            FieldKind::Bitset { .. } => BIT_REPS,
            FieldKind::Cardinality { .. } => CARDINALITY_REPS,
            FieldKind::Record { .. }
            | FieldKind::Array { .. }
            | FieldKind::Enum
            | FieldKind::Atomic => Representations::NONE,
        }
    }

    /// The representation used for writing: the explicitly chosen one, or
    /// the kind's default.
    pub fn column_representative(&self) -> Option<&'static [ColumnType]> {
        let reps = self.representations();
        if reps.serialization.is_empty() {
            return None;
        }
        Some(reps.serialization[self.repr_chosen.unwrap_or(0)])
    }

    pub fn has_default_column_representative(&self) -> bool {
        self.repr_chosen.is_none()
    }

    pub(crate) fn repr_index(&self) -> usize {
        self.repr_chosen.unwrap_or(0)
    }

    /// Fixes the column representation; only before connecting to a sink.
    pub fn set_column_representative(&mut self, types: &[ColumnType]) -> Result<()> {
        eyre::ensure!(
            self.state == ConnectionState::Unconnected,
            "column representation of field '{}' cannot change after connecting",
            self.name
        );
        let reps = self.representations();
        let index = reps
            .serialization
            .iter()
            .position(|list| *list == types)
            .ok_or_else(|| {
                eyre::eyre!(
                    "column types {:?} are not a valid representation for field '{}'",
                    types,
                    self.name
                )
            })?;
        self.repr_chosen = Some(index);
        if let FieldKind::Nullable { mode, .. } = &mut self.kind {
            *mode = if types == [ColumnType::Bit] {
                NullableMode::Dense
            } else {
                NullableMode::Sparse
            };
        }
        Ok(())
    }

    pub fn is_dense(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Nullable {
                mode: NullableMode::Dense,
                ..
            }
        )
    }

    pub fn is_sparse(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Nullable {
                mode: NullableMode::Sparse,
                ..
            }
        )
    }

    /// Switches a nullable field to the dense encoding; only before
    /// connecting.
    pub fn set_dense(&mut self) -> Result<()> {
        eyre::ensure!(
            matches!(self.kind, FieldKind::Nullable { .. }),
            "field '{}' is not nullable",
            self.name
        );
        self.set_column_representative(&[ColumnType::Bit])
    }

    /// Switches a nullable field to the sparse encoding; only before
    /// connecting.
    pub fn set_sparse(&mut self) -> Result<()> {
        eyre::ensure!(
            matches!(self.kind, FieldKind::Nullable { .. }),
            "field '{}' is not nullable",
            self.name
        );
        self.set_column_representative(&[ColumnType::SplitIndex64])
    }

    /// Registers a post-read hook and returns its index. Registering any
    /// callback demotes a simple field to the dispatched read path.
    pub fn add_read_callback(&mut self, callback: ReadCallback) -> usize {
        self.read_callbacks.push(callback);
        self.read_callbacks.len() - 1
    }

    /// Disables the callback at `index`, keeping later indices stable.
    pub fn remove_read_callback(&mut self, index: usize) {
        self.read_callbacks[index] = Box::new(|_| {});
    }

    pub(crate) fn read_callbacks(&self) -> &[ReadCallback] {
        &self.read_callbacks
    }

    /// Deep-copies the subtree under a new name with fresh, unconnected
    /// columns and cleared per-cluster counters. Read callbacks are not
    /// copied.
    pub fn clone_renamed(&self, new_name: impl Into<String>) -> Result<Field> {
        let name = new_name.into();
        ensure_valid_field_name(&name)?;
        let mut field = self.clone_unconnected();
        field.name = name;
        Ok(field)
    }

    fn clone_unconnected(&self) -> Field {
        let kind = match &self.kind {
            FieldKind::Leaf(kind) => FieldKind::Leaf(*kind),
            FieldKind::String { .. } => FieldKind::String { n_written: 0 },
            FieldKind::Record { offsets } => FieldKind::Record {
                offsets: offsets.clone(),
            },
            FieldKind::Vector { .. } => FieldKind::Vector { n_written: 0 },
            FieldKind::Proxied { strategy, .. } => FieldKind::Proxied {
                strategy: strategy.clone(),
                n_written: 0,
            },
            FieldKind::Set { .. } => FieldKind::Set { n_written: 0 },
            FieldKind::Array { len } => FieldKind::Array { len: *len },
            FieldKind::Nullable { mode, .. } => FieldKind::Nullable {
                mode: *mode,
                n_written: 0,
                default_item: None,
            },
            FieldKind::Variant {
                tag_offset,
                payload_size,
                n_written,
            } => FieldKind::Variant {
                tag_offset: *tag_offset,
                payload_size: *payload_size,
                n_written: vec![0; n_written.len()],
            },
            FieldKind::Cardinality { of, wide } => FieldKind::Cardinality {
                of: of.clone(),
                wide: *wide,
            },
            FieldKind::Bitset { n_bits } => FieldKind::Bitset { n_bits: *n_bits },
            FieldKind::Enum => FieldKind::Enum,
            FieldKind::Atomic => FieldKind::Atomic,
        };
        Field {
            name: self.name.clone(),
            type_name: self.type_name.clone(),
            type_version: self.type_version,
            structure: self.structure,
            kind,
            sub_fields: self
                .sub_fields
                .iter()
                .map(Field::clone_unconnected)
                .collect(),
            columns: SmallVec::new(),
            traits: self.traits,
            state: ConnectionState::Unconnected,
            on_disk_id: None,
            on_disk_type_version: None,
            repr_chosen: self.repr_chosen,
            read_callbacks: Vec::new(),
            description: self.description.clone(),
            value_size: self.value_size,
            align: self.align,
        }
    }

    /// Resets per-cluster transient counters and recurses into sub-fields.
    pub fn commit_cluster(&mut self) {
        match &mut self.kind {
            FieldKind::String { n_written }
            | FieldKind::Vector { n_written }
            | FieldKind::Proxied { n_written, .. }
            | FieldKind::Set { n_written }
            | FieldKind::Nullable { n_written, .. } => *n_written = 0,
            FieldKind::Variant { n_written, .. } => n_written.fill(0),
            _ => {}
        }
        for child in &mut self.sub_fields {
            child.commit_cluster();
        }
        trace!(field = %self.name, "cluster committed");
    }

    /// Depth-first traversal over the subtree, parents before children.
    pub fn walk(&self, visit: &mut dyn FnMut(&Field, usize)) {
        self.walk_depth(visit, 0);
    }

    fn walk_depth(&self, visit: &mut dyn FnMut(&Field, usize), depth: usize) {
        visit(self, depth);
        for child in &self.sub_fields {
            child.walk_depth(visit, depth + 1);
        }
    }
}
