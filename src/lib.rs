//! # coltree - Typed Columnar Object Serialization
//!
//! coltree maps arbitrarily nested, typed values (primitives, records, fixed
//! and variable-length collections, optional values, tagged unions, bitsets)
//! onto a small set of flat, strongly-typed columns suitable for bulk storage
//! and retrieval.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   Field tree (leaf/record/vector/...)     │
//! ├──────────────────────────────────────────┤
//! │   Value buffers (slot + heap arenas)      │
//! ├──────────────────────────────────────────┤
//! │   Columns (index translation, codecs)     │
//! ├──────────────────────────────────────────┤
//! │   Page sink / page source collaborators   │
//! └──────────────────────────────────────────┘
//! ```
//!
//! A model is a tree of [`Field`]s built bottom-up (children before parents).
//! Connecting the tree to a [`PageSink`] opens a write session; connecting a
//! fresh clone to a [`PageSource`] opens a read session. Client code obtains
//! value handles from a field, fills them from [`Datum`] literals, and calls
//! `append`/`read`, which recursively delegate to sub-fields and ultimately
//! to columns.
//!
//! ## Quick start
//!
//! ```ignore
//! use coltree::{Datum, Field, LeafKind, MemoryPages, SharedSink, SharedSource};
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! let store = Arc::new(Mutex::new(MemoryPages::new()));
//!
//! let mut field = Field::vector("pt", Field::leaf("_0", LeafKind::F32)?)?;
//! let sink: SharedSink = store.clone();
//! field.connect_page_sink(&sink, 0)?;
//!
//! let mut value = field.generate_value()?;
//! field.encode(value.as_mut(), &Datum::Vector(vec![Datum::F32(1.0), Datum::F32(2.5)]))?;
//! field.append(value.as_ref())?;
//! store.lock().commit_cluster()?;
//!
//! let mut reader = field.clone_renamed("pt")?;
//! let source: SharedSource = store.clone();
//! reader.connect_page_source(&source)?;
//! reader.read(0, value.as_mut())?;
//! ```
//!
//! ## Module overview
//!
//! - [`column`]: column handles, column types, the element codec
//! - [`pages`]: page sink/source collaborator traits and the in-memory backend
//! - [`layout`]: explicit size/alignment/offset computation for composites
//! - [`value`]: raw value buffers, owning and borrowed handles, [`Datum`]
//! - [`bulk`]: batched reads with availability/required bitmasks
//! - [`field`]: the field abstraction and its closed set of kinds
//! - [`registry`]: type-registry collaborator and the `build_field` factory

pub mod bulk;
pub mod column;
pub mod field;
pub mod layout;
pub mod pages;
pub mod registry;
pub mod value;

pub use bulk::{Bulk, BulkSpec, ALL_SET};
pub use column::{ClusterIndex, Column, ColumnType, EntryIndex};
pub use field::{
    CollectionAdapter, ConnectionState, Field, FieldKind, IterStrategy, LeafKind, NullableMode,
    Structure,
};
pub use pages::{
    ColumnId, Descriptor, FieldDescriptor, FieldId, MemoryPages, PageSink, PageSource, SharedSink,
    SharedSource, WriteOptions,
};
pub use registry::{build_field, MapRegistry, MemberInfo, TypeInfo, TypeKind, TypeRegistry};
pub use value::{Datum, OwnedValue, ValueBuf, ValueMut, ValueRef};
