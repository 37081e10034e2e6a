//! # Page Storage Collaborators
//!
//! The physical column store is an external collaborator, specified here only
//! at its interface. A [`PageSink`] receives columns and packed elements
//! during a write session; a [`PageSource`] serves positional reads and
//! exposes the [`Descriptor`] persisted by the sink. Fields never talk to
//! pages, files, or compression directly; everything below the packed-element
//! granularity belongs to the backend.
//!
//! ## Sessions and clusters
//!
//! Entries are grouped into clusters: bounded runs sharing per-field
//! transient write state (running offset counters reset at boundaries).
//! `PageSink::commit_cluster` seals the current cluster in the backend;
//! field trees reset their counters through `Field::commit_cluster`. The two
//! are driven together by the session owner.
//!
//! ## Sharing
//!
//! Sinks and sources are shared behind `Arc<parking_lot::Mutex<..>>`. One
//! store may serve a write session and later any number of read sessions;
//! each field tree still connects to exactly one side.

pub mod memory;

pub use memory::MemoryPages;

use crate::column::{ClusterIndex, ColumnType, EntryIndex};
use eyre::Result;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// On-disk field identifier, assigned by the sink at connect time.
pub type FieldId = u32;
/// Backend handle for one physical column.
pub type ColumnId = u32;

pub type SharedSink = Arc<Mutex<dyn PageSink>>;
pub type SharedSource = Arc<Mutex<dyn PageSource>>;

/// Per-session write options consulted when fields connect.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// When false, split encodings chosen as column defaults are downgraded
    /// to their plain counterparts at connect time.
    pub split_encoding: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            split_encoding: true,
        }
    }
}

/// Schema entry for one connected field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub id: FieldId,
    /// Dot-qualified name ("event.tracks._0").
    pub name: String,
    pub type_name: String,
    pub type_version: u32,
    pub parent: Option<FieldId>,
    /// Stored column encodings, in column order.
    pub column_types: Vec<ColumnType>,
}

/// The schema store built by a sink and exposed by a source: field name/id
/// lookup plus the stored column encodings used for compatibility checking.
#[derive(Debug, Default)]
pub struct Descriptor {
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, FieldId>,
}

impl Descriptor {
    pub fn add_field(
        &mut self,
        name: &str,
        type_name: &str,
        type_version: u32,
        parent: Option<FieldId>,
    ) -> Result<FieldId> {
        eyre::ensure!(
            !self.by_name.contains_key(name),
            "field '{}' already registered",
            name
        );
        let id = self.fields.len() as FieldId;
        self.fields.push(FieldDescriptor {
            id,
            name: name.to_string(),
            type_name: type_name.to_string(),
            type_version,
            parent,
            column_types: Vec::new(),
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_column(&mut self, field: FieldId, ty: ColumnType) -> Result<()> {
        let fd = self
            .fields
            .get_mut(field as usize)
            .ok_or_else(|| eyre::eyre!("unknown field id {}", field))?;
        fd.column_types.push(ty);
        Ok(())
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldDescriptor> {
        self.fields.get(id as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).and_then(|&id| self.field(id))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }
}

/// Write-side collaborator contract.
///
/// `create_field` is called once per field in the tree (parents before
/// children); `create_column` once per backing column, in column order.
/// Elements arrive pre-packed by the element codec.
pub trait PageSink: Send {
    fn options(&self) -> WriteOptions;

    fn create_field(
        &mut self,
        name: &str,
        type_name: &str,
        type_version: u32,
        parent: Option<FieldId>,
    ) -> Result<FieldId>;

    fn create_column(
        &mut self,
        field: FieldId,
        index: u32,
        ty: ColumnType,
        first_entry: EntryIndex,
    ) -> Result<ColumnId>;

    fn append(&mut self, column: ColumnId, element: &[u8]) -> Result<()>;

    /// Seals the current cluster; subsequent elements belong to the next one.
    fn commit_cluster(&mut self) -> Result<()>;
}

/// Read-side collaborator contract.
///
/// All indices are element indices of the addressed column. `read` fills one
/// packed element; `read_range` is the vectorized path and returns how many
/// elements it produced (clamped to the cluster end for sealed clusters).
pub trait PageSource: Send {
    fn descriptor(&self) -> &Descriptor;

    /// Opens a stored column for reading. `ty` must match the stored
    /// encoding; the caller picks it from the descriptor.
    fn open_column(&self, field: FieldId, index: u32, ty: ColumnType) -> Result<ColumnId>;

    fn n_elements(&self, column: ColumnId) -> Result<u64>;

    fn read(&self, column: ColumnId, global: u64, out: &mut [u8]) -> Result<()>;

    fn read_range(
        &self,
        column: ColumnId,
        first: ClusterIndex,
        count: u64,
        out: &mut [u8],
    ) -> Result<u64>;

    /// Translates a global element index into its cluster-local position.
    fn locate(&self, column: ColumnId, global: u64) -> Result<ClusterIndex>;

    /// Inverse of [`locate`](Self::locate).
    fn globalize(&self, column: ColumnId, at: ClusterIndex) -> Result<u64>;

    /// For offset-bearing columns: the start position and item count of the
    /// collection stored at `global`.
    fn collection_info(&self, column: ColumnId, global: u64) -> Result<(ClusterIndex, u64)>;
}
