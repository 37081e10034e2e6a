//! # Field Connection
//!
//! Fields and their columns live in the void until connected to physical
//! page storage. Connecting walks the tree depth-first, registers each field
//! in the descriptor under its dot-qualified name, and creates or opens the
//! backing columns. On the source side, the stored column encodings must be
//! in the field's accepted set; a mismatch is a fatal schema error.

use crate::column::{Column, ColumnType, ElementClass, EntryIndex};
use crate::column::element::SWITCH_ELEMENT_SIZE;
use crate::field::{ConnectionState, Field, FieldKind, NullableMode};
use crate::pages::{FieldId, SharedSink, SharedSource, WriteOptions};
use eyre::Result;
use smallvec::SmallVec;
use tracing::debug;

impl Field {
    /// Transitions `Unconnected -> ConnectedToSink`, creating descriptor
    /// entries and backing columns for the whole subtree. `first_entry` is
    /// the global index of the first entry this session will write.
    pub fn connect_page_sink(&mut self, sink: &SharedSink, first_entry: EntryIndex) -> Result<()> {
        eyre::ensure!(
            self.state() == ConnectionState::Unconnected,
            "field '{}' is already connected",
            self.name()
        );
        let options = sink.lock().options();
        self.connect_sink_inner(sink, options, first_entry, None, "")
    }

    fn connect_sink_inner(
        &mut self,
        sink: &SharedSink,
        options: WriteOptions,
        first_entry: EntryIndex,
        parent: Option<FieldId>,
        prefix: &str,
    ) -> Result<()> {
        if let FieldKind::Cardinality { .. } = self.kind() {
            eyre::bail!(
                "cardinality field '{}' is read-only and cannot connect to a page sink",
                self.name()
            );
        }
        let qualified = qualify(prefix, self.name());
        let id = sink.lock().create_field(
            &qualified,
            self.type_name(),
            self.type_version(),
            parent,
        )?;
        self.set_on_disk_id(id);

        let reps = self.representations();
        if !reps.serialization.is_empty() {
            let mut types: SmallVec<[ColumnType; 2]> = reps.serialization[self.repr_index()]
                .iter()
                .copied()
                .collect();
            if !options.split_encoding && types.iter().any(ColumnType::is_split) {
                for ty in &mut types {
                    *ty = ty.plain();
                }
                debug!(field = %qualified, "split encodings downgraded per write options");
            }
            for (index, ty) in types.iter().enumerate() {
                let (class, mem_len) = self.column_layout(index, *ty);
                self.columns.push(Column::connect_sink(
                    id,
                    index as u32,
                    *ty,
                    class,
                    mem_len,
                    first_entry,
                    sink,
                )?);
            }
        }

        for child in &mut self.sub_fields {
            child.connect_sink_inner(sink, options, first_entry, Some(id), &qualified)?;
        }
        self.set_state(ConnectionState::ConnectedToSink);
        debug!(field = %qualified, "connected to page sink");
        Ok(())
    }

    /// Transitions `Unconnected -> ConnectedToSource`, resolving the subtree
    /// against the source's descriptor and verifying that every stored
    /// column encoding is one this field can deserialize.
    pub fn connect_page_source(&mut self, source: &SharedSource) -> Result<()> {
        eyre::ensure!(
            self.state() == ConnectionState::Unconnected,
            "field '{}' is already connected",
            self.name()
        );
        self.connect_source_inner(source, "")
    }

    fn connect_source_inner(&mut self, source: &SharedSource, prefix: &str) -> Result<()> {
        let qualified = qualify(prefix, self.name());
        let target = match self.kind() {
            FieldKind::Cardinality { of, .. } => of.clone(),
            _ => qualified.clone(),
        };
        let (id, on_disk_types, type_version) = {
            let src = source.lock();
            let fd = src
                .descriptor()
                .lookup(&target)
                .ok_or_else(|| eyre::eyre!("no on-disk field named '{}'", target))?;
            (fd.id, fd.column_types.clone(), fd.type_version)
        };
        self.set_on_disk_id(id);
        self.set_on_disk_type_version(type_version);

        if let FieldKind::Cardinality { of, .. } = self.kind() {
            // Only the collection's principal offset column is borrowed.
            let first = on_disk_types.first().copied().ok_or_else(|| {
                eyre::eyre!(
                    "schema mismatch for field '{}': collection '{}' has no columns",
                    qualified,
                    of
                )
            })?;
            eyre::ensure!(
                first.is_index(),
                "schema mismatch for field '{}': column type {:?} of '{}' is not an offset column",
                qualified,
                first,
                of
            );
            let (class, mem_len) = self.column_layout(0, first);
            self.columns
                .push(Column::connect_source(id, 0, first, class, mem_len, source)?);
        } else {
            let reps = self.representations();
            if reps.serialization.is_empty() && reps.deserialization_extra.is_empty() {
                eyre::ensure!(
                    on_disk_types.is_empty(),
                    "schema mismatch for field '{}': unexpected stored columns {:?}",
                    qualified,
                    on_disk_types
                );
            } else {
                eyre::ensure!(
                    reps.accepts_for_read(&on_disk_types),
                    "schema mismatch for field '{}': on-disk column types {:?} are not accepted",
                    qualified,
                    on_disk_types
                );
                for (index, ty) in on_disk_types.iter().enumerate() {
                    let (class, mem_len) = self.column_layout(index, *ty);
                    self.columns.push(Column::connect_source(
                        id,
                        index as u32,
                        *ty,
                        class,
                        mem_len,
                        source,
                    )?);
                }
            }
        }

        self.on_connect_source(&on_disk_types);

        for child in &mut self.sub_fields {
            child.connect_source_inner(source, &qualified)?;
        }
        self.set_state(ConnectionState::ConnectedToSource);
        debug!(field = %qualified, "connected to page source");
        Ok(())
    }

    /// Post-connect hook: recovers state implied by the stored encodings.
    fn on_connect_source(&mut self, on_disk_types: &[ColumnType]) {
        if let FieldKind::Nullable { mode, .. } = self.kind_mut() {
            *mode = if on_disk_types == [ColumnType::Bit] {
                NullableMode::Dense
            } else {
                NullableMode::Sparse
            };
        }
    }

    /// Element codec configuration for the field's own column at `index`.
    fn column_layout(&self, index: usize, ty: ColumnType) -> (ElementClass, usize) {
        match self.kind() {
            FieldKind::Leaf(kind) => (kind.class(), kind.size()),
            FieldKind::String { .. } => {
                if index == 0 {
                    (ElementClass::Index, 8)
                } else {
                    (ElementClass::Bytes, 1)
                }
            }
            FieldKind::Vector { .. } | FieldKind::Proxied { .. } | FieldKind::Set { .. } => {
                (ElementClass::Index, 8)
            }
            FieldKind::Nullable { .. } => {
                if ty == ColumnType::Bit {
                    (ElementClass::Bool, 1)
                } else {
                    (ElementClass::Index, 8)
                }
            }
            FieldKind::Variant { .. } => (ElementClass::Switch, SWITCH_ELEMENT_SIZE),
            FieldKind::Cardinality { .. } => (ElementClass::Index, 8),
            FieldKind::Bitset { .. } => (ElementClass::Bool, 1),
            FieldKind::Record { .. }
            | FieldKind::Array { .. }
            | FieldKind::Enum
            | FieldKind::Atomic => (ElementClass::Bytes, 0),
        }
    }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
