//! # Field I/O
//!
//! Value construction, append, read, bulk read, and literal
//! encoding/decoding for every field kind. Composite kinds delegate
//! recursively to their sub-fields and ultimately to columns; the simple
//! fast path (mappable, no callbacks) bypasses dispatch entirely.
//!
//! Index spaces: a top-level entry index equals the element index of the
//! field's own columns. Fixed arrays and bitsets scale indices by their
//! static length; collections translate through their offset column's
//! collection info.

use crate::bulk::{Bulk, BulkSpec, ALL_SET};
use crate::column::{ClusterIndex, Column, EntryIndex};
use crate::field::{traits, ConnectionState, Field, FieldKind, IterStrategy, NullableMode};
use crate::layout;
use crate::value::{self, Datum, OwnedValue, ValueBuf, ValueMut, ValueRef};
use eyre::Result;
use smallvec::SmallVec;

impl Field {
    pub(crate) fn column(&self, index: usize) -> Result<&Column> {
        self.columns
            .get(index)
            .ok_or_else(|| eyre::eyre!("field '{}' has no column {}", self.name(), index))
    }

    /// Allocates storage of `value_size` bytes, default-constructs an
    /// instance in place, and returns the owning handle.
    pub fn generate_value(&self) -> Result<OwnedValue> {
        let mut buf = ValueBuf::with_size(self.value_size());
        self.default_construct(buf.as_mut())?;
        Ok(OwnedValue::new(buf))
    }

    /// Wraps externally owned, already constructed storage; no construction
    /// is performed. The storage must match the field's footprint exactly;
    /// shorter backing buffers are rejected here rather than truncated.
    pub fn bind_value<'a>(&self, buf: &'a mut ValueBuf) -> Result<ValueMut<'a>> {
        eyre::ensure!(
            buf.slot_len() == self.value_size(),
            "bound storage is {} bytes but field '{}' requires {}",
            buf.slot_len(),
            self.name(),
            self.value_size()
        );
        Ok(buf.as_mut())
    }

    /// An initially empty bulk arena for this field's type.
    pub fn generate_bulk(&self) -> Bulk {
        Bulk::new(self.value_size())
    }

    /// Default-constructs a value in place. Members are constructed in
    /// declaration order; for trivially constructible kinds this is a plain
    /// zero-fill.
    pub(crate) fn default_construct(&self, dst: ValueMut<'_>) -> Result<()> {
        let ValueMut { slot, heap } = dst;
        slot.fill(0);
        if self.traits() & traits::TRIVIALLY_CONSTRUCTIBLE != 0 {
            return Ok(());
        }
        match self.kind() {
            FieldKind::Record { offsets } => {
                for (child, &off) in self.sub_fields().iter().zip(offsets) {
                    child.default_construct(ValueMut {
                        slot: &mut slot[off..off + child.value_size()],
                        heap: &mut *heap,
                    })?;
                }
                Ok(())
            }
            FieldKind::Array { len } => {
                let item = &self.sub_fields()[0];
                let stride = item.value_size();
                for i in 0..*len {
                    item.default_construct(ValueMut {
                        slot: &mut slot[i * stride..(i + 1) * stride],
                        heap: &mut *heap,
                    })?;
                }
                Ok(())
            }
            FieldKind::Variant { tag_offset, .. } => {
                let arm = &self.sub_fields()[0];
                arm.default_construct(ValueMut {
                    slot: &mut slot[..arm.value_size()],
                    heap,
                })?;
                slot[*tag_offset..*tag_offset + 4].copy_from_slice(&1u32.to_le_bytes());
                Ok(())
            }
            FieldKind::Enum | FieldKind::Atomic => {
                self.sub_fields()[0].default_construct(ValueMut { slot, heap })
            }
            _ => Ok(()),
        }
    }

    /// Serializes one value into this field's columns (recursively into
    /// sub-field columns for composites). Returns the number of uncompressed
    /// bytes written. Advances the column write cursors.
    pub fn append(&mut self, v: ValueRef<'_>) -> Result<usize> {
        eyre::ensure!(
            self.state() == ConnectionState::ConnectedToSink,
            "field '{}' is not connected to a page sink",
            self.name()
        );
        self.append_inner(v)
    }

    fn append_inner(&mut self, v: ValueRef<'_>) -> Result<usize> {
        let Field {
            name,
            kind,
            sub_fields,
            columns,
            ..
        } = self;
        match kind {
            FieldKind::Leaf(_) => columns[0].append_slot(v.slot),
            FieldKind::String { n_written } => {
                let (off, len) = value::read_handle(v.slot);
                let mut written = 0;
                for i in 0..len {
                    written += columns[1].append_slot(&v.heap[off + i..off + i + 1])?;
                }
                *n_written += len as u64;
                written += columns[0].append_index(*n_written)?;
                Ok(written)
            }
            FieldKind::Record { offsets } => {
                let mut written = 0;
                for (child, &off) in sub_fields.iter_mut().zip(offsets.iter()) {
                    let size = child.value_size();
                    written += child.append_inner(v.window(off, size))?;
                }
                Ok(written)
            }
            FieldKind::Vector { n_written } | FieldKind::Set { n_written } => {
                let item = &mut sub_fields[0];
                let stride = item.value_size();
                let (off, len) = value::read_handle(v.slot);
                let mut written = 0;
                for i in 0..len {
                    written += item.append_inner(v.heap_window(off + i * stride, stride))?;
                }
                *n_written += len as u64;
                written += columns[0].append_index(*n_written)?;
                Ok(written)
            }
            FieldKind::Proxied {
                strategy,
                n_written,
            } => {
                let item = &mut sub_fields[0];
                let mut written = 0;
                let mut count = 0u64;
                match strategy {
                    IterStrategy::Contiguous => {
                        let stride = item.value_size();
                        let (off, len) = value::read_handle(v.slot);
                        for i in 0..len {
                            written += item.append_inner(v.heap_window(off + i * stride, stride))?;
                        }
                        count = len as u64;
                    }
                    IterStrategy::Cursor(adapter) => {
                        let adapter = adapter.clone();
                        adapter.for_each(v, &mut |elem| {
                            written += item.append_inner(elem)?;
                            count += 1;
                            Ok(())
                        })?;
                    }
                }
                *n_written += count;
                written += columns[0].append_index(*n_written)?;
                Ok(written)
            }
            FieldKind::Array { len } => {
                let item = &mut sub_fields[0];
                let stride = item.value_size();
                let mut written = 0;
                for i in 0..*len {
                    written += item.append_inner(v.window(i * stride, stride))?;
                }
                Ok(written)
            }
            FieldKind::Nullable {
                mode,
                n_written,
                default_item,
            } => {
                let item = &mut sub_fields[0];
                let (item_off, _, _) = layout::nullable_layout(item.value_size(), item.alignment());
                let present = v.slot[0] != 0;
                match mode {
                    NullableMode::Dense => {
                        let mut written = columns[0].append_slot(&[present as u8])?;
                        if present {
                            written += item.append_inner(v.window(item_off, item.value_size()))?;
                        } else {
                            let def = match default_item {
                                Some(buf) => buf,
                                None => {
                                    let mut buf = ValueBuf::with_size(item.value_size());
                                    item.default_construct(buf.as_mut())?;
                                    default_item.insert(buf)
                                }
                            };
                            written += item.append_inner(def.as_ref())?;
                        }
                        Ok(written)
                    }
                    NullableMode::Sparse => {
                        let mut written = 0;
                        if present {
                            written += item.append_inner(v.window(item_off, item.value_size()))?;
                            *n_written += 1;
                        }
                        written += columns[0].append_index(*n_written)?;
                        Ok(written)
                    }
                }
            }
            FieldKind::Variant {
                tag_offset,
                n_written,
                ..
            } => {
                let tag = value::read_u32_at(v.slot, *tag_offset);
                eyre::ensure!(
                    tag >= 1 && tag as usize <= sub_fields.len(),
                    "variant tag {} is out of range for {} arms (0 is reserved)",
                    tag,
                    sub_fields.len()
                );
                let arm = (tag - 1) as usize;
                let arm_field = &mut sub_fields[arm];
                let size = arm_field.value_size();
                let item_index = n_written[arm];
                n_written[arm] += 1;
                let mut written = arm_field.append_inner(v.window(0, size))?;
                written += columns[0].append_switch(item_index, tag)?;
                Ok(written)
            }
            FieldKind::Bitset { n_bits } => {
                let mut written = 0;
                for j in 0..*n_bits {
                    let bit = (v.slot[j / 8] >> (j % 8)) & 1;
                    written += columns[0].append_slot(&[bit])?;
                }
                Ok(written)
            }
            FieldKind::Cardinality { .. } => {
                eyre::bail!("cardinality field '{}' is read-only", name)
            }
            FieldKind::Enum | FieldKind::Atomic => sub_fields[0].append_inner(v),
        }
    }

    /// Deserializes the value at `global` into `dst`, which must already
    /// hold a valid-to-overwrite instance of the field's type.
    pub fn read(&self, global: EntryIndex, dst: ValueMut<'_>) -> Result<()> {
        eyre::ensure!(
            self.state() == ConnectionState::ConnectedToSource,
            "field '{}' is not connected to a page source",
            self.name()
        );
        self.read_inner(global, dst)
    }

    /// Random access within a known cluster; the common case after an
    /// offset lookup.
    pub fn read_at(&self, at: ClusterIndex, dst: ValueMut<'_>) -> Result<()> {
        eyre::ensure!(
            self.state() == ConnectionState::ConnectedToSource,
            "field '{}' is not connected to a page source",
            self.name()
        );
        self.read_at_inner(at, dst)
    }

    fn read_inner(&self, global: EntryIndex, mut dst: ValueMut<'_>) -> Result<()> {
        if self.is_simple() {
            return self.principal()?.read_slot(global, dst.slot);
        }
        self.read_impl(global, dst.reborrow())?;
        for callback in self.read_callbacks() {
            callback(dst.reborrow());
        }
        Ok(())
    }

    fn read_at_inner(&self, at: ClusterIndex, mut dst: ValueMut<'_>) -> Result<()> {
        if self.is_simple() {
            return self.principal()?.read_slot_at(at, dst.slot);
        }
        self.read_at_impl(at, dst.reborrow())?;
        for callback in self.read_callbacks() {
            callback(dst.reborrow());
        }
        Ok(())
    }

    fn read_at_impl(&self, at: ClusterIndex, dst: ValueMut<'_>) -> Result<()> {
        match self.kind() {
            FieldKind::Record { offsets } => {
                let ValueMut { slot, heap } = dst;
                for (child, &off) in self.sub_fields().iter().zip(offsets) {
                    child.read_at_inner(
                        at,
                        ValueMut {
                            slot: &mut slot[off..off + child.value_size()],
                            heap: &mut *heap,
                        },
                    )?;
                }
                Ok(())
            }
            FieldKind::Array { len } => {
                let ValueMut { slot, heap } = dst;
                let item = &self.sub_fields()[0];
                let stride = item.value_size();
                for j in 0..*len {
                    let item_at = ClusterIndex::new(at.cluster, at.index * *len as u64 + j as u64);
                    item.read_at_inner(
                        item_at,
                        ValueMut {
                            slot: &mut slot[j * stride..(j + 1) * stride],
                            heap: &mut *heap,
                        },
                    )?;
                }
                Ok(())
            }
            FieldKind::Enum | FieldKind::Atomic => self.sub_fields()[0].read_at_inner(at, dst),
            FieldKind::Bitset { n_bits } => {
                // the bit column holds n_bits elements per entry, so the
                // entry-to-element translation is scaled
                let bits = *n_bits as u64;
                let element_at = ClusterIndex::new(at.cluster, at.index * bits);
                let global = self.principal()?.globalize(element_at)? / bits;
                self.read_impl(global, dst)
            }
            _ => {
                let global = self.principal()?.globalize(at)?;
                self.read_impl(global, dst)
            }
        }
    }

    fn read_impl(&self, global: EntryIndex, dst: ValueMut<'_>) -> Result<()> {
        let ValueMut { slot, heap } = dst;
        match self.kind() {
            FieldKind::Leaf(_) => self.column(0)?.read_slot(global, slot),
            FieldKind::String { .. } => {
                let (start, len) = self.column(0)?.collection_info(global)?;
                let len = len as usize;
                let off = heap.len();
                if len > 0 {
                    let mut bytes = vec![0u8; len];
                    let got =
                        self.column(1)?.read_range_packed(start, len as u64, &mut bytes)?;
                    eyre::ensure!(
                        got == len as u64,
                        "string payload of entry {} is truncated",
                        global
                    );
                    heap.extend_from_slice(&bytes);
                }
                value::write_handle(slot, off, len);
                Ok(())
            }
            FieldKind::Record { offsets } => {
                for (child, &off) in self.sub_fields().iter().zip(offsets) {
                    child.read_inner(
                        global,
                        ValueMut {
                            slot: &mut slot[off..off + child.value_size()],
                            heap: &mut *heap,
                        },
                    )?;
                }
                Ok(())
            }
            FieldKind::Vector { .. } | FieldKind::Proxied { .. } | FieldKind::Set { .. } => {
                let (start, len) = self.column(0)?.collection_info(global)?;
                let len = len as usize;
                let item = &self.sub_fields()[0];
                let stride = item.value_size();
                let mut items = vec![0u8; len * stride];
                for j in 0..len {
                    let at = ClusterIndex::new(start.cluster, start.index + j as u64);
                    item.read_at_inner(
                        at,
                        ValueMut {
                            slot: &mut items[j * stride..(j + 1) * stride],
                            heap: &mut *heap,
                        },
                    )?;
                }
                let off = heap.len();
                heap.extend_from_slice(&items);
                value::write_handle(slot, off, len);
                Ok(())
            }
            FieldKind::Array { len } => {
                let item = &self.sub_fields()[0];
                let stride = item.value_size();
                for j in 0..*len {
                    item.read_inner(
                        global * *len as u64 + j as u64,
                        ValueMut {
                            slot: &mut slot[j * stride..(j + 1) * stride],
                            heap: &mut *heap,
                        },
                    )?;
                }
                Ok(())
            }
            FieldKind::Nullable { mode, .. } => {
                let item = &self.sub_fields()[0];
                let (item_off, _, _) = layout::nullable_layout(item.value_size(), item.alignment());
                let item_index = match mode {
                    NullableMode::Dense => {
                        let mut mask = [0u8; 1];
                        self.column(0)?.read_slot(global, &mut mask)?;
                        if mask[0] != 0 {
                            Some(self.column(0)?.locate(global)?)
                        } else {
                            None
                        }
                    }
                    NullableMode::Sparse => {
                        let (start, size) = self.column(0)?.collection_info(global)?;
                        (size > 0).then_some(start)
                    }
                };
                match item_index {
                    Some(at) => {
                        slot[0] = 1;
                        item.read_at_inner(
                            at,
                            ValueMut {
                                slot: &mut slot[item_off..item_off + item.value_size()],
                                heap,
                            },
                        )
                    }
                    None => {
                        slot[0] = 0;
                        slot[item_off..item_off + item.value_size()].fill(0);
                        Ok(())
                    }
                }
            }
            FieldKind::Variant {
                tag_offset,
                payload_size,
                ..
            } => {
                let (item_index, tag) = self.column(0)?.read_switch(global)?;
                eyre::ensure!(
                    tag >= 1 && tag as usize <= self.sub_fields().len(),
                    "stored variant tag {} is out of range for {} arms",
                    tag,
                    self.sub_fields().len()
                );
                let cluster = self.column(0)?.locate(global)?.cluster;
                let arm = &self.sub_fields()[(tag - 1) as usize];
                slot[..*payload_size].fill(0);
                arm.read_at_inner(
                    ClusterIndex::new(cluster, item_index),
                    ValueMut {
                        slot: &mut slot[..arm.value_size()],
                        heap,
                    },
                )?;
                slot[*tag_offset..*tag_offset + 4].copy_from_slice(&tag.to_le_bytes());
                Ok(())
            }
            FieldKind::Bitset { n_bits } => {
                slot.fill(0);
                let mut bit = [0u8; 1];
                for j in 0..*n_bits {
                    self.column(0)?
                        .read_slot(global * *n_bits as u64 + j as u64, &mut bit)?;
                    if bit[0] != 0 {
                        slot[j / 8] |= 1 << (j % 8);
                    }
                }
                Ok(())
            }
            FieldKind::Cardinality { wide, .. } => {
                let (_, size) = self.column(0)?.collection_info(global)?;
                write_cardinality(slot, size, *wide)
            }
            FieldKind::Enum | FieldKind::Atomic => {
                self.sub_fields()[0].read_inner(global, ValueMut { slot, heap })
            }
        }
    }

    /// Reads a contiguous range into `bulk`, honoring the required mask.
    /// Slots already valid from previous calls on the same range are not
    /// re-read; any range not contained in the current one resets the arena.
    pub fn read_bulk_into(
        &self,
        bulk: &mut Bulk,
        first: ClusterIndex,
        count: usize,
        mask_req: &[bool],
    ) -> Result<()> {
        eyre::ensure!(
            mask_req.len() >= count,
            "required mask has {} entries for a bulk of {}",
            mask_req.len(),
            count
        );
        if count == 0 {
            return Ok(());
        }
        if !bulk.contains_range(first, count) {
            bulk.reset(first, count);
        }
        if bulk.n_valid() == bulk.size() {
            return Ok(());
        }
        let offset = bulk.offset_of(first);
        let value_size = self.value_size();
        let (values, mask_avail, heap) = bulk.parts();
        let mut spec = BulkSpec {
            first,
            count,
            mask_req,
            mask_avail: &mut mask_avail[offset..offset + count],
            values: &mut values[offset * value_size..(offset + count) * value_size],
            heap,
        };
        let n_read = self.read_bulk(&mut spec)?;
        bulk.note_read(n_read, offset, count);
        Ok(())
    }

    /// Low-level bulk read against a caller-provided spec. Returns the
    /// number of newly available slots, or [`ALL_SET`] when every requested
    /// slot was filled unconditionally.
    pub fn read_bulk(&self, spec: &mut BulkSpec<'_>) -> Result<usize> {
        eyre::ensure!(
            self.state() == ConnectionState::ConnectedToSource,
            "field '{}' is not connected to a page source",
            self.name()
        );
        if spec.count == 0 {
            return Ok(0);
        }
        if self.is_simple() && self.principal()?.packed_size() == self.value_size() {
            // Mapped leaves whose stored element equals the slot encoding
            // ignore the mask and copy the whole range. A narrower stored
            // encoding (widening read) takes the per-value path below.
            let got =
                self.principal()?
                    .read_range_packed(spec.first, spec.count as u64, spec.values)?;
            eyre::ensure!(
                got == spec.count as u64,
                "bulk range of {} extends past the cluster end",
                spec.count
            );
            spec.mask_avail.fill(true);
            return Ok(ALL_SET);
        }
        if let FieldKind::Cardinality { wide, .. } = self.kind() {
            return self.read_bulk_cardinality(spec, *wide);
        }
        self.read_bulk_default(spec)
    }

    /// Generic bulk path: loop over the required range and read values that
    /// are required and not already present.
    fn read_bulk_default(&self, spec: &mut BulkSpec<'_>) -> Result<usize> {
        let value_size = self.value_size();
        let mut n_read = 0;
        for i in 0..spec.count {
            if !spec.mask_req[i] || spec.mask_avail[i] {
                continue;
            }
            let at = ClusterIndex::new(spec.first.cluster, spec.first.index + i as u64);
            self.read_at_inner(
                at,
                ValueMut {
                    slot: &mut spec.values[i * value_size..(i + 1) * value_size],
                    heap: &mut *spec.heap,
                },
            )?;
            spec.mask_avail[i] = true;
            n_read += 1;
        }
        Ok(n_read)
    }

    /// Derives collection sizes from consecutive offset column elements:
    /// the first element through collection info, the rest by walking the
    /// offsets chunk-wise and taking successive differences. Fills every
    /// slot regardless of the required mask.
    fn read_bulk_cardinality(&self, spec: &mut BulkSpec<'_>, wide: bool) -> Result<usize> {
        let value_size = self.value_size();
        let col = self.principal()?;
        let (_, first_size) = col.collection_info_at(spec.first)?;
        write_cardinality(&mut spec.values[..value_size], first_size, wide)?;

        let mut prev = col.read_index(col.globalize(spec.first)?)?;
        let packed = col.packed_size();
        const CHUNK: usize = 512;
        let mut buf = vec![0u8; CHUNK * packed];
        let mut done = 1usize;
        while done < spec.count {
            let n = (spec.count - done).min(CHUNK);
            let at = ClusterIndex::new(spec.first.cluster, spec.first.index + done as u64);
            let got = col.read_range_packed(at, n as u64, &mut buf)?;
            eyre::ensure!(
                got == n as u64,
                "bulk range of {} extends past the cluster end",
                spec.count
            );
            for i in 0..n {
                let offset = read_packed_index(&buf[i * packed..(i + 1) * packed]);
                eyre::ensure!(
                    offset >= prev,
                    "offset column is not monotonic within the bulk range"
                );
                write_cardinality(
                    &mut spec.values[(done + i) * value_size..(done + i + 1) * value_size],
                    offset - prev,
                    wide,
                )?;
                prev = offset;
            }
            done += n;
        }
        spec.mask_avail.fill(true);
        Ok(ALL_SET)
    }

    /// Non-owning views of the direct sub-components of `v`: record members,
    /// collection elements, the present optional item, or the active variant
    /// arm. Leaf kinds return an empty list.
    pub fn split_value<'a>(&self, v: ValueRef<'a>) -> SmallVec<[ValueRef<'a>; 4]> {
        let mut out = SmallVec::new();
        match self.kind() {
            FieldKind::Record { offsets } => {
                for (child, &off) in self.sub_fields().iter().zip(offsets) {
                    out.push(v.window(off, child.value_size()));
                }
            }
            FieldKind::Array { len } => {
                let stride = self.sub_fields()[0].value_size();
                for j in 0..*len {
                    out.push(v.window(j * stride, stride));
                }
            }
            FieldKind::Vector { .. } | FieldKind::Proxied { .. } | FieldKind::Set { .. } => {
                let stride = self.sub_fields()[0].value_size();
                let (off, len) = value::read_handle(v.slot);
                for j in 0..len {
                    out.push(v.heap_window(off + j * stride, stride));
                }
            }
            FieldKind::Nullable { .. } => {
                if v.slot[0] != 0 {
                    let item = &self.sub_fields()[0];
                    let (item_off, _, _) =
                        layout::nullable_layout(item.value_size(), item.alignment());
                    out.push(v.window(item_off, item.value_size()));
                }
            }
            FieldKind::Variant { tag_offset, .. } => {
                let tag = value::read_u32_at(v.slot, *tag_offset);
                if tag >= 1 && tag as usize <= self.sub_fields().len() {
                    out.push(v.window(0, self.sub_fields()[(tag - 1) as usize].value_size()));
                }
            }
            FieldKind::Enum | FieldKind::Atomic => {
                out.push(v.window(0, self.sub_fields()[0].value_size()));
            }
            _ => {}
        }
        out
    }

    /// Reads the 1-based discriminant of a variant value.
    pub fn get_tag(&self, v: ValueRef<'_>) -> Result<u32> {
        match self.kind() {
            FieldKind::Variant { tag_offset, .. } => {
                Ok(value::read_u32_at(v.slot, *tag_offset))
            }
            _ => eyre::bail!("field '{}' is not a variant", self.name()),
        }
    }

    /// Writes the 1-based discriminant of a variant value. The payload must
    /// already hold a valid value of the selected arm.
    pub fn set_tag(&self, v: ValueMut<'_>, tag: u32) -> Result<()> {
        match self.kind() {
            FieldKind::Variant { tag_offset, .. } => {
                eyre::ensure!(
                    tag >= 1 && tag as usize <= self.sub_fields().len(),
                    "variant tag {} is out of range for {} arms (0 is reserved)",
                    tag,
                    self.sub_fields().len()
                );
                v.slot[*tag_offset..*tag_offset + 4].copy_from_slice(&tag.to_le_bytes());
                Ok(())
            }
            _ => eyre::bail!("field '{}' is not a variant", self.name()),
        }
    }

    /// For a nullable field: the item position backing entry `global`, or
    /// the invalid sentinel when the entry is absent.
    pub fn item_index(&self, global: EntryIndex) -> Result<ClusterIndex> {
        eyre::ensure!(
            self.state() == ConnectionState::ConnectedToSource,
            "field '{}' is not connected to a page source",
            self.name()
        );
        match self.kind() {
            FieldKind::Nullable { mode, .. } => match mode {
                NullableMode::Dense => {
                    let mut mask = [0u8; 1];
                    self.column(0)?.read_slot(global, &mut mask)?;
                    if mask[0] != 0 {
                        self.column(0)?.locate(global)
                    } else {
                        Ok(ClusterIndex::INVALID)
                    }
                }
                NullableMode::Sparse => {
                    let (start, size) = self.column(0)?.collection_info(global)?;
                    Ok(if size > 0 { start } else { ClusterIndex::INVALID })
                }
            },
            _ => eyre::bail!("field '{}' is not nullable", self.name()),
        }
    }

    /// Writes a literal into a bound value of this field's type.
    pub fn encode(&self, dst: ValueMut<'_>, datum: &Datum) -> Result<()> {
        let ValueMut { slot, heap } = dst;
        match (self.kind(), datum) {
            (FieldKind::Leaf(kind), d) => kind.encode(slot, d),
            (FieldKind::String { .. }, Datum::Str(s)) => {
                let off = heap.len();
                heap.extend_from_slice(s.as_bytes());
                value::write_handle(slot, off, s.len());
                Ok(())
            }
            (FieldKind::Record { offsets }, Datum::Record(items)) => {
                eyre::ensure!(
                    items.len() == self.sub_fields().len(),
                    "record '{}' has {} members, literal has {}",
                    self.name(),
                    self.sub_fields().len(),
                    items.len()
                );
                for ((child, &off), item) in self.sub_fields().iter().zip(offsets).zip(items) {
                    child.encode(
                        ValueMut {
                            slot: &mut slot[off..off + child.value_size()],
                            heap: &mut *heap,
                        },
                        item,
                    )?;
                }
                Ok(())
            }
            (FieldKind::Vector { .. }, Datum::Vector(items))
            | (FieldKind::Proxied { .. }, Datum::Vector(items))
            | (FieldKind::Set { .. }, Datum::Set(items)) => {
                self.encode_items(slot, heap, items)
            }
            (FieldKind::Array { len }, Datum::Array(items)) => {
                eyre::ensure!(
                    items.len() == *len,
                    "array '{}' has fixed length {}, literal has {} items",
                    self.name(),
                    len,
                    items.len()
                );
                let item = &self.sub_fields()[0];
                let stride = item.value_size();
                for (j, d) in items.iter().enumerate() {
                    item.encode(
                        ValueMut {
                            slot: &mut slot[j * stride..(j + 1) * stride],
                            heap: &mut *heap,
                        },
                        d,
                    )?;
                }
                Ok(())
            }
            (FieldKind::Nullable { .. }, Datum::Optional(opt)) => {
                let item = &self.sub_fields()[0];
                let (item_off, _, _) = layout::nullable_layout(item.value_size(), item.alignment());
                match opt {
                    Some(d) => {
                        slot[0] = 1;
                        item.encode(
                            ValueMut {
                                slot: &mut slot[item_off..item_off + item.value_size()],
                                heap,
                            },
                            d,
                        )
                    }
                    None => {
                        slot[0] = 0;
                        slot[item_off..item_off + item.value_size()].fill(0);
                        Ok(())
                    }
                }
            }
            (
                FieldKind::Variant {
                    tag_offset,
                    payload_size,
                    ..
                },
                Datum::Variant { tag, value },
            ) => {
                eyre::ensure!(
                    *tag >= 1 && *tag as usize <= self.sub_fields().len(),
                    "variant tag {} is out of range for {} arms (0 is reserved)",
                    tag,
                    self.sub_fields().len()
                );
                let arm = &self.sub_fields()[(*tag - 1) as usize];
                slot[..*payload_size].fill(0);
                arm.encode(
                    ValueMut {
                        slot: &mut slot[..arm.value_size()],
                        heap,
                    },
                    value,
                )?;
                slot[*tag_offset..*tag_offset + 4].copy_from_slice(&tag.to_le_bytes());
                Ok(())
            }
            (FieldKind::Bitset { n_bits }, Datum::Bitset(bits)) => {
                eyre::ensure!(
                    bits.len() == *n_bits,
                    "bitset '{}' has {} bits, literal has {}",
                    self.name(),
                    n_bits,
                    bits.len()
                );
                slot.fill(0);
                for (j, &bit) in bits.iter().enumerate() {
                    if bit {
                        slot[j / 8] |= 1 << (j % 8);
                    }
                }
                Ok(())
            }
            (FieldKind::Enum, d) | (FieldKind::Atomic, d) => {
                self.sub_fields()[0].encode(ValueMut { slot, heap }, d)
            }
            (FieldKind::Cardinality { .. }, _) => {
                eyre::bail!("cardinality field '{}' is read-only", self.name())
            }
            (_, d) => eyre::bail!(
                "field '{}' of type {} cannot encode {} datum",
                self.name(),
                self.type_name(),
                d.kind_name()
            ),
        }
    }

    fn encode_items(&self, slot: &mut [u8], heap: &mut Vec<u8>, items: &[Datum]) -> Result<()> {
        let item = &self.sub_fields()[0];
        let stride = item.value_size();
        let mut packed = vec![0u8; items.len() * stride];
        for (j, d) in items.iter().enumerate() {
            item.encode(
                ValueMut {
                    slot: &mut packed[j * stride..(j + 1) * stride],
                    heap: &mut *heap,
                },
                d,
            )?;
        }
        let off = heap.len();
        heap.extend_from_slice(&packed);
        value::write_handle(slot, off, items.len());
        Ok(())
    }

    /// Reads a literal back from a bound value of this field's type.
    pub fn decode(&self, v: ValueRef<'_>) -> Result<Datum> {
        match self.kind() {
            FieldKind::Leaf(kind) => Ok(kind.decode(v.slot)),
            FieldKind::String { .. } => {
                let (off, len) = value::read_handle(v.slot);
                let bytes = &v.heap[off..off + len];
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| eyre::eyre!("invalid UTF-8 in string field '{}': {}", self.name(), e))?;
                Ok(Datum::Str(text.to_string()))
            }
            FieldKind::Record { offsets } => {
                let mut items = Vec::with_capacity(self.sub_fields().len());
                for (child, &off) in self.sub_fields().iter().zip(offsets) {
                    items.push(child.decode(v.window(off, child.value_size()))?);
                }
                Ok(Datum::Record(items))
            }
            FieldKind::Vector { .. } | FieldKind::Proxied { .. } => {
                Ok(Datum::Vector(self.decode_items(v)?))
            }
            FieldKind::Set { .. } => Ok(Datum::Set(self.decode_items(v)?)),
            FieldKind::Array { len } => {
                let item = &self.sub_fields()[0];
                let stride = item.value_size();
                let mut items = Vec::with_capacity(*len);
                for j in 0..*len {
                    items.push(item.decode(v.window(j * stride, stride))?);
                }
                Ok(Datum::Array(items))
            }
            FieldKind::Nullable { .. } => {
                if v.slot[0] != 0 {
                    let item = &self.sub_fields()[0];
                    let (item_off, _, _) =
                        layout::nullable_layout(item.value_size(), item.alignment());
                    let inner = item.decode(v.window(item_off, item.value_size()))?;
                    Ok(Datum::Optional(Some(Box::new(inner))))
                } else {
                    Ok(Datum::Optional(None))
                }
            }
            FieldKind::Variant { .. } => {
                let tag = self.get_tag(v)?;
                eyre::ensure!(
                    tag >= 1 && tag as usize <= self.sub_fields().len(),
                    "variant tag {} is out of range for {} arms",
                    tag,
                    self.sub_fields().len()
                );
                let arm = &self.sub_fields()[(tag - 1) as usize];
                let inner = arm.decode(v.window(0, arm.value_size()))?;
                Ok(Datum::Variant {
                    tag,
                    value: Box::new(inner),
                })
            }
            FieldKind::Bitset { n_bits } => {
                let mut bits = Vec::with_capacity(*n_bits);
                for j in 0..*n_bits {
                    bits.push((v.slot[j / 8] >> (j % 8)) & 1 != 0);
                }
                Ok(Datum::Bitset(bits))
            }
            FieldKind::Cardinality { wide, .. } => Ok(if *wide {
                Datum::U64(value::read_u64_at(v.slot, 0))
            } else {
                Datum::U32(value::read_u32_at(v.slot, 0))
            }),
            FieldKind::Enum | FieldKind::Atomic => self.sub_fields()[0].decode(v),
        }
    }

    fn decode_items(&self, v: ValueRef<'_>) -> Result<Vec<Datum>> {
        let item = &self.sub_fields()[0];
        let stride = item.value_size();
        let (off, len) = value::read_handle(v.slot);
        let mut items = Vec::with_capacity(len);
        for j in 0..len {
            items.push(item.decode(v.heap_window(off + j * stride, stride))?);
        }
        Ok(items)
    }
}

fn write_cardinality(slot: &mut [u8], size: u64, wide: bool) -> Result<()> {
    if wide {
        slot.copy_from_slice(&size.to_le_bytes());
    } else {
        eyre::ensure!(
            size <= u32::MAX as u64,
            "collection size {} does not fit a 32-bit cardinality",
            size
        );
        slot.copy_from_slice(&(size as u32).to_le_bytes());
    }
    Ok(())
}

fn read_packed_index(bytes: &[u8]) -> u64 {
    match bytes.len() {
        4 => value::read_u32_at(bytes, 0) as u64,
        _ => value::read_u64_at(bytes, 0),
    }
}
