//! # In-Memory Page Store
//!
//! Reference implementation of both collaborator traits, used by unit and
//! integration tests and by the benches. Elements are stored packed and
//! contiguous per column; cluster boundaries are recorded as element-index
//! watermarks sealed by `commit_cluster`.
//!
//! Bit columns store one byte per element here; packing below element
//! granularity is the physical store's concern and out of scope for the
//! reference backend.

use crate::column::{ClusterIndex, ColumnType, EntryIndex};
use crate::pages::{ColumnId, Descriptor, FieldId, PageSink, PageSource, WriteOptions};
use eyre::Result;
use hashbrown::HashMap;

#[derive(Debug)]
struct MemColumn {
    ty: ColumnType,
    data: Vec<u8>,
    n: u64,
    /// Element index at the start of each cluster; `starts[0] == 0`. The last
    /// entry opens the current (unsealed) cluster.
    cluster_starts: Vec<u64>,
}

impl MemColumn {
    fn element(&self, global: u64) -> Result<&[u8]> {
        eyre::ensure!(
            global < self.n,
            "element {} out of range for column with {} elements",
            global,
            self.n
        );
        let size = self.ty.packed_size();
        let start = global as usize * size;
        Ok(&self.data[start..start + size])
    }

    fn read_index(&self, global: u64) -> Result<u64> {
        let bytes = self.element(global)?;
        Ok(match self.ty.packed_size() {
            4 => crate::value::read_u32_at(bytes, 0) as u64,
            8 => crate::value::read_u64_at(bytes, 0),
            n => eyre::bail!("column type {:?} ({} bytes) is not an offset column", self.ty, n),
        })
    }

    fn locate(&self, global: u64) -> Result<ClusterIndex> {
        eyre::ensure!(
            global < self.n,
            "element {} out of range for column with {} elements",
            global,
            self.n
        );
        let cluster = self.cluster_starts.partition_point(|&s| s <= global) - 1;
        Ok(ClusterIndex::new(
            cluster as u64,
            global - self.cluster_starts[cluster],
        ))
    }

    fn globalize(&self, at: ClusterIndex) -> Result<u64> {
        let cluster = at.cluster as usize;
        eyre::ensure!(
            cluster < self.cluster_starts.len(),
            "cluster {} does not exist",
            at.cluster
        );
        let global = self.cluster_starts[cluster] + at.index;
        eyre::ensure!(
            global < self.n,
            "element {} out of range for column with {} elements",
            global,
            self.n
        );
        Ok(global)
    }

    /// End of the cluster: the next boundary for sealed clusters, the current
    /// element count for the open one.
    fn cluster_end(&self, cluster: u64) -> u64 {
        self.cluster_starts
            .get(cluster as usize + 1)
            .copied()
            .unwrap_or(self.n)
    }
}

/// In-memory page sink and source over the same storage.
///
/// Shared as `Arc<Mutex<MemoryPages>>`; the same store may back one write
/// session and later read sessions.
#[derive(Debug, Default)]
pub struct MemoryPages {
    options: WriteOptions,
    descriptor: Descriptor,
    columns: Vec<MemColumn>,
    by_key: HashMap<(FieldId, u32), ColumnId>,
}

impl MemoryPages {
    pub fn new() -> Self {
        Self::with_options(WriteOptions::default())
    }

    pub fn with_options(options: WriteOptions) -> Self {
        Self {
            options,
            descriptor: Descriptor::default(),
            columns: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    fn column(&self, id: ColumnId) -> Result<&MemColumn> {
        self.columns
            .get(id as usize)
            .ok_or_else(|| eyre::eyre!("unknown column id {}", id))
    }

    /// Element count of a stored column, addressed by qualified field name
    /// and column position. Intended for storage-cost assertions in tests.
    pub fn column_elements(&self, field_name: &str, index: u32) -> Option<u64> {
        let fd = self.descriptor.lookup(field_name)?;
        let id = self.by_key.get(&(fd.id, index))?;
        Some(self.columns[*id as usize].n)
    }
}

impl PageSink for MemoryPages {
    fn options(&self) -> WriteOptions {
        self.options
    }

    fn create_field(
        &mut self,
        name: &str,
        type_name: &str,
        type_version: u32,
        parent: Option<FieldId>,
    ) -> Result<FieldId> {
        self.descriptor.add_field(name, type_name, type_version, parent)
    }

    fn create_column(
        &mut self,
        field: FieldId,
        index: u32,
        ty: ColumnType,
        _first_entry: EntryIndex,
    ) -> Result<ColumnId> {
        eyre::ensure!(
            !self.by_key.contains_key(&(field, index)),
            "column {} of field {} already exists",
            index,
            field
        );
        self.descriptor.add_column(field, ty)?;
        let id = self.columns.len() as ColumnId;
        self.columns.push(MemColumn {
            ty,
            data: Vec::new(),
            n: 0,
            cluster_starts: vec![0],
        });
        self.by_key.insert((field, index), id);
        Ok(id)
    }

    fn append(&mut self, column: ColumnId, element: &[u8]) -> Result<()> {
        let col = self
            .columns
            .get_mut(column as usize)
            .ok_or_else(|| eyre::eyre!("unknown column id {}", column))?;
        eyre::ensure!(
            element.len() == col.ty.packed_size(),
            "element size {} does not match {:?}",
            element.len(),
            col.ty
        );
        col.data.extend_from_slice(element);
        col.n += 1;
        Ok(())
    }

    fn commit_cluster(&mut self) -> Result<()> {
        for col in &mut self.columns {
            col.cluster_starts.push(col.n);
        }
        Ok(())
    }
}

impl PageSource for MemoryPages {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn open_column(&self, field: FieldId, index: u32, ty: ColumnType) -> Result<ColumnId> {
        let id = *self
            .by_key
            .get(&(field, index))
            .ok_or_else(|| eyre::eyre!("field {} has no column {}", field, index))?;
        let col = &self.columns[id as usize];
        eyre::ensure!(
            col.ty == ty,
            "column {} of field {} is stored as {:?}, not {:?}",
            index,
            field,
            col.ty,
            ty
        );
        Ok(id)
    }

    fn n_elements(&self, column: ColumnId) -> Result<u64> {
        Ok(self.column(column)?.n)
    }

    fn read(&self, column: ColumnId, global: u64, out: &mut [u8]) -> Result<()> {
        let bytes = self.column(column)?.element(global)?;
        out.copy_from_slice(bytes);
        Ok(())
    }

    fn read_range(
        &self,
        column: ColumnId,
        first: ClusterIndex,
        count: u64,
        out: &mut [u8],
    ) -> Result<u64> {
        let col = self.column(column)?;
        let g0 = col.globalize(first)?;
        let end = col.cluster_end(first.cluster);
        let n = count.min(end - g0);
        let size = col.ty.packed_size();
        let start = g0 as usize * size;
        let len = n as usize * size;
        out[..len].copy_from_slice(&col.data[start..start + len]);
        Ok(n)
    }

    fn locate(&self, column: ColumnId, global: u64) -> Result<ClusterIndex> {
        self.column(column)?.locate(global)
    }

    fn globalize(&self, column: ColumnId, at: ClusterIndex) -> Result<u64> {
        self.column(column)?.globalize(at)
    }

    fn collection_info(&self, column: ColumnId, global: u64) -> Result<(ClusterIndex, u64)> {
        let col = self.column(column)?;
        let at = col.locate(global)?;
        let end = col.read_index(global)?;
        let begin = if at.index == 0 {
            0
        } else {
            col.read_index(global - 1)?
        };
        eyre::ensure!(
            end >= begin,
            "offset column is not monotonic at element {} ({} < {})",
            global,
            end,
            begin
        );
        Ok((ClusterIndex::new(at.cluster, begin), end - begin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset_store() -> (MemoryPages, ColumnId) {
        let mut store = MemoryPages::new();
        let field = store.create_field("hits", "vec<f32>", 0, None).unwrap();
        let col = store
            .create_column(field, 0, ColumnType::Index64, 0)
            .unwrap();
        (store, col)
    }

    #[test]
    fn cluster_boundaries_partition_elements() {
        let (mut store, col) = offset_store();
        for v in [3u64, 3, 8] {
            store.append(col, &v.to_le_bytes()).unwrap();
        }
        store.commit_cluster().unwrap();
        for v in [2u64, 6] {
            store.append(col, &v.to_le_bytes()).unwrap();
        }

        assert_eq!(store.locate(col, 0).unwrap(), ClusterIndex::new(0, 0));
        assert_eq!(store.locate(col, 2).unwrap(), ClusterIndex::new(0, 2));
        assert_eq!(store.locate(col, 3).unwrap(), ClusterIndex::new(1, 0));
        assert_eq!(store.locate(col, 4).unwrap(), ClusterIndex::new(1, 1));

        assert_eq!(store.globalize(col, ClusterIndex::new(1, 1)).unwrap(), 4);
        assert!(store.locate(col, 5).is_err());
    }

    #[test]
    fn collection_info_restarts_at_cluster_boundaries() {
        let (mut store, col) = offset_store();
        // cluster 0: entry item counts 3, 0, 5
        for v in [3u64, 3, 8] {
            store.append(col, &v.to_le_bytes()).unwrap();
        }
        store.commit_cluster().unwrap();
        // cluster 1: entry item counts 2, 4
        for v in [2u64, 6] {
            store.append(col, &v.to_le_bytes()).unwrap();
        }

        let (start, size) = store.collection_info(col, 0).unwrap();
        assert_eq!((start, size), (ClusterIndex::new(0, 0), 3));
        let (start, size) = store.collection_info(col, 1).unwrap();
        assert_eq!((start, size), (ClusterIndex::new(0, 3), 0));
        let (start, size) = store.collection_info(col, 2).unwrap();
        assert_eq!((start, size), (ClusterIndex::new(0, 3), 5));
        // first entry of the new cluster starts from offset zero again
        let (start, size) = store.collection_info(col, 3).unwrap();
        assert_eq!((start, size), (ClusterIndex::new(1, 0), 2));
        let (start, size) = store.collection_info(col, 4).unwrap();
        assert_eq!((start, size), (ClusterIndex::new(1, 2), 4));
    }

    #[test]
    fn read_range_clamps_to_cluster_end() {
        let (mut store, col) = offset_store();
        for v in [1u64, 2, 3] {
            store.append(col, &v.to_le_bytes()).unwrap();
        }
        store.commit_cluster().unwrap();
        store.append(col, &9u64.to_le_bytes()).unwrap();

        let mut out = vec![0u8; 8 * 8];
        let n = store
            .read_range(col, ClusterIndex::new(0, 1), 8, &mut out)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(u64::from_le_bytes(out[0..8].try_into().unwrap()), 2);
        assert_eq!(u64::from_le_bytes(out[8..16].try_into().unwrap()), 3);
    }

    #[test]
    fn duplicate_field_registration_is_rejected() {
        let mut store = MemoryPages::new();
        store.create_field("x", "f64", 0, None).unwrap();
        assert!(store.create_field("x", "f64", 0, None).is_err());
    }
}
