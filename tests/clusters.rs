//! Cluster-boundary behavior: running offset counters reset per cluster,
//! derived cardinalities, and reads that cross commit points.

use coltree::{
    Datum, Field, LeafKind, MemoryPages, PageSink, PageSource, SharedSink, SharedSource,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn store() -> Arc<Mutex<MemoryPages>> {
    Arc::new(Mutex::new(MemoryPages::new()))
}

fn append_row(field: &mut Field, row: &Datum) {
    let mut value = field.generate_value().unwrap();
    field.encode(value.as_mut(), row).unwrap();
    field.append(value.as_ref()).unwrap();
}

fn vec_row(items: &[i32]) -> Datum {
    Datum::Vector(items.iter().copied().map(Datum::I32).collect())
}

/// Writes vectors with item counts [3, 0, 5] in cluster 0 and [2, 4] in
/// cluster 1.
fn two_cluster_vectors(st: &Arc<Mutex<MemoryPages>>) -> Field {
    let mut field = Field::vector("hits", Field::leaf("x", LeafKind::I32).unwrap()).unwrap();
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();

    append_row(&mut field, &vec_row(&[1, 2, 3]));
    append_row(&mut field, &vec_row(&[]));
    append_row(&mut field, &vec_row(&[4, 5, 6, 7, 8]));
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    append_row(&mut field, &vec_row(&[9, 10]));
    append_row(&mut field, &vec_row(&[11, 12, 13, 14]));
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    field
}

#[test]
fn offsets_stay_monotonic_and_sum_to_items_per_cluster() {
    let st = store();
    let field = two_cluster_vectors(&st);

    // item column holds 8 elements in cluster 0 and 6 in cluster 1
    assert_eq!(st.lock().column_elements("hits._0", 0), Some(14));

    let mut reader = field.clone_renamed("hits").unwrap();
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();

    let expected = [
        vec![1, 2, 3],
        vec![],
        vec![4, 5, 6, 7, 8],
        vec![9, 10],
        vec![11, 12, 13, 14],
    ];
    let mut per_cluster_items = [0u64; 2];
    for (i, items) in expected.iter().enumerate() {
        let mut value = reader.generate_value().unwrap();
        reader.read(i as u64, value.as_mut()).unwrap();
        assert_eq!(reader.decode(value.as_ref()).unwrap(), vec_row(items));
        per_cluster_items[if i < 3 { 0 } else { 1 }] += items.len() as u64;
    }
    assert_eq!(per_cluster_items, [8, 6]);
}

#[test]
fn cardinality_matches_single_reads_and_bulk_reads() {
    let st = store();
    let mut field = Field::vector("hits", Field::leaf("x", LeafKind::I32).unwrap()).unwrap();
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();
    for items in [&[1, 2, 3][..], &[][..], &[4, 5, 6, 7, 8][..], &[9, 10][..]] {
        append_row(&mut field, &vec_row(items));
    }
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let mut card = Field::cardinality64("n_hits", "hits").unwrap();
    let source: SharedSource = st.clone();
    card.connect_page_source(&source).unwrap();

    // single reads
    let mut singles = Vec::new();
    for i in 0..4 {
        let mut value = card.generate_value().unwrap();
        card.read(i, value.as_mut()).unwrap();
        singles.push(card.decode(value.as_ref()).unwrap());
    }
    assert_eq!(
        singles,
        vec![Datum::U64(3), Datum::U64(0), Datum::U64(5), Datum::U64(2)]
    );

    // one bulk read spanning all four indices
    let mut bulk = card.generate_bulk();
    let mask = vec![true; 4];
    card.read_bulk_into(&mut bulk, coltree::ClusterIndex::new(0, 0), 4, &mask)
        .unwrap();
    assert_eq!(bulk.n_valid(), 4);
    let got: Vec<Datum> = (0..4).map(|i| card.decode(bulk.value(i)).unwrap()).collect();
    assert_eq!(got, singles);
}

#[test]
fn narrow_cardinality_reads_the_same_counts() {
    let st = store();
    let field = two_cluster_vectors(&st);
    drop(field);

    let mut card = Field::cardinality32("n", "hits").unwrap();
    let source: SharedSource = st.clone();
    card.connect_page_source(&source).unwrap();
    let mut value = card.generate_value().unwrap();
    card.read(2, value.as_mut()).unwrap();
    assert_eq!(card.decode(value.as_ref()).unwrap(), Datum::U32(5));
    // entry 3 is the first of cluster 1; its count restarts from offset zero
    card.read(3, value.as_mut()).unwrap();
    assert_eq!(card.decode(value.as_ref()).unwrap(), Datum::U32(2));
}

#[test]
fn strings_written_across_clusters_read_back() {
    let st = store();
    let mut field = Field::string("name").unwrap();
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();

    for s in ["alpha", "beta"] {
        append_row(&mut field, &Datum::Str(s.to_string()));
    }
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();
    for s in ["gamma", ""] {
        append_row(&mut field, &Datum::Str(s.to_string()));
    }
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let mut reader = field.clone_renamed("name").unwrap();
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();
    for (i, s) in ["alpha", "beta", "gamma", ""].iter().enumerate() {
        let mut value = reader.generate_value().unwrap();
        reader.read(i as u64, value.as_mut()).unwrap();
        assert_eq!(
            reader.decode(value.as_ref()).unwrap(),
            Datum::Str(s.to_string())
        );
    }
}

#[test]
fn variant_arm_counters_restart_per_cluster() {
    let st = store();
    let mut field = Field::variant(
        "u",
        vec![
            Field::leaf("a", LeafKind::I32).unwrap(),
            Field::leaf("b", LeafKind::F64).unwrap(),
        ],
    )
    .unwrap();
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();

    let rows = [
        Datum::Variant {
            tag: 1,
            value: Box::new(Datum::I32(1)),
        },
        Datum::Variant {
            tag: 2,
            value: Box::new(Datum::F64(0.5)),
        },
    ];
    for row in &rows {
        append_row(&mut field, row);
    }
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let later = [
        Datum::Variant {
            tag: 2,
            value: Box::new(Datum::F64(1.5)),
        },
        Datum::Variant {
            tag: 1,
            value: Box::new(Datum::I32(2)),
        },
    ];
    for row in &later {
        append_row(&mut field, row);
    }
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let mut reader = field.clone_renamed("u").unwrap();
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();
    for (i, expected) in rows.iter().chain(later.iter()).enumerate() {
        let mut value = reader.generate_value().unwrap();
        reader.read(i as u64, value.as_mut()).unwrap();
        assert_eq!(&reader.decode(value.as_ref()).unwrap(), expected);
    }
}

#[test]
fn nullable_sparse_counters_restart_per_cluster() {
    let st = store();
    let mut field = Field::nullable("opt", Field::leaf("x", LeafKind::F64).unwrap()).unwrap();
    assert!(field.is_sparse());
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();

    let present = |v: f64| Datum::Optional(Some(Box::new(Datum::F64(v))));
    let absent = Datum::Optional(None);

    append_row(&mut field, &present(1.0));
    append_row(&mut field, &absent.clone());
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();
    append_row(&mut field, &present(2.0));
    append_row(&mut field, &present(3.0));
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let mut reader = field.clone_renamed("opt").unwrap();
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();
    let expected = [present(1.0), absent, present(2.0), present(3.0)];
    for (i, e) in expected.iter().enumerate() {
        let mut value = reader.generate_value().unwrap();
        reader.read(i as u64, value.as_mut()).unwrap();
        assert_eq!(&reader.decode(value.as_ref()).unwrap(), e);
    }

    // item lookup reports the invalid sentinel for the absent entry
    assert!(!reader.item_index(1).unwrap().is_valid());
    assert!(reader.item_index(3).unwrap().is_valid());
}

#[test]
fn descriptor_registers_the_whole_subtree() {
    let st = store();
    let mut field = Field::record(
        "event",
        "Event",
        vec![
            Field::leaf("id", LeafKind::I64).unwrap(),
            Field::vector("hits", Field::leaf("x", LeafKind::F32).unwrap()).unwrap(),
        ],
    )
    .unwrap();
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();

    let guard = st.lock();
    let desc = PageSource::descriptor(&*guard);
    assert!(desc.lookup("event").is_some());
    assert!(desc.lookup("event.id").is_some());
    assert!(desc.lookup("event.hits").is_some());
    assert!(desc.lookup("event.hits._0").is_some());
    let parent = desc.lookup("event.hits._0").unwrap().parent;
    assert_eq!(parent, Some(desc.lookup("event.hits").unwrap().id));
}
