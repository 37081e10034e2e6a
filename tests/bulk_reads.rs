//! Bulk read protocol: arena reuse and reset, required/available masks, and
//! the unconditional fast path for simple fields.

use coltree::{
    ClusterIndex, Datum, Field, LeafKind, MemoryPages, PageSink, SharedSink, SharedSource,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn store() -> Arc<Mutex<MemoryPages>> {
    Arc::new(Mutex::new(MemoryPages::new()))
}

/// 30 f64 entries (value = index as f64) in a single sealed cluster.
fn f64_store() -> (Arc<Mutex<MemoryPages>>, Field) {
    let st = store();
    let mut field = Field::leaf("e", LeafKind::F64).unwrap();
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();
    for i in 0..30 {
        let mut value = field.generate_value().unwrap();
        field
            .encode(value.as_mut(), &Datum::F64(i as f64))
            .unwrap();
        field.append(value.as_ref()).unwrap();
    }
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let mut reader = field.clone_renamed("e").unwrap();
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();
    (st, reader)
}

#[test]
fn simple_fields_fill_every_slot_regardless_of_the_mask() {
    let (_st, reader) = f64_store();
    let mut bulk = reader.generate_bulk();
    let mut mask = vec![false; 10];
    mask[3] = true;
    reader
        .read_bulk_into(&mut bulk, ClusterIndex::new(0, 10), 10, &mask)
        .unwrap();
    assert_eq!(bulk.n_valid(), 10);
    for i in 0..10 {
        assert!(bulk.is_valid(i));
        assert_eq!(
            reader.decode(bulk.value(i)).unwrap(),
            Datum::F64((10 + i) as f64)
        );
    }
}

#[test]
fn sub_ranges_reuse_the_arena_without_reset() {
    let (_st, reader) = f64_store();
    let mut bulk = reader.generate_bulk();
    let mask = vec![true; 10];
    reader
        .read_bulk_into(&mut bulk, ClusterIndex::new(0, 10), 10, &mask)
        .unwrap();
    let capacity = bulk.capacity();
    assert_eq!(bulk.first(), ClusterIndex::new(0, 10));
    assert_eq!(bulk.n_valid(), 10);

    // [12, 18) lies inside [10, 20): same arena, same masks, no reallocation
    reader
        .read_bulk_into(&mut bulk, ClusterIndex::new(0, 12), 6, &mask)
        .unwrap();
    assert_eq!(bulk.first(), ClusterIndex::new(0, 10));
    assert_eq!(bulk.size(), 10);
    assert_eq!(bulk.capacity(), capacity);
    assert_eq!(bulk.n_valid(), 10);
    assert_eq!(reader.decode(bulk.value(0)).unwrap(), Datum::F64(10.0));

    // [25, 30) is disjoint: full reset, masks invalidated and refilled
    reader
        .read_bulk_into(&mut bulk, ClusterIndex::new(0, 25), 5, &mask)
        .unwrap();
    assert_eq!(bulk.first(), ClusterIndex::new(0, 25));
    assert_eq!(bulk.size(), 5);
    assert_eq!(bulk.capacity(), capacity);
    assert_eq!(bulk.n_valid(), 5);
    assert_eq!(reader.decode(bulk.value(4)).unwrap(), Datum::F64(29.0));
}

#[test]
fn bulk_requests_past_the_cluster_end_fail() {
    let (_st, reader) = f64_store();
    let mut bulk = reader.generate_bulk();
    let mask = vec![true; 6];
    let err = reader
        .read_bulk_into(&mut bulk, ClusterIndex::new(0, 28), 6, &mask)
        .unwrap_err();
    assert!(err.to_string().contains("past the cluster end"));
}

#[test]
fn composite_bulks_materialize_only_required_slots() {
    let st = store();
    let mut field = Field::record(
        "r",
        "Pair",
        vec![
            Field::leaf("a", LeafKind::I32).unwrap(),
            Field::leaf("b", LeafKind::F64).unwrap(),
        ],
    )
    .unwrap();
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();
    for i in 0..8 {
        let mut value = field.generate_value().unwrap();
        field
            .encode(
                value.as_mut(),
                &Datum::Record(vec![Datum::I32(i), Datum::F64(i as f64 / 2.0)]),
            )
            .unwrap();
        field.append(value.as_ref()).unwrap();
    }
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let mut reader = field.clone_renamed("r").unwrap();
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();

    let mut bulk = reader.generate_bulk();
    let first_pass = vec![true, false, true, false, true, false, true, false];
    reader
        .read_bulk_into(&mut bulk, ClusterIndex::new(0, 0), 8, &first_pass)
        .unwrap();
    assert_eq!(bulk.n_valid(), 4);
    assert!(bulk.is_valid(0));
    assert!(!bulk.is_valid(1));
    assert_eq!(
        reader.decode(bulk.value(2)).unwrap(),
        Datum::Record(vec![Datum::I32(2), Datum::F64(1.0)])
    );

    // a second pass over the same range fills only what is still missing
    let second_pass = vec![true; 8];
    reader
        .read_bulk_into(&mut bulk, ClusterIndex::new(0, 0), 8, &second_pass)
        .unwrap();
    assert_eq!(bulk.n_valid(), 8);
    assert_eq!(
        reader.decode(bulk.value(7)).unwrap(),
        Datum::Record(vec![Datum::I32(7), Datum::F64(3.5)])
    );
}

#[test]
fn read_callbacks_demote_the_unconditional_fast_path() {
    let st = store();
    let mut field = Field::leaf("x", LeafKind::I32).unwrap();
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();
    for i in 0..6 {
        let mut value = field.generate_value().unwrap();
        field.encode(value.as_mut(), &Datum::I32(i)).unwrap();
        field.append(value.as_ref()).unwrap();
    }
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let mut reader = field.clone_renamed("x").unwrap();
    reader.add_read_callback(Box::new(|v| {
        let raw = i32::from_le_bytes([v.slot[0], v.slot[1], v.slot[2], v.slot[3]]);
        v.slot.copy_from_slice(&(raw + 100).to_le_bytes());
    }));
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();

    let mut bulk = reader.generate_bulk();
    let mask = vec![true, false, true, false, true, false];
    reader
        .read_bulk_into(&mut bulk, ClusterIndex::new(0, 0), 6, &mask)
        .unwrap();
    // with a callback the mask is honored slot by slot
    assert_eq!(bulk.n_valid(), 3);
    assert!(!bulk.is_valid(1));
    assert_eq!(reader.decode(bulk.value(2)).unwrap(), Datum::I32(102));
}

#[test]
fn vector_bulks_accumulate_heap_payloads() {
    let st = store();
    let mut field = Field::vector("v", Field::leaf("x", LeafKind::I32).unwrap()).unwrap();
    let sink: SharedSink = st.clone();
    field.connect_page_sink(&sink, 0).unwrap();
    for i in 0..5i32 {
        let items: Vec<Datum> = (0..i).map(Datum::I32).collect();
        let mut value = field.generate_value().unwrap();
        field.encode(value.as_mut(), &Datum::Vector(items)).unwrap();
        field.append(value.as_ref()).unwrap();
    }
    st.lock().commit_cluster().unwrap();
    field.commit_cluster();

    let mut reader = field.clone_renamed("v").unwrap();
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();

    let mut bulk = reader.generate_bulk();
    let mask = vec![true; 5];
    reader
        .read_bulk_into(&mut bulk, ClusterIndex::new(0, 0), 5, &mask)
        .unwrap();
    assert_eq!(bulk.n_valid(), 5);
    for i in 0..5 {
        let expected = Datum::Vector((0..i as i32).map(Datum::I32).collect());
        assert_eq!(reader.decode(bulk.value(i)).unwrap(), expected);
    }
}
