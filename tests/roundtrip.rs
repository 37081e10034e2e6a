//! End-to-end round-trip tests: every field kind written through a page sink
//! and read back through a page source over the same store.

use coltree::{
    build_field, ColumnType, Datum, Field, LeafKind, MapRegistry, MemberInfo, MemoryPages,
    PageSink, PageSource, SharedSink, SharedSource, TypeInfo, TypeKind, WriteOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn store() -> Arc<Mutex<MemoryPages>> {
    Arc::new(Mutex::new(MemoryPages::new()))
}

/// Connects, appends one value per literal, and seals the cluster.
fn write_all(field: &mut Field, store: &Arc<Mutex<MemoryPages>>, rows: &[Datum]) {
    let sink: SharedSink = store.clone();
    field.connect_page_sink(&sink, 0).unwrap();
    for row in rows {
        let mut value = field.generate_value().unwrap();
        field.encode(value.as_mut(), row).unwrap();
        field.append(value.as_ref()).unwrap();
    }
    store.lock().commit_cluster().unwrap();
    field.commit_cluster();
}

/// Clones the template, connects it to the store as a source, and decodes
/// the first `n` entries.
fn read_back(template: &Field, store: &Arc<Mutex<MemoryPages>>, n: usize) -> Vec<Datum> {
    let mut reader = template.clone_renamed(template.name()).unwrap();
    let source: SharedSource = store.clone();
    reader.connect_page_source(&source).unwrap();
    (0..n)
        .map(|i| {
            let mut value = reader.generate_value().unwrap();
            reader.read(i as u64, value.as_mut()).unwrap();
            reader.decode(value.as_ref()).unwrap()
        })
        .collect()
}

fn round_trip(field: &mut Field, rows: Vec<Datum>) {
    let st = store();
    write_all(field, &st, &rows);
    assert_eq!(read_back(field, &st, rows.len()), rows);
}

#[test]
fn leaf_scalars_round_trip() {
    round_trip(
        &mut Field::leaf("x", LeafKind::F64).unwrap(),
        vec![Datum::F64(1.5), Datum::F64(-2.25), Datum::F64(0.0)],
    );
    round_trip(
        &mut Field::leaf("n", LeafKind::I32).unwrap(),
        vec![Datum::I32(-40), Datum::I32(0), Datum::I32(i32::MAX)],
    );
    round_trip(
        &mut Field::leaf("b", LeafKind::Bool).unwrap(),
        vec![Datum::Bool(true), Datum::Bool(false)],
    );
    round_trip(
        &mut Field::leaf("u", LeafKind::U64).unwrap(),
        vec![Datum::U64(u64::MAX), Datum::U64(7)],
    );
    round_trip(
        &mut Field::leaf("s", LeafKind::I8).unwrap(),
        vec![Datum::I8(-128), Datum::I8(127)],
    );
}

#[test]
fn strings_round_trip_including_empty() {
    round_trip(
        &mut Field::string("tag").unwrap(),
        vec![
            Datum::Str("electron".to_string()),
            Datum::Str(String::new()),
            Datum::Str("µ±".to_string()),
        ],
    );
}

#[test]
fn nested_records_round_trip() {
    let point = |name: &str| {
        Field::record(
            name,
            "Point",
            vec![
                Field::leaf("x", LeafKind::F64).unwrap(),
                Field::leaf("y", LeafKind::F64).unwrap(),
            ],
        )
        .unwrap()
    };
    let mut field = Field::record(
        "track",
        "Track",
        vec![
            point("origin"),
            Field::leaf("charge", LeafKind::I8).unwrap(),
            Field::vector("momenta", point("p")).unwrap(),
        ],
    )
    .unwrap();

    let p = |x: f64, y: f64| Datum::Record(vec![Datum::F64(x), Datum::F64(y)]);
    round_trip(
        &mut field,
        vec![
            Datum::Record(vec![
                p(0.0, 0.5),
                Datum::I8(-1),
                Datum::Vector(vec![p(1.0, 2.0), p(3.0, 4.0)]),
            ]),
            Datum::Record(vec![p(9.0, 9.5), Datum::I8(1), Datum::Vector(vec![])]),
        ],
    );
}

#[test]
fn vectors_of_vectors_round_trip() {
    let inner = Field::vector("_0", Field::leaf("x", LeafKind::I32).unwrap()).unwrap();
    let mut field = Field::vector("vv", inner).unwrap();
    let row = |items: Vec<Vec<i32>>| {
        Datum::Vector(
            items
                .into_iter()
                .map(|v| Datum::Vector(v.into_iter().map(Datum::I32).collect()))
                .collect(),
        )
    };
    round_trip(
        &mut field,
        vec![
            row(vec![vec![1, 2], vec![], vec![3]]),
            row(vec![]),
            row(vec![vec![4, 5, 6]]),
        ],
    );
}

#[test]
fn fixed_arrays_round_trip() {
    let mut field = Field::array("a", Field::leaf("x", LeafKind::F32).unwrap(), 4).unwrap();
    assert_eq!(field.value_size(), 16);
    let row = |v: [f32; 4]| Datum::Array(v.iter().copied().map(Datum::F32).collect());
    round_trip(
        &mut field,
        vec![row([1.0, 2.0, 3.0, 4.0]), row([0.0, -1.0, 0.5, 9.0])],
    );
}

#[test]
fn nullable_dense_and_sparse_read_identically() {
    let rows = vec![
        Datum::Optional(Some(Box::new(Datum::I32(11)))),
        Datum::Optional(None),
        Datum::Optional(Some(Box::new(Datum::I32(22)))),
    ];

    for sparse in [false, true] {
        let st = store();
        let mut field = Field::nullable("opt", Field::leaf("x", LeafKind::I32).unwrap()).unwrap();
        if sparse {
            field.set_sparse().unwrap();
        } else {
            field.set_dense().unwrap();
        }
        write_all(&mut field, &st, &rows);
        assert_eq!(read_back(&field, &st, rows.len()), rows);

        // Storage cost differs: dense pays an item slot per entry, sparse
        // only per present value.
        let item_elements = st.lock().column_elements("opt._0", 0).unwrap();
        if sparse {
            assert_eq!(item_elements, 2);
        } else {
            assert_eq!(item_elements, 3);
        }
    }
}

#[test]
fn variant_tags_survive_interleaved_appends() {
    let st = store();
    let mut field = Field::variant(
        "u",
        vec![
            Field::leaf("i", LeafKind::I32).unwrap(),
            Field::leaf("q", LeafKind::I64).unwrap(),
            Field::leaf("f", LeafKind::F64).unwrap(),
        ],
    )
    .unwrap();
    let rows = vec![
        Datum::Variant {
            tag: 2,
            value: Box::new(Datum::I64(42)),
        },
        Datum::Variant {
            tag: 1,
            value: Box::new(Datum::I32(-3)),
        },
        Datum::Variant {
            tag: 3,
            value: Box::new(Datum::F64(0.125)),
        },
        Datum::Variant {
            tag: 2,
            value: Box::new(Datum::I64(-42)),
        },
    ];
    write_all(&mut field, &st, &rows);

    let got = read_back(&field, &st, rows.len());
    assert_eq!(got, rows);
    // the first entry's tag in particular is intact after later appends
    assert_eq!(
        got[0],
        Datum::Variant {
            tag: 2,
            value: Box::new(Datum::I64(42)),
        }
    );
}

#[test]
fn bitsets_round_trip() {
    let mut field = Field::bitset("mask", 70).unwrap();
    let mut bits = vec![false; 70];
    for i in [0usize, 1, 63, 64, 69] {
        bits[i] = true;
    }
    round_trip(&mut field, vec![Datum::Bitset(bits.clone())]);
}

#[test]
fn enums_atomics_and_sets_round_trip() {
    round_trip(
        &mut Field::enumeration("color", "Color", Field::leaf("_0", LeafKind::I32).unwrap())
            .unwrap(),
        vec![Datum::I32(0), Datum::I32(2), Datum::I32(1)],
    );
    round_trip(
        &mut Field::atomic("counter", Field::leaf("_0", LeafKind::U32).unwrap()).unwrap(),
        vec![Datum::U32(5), Datum::U32(6)],
    );
    round_trip(
        &mut Field::set("ids", Field::leaf("_0", LeafKind::U16).unwrap()).unwrap(),
        vec![
            Datum::Set(vec![Datum::U16(1), Datum::U16(5), Datum::U16(9)]),
            Datum::Set(vec![]),
        ],
    );
}

#[test]
fn registry_built_records_round_trip() {
    let mut reg = MapRegistry::new();
    reg.register(TypeInfo {
        name: "Hit".to_string(),
        version: 3,
        kind: TypeKind::Struct,
        members: vec![
            MemberInfo::new("channel", "u32"),
            MemberInfo::new("adc", "vec<u16>"),
            MemberInfo::new("label", "string"),
        ],
    });

    let mut field = build_field("hit", "Hit", &reg).unwrap();
    assert_eq!(field.type_version(), 3);

    let rows = vec![
        Datum::Record(vec![
            Datum::U32(7),
            Datum::Vector(vec![Datum::U16(100), Datum::U16(101)]),
            Datum::Str("near".to_string()),
        ]),
        Datum::Record(vec![
            Datum::U32(8),
            Datum::Vector(vec![]),
            Datum::Str("far".to_string()),
        ]),
    ];
    let st = store();
    write_all(&mut field, &st, &rows);
    assert_eq!(read_back(&field, &st, rows.len()), rows);

    // the stored type version is visible after connecting the reader
    let mut reader = field.clone_renamed("hit").unwrap();
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();
    assert_eq!(reader.on_disk_type_version(), Some(3));
}

#[test]
fn split_encodings_downgrade_per_write_options() {
    let st = Arc::new(Mutex::new(MemoryPages::with_options(WriteOptions {
        split_encoding: false,
    })));
    let mut field = Field::leaf("e", LeafKind::F64).unwrap();
    write_all(&mut field, &st, &[Datum::F64(3.5), Datum::F64(-1.0)]);

    {
        let guard = st.lock();
        let desc = PageSource::descriptor(&*guard);
        assert_eq!(
            desc.lookup("e").unwrap().column_types,
            vec![ColumnType::Real64]
        );
    }

    assert_eq!(
        read_back(&field, &st, 2),
        vec![Datum::F64(3.5), Datum::F64(-1.0)]
    );
}

#[test]
fn wide_fields_read_narrow_stored_columns() {
    let st = store();
    let mut writer = Field::leaf("n", LeafKind::I32).unwrap();
    write_all(&mut writer, &st, &[Datum::I32(-9), Datum::I32(512)]);

    let mut reader = Field::leaf("n", LeafKind::I64).unwrap();
    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();
    let mut value = reader.generate_value().unwrap();
    reader.read(0, value.as_mut()).unwrap();
    assert_eq!(reader.decode(value.as_ref()).unwrap(), Datum::I64(-9));
    reader.read(1, value.as_mut()).unwrap();
    assert_eq!(reader.decode(value.as_ref()).unwrap(), Datum::I64(512));
}

#[test]
fn incompatible_stored_columns_are_a_schema_error() {
    let st = store();
    let mut writer = Field::leaf("x", LeafKind::F64).unwrap();
    write_all(&mut writer, &st, &[Datum::F64(1.0)]);

    let mut reader = Field::string("x").unwrap();
    let source: SharedSource = st.clone();
    let err = reader.connect_page_source(&source).unwrap_err();
    assert!(err.to_string().contains("schema mismatch"));
}

#[test]
fn missing_on_disk_fields_are_reported_by_name() {
    let st = store();
    let mut writer = Field::leaf("x", LeafKind::F64).unwrap();
    write_all(&mut writer, &st, &[Datum::F64(1.0)]);

    let mut reader = Field::leaf("y", LeafKind::F64).unwrap();
    let source: SharedSource = st.clone();
    let err = reader.connect_page_source(&source).unwrap_err();
    assert!(err.to_string().contains("no on-disk field named 'y'"));
}

#[test]
fn read_callbacks_observe_and_rewrite_values() {
    let st = store();
    let mut writer = Field::leaf("x", LeafKind::I32).unwrap();
    write_all(&mut writer, &st, &[Datum::I32(10), Datum::I32(20)]);

    let mut reader = Field::leaf("x", LeafKind::I32).unwrap();
    reader.add_read_callback(Box::new(|v| {
        // schema-evolution style fix-up: negate on read
        let raw = i32::from_le_bytes([v.slot[0], v.slot[1], v.slot[2], v.slot[3]]);
        v.slot.copy_from_slice(&(-raw).to_le_bytes());
    }));
    assert!(!reader.is_simple());

    let source: SharedSource = st.clone();
    reader.connect_page_source(&source).unwrap();
    let mut value = reader.generate_value().unwrap();
    reader.read(0, value.as_mut()).unwrap();
    assert_eq!(reader.decode(value.as_ref()).unwrap(), Datum::I32(-10));
    reader.read(1, value.as_mut()).unwrap();
    assert_eq!(reader.decode(value.as_ref()).unwrap(), Datum::I32(-20));
}

#[test]
fn proxied_collections_round_trip_with_both_strategies() {
    use coltree::IterStrategy;

    let rows = vec![
        Datum::Vector(vec![Datum::F32(1.0), Datum::F32(2.0)]),
        Datum::Vector(vec![]),
        Datum::Vector(vec![Datum::F32(-4.5)]),
    ];

    // contiguous stride fast path
    let st = store();
    let mut field = Field::proxied(
        "samples",
        "Samples",
        Field::leaf("_0", LeafKind::F32).unwrap(),
        IterStrategy::Contiguous,
    )
    .unwrap();
    write_all(&mut field, &st, &rows);
    assert_eq!(read_back(&field, &st, rows.len()), rows);

    // cursor fallback through the adapter
    let st = store();
    let mut field = Field::proxied(
        "samples",
        "Samples",
        Field::leaf("_0", LeafKind::F32).unwrap(),
        IterStrategy::Cursor(Arc::new(coltree::field::StridedCursor { stride: 4 })),
    )
    .unwrap();
    write_all(&mut field, &st, &rows);
    assert_eq!(read_back(&field, &st, rows.len()), rows);
}
