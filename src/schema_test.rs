use super::*;
use crate::value::ValueType;

fn spec(name: &str, vtype: ValueType) -> ColumnSpec {
    ColumnSpec::new(name, vtype)
}

#[test]
fn test_fixed_layout_offsets() {
    let schema = TupleSchema::new(
        vec![
            spec("a", ValueType::TinyInt),
            spec("b", ValueType::Integer),
            spec("c", ValueType::BigInt),
            spec("d", ValueType::Decimal),
        ],
        vec![],
    )
    .unwrap();

    assert_eq!(schema.count_visible(), 4);
    assert_eq!(schema.column(0).offset, 0);
    assert_eq!(schema.column(1).offset, 1);
    assert_eq!(schema.column(2).offset, 5);
    assert_eq!(schema.column(3).offset, 13);
    assert_eq!(schema.tuple_length(), 29);
    assert_eq!(schema.row_bytes(), 30); // one status header byte
    assert!(schema.uninlined_columns().is_empty());
}

#[test]
fn test_varchar_inline_decision() {
    let schema = TupleSchema::new(
        vec![
            ColumnSpec::new_varchar("small", 15, false), // 60 bytes max, inline
            ColumnSpec::new_varchar("big", 32, false),   // 128 bytes max, heap
            ColumnSpec::new_varchar("bytes", 64, true),  // 64 bytes max, inline
            ColumnSpec::new_varbinary("bin", 100),       // heap
        ],
        vec![],
    )
    .unwrap();

    assert!(schema.column(0).inlined);
    assert_eq!(schema.column(0).size, 61); // length prefix + payload
    assert!(!schema.column(1).inlined);
    assert_eq!(schema.column(1).size, UNINLINED_SLOT_WIDTH);
    assert!(schema.column(2).inlined);
    assert_eq!(schema.column(2).size, 65);
    assert!(!schema.column(3).inlined);
    assert_eq!(schema.uninlined_columns(), &[1, 3]);
}

#[test]
fn test_hidden_columns_follow_visible() {
    let schema = TupleSchema::new(
        vec![spec("a", ValueType::BigInt)],
        vec![spec("dr_ts", ValueType::Timestamp)],
    )
    .unwrap();

    assert_eq!(schema.count_visible(), 1);
    assert_eq!(schema.count_all(), 2);
    assert_eq!(schema.column(1).offset, 8);
    assert_eq!(schema.tuple_length(), 16);
}

#[test]
fn test_key_schema_headerless() {
    let schema = TupleSchema::new_key(vec![
        spec("k0", ValueType::Integer),
        ColumnSpec::new_varchar("k1", 8, true),
    ])
    .unwrap();

    assert!(schema.is_headerless());
    assert_eq!(schema.row_bytes(), schema.tuple_length());
    assert!(schema.uninlined_columns().is_empty());

    // keys refuse columns that would need out-of-line storage.
    assert!(TupleSchema::new_key(vec![ColumnSpec::new_varchar("wide", 64, false)]).is_err());
}

#[test]
fn test_compatible() {
    let a = TupleSchema::new(
        vec![spec("x", ValueType::BigInt), ColumnSpec::new_varchar("y", 8, true)],
        vec![],
    )
    .unwrap();
    let b = TupleSchema::new(
        vec![spec("p", ValueType::BigInt), ColumnSpec::new_varchar("q", 8, true)],
        vec![spec("h", ValueType::Timestamp)],
    )
    .unwrap();
    let c = TupleSchema::new(
        vec![spec("x", ValueType::BigInt), ColumnSpec::new_varchar("y", 9, true)],
        vec![],
    )
    .unwrap();

    // names and hidden columns do not matter, types and widths do.
    assert!(a.compatible(&b));
    assert!(!a.compatible(&c));
}
