use std::sync::Arc;

use super::*;
use crate::{
    schema::{ColumnSpec, TupleSchema},
    tuple::OwnedTuple,
    value::ValueType,
};

fn schema() -> Arc<TupleSchema> {
    TupleSchema::new(
        vec![
            ColumnSpec::new("a", ValueType::Integer),
            ColumnSpec::new_varchar("b", 16, true),
            ColumnSpec::new("c", ValueType::Double),
            ColumnSpec::new_varchar("d", 100, true), // uninlined
        ],
        vec![ColumnSpec::new("h", ValueType::BigInt)],
    )
    .unwrap()
}

fn sample_row(schema: &Arc<TupleSchema>) -> OwnedTuple {
    let mut row = OwnedTuple::new(Arc::clone(schema)).unwrap();
    row.set_value(0, &Value::Integer(12)).unwrap();
    row.set_value(1, &Value::varchar("inline str")).unwrap();
    row.set_value(2, &Value::Double(-1.5)).unwrap();
    row.set_value(3, &Value::varchar("a heap resident payload here")).unwrap();
    row.set_value(4, &Value::BigInt(777)).unwrap();
    row
}

#[test]
fn test_network_round_trip() {
    let schema = schema();
    let row = sample_row(&schema);

    let mut buf = vec![];
    serialize_tuple_be(&row.as_tuple(), &mut buf).unwrap();

    let mut back = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    let mut off = 0;
    deserialize_tuple_be(&buf, &mut off, &mut back.as_mut()).unwrap();
    assert_eq!(off, buf.len());

    // network format carries visible columns only.
    assert!(row.as_tuple().equals(&back.as_tuple()).unwrap());
    assert!(back.value(4).unwrap().is_null());
}

#[test]
fn test_network_nulls() {
    let schema = schema();
    let row = OwnedTuple::new(Arc::clone(&schema)).unwrap();

    let mut buf = vec![];
    serialize_tuple_be(&row.as_tuple(), &mut buf).unwrap();

    let mut back = sample_row(&schema);
    let mut off = 0;
    deserialize_tuple_be(&buf, &mut off, &mut back.as_mut()).unwrap();
    for i in 0..schema.count_visible() {
        assert!(back.value(i).unwrap().is_null(), "column {}", i);
    }
}

#[test]
fn test_replication_round_trip() {
    let schema = schema();
    let mut row = sample_row(&schema);
    row.set_value(1, &Value::Null(ValueType::Varchar)).unwrap();

    let mut buf = vec![];
    serialize_tuple_le(&row.as_tuple(), &mut buf).unwrap();

    let mut back = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    let mut off = 0;
    deserialize_tuple_le(&buf, &mut off, &mut back.as_mut()).unwrap();
    assert_eq!(off, buf.len());

    // replication format carries hidden columns too.
    assert!(row.as_tuple().equals_with_hidden(&back.as_tuple()).unwrap());
    assert_eq!(back.value(4).unwrap(), Value::BigInt(777));
}

#[test]
fn test_wire_length_prefix() {
    let schema = schema();
    let row = sample_row(&schema);

    let mut buf = vec![];
    serialize_tuple_be(&row.as_tuple(), &mut buf).unwrap();
    let mut off = 0;
    let len = crate::util::read_i32_be(&buf, &mut off).unwrap();
    assert_eq!(len as usize, buf.len() - 4);
}

#[test]
fn test_wire_truncation_detected() {
    let schema = schema();
    let row = sample_row(&schema);

    let mut buf = vec![];
    serialize_tuple_be(&row.as_tuple(), &mut buf).unwrap();
    buf.truncate(buf.len() - 3);

    let mut back = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    let mut off = 0;
    assert!(deserialize_tuple_be(&buf, &mut off, &mut back.as_mut()).is_err());
}
