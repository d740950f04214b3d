use std::sync::Arc;

use super::*;
use crate::{
    schema::{ColumnSpec, TupleSchema},
    tuple::OwnedTuple,
    value::{Value, ValueType},
};

fn schema() -> Arc<TupleSchema> {
    TupleSchema::new(
        vec![
            ColumnSpec::new("a", ValueType::BigInt),
            ColumnSpec::new_varchar("b", 8, true),
        ],
        vec![],
    )
    .unwrap()
}

#[test]
fn test_append_and_drain() {
    let schema = schema();
    let mut stream = StreamedTable::new("export", Arc::clone(&schema));

    let mut row = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    row.set_value(0, &Value::BigInt(1)).unwrap();
    row.set_value(1, &Value::varchar("x")).unwrap();

    stream.append_tuple(&row.as_tuple()).unwrap();
    stream.append_tuple(&row.as_tuple()).unwrap();
    assert_eq!(stream.len(), 2);
    assert!(stream.bytes() > 0);

    let drained = stream.drain();
    assert!(!drained.is_empty());
    assert_eq!(stream.len(), 0);
    assert_eq!(stream.bytes(), 0);

    // two identical wire tuples back to back.
    let mut off = 0;
    let mut back = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    crate::tuple::deserialize_tuple_be(&drained, &mut off, &mut back.as_mut()).unwrap();
    assert!(back.as_tuple().equals(&row.as_tuple()).unwrap());
    crate::tuple::deserialize_tuple_be(&drained, &mut off, &mut back.as_mut()).unwrap();
    assert_eq!(off, drained.len());
}

#[test]
fn test_append_record_le() {
    let schema = schema();
    let mut stream = StreamedTable::new("dr", Arc::clone(&schema));

    let row = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    stream.append_record(7, &row.as_tuple()).unwrap();

    let drained = stream.drain();
    assert_eq!(drained[0], 7); // op byte leads
    let mut off = 1;
    let mut back = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    crate::tuple::deserialize_tuple_le(&drained, &mut off, &mut back.as_mut()).unwrap();
    assert_eq!(off, drained.len());
}
