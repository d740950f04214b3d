use super::*;
use crate::{
    schema::{ColumnSpec, TupleSchema},
    value::ValueType,
    Error,
};

fn mixed_schema() -> Arc<TupleSchema> {
    TupleSchema::new(
        vec![
            ColumnSpec::new("id", ValueType::BigInt),
            ColumnSpec::new_varchar("tag", 4, true), // inline
            ColumnSpec::new_varchar("body", 200, true), // heap
            ColumnSpec::new("score", ValueType::Double),
        ],
        vec![ColumnSpec::new("dr_ts", ValueType::Timestamp)],
    )
    .unwrap()
}

#[test]
fn test_row_id() {
    let id = RowId::new(7, 42);
    assert_eq!(id.block(), 7);
    assert_eq!(id.slot(), 42);
    assert!(RowId::new(1, 0) > RowId::new(0, u32::MAX));
}

#[test]
fn test_blob_store() {
    let mut store = BlobStore::new();
    let a = store.put(Rc::from(&b"hello"[..]));
    let b = store.put(Rc::from(&b"world!"[..]));
    assert_ne!(a, 0);
    assert_eq!(store.bytes(), 11);
    assert_eq!(&store.get(a).unwrap()[..], b"hello");

    store.remove(a).unwrap();
    assert_eq!(store.bytes(), 6);
    assert!(store.get(a).is_err());

    // freed slots are reused.
    let c = store.put(Rc::from(&b"x"[..]));
    assert_eq!(c, a);
    assert_eq!(&store.get(b).unwrap()[..], b"world!");
}

#[test]
fn test_owned_tuple_fields() {
    let schema = mixed_schema();
    let mut row = OwnedTuple::new(Arc::clone(&schema)).unwrap();

    for i in 0..schema.count_all() {
        assert!(row.value(i).unwrap().is_null(), "column {}", i);
    }

    row.set_value(0, &Value::BigInt(42)).unwrap();
    row.set_value(1, &Value::varchar("ab")).unwrap();
    row.set_value(2, &Value::varchar("a longer out-of-line payload")).unwrap();
    row.set_value(3, &Value::Double(0.5)).unwrap();
    row.set_value(4, &Value::Timestamp(99)).unwrap();

    assert_eq!(row.value(0).unwrap(), Value::BigInt(42));
    assert_eq!(row.value(1).unwrap(), Value::varchar("ab"));
    assert_eq!(
        row.value(2).unwrap(),
        Value::varchar("a longer out-of-line payload")
    );
    assert_eq!(row.value(3).unwrap(), Value::Double(0.5));
    assert_eq!(row.value(4).unwrap(), Value::Timestamp(99));

    // overwrite releases the old blob.
    row.set_value(2, &Value::varchar("replacement payload")).unwrap();
    assert_eq!(row.value(2).unwrap(), Value::varchar("replacement payload"));

    // null an uninlined column.
    row.set_value(2, &Value::Null(ValueType::Varchar)).unwrap();
    assert!(row.value(2).unwrap().is_null());
}

#[test]
fn test_set_value_casts_and_width() {
    let schema = mixed_schema();
    let mut row = OwnedTuple::new(schema).unwrap();

    // implicit widening cast on store.
    row.set_value(0, &Value::Integer(7)).unwrap();
    assert_eq!(row.value(0).unwrap(), Value::BigInt(7));

    match row.set_value(1, &Value::varchar("too long")) {
        Err(Error::WidthMismatch(_, _)) => (),
        res => panic!("{:?}", res),
    }
}

#[test]
fn test_header_bits() {
    let schema = mixed_schema();
    let mut row = OwnedTuple::new(schema).unwrap();

    assert!(row.as_tuple().is_active());
    assert!(!row.as_tuple().is_dirty());

    row.as_mut().set_dirty(true);
    row.as_mut().set_pending_delete(true);
    assert!(row.as_tuple().is_dirty());
    assert!(row.as_tuple().is_pending_delete());
    assert!(!row.as_tuple().is_pending_delete_on_undo_release());

    row.as_mut().set_dirty(false);
    assert!(!row.as_tuple().is_dirty());
    assert!(row.as_tuple().is_active());
}

#[test]
fn test_copy_row_rehomes_blobs() {
    let schema = mixed_schema();
    let mut src = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    src.set_value(0, &Value::BigInt(1)).unwrap();
    src.set_value(2, &Value::varchar("shared out-of-line payload")).unwrap();

    let mut dst_bytes = vec![0; schema.row_bytes()];
    let mut dst_blobs = BlobStore::new();
    copy_row(&mut dst_bytes, &mut dst_blobs, &schema, &src.as_tuple()).unwrap();

    let dst = Tuple::new(&dst_bytes, &schema, Some(&dst_blobs));
    assert_eq!(dst.value(0).unwrap(), Value::BigInt(1));
    assert_eq!(dst.value(2).unwrap(), Value::varchar("shared out-of-line payload"));
    assert_eq!(dst_blobs.bytes(), 26);

    // destination blobs are independent of the source store.
    assert!(src.as_tuple().equals(&dst).unwrap());
}

#[test]
fn test_release_row_blobs() {
    let schema = mixed_schema();
    let mut row = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    row.set_value(2, &Value::varchar("will be released")).unwrap();

    let mut tmp = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    tmp.copy_from(&row.as_tuple()).unwrap();
    assert!(tmp.blobs.bytes() > 0);
    release_row_blobs(&mut tmp.data, &schema, &mut tmp.blobs).unwrap();
    assert_eq!(tmp.blobs.bytes(), 0);

    let t = Tuple::new(&tmp.data, &schema, Some(&tmp.blobs));
    assert!(t.value(2).unwrap().is_null());
}

#[test]
fn test_tuple_compare_and_equals() {
    let schema = mixed_schema();
    let mut a = OwnedTuple::new(Arc::clone(&schema)).unwrap();
    let mut b = OwnedTuple::new(Arc::clone(&schema)).unwrap();

    a.set_value(0, &Value::BigInt(1)).unwrap();
    b.set_value(0, &Value::BigInt(2)).unwrap();
    assert_eq!(a.as_tuple().compare(&b.as_tuple()).unwrap(), Ordering::Less);

    b.set_value(0, &Value::BigInt(1)).unwrap();
    assert!(a.as_tuple().equals(&b.as_tuple()).unwrap());

    // hidden columns only matter for the with-hidden flavor.
    b.set_value(4, &Value::Timestamp(5)).unwrap();
    assert!(a.as_tuple().equals(&b.as_tuple()).unwrap());
    assert!(!a.as_tuple().equals_with_hidden(&b.as_tuple()).unwrap());

    // nulls sort first.
    b.set_value(0, &Value::Null(ValueType::BigInt)).unwrap();
    assert_eq!(a.as_tuple().compare(&b.as_tuple()).unwrap(), Ordering::Greater);
    assert_eq!(
        a.as_tuple().compare_null_as_max(&b.as_tuple()).unwrap(),
        Ordering::Less
    );
}

#[test]
fn test_key_tuple_ordering() {
    let kschema = TupleSchema::new_key(vec![
        ColumnSpec::new("k0", ValueType::Integer),
        ColumnSpec::new_varchar("k1", 8, true),
    ])
    .unwrap();

    let mut a = KeyTuple::new(Arc::clone(&kschema)).unwrap();
    a.set_value(0, &Value::Integer(1)).unwrap();
    a.set_value(1, &Value::varchar("aa")).unwrap();

    let mut b = KeyTuple::new(Arc::clone(&kschema)).unwrap();
    b.set_value(0, &Value::Integer(1)).unwrap();
    b.set_value(1, &Value::varchar("ab")).unwrap();

    assert!(a < b);
    b.set_value(1, &Value::varchar("aa")).unwrap();
    assert_eq!(a, b);

    // nulls order below values.
    b.set_value(0, &Value::Null(ValueType::Integer)).unwrap();
    assert!(b < a);

    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let hash_of = |k: &KeyTuple| {
        let mut h = DefaultHasher::new();
        k.hash(&mut h);
        h.finish()
    };
    b.set_value(0, &Value::Integer(1)).unwrap();
    assert_eq!(hash_of(&a), hash_of(&b));
}

#[test]
fn test_key_tuple_shrink_set() {
    let kschema =
        TupleSchema::new_key(vec![ColumnSpec::new_varchar("k", 3, true)]).unwrap();
    let mut k = KeyTuple::new(kschema).unwrap();

    assert!(k.set_value(0, &Value::varchar("abcd")).is_err());
    k.shrink_set_value(0, &Value::varchar("abcd")).unwrap();
    assert_eq!(k.value(0).unwrap(), Value::varchar("abc"));
}
