use std::{cell::RefCell, rc::Rc, sync::Arc};

use super::*;
use crate::{
    schema::{ColumnSpec, TupleSchema},
    value::{Value, ValueType},
    Error,
};

fn schema() -> Arc<TupleSchema> {
    TupleSchema::new(
        vec![
            ColumnSpec::new("a", ValueType::BigInt),
            ColumnSpec::new_varchar("s", 200, true), // uninlined
        ],
        vec![],
    )
    .unwrap()
}

#[test]
fn test_append_iterate_clear() {
    let schema = schema();
    let mut temp = TempTable::new(Arc::clone(&schema), None);

    for i in 0..100_i64 {
        temp.append_values(&[Value::BigInt(i), Value::varchar(&format!("row payload {}", i))])
            .unwrap();
    }
    assert_eq!(temp.len(), 100);

    let got: Vec<i64> = temp
        .iter()
        .map(|t| t.value(0).unwrap().as_bigint().unwrap())
        .collect();
    assert_eq!(got, (0..100).collect::<Vec<i64>>());
    assert_eq!(
        temp.tuple_at(42).unwrap().value(1).unwrap(),
        Value::varchar("row payload 42")
    );

    temp.clear();
    assert!(temp.is_empty());
    assert!(temp.tuple_at(0).is_err());

    // reusable after clear.
    temp.append_values(&[Value::BigInt(7), Value::Null(ValueType::Varchar)]).unwrap();
    assert_eq!(temp.len(), 1);
    assert!(temp.tuple_at(0).unwrap().value(1).unwrap().is_null());
}

#[test]
fn test_memory_limits() {
    let schema = schema();
    let limits = Rc::new(RefCell::new(TempLimits::new(0, 2048)));
    let mut temp = TempTable::new(Arc::clone(&schema), Some(Rc::clone(&limits)));

    let mut hit_limit = false;
    for i in 0..10_000_i64 {
        let res = temp.append_values(&[
            Value::BigInt(i),
            Value::varchar("a fairly long payload string to burn memory"),
        ]);
        match res {
            Ok(()) => (),
            Err(Error::ResourceFail(_, _)) => {
                hit_limit = true;
                break;
            }
            Err(err) => panic!("{}", err),
        }
    }
    assert!(hit_limit);

    // lifting the limit lets the bulk path continue.
    let was = limits.borrow_mut().suspend();
    assert!(!was);
    temp.append_values(&[Value::BigInt(-1), Value::varchar("over the line")]).unwrap();
    limits.borrow_mut().restore(was);

    // dropping the table returns its accounting.
    let used_before = limits.borrow().used;
    assert!(used_before > 0);
    drop(temp);
    assert_eq!(limits.borrow().used, 0);
}

#[test]
fn test_shared_accounting_across_tables() {
    let schema = schema();
    let limits = Rc::new(RefCell::new(TempLimits::new(0, 0)));
    let mut a = TempTable::new(Arc::clone(&schema), Some(Rc::clone(&limits)));
    let mut b = TempTable::new(Arc::clone(&schema), Some(Rc::clone(&limits)));

    a.append_values(&[Value::BigInt(1), Value::Null(ValueType::Varchar)]).unwrap();
    b.append_values(&[Value::BigInt(2), Value::Null(ValueType::Varchar)]).unwrap();
    let used = limits.borrow().used;
    assert_eq!(used, 2 * schema.row_bytes());

    a.clear();
    assert_eq!(limits.borrow().used, schema.row_bytes());
    drop(b);
    assert_eq!(limits.borrow().used, 0);
}
