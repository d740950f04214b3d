use std::sync::Arc;

use super::*;
use crate::{
    index::{IndexScheme, TableIndex},
    schema::{ColumnSpec, TupleSchema},
    tuple::OwnedTuple,
    value::{Value, ValueType},
};

fn schema() -> Arc<TupleSchema> {
    TupleSchema::new(vec![ColumnSpec::new("id", ValueType::BigInt)], vec![]).unwrap()
}

fn persistent(name: &str, rows: i64) -> PersistentTable {
    let schema = schema();
    let mut table = PersistentTable::new(name, Arc::clone(&schema), None, false);
    let pk = IndexScheme::new(&format!("{}_pk", name), &schema, vec![0], true, false, None).unwrap();
    table.add_index(TableIndex::new(pk), true).unwrap();
    for i in 0..rows {
        let mut t = OwnedTuple::new(Arc::clone(&schema)).unwrap();
        t.set_value(0, &Value::BigInt(i)).unwrap();
        table.insert_tuple(&t.as_tuple(), None).unwrap();
    }
    table
}

#[test]
fn test_catalog_registry() {
    let mut catalog = Catalog::new();
    catalog.add(Table::Persistent(persistent("a", 3))).unwrap();
    catalog
        .add(Table::Streamed(StreamedTable::new("s", schema())))
        .unwrap();

    assert!(catalog.add(Table::Persistent(persistent("a", 0))).is_err());
    assert_eq!(catalog.names(), vec!["a".to_string(), "s".to_string()]);

    assert_eq!(catalog.persistent("a").unwrap().len(), 3);
    assert!(catalog.persistent("s").is_err());
    assert!(catalog.streamed_mut("s").is_ok());
    assert!(catalog.get("zzz").is_err());
}

#[test]
fn test_catalog_swap_tables() {
    let mut catalog = Catalog::new();
    catalog.add(Table::Persistent(persistent("a", 5))).unwrap();
    catalog.add(Table::Persistent(persistent("b", 2))).unwrap();

    catalog.swap_tables("a", "b").unwrap();
    assert_eq!(catalog.persistent("a").unwrap().len(), 2);
    assert_eq!(catalog.persistent("b").unwrap().len(), 5);

    assert!(catalog.swap_tables("a", "a").is_err());
    assert!(catalog.swap_tables("a", "zzz").is_err());
}
