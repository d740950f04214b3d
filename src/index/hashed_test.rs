use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::collections::HashMap;
use std::sync::Arc;

use super::*;
use crate::{
    schema::{ColumnSpec, TupleSchema},
    tuple::{KeyTuple, RowId},
    value::{Value, ValueType},
};

fn key(schema: &Arc<crate::schema::TupleSchema>, k: i64) -> KeyTuple {
    let mut kt = KeyTuple::new(Arc::clone(schema)).unwrap();
    kt.set_value(0, &Value::BigInt(k)).unwrap();
    kt
}

#[test]
fn test_hashed_against_model() {
    let seed: u64 = random();
    println!("test_hashed_against_model seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let schema = TupleSchema::new_key(vec![ColumnSpec::new("k", ValueType::BigInt)]).unwrap();
    let mut index = HashedIndex::new();
    let mut model: HashMap<i64, Vec<RowId>> = HashMap::new();

    for op in 0..10_000_u32 {
        let k: i64 = rng.gen_range(0..300);
        if rng.gen_bool(0.6) {
            let row = RowId::new(1, op);
            index.insert(key(&schema, k), row, false).unwrap();
            model.entry(k).or_insert_with(Vec::new).push(row);
        } else {
            let row = model.get(&k).and_then(|rows| rows.first().copied());
            let removed = index.remove(&key(&schema, k), row.unwrap_or(RowId(9))).unwrap();
            assert_eq!(removed, row.is_some());
            if let Some(row) = row {
                let rows = model.get_mut(&k).unwrap();
                rows.retain(|r| *r != row);
                if rows.is_empty() {
                    model.remove(&k);
                }
            }
        }
    }

    let n: usize = model.values().map(|rows| rows.len()).sum();
    assert_eq!(index.len(), n);
    for (k, rows) in model.iter() {
        assert_eq!(index.get(&key(&schema, *k)).unwrap(), rows.as_slice());
    }
}

#[test]
fn test_hashed_unique() {
    let schema = TupleSchema::new_key(vec![ColumnSpec::new("k", ValueType::BigInt)]).unwrap();
    let mut index = HashedIndex::new();

    index.insert(key(&schema, 1), RowId(1), true).unwrap();
    assert!(index.insert(key(&schema, 1), RowId(2), true).is_err());
    assert!(index.has_key(&key(&schema, 1)));
    assert!(index.remove(&key(&schema, 1), RowId(1)).unwrap());
    assert!(!index.has_key(&key(&schema, 1)));
    assert!(index.is_empty());
}
