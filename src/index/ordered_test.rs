use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::collections::BTreeMap;
use std::sync::Arc;

use super::*;
use crate::{
    schema::{ColumnSpec, TupleSchema},
    tuple::{KeyTuple, RowId},
    value::{Value, ValueType},
    Error,
};

fn key_schema() -> Arc<TupleSchema> {
    TupleSchema::new_key(vec![ColumnSpec::new("k", ValueType::BigInt)]).unwrap()
}

fn key(schema: &Arc<TupleSchema>, k: i64) -> KeyTuple {
    let mut kt = KeyTuple::new(Arc::clone(schema)).unwrap();
    kt.set_value(0, &Value::BigInt(k)).unwrap();
    kt
}

#[test]
fn test_ordered_unique_against_btree() {
    let seed: u64 = random();
    println!("test_ordered_unique_against_btree seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let schema = key_schema();
    let mut index = OrderedIndex::new();
    let mut model: BTreeMap<i64, RowId> = BTreeMap::new();

    for op in 0..20_000 {
        let k: i64 = rng.gen_range(0..2000);
        match rng.gen_range(0..3) {
            0 | 1 => {
                let row = RowId::new(0, op as u32);
                let res = index.insert(key(&schema, k), row, true /*unique*/);
                match model.contains_key(&k) {
                    true => match res {
                        Err(Error::ConstraintFail(_, _)) => (),
                        res => panic!("expected duplicate failure {:?}", res),
                    },
                    false => {
                        res.unwrap();
                        model.insert(k, row);
                    }
                }
            }
            _ => {
                let row = model.get(&k).copied();
                let removed = index.remove(&key(&schema, k), row.unwrap_or(RowId(0))).unwrap();
                assert_eq!(removed, row.is_some(), "key {}", k);
                model.remove(&k);
            }
        }

        if op % 2500 == 0 {
            index.validate().unwrap();
        }
    }
    index.validate().unwrap();
    assert_eq!(index.len(), model.len());

    // every surviving key is found, every removed key is absent.
    for k in 0..2000_i64 {
        let kt = key(&schema, k);
        match model.get(&k) {
            Some(row) => assert_eq!(index.get(&kt).unwrap(), &[*row]),
            None => assert!(index.get(&kt).is_none()),
        }
    }

    // full forward scan is the model's order.
    let scanned: Vec<i64> = index
        .cursor_all(false)
        .map(|(k, _)| k.value(0).unwrap().as_bigint().unwrap())
        .collect();
    let expected: Vec<i64> = model.keys().copied().collect();
    assert_eq!(scanned, expected);
}

#[test]
fn test_ordered_multi_rows_per_key() {
    let schema = key_schema();
    let mut index = OrderedIndex::new();

    for slot in 0..4_u32 {
        index.insert(key(&schema, 7), RowId::new(0, slot), false).unwrap();
    }
    index.insert(key(&schema, 3), RowId::new(0, 100), false).unwrap();
    assert_eq!(index.len(), 5);
    assert_eq!(index.get(&key(&schema, 7)).unwrap().len(), 4);
    index.validate().unwrap();

    // remove one duplicate, node stays.
    assert!(index.remove(&key(&schema, 7), RowId::new(0, 2)).unwrap());
    assert_eq!(index.get(&key(&schema, 7)).unwrap().len(), 3);
    assert!(!index.remove(&key(&schema, 7), RowId::new(0, 2)).unwrap());
    index.validate().unwrap();

    // drain the key, node goes.
    for slot in [0_u32, 1, 3] {
        assert!(index.remove(&key(&schema, 7), RowId::new(0, slot)).unwrap());
    }
    assert!(index.get(&key(&schema, 7)).is_none());
    assert_eq!(index.len(), 1);
    index.validate().unwrap();
}

#[test]
fn test_entries_below() {
    let schema = key_schema();
    let mut index = OrderedIndex::new();
    // keys 10, 20, 20, 30, 40
    index.insert(key(&schema, 20), RowId::new(0, 1), false).unwrap();
    index.insert(key(&schema, 10), RowId::new(0, 0), false).unwrap();
    index.insert(key(&schema, 30), RowId::new(0, 3), false).unwrap();
    index.insert(key(&schema, 20), RowId::new(0, 2), false).unwrap();
    index.insert(key(&schema, 40), RowId::new(0, 4), false).unwrap();

    assert_eq!(index.entries_below(&key(&schema, 10), false), 0);
    assert_eq!(index.entries_below(&key(&schema, 10), true), 1);
    assert_eq!(index.entries_below(&key(&schema, 20), false), 1);
    assert_eq!(index.entries_below(&key(&schema, 20), true), 3);
    assert_eq!(index.entries_below(&key(&schema, 25), false), 3);
    assert_eq!(index.entries_below(&key(&schema, 40), true), 5);
    assert_eq!(index.entries_below(&key(&schema, 99), true), 5);
}

#[test]
fn test_entries_below_random() {
    let seed: u64 = random();
    println!("test_entries_below_random seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let schema = key_schema();
    let mut index = OrderedIndex::new();
    let mut keys: Vec<i64> = vec![];
    for slot in 0..3000_u32 {
        let k = rng.gen_range(0..500);
        index.insert(key(&schema, k), RowId::new(0, slot), false).unwrap();
        keys.push(k);
    }
    keys.sort_unstable();

    for probe in [-1_i64, 0, 17, 250, 499, 500, 1000] {
        let below = keys.iter().filter(|k| **k < probe).count();
        let below_eq = keys.iter().filter(|k| **k <= probe).count();
        assert_eq!(index.entries_below(&key(&schema, probe), false), below);
        assert_eq!(index.entries_below(&key(&schema, probe), true), below_eq);
    }
}

#[test]
fn test_cursor_seek_modes() {
    let schema = key_schema();
    let mut index = OrderedIndex::new();
    for (slot, k) in [10_i64, 20, 30, 40].iter().enumerate() {
        index.insert(key(&schema, *k), RowId::new(0, slot as u32), false).unwrap();
    }

    let keys = |cursor: OrderedCursor| -> Vec<i64> {
        cursor.map(|(k, _)| k.value(0).unwrap().as_bigint().unwrap()).collect()
    };

    assert_eq!(keys(index.cursor_from(&key(&schema, 20), true, false)), vec![20, 30, 40]);
    assert_eq!(keys(index.cursor_from(&key(&schema, 20), false, false)), vec![30, 40]);
    assert_eq!(keys(index.cursor_from(&key(&schema, 25), true, false)), vec![30, 40]);
    assert_eq!(keys(index.cursor_from(&key(&schema, 30), true, true)), vec![30, 20, 10]);
    assert_eq!(keys(index.cursor_from(&key(&schema, 30), false, true)), vec![20, 10]);
    assert_eq!(keys(index.cursor_all(true)), vec![40, 30, 20, 10]);
    assert_eq!(keys(index.cursor_from(&key(&schema, 99), true, false)), Vec::<i64>::new());
}
