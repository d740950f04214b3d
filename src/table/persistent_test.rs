use std::sync::Arc;

use super::*;
use crate::{
    index::{IndexScheme, TableIndex},
    schema::{ColumnSpec, TupleSchema},
    tuple::OwnedTuple,
    undo::UndoLog,
    value::{Value, ValueType},
    Error,
};

fn schema() -> Arc<TupleSchema> {
    TupleSchema::new(
        vec![
            ColumnSpec::new("id", ValueType::BigInt),
            ColumnSpec::new("grp", ValueType::Integer),
            ColumnSpec::new_varchar("name", 100, true), // uninlined
        ],
        vec![],
    )
    .unwrap()
}

fn table() -> PersistentTable {
    let schema = schema();
    let mut table = PersistentTable::new("items", Arc::clone(&schema), None, false);
    let pk = IndexScheme::new("items_pk", &schema, vec![0], true, false, None).unwrap();
    table.add_index(TableIndex::new(pk), true).unwrap();
    let grp = IndexScheme::new("items_grp", &schema, vec![1], false, false, None).unwrap();
    table.add_index(TableIndex::new(grp), false).unwrap();
    table
}

fn staged(schema: &Arc<TupleSchema>, id: i64, grp: i32, name: &str) -> OwnedTuple {
    let mut t = OwnedTuple::new(Arc::clone(schema)).unwrap();
    t.set_value(0, &Value::BigInt(id)).unwrap();
    t.set_value(1, &Value::Integer(grp)).unwrap();
    t.set_value(2, &Value::varchar(name)).unwrap();
    t
}

#[test]
fn test_insert_lookup_delete() {
    let mut table = table();
    let schema = Arc::clone(table.schema());

    let mut rows = vec![];
    for i in 0..50_i64 {
        let t = staged(&schema, i, (i % 4) as i32, &format!("payload number {}", i));
        rows.push(table.insert_tuple(&t.as_tuple(), None).unwrap());
    }
    assert_eq!(table.len(), 50);
    assert_eq!(table.index("items_pk").unwrap().len(), 50);
    assert_eq!(table.index("items_grp").unwrap().len(), 50);

    let t = table.tuple(rows[7]).unwrap();
    assert_eq!(t.value(0).unwrap(), Value::BigInt(7));
    assert_eq!(t.value(2).unwrap(), Value::varchar("payload number 7"));
    assert!(t.is_active());

    // pk probe
    let pk = table.index("items_pk").unwrap();
    let probe = pk.key_for(&staged(&schema, 7, 0, "").as_tuple()).unwrap();
    assert_eq!(pk.get(&probe).unwrap(), &[rows[7]]);

    table.delete_tuple(rows[7], None).unwrap();
    assert_eq!(table.len(), 49);
    assert!(table.tuple(rows[7]).is_err());
    assert!(table.index("items_pk").unwrap().get(&probe).is_none());

    // freed slot is reused.
    let t = staged(&schema, 777, 0, "recycled");
    let row = table.insert_tuple(&t.as_tuple(), None).unwrap();
    assert_eq!(row, rows[7]);
}

#[test]
fn test_unique_violation_leaves_no_trace() {
    let mut table = table();
    let schema = Arc::clone(table.schema());

    table.insert_tuple(&staged(&schema, 1, 0, "first").as_tuple(), None).unwrap();
    let before_len = table.len();
    let before_pk = table.index("items_pk").unwrap().len();
    let before_grp = table.index("items_grp").unwrap().len();

    match table.insert_tuple(&staged(&schema, 1, 9, "dup").as_tuple(), None) {
        Err(Error::ConstraintFail(_, _)) => (),
        res => panic!("{:?}", res),
    }
    assert_eq!(table.len(), before_len);
    assert_eq!(table.index("items_pk").unwrap().len(), before_pk);
    assert_eq!(table.index("items_grp").unwrap().len(), before_grp);
}

#[test]
fn test_update_maintains_affected_indexes() {
    let mut table = table();
    let schema = Arc::clone(table.schema());

    let row = table.insert_tuple(&staged(&schema, 1, 5, "before").as_tuple(), None).unwrap();

    // change grp and name; pk untouched.
    let new = staged(&schema, 1, 8, "after");
    table.update_tuple(row, &new, &[1, 2], None).unwrap();

    let t = table.tuple(row).unwrap();
    assert_eq!(t.value(1).unwrap(), Value::Integer(8));
    assert_eq!(t.value(2).unwrap(), Value::varchar("after"));
    assert!(t.is_dirty());

    let grp = table.index("items_grp").unwrap();
    let old_probe = grp.key_for(&staged(&schema, 0, 5, "").as_tuple()).unwrap();
    let new_probe = grp.key_for(&staged(&schema, 0, 8, "").as_tuple()).unwrap();
    assert!(grp.get(&old_probe).is_none());
    assert_eq!(grp.get(&new_probe).unwrap(), &[row]);
}

#[test]
fn test_undo_round_trip() {
    let mut table = table();
    let schema = Arc::clone(table.schema());
    let mut undo = UndoLog::new();

    let keep = table.insert_tuple(&staged(&schema, 1, 1, "keep").as_tuple(), None).unwrap();

    let token = undo.begin_quantum();
    let gone = table
        .insert_tuple(&staged(&schema, 2, 2, "gone").as_tuple(), Some(&mut undo))
        .unwrap();
    table.delete_tuple(keep, Some(&mut undo)).unwrap();
    assert_eq!(table.len(), 1);

    // roll back: the insert disappears, the delete comes back.
    for action in undo.take_rollback(token) {
        match action {
            crate::undo::UndoAction::Insert { row, .. } => table.rollback_insert(row).unwrap(),
            crate::undo::UndoAction::Delete { values, .. } => {
                table.rollback_delete(&values).unwrap()
            }
            crate::undo::UndoAction::Update { row, values, .. } => {
                table.rollback_update(row, &values).unwrap()
            }
        }
    }
    assert_eq!(table.len(), 1);
    assert!(table.tuple(gone).is_err());
    let pk = table.index("items_pk").unwrap();
    let probe = pk.key_for(&staged(&schema, 1, 0, "").as_tuple()).unwrap();
    assert_eq!(pk.get(&probe).map(|r| r.len()), Some(1));
}

#[test]
fn test_dr_stream_records() {
    let mut table = table();
    let schema = Arc::clone(table.schema());
    table.enable_dr();

    let row = table.insert_tuple(&staged(&schema, 1, 1, "a").as_tuple(), None).unwrap();
    table.update_tuple(row, &staged(&schema, 1, 2, "b"), &[1, 2], None).unwrap();
    table.delete_tuple(row, None).unwrap();

    let buf = table.dr_stream_mut().unwrap().drain();
    // three records, each op byte then an LE row image.
    let mut off = 0;
    let mut ops = vec![];
    while off < buf.len() {
        ops.push(buf[off]);
        off += 1;
        let mut back = OwnedTuple::new(Arc::clone(&schema)).unwrap();
        crate::tuple::deserialize_tuple_le(&buf, &mut off, &mut back.as_mut()).unwrap();
    }
    assert_eq!(ops, vec![DR_INSERT, DR_UPDATE, DR_DELETE]);
}

#[test]
fn test_truncate_and_swap() {
    let mut a = table();
    let schema = Arc::clone(a.schema());
    for i in 0..10_i64 {
        a.insert_tuple(&staged(&schema, i, 0, "x").as_tuple(), None).unwrap();
    }

    let mut b = PersistentTable::new("items2", Arc::clone(&schema), None, false);
    let pk = IndexScheme::new("items2_pk", &schema, vec![0], true, false, None).unwrap();
    b.add_index(TableIndex::new(pk), true).unwrap();

    a.swap_contents(&mut b).unwrap();
    assert_eq!(a.len(), 0);
    assert_eq!(b.len(), 10);
    assert_eq!(b.indexes()[0].len(), 10);

    b.truncate();
    assert_eq!(b.len(), 0);
    assert_eq!(b.indexes()[0].len(), 0);
}
