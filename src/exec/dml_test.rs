use std::sync::Arc;

use super::*;
use crate::{
    exec::testing::{add_table, bigint_rows, bigint_schema, table_with_pk, TestEnv},
    hasher::Hashinator,
    tuple::Tuple,
    Error,
};

fn count_of(out: &TempTable) -> i64 {
    rows_of_out(out)
}

fn rows_of_out(out: &TempTable) -> i64 {
    out.tuple_at(0).unwrap().value(0).unwrap().as_bigint().unwrap()
}

#[test]
fn test_insert_executor() {
    let mut env = TestEnv::new();
    add_table(&mut env, table_with_pk("t", 2, &[]));
    let schema = bigint_schema(2);
    env.outputs.insert(
        1,
        bigint_rows(&schema, &[vec![Some(1), Some(10)], vec![Some(2), Some(20)]]),
    );

    let exec = InsertExec {
        child: 1,
        table: "t".to_string(),
        upsert: false,
        multi_partition: false,
        out_schema: crate::exec::count_schema("modified_tuples").unwrap(),
    };
    let out = exec.execute(&mut env.ctx()).unwrap();
    assert_eq!(count_of(&out), 2);
    assert_eq!(env.catalog.persistent("t").unwrap().len(), 2);
    // undo was recorded for the statement.
    assert_eq!(env.undo.len(), 2);
}

#[test]
fn test_insert_partition_check() {
    let mut env = TestEnv::new();
    // partition over 8 sites; this engine is partition 0.
    env.hashinator = Hashinator::new(0, 8);
    let schema = bigint_schema(2);
    let mut table = crate::table::PersistentTable::new("p", Arc::clone(&schema), Some(0), false);
    let scheme =
        crate::index::IndexScheme::new("p_pk", &schema, vec![0], true, false, None).unwrap();
    table.add_index(crate::index::TableIndex::new(scheme), true).unwrap();
    add_table(&mut env, table);

    // find one key that lands here and one that does not.
    let local = (0..1000)
        .find(|k| env.hashinator.is_local(&Value::BigInt(*k)).unwrap())
        .unwrap();
    let foreign = (0..1000)
        .find(|k| !env.hashinator.is_local(&Value::BigInt(*k)).unwrap())
        .unwrap();

    env.outputs.insert(1, bigint_rows(&schema, &[vec![Some(local), Some(0)]]));
    let exec = InsertExec {
        child: 1,
        table: "p".to_string(),
        upsert: false,
        multi_partition: false,
        out_schema: crate::exec::count_schema("modified_tuples").unwrap(),
    };
    assert_eq!(count_of(&exec.execute(&mut env.ctx()).unwrap()), 1);

    env.outputs.insert(1, bigint_rows(&schema, &[vec![Some(foreign), Some(0)]]));
    match exec.execute(&mut env.ctx()) {
        Err(Error::ConstraintFail(_, _)) => (),
        res => panic!("{:?}", res),
    }

    // declared multi-partition statements skip the check.
    env.outputs.insert(1, bigint_rows(&schema, &[vec![Some(foreign), Some(0)]]));
    let exec = InsertExec {
        child: 1,
        table: "p".to_string(),
        upsert: false,
        multi_partition: true,
        out_schema: crate::exec::count_schema("modified_tuples").unwrap(),
    };
    assert_eq!(count_of(&exec.execute(&mut env.ctx()).unwrap()), 1);
}

#[test]
fn test_upsert_executor() {
    let mut env = TestEnv::new();
    add_table(&mut env, table_with_pk("t", 2, &[vec![1, 10]]));
    let schema = bigint_schema(2);
    env.outputs.insert(
        1,
        bigint_rows(&schema, &[vec![Some(1), Some(99)], vec![Some(2), Some(20)]]),
    );

    let exec = InsertExec {
        child: 1,
        table: "t".to_string(),
        upsert: true,
        multi_partition: false,
        out_schema: crate::exec::count_schema("modified_tuples").unwrap(),
    };
    let out = exec.execute(&mut env.ctx()).unwrap();
    assert_eq!(count_of(&out), 2);

    let table = env.catalog.persistent("t").unwrap();
    assert_eq!(table.len(), 2);
    let values: Vec<(i64, i64)> = table
        .iter()
        .map(|(_, t): (_, Tuple)| {
            (
                t.value(0).unwrap().as_bigint().unwrap(),
                t.value(1).unwrap().as_bigint().unwrap(),
            )
        })
        .collect();
    assert!(values.contains(&(1, 99))); // hit became an update
    assert!(values.contains(&(2, 20))); // miss became an insert
}

#[test]
fn test_update_executor() {
    let mut env = TestEnv::new();
    add_table(&mut env, table_with_pk("t", 3, &[vec![1, 10, 100], vec![2, 20, 200]]));

    // input rows: (address, new value for column 2)
    let address_schema = crate::schema::TupleSchema::new(
        vec![
            crate::schema::ColumnSpec::new("addr", crate::value::ValueType::Address),
            crate::schema::ColumnSpec::new("v", crate::value::ValueType::BigInt),
        ],
        vec![],
    )
    .unwrap();
    let mut input = TempTable::new(Arc::clone(&address_schema), None);
    let addresses: Vec<crate::tuple::RowId> = env
        .catalog
        .persistent("t")
        .unwrap()
        .iter()
        .map(|(id, _)| id)
        .collect();
    for (i, addr) in addresses.iter().enumerate() {
        input
            .append_values(&[Value::Address(addr.0), Value::BigInt(((i as i64) + 1) * 1000)])
            .unwrap();
    }
    env.outputs.insert(1, input);

    let exec = UpdateExec {
        child: 1,
        table: "t".to_string(),
        target_columns: vec![2],
        out_schema: crate::exec::count_schema("modified_tuples").unwrap(),
    };
    let out = exec.execute(&mut env.ctx()).unwrap();
    assert_eq!(count_of(&out), 2);

    let table = env.catalog.persistent("t").unwrap();
    let mut values: Vec<i64> = table
        .iter()
        .map(|(_, t)| t.value(2).unwrap().as_bigint().unwrap())
        .collect();
    values.sort_unstable();
    assert_eq!(values, vec![1000, 2000]);
}

#[test]
fn test_delete_executor_and_truncate() {
    let mut env = TestEnv::new();
    add_table(&mut env, table_with_pk("t", 2, &[vec![1, 0], vec![2, 0], vec![3, 0]]));

    // delete row with key 2 by address.
    let address_schema = crate::schema::TupleSchema::new(
        vec![crate::schema::ColumnSpec::new("addr", crate::value::ValueType::Address)],
        vec![],
    )
    .unwrap();
    let target = env
        .catalog
        .persistent("t")
        .unwrap()
        .iter()
        .find(|(_, t)| t.value(0).unwrap().as_bigint().unwrap() == 2)
        .map(|(id, _)| id)
        .unwrap();
    let mut input = TempTable::new(Arc::clone(&address_schema), None);
    input.append_values(&[Value::Address(target.0)]).unwrap();
    env.outputs.insert(1, input);

    let exec = DeleteExec {
        child: Some(1),
        table: "t".to_string(),
        truncate: false,
        out_schema: crate::exec::count_schema("modified_tuples").unwrap(),
    };
    assert_eq!(count_of(&exec.execute(&mut env.ctx()).unwrap()), 1);
    assert_eq!(env.catalog.persistent("t").unwrap().len(), 2);

    let exec = DeleteExec {
        child: None,
        table: "t".to_string(),
        truncate: true,
        out_schema: crate::exec::count_schema("modified_tuples").unwrap(),
    };
    assert_eq!(count_of(&exec.execute(&mut env.ctx()).unwrap()), 2);
    assert_eq!(env.catalog.persistent("t").unwrap().len(), 0);
}

#[test]
fn test_swap_tables_executor() {
    let mut env = TestEnv::new();
    add_table(&mut env, table_with_pk("a", 2, &[vec![1, 0], vec![2, 0]]));
    add_table(&mut env, table_with_pk("b", 2, &[vec![9, 0]]));

    let exec = SwapTablesExec {
        table: "a".to_string(),
        other: "b".to_string(),
        out_schema: crate::exec::count_schema("modified_tuples").unwrap(),
    };
    assert_eq!(count_of(&exec.execute(&mut env.ctx()).unwrap()), 3);
    assert_eq!(env.catalog.persistent("a").unwrap().len(), 1);
    assert_eq!(env.catalog.persistent("b").unwrap().len(), 2);
}

#[test]
fn test_replicated_cell() {
    let cell = ReplicatedCell::new(0);
    assert!(cell.is_actor(0));
    assert!(!cell.is_actor(3));
    assert_eq!(cell.read().unwrap(), None);

    cell.publish(42);
    assert_eq!(cell.read().unwrap(), Some(42));

    cell.reset();
    assert_eq!(cell.read().unwrap(), None);
    cell.publish_error();
    match cell.read() {
        Err(Error::ConstraintFail(_, _)) => (),
        res => panic!("{:?}", res),
    }
}

#[test]
fn test_replicated_gate_reader_side() {
    let mut env = TestEnv::new();
    env.hashinator = Hashinator::new(2, 4); // this partition is not the actor
    let schema = bigint_schema(2);
    let mut table = crate::table::PersistentTable::new("r", Arc::clone(&schema), None, true);
    let scheme =
        crate::index::IndexScheme::new("r_pk", &schema, vec![0], true, false, None).unwrap();
    table.add_index(crate::index::TableIndex::new(scheme), true).unwrap();
    add_table(&mut env, table);

    let cell = ReplicatedCell::new(0);
    cell.publish(5); // the acting partition already ran
    env.outputs.insert(1, bigint_rows(&schema, &[vec![Some(1), Some(0)]]));

    let exec = InsertExec {
        child: 1,
        table: "r".to_string(),
        upsert: false,
        multi_partition: false,
        out_schema: crate::exec::count_schema("modified_tuples").unwrap(),
    };
    let mut ctx = env.ctx();
    ctx.replicated = Some(cell);
    let out = exec.execute(&mut ctx).unwrap();
    drop(ctx);

    // reader side reports the published count without mutating.
    assert_eq!(count_of(&out), 5);
    assert_eq!(env.catalog.persistent("r").unwrap().len(), 0);
}
