use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::collections::HashMap;
use std::sync::Arc;

use super::*;
use crate::exec::testing::{bigint_rows, bigint_schema, rows_of, TestEnv};

fn multiset(rows: &[Vec<Option<i64>>]) -> HashMap<i64, i64> {
    let mut counts = HashMap::new();
    for row in rows.iter() {
        *counts.entry(row[0].unwrap()).or_insert(0) += 1;
    }
    counts
}

fn run_setop(kind: SetOpKind, a: &[i64], b: &[i64]) -> Vec<Vec<Option<i64>>> {
    let mut env = TestEnv::new();
    let schema = bigint_schema(1);
    let rows_a: Vec<Vec<Option<i64>>> = a.iter().map(|v| vec![Some(*v)]).collect();
    let rows_b: Vec<Vec<Option<i64>>> = b.iter().map(|v| vec![Some(*v)]).collect();
    env.outputs.insert(1, bigint_rows(&schema, &rows_a));
    env.outputs.insert(2, bigint_rows(&schema, &rows_b));

    let exec = SetOpExec {
        kind,
        children: vec![1, 2],
        out_schema: Arc::clone(&schema),
    };
    let out = exec.execute(&mut env.ctx()).unwrap();
    rows_of(&out)
}

// A = {99x2, 100x3, 101, 102}, B = {99x2, 100x2, 101x3,
// 103}; INTERSECT ALL is {99x2, 100x2, 101}.
#[test]
fn test_intersect_all_scenario() {
    let a = vec![99, 99, 100, 100, 100, 101, 102];
    let b = vec![99, 99, 100, 100, 101, 101, 101, 103];
    let got = run_setop(SetOpKind::IntersectAll, &a, &b);
    let counts = multiset(&got);
    assert_eq!(counts.get(&99), Some(&2));
    assert_eq!(counts.get(&100), Some(&2));
    assert_eq!(counts.get(&101), Some(&1));
    assert_eq!(counts.get(&102), None);
    assert_eq!(counts.get(&103), None);
    assert_eq!(got.len(), 5);
}

#[test]
fn test_union_variants() {
    let a = vec![1, 1, 2];
    let b = vec![2, 3];

    let got = run_setop(SetOpKind::UnionAll, &a, &b);
    assert_eq!(got.len(), 5);

    let got = run_setop(SetOpKind::Union, &a, &b);
    let counts = multiset(&got);
    assert_eq!(counts.len(), 3);
    assert!(counts.values().all(|c| *c == 1));
}

#[test]
fn test_except_variants() {
    let a = vec![1, 1, 1, 2, 3];
    let b = vec![1, 3, 3];

    let got = run_setop(SetOpKind::ExceptAll, &a, &b);
    let counts = multiset(&got);
    assert_eq!(counts.get(&1), Some(&2)); // 3 - 1
    assert_eq!(counts.get(&2), Some(&1));
    assert_eq!(counts.get(&3), None); // 1 - 2 floors at zero

    let got = run_setop(SetOpKind::Except, &a, &b);
    let counts = multiset(&got);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get(&2), Some(&1));
}

#[test]
fn test_pass_through_tags_inputs() {
    let mut env = TestEnv::new();
    let schema = bigint_schema(1);
    env.outputs.insert(1, bigint_rows(&schema, &[vec![Some(10)], vec![Some(11)]]));
    env.outputs.insert(2, bigint_rows(&schema, &[vec![Some(20)]]));

    // synthesized pass-through schema appends the input-index column.
    let node = crate::plan::PlanNode {
        id: 50,
        ntype: crate::plan::PlanNodeType::Union,
        children: vec![1, 2],
        output_schema: vec![],
        inline: vec![],
        spec: crate::plan::NodeSpec::SetOp {
            kind: SetOpKind::PassThrough,
        },
    };
    let mut schemas = HashMap::new();
    schemas.insert(1, Arc::clone(&schema));
    schemas.insert(2, Arc::clone(&schema));
    let (exec, out_schema) = SetOpExec::build(&node, SetOpKind::PassThrough, &schemas).unwrap();
    assert_eq!(out_schema.count_visible(), 2);

    let out = exec.execute(&mut env.ctx()).unwrap();
    assert_eq!(
        rows_of(&out),
        vec![
            vec![Some(10), Some(0)],
            vec![Some(11), Some(0)],
            vec![Some(20), Some(1)],
        ]
    );
}

// the multiset identities of the three operators hold on random
// inputs.
#[test]
fn test_multiset_identities() {
    let seed: u64 = random();
    println!("test_multiset_identities seed:{}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    for _ in 0..20 {
        let a: Vec<i64> = (0..rng.gen_range(0..60)).map(|_| rng.gen_range(0..10)).collect();
        let b: Vec<i64> = (0..rng.gen_range(0..60)).map(|_| rng.gen_range(0..10)).collect();
        let count = |xs: &[i64], v: i64| xs.iter().filter(|x| **x == v).count() as i64;

        let inter = multiset(&run_setop(SetOpKind::IntersectAll, &a, &b));
        let except = multiset(&run_setop(SetOpKind::ExceptAll, &a, &b));
        let union_all = multiset(&run_setop(SetOpKind::UnionAll, &a, &b));

        for v in 0..10_i64 {
            let (ca, cb) = (count(&a, v), count(&b, v));
            assert_eq!(inter.get(&v).copied().unwrap_or(0), ca.min(cb), "v {}", v);
            assert_eq!(
                except.get(&v).copied().unwrap_or(0),
                (ca - cb).max(0),
                "v {}",
                v
            );
            assert_eq!(union_all.get(&v).copied().unwrap_or(0), ca + cb, "v {}", v);
        }
    }
}
