use std::sync::Arc;

use super::*;
use crate::{
    exec::testing::{bigint_rows, bigint_schema, col, rows_of, TestEnv},
    plan::{PlanNode, PlanNodeType, WindowFnSpec},
};

fn window_node(
    fns: Vec<WindowFnSpec>,
    partition_by: Vec<Expr>,
    order_by: Vec<(Expr, bool)>,
    out_cols: Vec<OutputColumn>,
) -> PlanNode {
    PlanNode {
        id: 20,
        ntype: PlanNodeType::WindowFunction,
        children: vec![1],
        output_schema: out_cols,
        inline: vec![],
        spec: NodeSpec::WindowFunction {
            fns,
            partition_by,
            order_by,
        },
    }
}

fn out_col(name: &str, expr: Expr) -> OutputColumn {
    OutputColumn {
        name: name.to_string(),
        expr,
        vtype: ValueType::BigInt,
        length: 0,
        in_bytes: false,
    }
}

// input sorted by (partition c0, order c1)
fn sample_input() -> Vec<Vec<Option<i64>>> {
    vec![
        vec![Some(1), Some(10)],
        vec![Some(1), Some(10)],
        vec![Some(1), Some(20)],
        vec![Some(2), Some(5)],
        vec![Some(2), Some(6)],
        vec![Some(2), Some(6)],
        vec![Some(2), Some(9)],
    ]
}

fn run_window(kind: WindowFnKind, expr: Option<Expr>) -> Vec<Vec<Option<i64>>> {
    let mut env = TestEnv::new();
    let schema = bigint_schema(2);
    env.outputs.insert(1, bigint_rows(&schema, &sample_input()));

    let fns = vec![WindowFnSpec {
        kind,
        expr,
        output_col: 0,
    }];
    let out_cols = vec![
        out_col("w", col(0, 0)),
        out_col("p", col(0, 0)),
        out_col("o", col(0, 1)),
    ];
    let node = window_node(fns, vec![col(0, 0)], vec![(col(0, 1), true)], out_cols);
    let exec = WindowFunctionExec::build(&node, Arc::clone(&schema)).unwrap();
    let out = exec.execute(&mut env.ctx()).unwrap();
    rows_of(&out)
}

#[test]
fn test_rank() {
    let got: Vec<i64> = run_window(WindowFnKind::Rank, None)
        .iter()
        .map(|r| r[0].unwrap())
        .collect();
    // peers share a rank; the next group jumps past them.
    assert_eq!(got, vec![1, 1, 3, 1, 2, 2, 4]);
}

#[test]
fn test_dense_rank() {
    let got: Vec<i64> = run_window(WindowFnKind::DenseRank, None)
        .iter()
        .map(|r| r[0].unwrap())
        .collect();
    assert_eq!(got, vec![1, 1, 2, 1, 2, 2, 3]);
}

#[test]
fn test_row_number() {
    let got: Vec<i64> = run_window(WindowFnKind::RowNumber, None)
        .iter()
        .map(|r| r[0].unwrap())
        .collect();
    assert_eq!(got, vec![1, 2, 3, 1, 2, 3, 4]);
}

#[test]
fn test_windowed_sum_runs_through_peers() {
    let got: Vec<i64> = run_window(WindowFnKind::Sum, Some(col(0, 1)))
        .iter()
        .map(|r| r[0].unwrap())
        .collect();
    // running sum through the current peer group, whole group at once:
    // partition 1: 10,10 -> 20,20 then +20 -> 40
    // partition 2: 5 -> 5; 6,6 -> 17,17; 9 -> 26
    assert_eq!(got, vec![20, 20, 40, 5, 17, 17, 26]);
}

#[test]
fn test_windowed_count_and_min() {
    let got: Vec<i64> = run_window(WindowFnKind::Count, Some(col(0, 1)))
        .iter()
        .map(|r| r[0].unwrap())
        .collect();
    assert_eq!(got, vec![2, 2, 3, 1, 3, 3, 4]);

    let got: Vec<i64> = run_window(WindowFnKind::Min, Some(col(0, 1)))
        .iter()
        .map(|r| r[0].unwrap())
        .collect();
    assert_eq!(got, vec![10, 10, 10, 5, 5, 5, 5]);
}

#[test]
fn test_pass_through_columns_ride_along() {
    let rows = run_window(WindowFnKind::Rank, None);
    let passthrough: Vec<(i64, i64)> = rows.iter().map(|r| (r[1].unwrap(), r[2].unwrap())).collect();
    let expect: Vec<(i64, i64)> = sample_input()
        .iter()
        .map(|r| (r[0].unwrap(), r[1].unwrap()))
        .collect();
    assert_eq!(passthrough, expect);
}
