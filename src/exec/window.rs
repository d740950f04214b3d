//! Windowed aggregates: PARTITION BY / ORDER BY with peer-group
//! buffering.
//!
//! Input arrives sorted on (partition-by, order-by). Rows buffer until
//! a group edge: start of input, new partition, new order-by peer
//! group, or end of input. Functions that need lookahead (the windowed
//! aggregates) see the whole peer group before any of its rows emit;
//! rank flavors only need the edge bookkeeping.

use std::sync::Arc;

use crate::{
    exec::ExecCtx,
    expr::{EvalCtx, Expr},
    plan::{schema_of, NodeSpec, OutputColumn, PlanNode, WindowFnKind, WindowFnSpec},
    schema::TupleSchema,
    table::TempTable,
    tuple::OwnedTuple,
    value::{Value, ValueType},
    Result,
};

pub struct WindowFunctionExec {
    pub child: i32,
    fns: Vec<WindowFnSpec>,
    partition_by: Vec<Expr>,
    order_by: Vec<Expr>,
    out_cols: Vec<OutputColumn>,
    out_schema: Arc<TupleSchema>,
    in_schema: Arc<TupleSchema>,
}

// Running value of one windowed function within a partition.
enum FnState {
    Rank,
    DenseRank,
    RowNumber,
    Count(i64),
    Sum(Option<Value>),
    Min(Option<Value>),
    Max(Option<Value>),
}

impl FnState {
    fn new(kind: WindowFnKind) -> FnState {
        match kind {
            WindowFnKind::Rank => FnState::Rank,
            WindowFnKind::DenseRank => FnState::DenseRank,
            WindowFnKind::RowNumber => FnState::RowNumber,
            WindowFnKind::Count => FnState::Count(0),
            WindowFnKind::Sum => FnState::Sum(None),
            WindowFnKind::Min => FnState::Min(None),
            WindowFnKind::Max => FnState::Max(None),
        }
    }

    fn advance(&mut self, value: &Value) -> Result<()> {
        match self {
            FnState::Rank | FnState::DenseRank | FnState::RowNumber => (),
            FnState::Count(n) => {
                if !value.is_null() {
                    *n += 1
                }
            }
            FnState::Sum(acc) => {
                if !value.is_null() {
                    *acc = Some(match acc.take() {
                        None => value.clone(),
                        Some(sum) => sum.add(value)?,
                    });
                }
            }
            FnState::Min(acc) => {
                if !value.is_null() {
                    let keep = match acc.take() {
                        None => value.clone(),
                        Some(cur) => match cur.cmp_values(value)? {
                            std::cmp::Ordering::Greater => value.clone(),
                            _ => cur,
                        },
                    };
                    *acc = Some(keep);
                }
            }
            FnState::Max(acc) => {
                if !value.is_null() {
                    let keep = match acc.take() {
                        None => value.clone(),
                        Some(cur) => match cur.cmp_values(value)? {
                            std::cmp::Ordering::Less => value.clone(),
                            _ => cur,
                        },
                    };
                    *acc = Some(keep);
                }
            }
        }
        Ok(())
    }

    // Value for a row of the just-completed peer group.
    fn value_for(&self, rows_before: i64, groups_before: i64, row_in_group: i64) -> Result<Value> {
        let v = match self {
            FnState::Rank => Value::BigInt(rows_before + 1),
            FnState::DenseRank => Value::BigInt(groups_before + 1),
            FnState::RowNumber => Value::BigInt(rows_before + row_in_group + 1),
            FnState::Count(n) => Value::BigInt(*n),
            FnState::Sum(acc) | FnState::Min(acc) | FnState::Max(acc) => match acc {
                Some(v) => v.clone(),
                None => Value::Null(ValueType::BigInt),
            },
        };
        Ok(v)
    }
}

struct PartitionState {
    rows_before: i64,
    groups_before: i64,
    fns: Vec<FnState>,
}

impl WindowFunctionExec {
    pub fn build(node: &PlanNode, in_schema: Arc<TupleSchema>) -> Result<WindowFunctionExec> {
        let (fns, partition_by, order_by) = match &node.spec {
            NodeSpec::WindowFunction {
                fns,
                partition_by,
                order_by,
            } => (
                fns.clone(),
                partition_by.clone(),
                order_by.iter().map(|(e, _)| e.clone()).collect::<Vec<Expr>>(),
            ),
            spec => err_at!(Fatal, msg: "window build over {:?}", spec)?,
        };
        if node.output_schema.is_empty() {
            return err_at!(DecodeFail, msg: "window node {} without output schema", node.id);
        }
        let child = match node.children.first() {
            Some(id) => *id,
            None => err_at!(DecodeFail, msg: "window node {} needs a child", node.id)?,
        };
        let out_schema = schema_of(&node.output_schema)?;
        Ok(WindowFunctionExec {
            child,
            fns,
            partition_by,
            order_by,
            out_cols: node.output_schema.clone(),
            out_schema,
            in_schema,
        })
    }

    pub fn out_schema(&self) -> Arc<TupleSchema> {
        Arc::clone(&self.out_schema)
    }

    fn keys(&self, cx: &EvalCtx, row: &crate::tuple::Tuple, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| e.eval(cx, Some(row), None)).collect()
    }

    fn flush_group(
        &self,
        cx: &EvalCtx,
        part: &mut PartitionState,
        buffer: &mut Vec<OwnedTuple>,
        out: &mut TempTable,
    ) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        // lookahead: the windowed aggregates absorb the whole peer
        // group before any of its rows emit.
        for (spec, state) in self.fns.iter().zip(part.fns.iter_mut()) {
            if !spec.kind.needs_lookahead() {
                continue;
            }
            for row in buffer.iter() {
                let value = match &spec.expr {
                    Some(expr) => expr.eval(cx, Some(&row.as_tuple()), None)?,
                    None => Value::BigInt(0),
                };
                state.advance(&value)?;
            }
        }

        for (i, row) in buffer.iter().enumerate() {
            let mut out_row = OwnedTuple::new(Arc::clone(&self.out_schema))?;
            for (c, col) in self.out_cols.iter().enumerate() {
                let fn_at = self.fns.iter().position(|f| f.output_col == c);
                let value = match fn_at {
                    Some(at) => part.fns[at].value_for(
                        part.rows_before,
                        part.groups_before,
                        i as i64,
                    )?,
                    None => col.expr.eval(cx, Some(&row.as_tuple()), None)?,
                };
                out_row.set_value(c, &value)?;
            }
            out.append_tuple(&out_row.as_tuple())?;
        }

        part.rows_before += buffer.len() as i64;
        part.groups_before += 1;
        buffer.clear();
        Ok(())
    }

    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let input = ctx.take_child(self.child)?;
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));
        let n = input.len() as u64;
        {
            let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
            let mut part = PartitionState {
                rows_before: 0,
                groups_before: 0,
                fns: self.fns.iter().map(|f| FnState::new(f.kind)).collect(),
            };
            let mut part_key: Option<Vec<Value>> = None;
            let mut order_key: Option<Vec<Value>> = None;
            let mut buffer: Vec<OwnedTuple> = vec![];

            for row in input.iter() {
                let pk = self.keys(&cx, &row, &self.partition_by)?;
                let ok = self.keys(&cx, &row, &self.order_by)?;

                if part_key.as_ref() != Some(&pk) {
                    // partition edge: finish the open group, restart.
                    self.flush_group(&cx, &mut part, &mut buffer, &mut out)?;
                    part = PartitionState {
                        rows_before: 0,
                        groups_before: 0,
                        fns: self.fns.iter().map(|f| FnState::new(f.kind)).collect(),
                    };
                    part_key = Some(pk);
                    order_key = Some(ok);
                } else if order_key.as_ref() != Some(&ok) {
                    // order-by edge within the partition.
                    self.flush_group(&cx, &mut part, &mut buffer, &mut out)?;
                    order_key = Some(ok);
                }

                let mut copy = OwnedTuple::new(Arc::clone(&self.in_schema))?;
                copy.copy_from(&row)?;
                buffer.push(copy);
            }
            self.flush_group(&cx, &mut part, &mut buffer, &mut out)?;
        }
        ctx.tick(n);
        Ok(out)
    }
}

#[cfg(test)]
#[path = "window_test.rs"]
mod window_test;
