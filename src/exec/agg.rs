//! Aggregation: group-keyed accumulators with DISTINCT de-duplication.
//!
//! One processor serves all three executor flavors. The group key
//! splits into a sorted prefix (whole key for the serial flavor, empty
//! for hash, a leading run for partial) and a hashed remainder: groups
//! accumulate in a map keyed by the remainder, and a prefix change
//! flushes the map. Pass-through columns evaluate against a saved
//! representative row of the group; a no-GROUP-BY aggregate always
//! emits exactly one row.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    exec::ExecCtx,
    expr::{EvalCtx, Expr},
    plan::{schema_of, AggOp, AggSpec, NodeSpec, OutputColumn, PlanNode, PlanNodeType},
    schema::TupleSchema,
    table::TempTable,
    tuple::{OwnedTuple, Tuple},
    value::{Value, ValueType},
    Result,
};

/// One accumulator. NULL inputs are ignored except for COUNT(*).
enum Acc {
    CountStar(i64),
    Count(i64),
    Sum(Option<Value>),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg(Option<Value>, i64),
}

impl Acc {
    fn new(op: AggOp) -> Acc {
        match op {
            AggOp::CountStar => Acc::CountStar(0),
            AggOp::Count => Acc::Count(0),
            AggOp::Sum => Acc::Sum(None),
            AggOp::Min => Acc::Min(None),
            AggOp::Max => Acc::Max(None),
            AggOp::Avg => Acc::Avg(None, 0),
        }
    }

    fn advance(&mut self, value: &Value) -> Result<()> {
        match self {
            Acc::CountStar(n) => *n += 1,
            Acc::Count(n) => {
                if !value.is_null() {
                    *n += 1
                }
            }
            Acc::Sum(acc) => {
                if !value.is_null() {
                    *acc = Some(match acc.take() {
                        None => value.clone(),
                        Some(sum) => sum.add(value)?,
                    });
                }
            }
            Acc::Min(acc) => {
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
            Acc::Max(acc) => {
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
            Acc::Avg(acc, n) => {
                if !value.is_null() {
                    *acc = Some(match acc.take() {
                        None => value.clone(),
                        Some(sum) => sum.add(value)?,
                    });
                    *n += 1;
                }
            }
        }
        Ok(())
    }

    fn final_value(&self) -> Result<Value> {
        let v = match self {
            Acc::CountStar(n) => Value::BigInt(*n),
            Acc::Count(n) => Value::BigInt(*n),
            Acc::Sum(None) | Acc::Min(None) | Acc::Max(None) | Acc::Avg(None, _) => {
                Value::Null(ValueType::BigInt)
            }
            Acc::Sum(Some(v)) | Acc::Min(Some(v)) | Acc::Max(Some(v)) => v.clone(),
            Acc::Avg(Some(sum), n) => sum.div(&Value::BigInt(*n))?,
        };
        Ok(v)
    }
}

struct GroupState {
    accs: Vec<Acc>,
    distinct: Vec<Option<HashSet<Value>>>,
    rep: OwnedTuple,
}

/// Per-run aggregation state.
pub struct AggState {
    current_prefix: Option<Vec<Value>>,
    groups: HashMap<Vec<Value>, GroupState>,
    saw_input: bool,
}

/// Compiled aggregation logic, shared by the standalone executor and
/// the scans' inline aggregation.
pub struct AggProcessor {
    prefix_len: usize,
    aggs: Vec<AggSpec>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
    out_cols: Vec<OutputColumn>,
    out_schema: Arc<TupleSchema>,
    in_schema: Arc<TupleSchema>,
}

impl AggProcessor {
    pub fn build(node: &PlanNode, in_schema: Arc<TupleSchema>) -> Result<AggProcessor> {
        let (aggs, group_by, having, sorted_prefix) = match &node.spec {
            NodeSpec::Aggregate {
                aggs,
                group_by,
                having,
                sorted_prefix,
            } => (aggs.clone(), group_by.clone(), having.clone(), *sorted_prefix),
            spec => err_at!(Fatal, msg: "aggregate build over {:?}", spec)?,
        };
        let prefix_len = match node.ntype {
            PlanNodeType::Aggregate => group_by.len(),
            PlanNodeType::PartialAggregate => sorted_prefix.min(group_by.len()),
            _ => 0,
        };
        if node.output_schema.is_empty() {
            return err_at!(DecodeFail, msg: "aggregate {} without output schema", node.id);
        }
        let out_schema = schema_of(&node.output_schema)?;
        Ok(AggProcessor {
            prefix_len,
            aggs,
            group_by,
            having,
            out_cols: node.output_schema.clone(),
            out_schema,
            in_schema,
        })
    }

    pub fn out_schema(&self) -> Arc<TupleSchema> {
        Arc::clone(&self.out_schema)
    }

    pub fn new_state(&self) -> AggState {
        AggState {
            current_prefix: None,
            groups: HashMap::new(),
            saw_input: false,
        }
    }

    fn new_group(&self, row: &Tuple) -> Result<GroupState> {
        let mut rep = OwnedTuple::new(Arc::clone(&self.in_schema))?;
        rep.copy_from(row)?;
        Ok(GroupState {
            accs: self.aggs.iter().map(|a| Acc::new(a.op)).collect(),
            distinct: self
                .aggs
                .iter()
                .map(|a| match a.distinct {
                    true => Some(HashSet::new()),
                    false => None,
                })
                .collect(),
            rep,
        })
    }

    /// Accumulate one input row. Serial and partial flavors may emit
    /// completed groups into `out` as sorted prefixes change.
    pub fn feed(
        &self,
        st: &mut AggState,
        cx: &EvalCtx,
        row: &Tuple,
        out: &mut TempTable,
    ) -> Result<()> {
        st.saw_input = true;
        let mut key = Vec::with_capacity(self.group_by.len());
        for expr in self.group_by.iter() {
            key.push(expr.eval(cx, Some(row), None)?);
        }
        let remainder = key.split_off(self.prefix_len.min(key.len()));
        let prefix = key;

        if st.current_prefix.as_ref() != Some(&prefix) {
            self.flush(st, cx, out)?;
            st.current_prefix = Some(prefix);
        }

        if !st.groups.contains_key(&remainder) {
            let group = self.new_group(row)?;
            st.groups.insert(remainder.clone(), group);
        }
        let group = match st.groups.get_mut(&remainder) {
            Some(group) => group,
            None => unreachable!(),
        };

        for (i, spec) in self.aggs.iter().enumerate() {
            let value = match &spec.expr {
                Some(expr) => expr.eval(cx, Some(row), None)?,
                None => Value::BigInt(0), // COUNT(*) counts rows
            };
            if let Some(seen) = group.distinct[i].as_mut() {
                if !value.is_null() && !seen.insert(value.clone()) {
                    continue;
                }
            }
            group.accs[i].advance(&value)?;
        }
        Ok(())
    }

    fn flush(&self, st: &mut AggState, cx: &EvalCtx, out: &mut TempTable) -> Result<()> {
        let groups: Vec<GroupState> = st.groups.drain().map(|(_k, g)| g).collect();
        for group in groups {
            self.emit(cx, group, out)?;
        }
        Ok(())
    }

    fn emit(&self, cx: &EvalCtx, group: GroupState, out: &mut TempTable) -> Result<()> {
        let mut row = OwnedTuple::new(Arc::clone(&self.out_schema))?;
        for (i, col) in self.out_cols.iter().enumerate() {
            let agg_at = self.aggs.iter().position(|a| a.output_col == i);
            let value = match agg_at {
                Some(at) => group.accs[at].final_value()?,
                None => col.expr.eval(cx, Some(&group.rep.as_tuple()), None)?,
            };
            row.set_value(i, &value)?;
        }
        if let Some(having) = &self.having {
            if !having.eval(cx, Some(&row.as_tuple()), None)?.is_true() {
                return Ok(());
            }
        }
        out.append_tuple(&row.as_tuple())
    }

    /// End of input: flush open groups; an empty no-GROUP-BY input
    /// still emits its single row.
    pub fn finish(&self, mut st: AggState, cx: &EvalCtx, out: &mut TempTable) -> Result<()> {
        self.flush(&mut st, cx, out)?;
        if !st.saw_input && self.group_by.is_empty() {
            let empty_rep = OwnedTuple::new(Arc::clone(&self.in_schema))?;
            let group = GroupState {
                accs: self.aggs.iter().map(|a| Acc::new(a.op)).collect(),
                distinct: self.aggs.iter().map(|_| None).collect(),
                rep: empty_rep,
            };
            self.emit(cx, group, out)?;
        }
        Ok(())
    }
}

/// Standalone aggregation executor (serial, partial or hash, per the
/// plan-node type baked into the processor).
pub struct AggregateExec {
    pub child: i32,
    pub processor: AggProcessor,
}

impl AggregateExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let input = ctx.take_child(self.child)?;
        let mut out = TempTable::new(self.processor.out_schema(), Some(ctx.limits.clone()));
        let mut state = self.processor.new_state();
        let n = input.len() as u64;
        {
            let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
            for row in input.iter() {
                self.processor.feed(&mut state, &cx, &row, &mut out)?;
            }
            self.processor.finish(state, &cx, &mut out)?;
        }
        ctx.tick(n);
        Ok(out)
    }
}

#[cfg(test)]
#[path = "agg_test.rs"]
mod agg_test;
