//! Set operators over N child temp tables: UNION, INTERSECT and EXCEPT
//! in distinct and ALL variants, plus the pass-through router that tags
//! rows with their input index.
//!
//! Result rows are always drawn from the first input, in its order;
//! the other inputs only contribute occurrence counts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    exec::ExecCtx,
    plan::{schema_of, PlanNode, SetOpKind},
    schema::{ColumnSpec, TupleSchema},
    table::TempTable,
    tuple::{OwnedTuple, Tuple},
    value::{Value, ValueType},
    Result,
};

pub struct SetOpExec {
    pub kind: SetOpKind,
    pub children: Vec<i32>,
    pub out_schema: Arc<TupleSchema>,
}

impl SetOpExec {
    pub fn build(
        node: &PlanNode,
        kind: SetOpKind,
        schemas: &HashMap<i32, Arc<TupleSchema>>,
    ) -> Result<(crate::exec::Exec, Arc<TupleSchema>)> {
        if node.children.is_empty() {
            return err_at!(DecodeFail, msg: "set-op {} without children", node.id);
        }
        let first = crate::exec::child_schema(schemas, node.children[0])?;
        let out_schema = match node.output_schema.is_empty() {
            false => schema_of(&node.output_schema)?,
            true => match kind {
                // pass-through appends the partition tag column.
                SetOpKind::PassThrough => {
                    let mut specs: Vec<ColumnSpec> = (0..first.count_visible())
                        .map(|i| {
                            let c = first.column(i);
                            ColumnSpec {
                                name: c.name.clone(),
                                vtype: c.vtype,
                                length: c.length,
                                in_bytes: c.in_bytes,
                            }
                        })
                        .collect();
                    specs.push(ColumnSpec::new("input_index", ValueType::Integer));
                    TupleSchema::new(specs, vec![])?
                }
                _ => first,
            },
        };
        let exec = crate::exec::Exec::SetOp(SetOpExec {
            kind,
            children: node.children.clone(),
            out_schema: Arc::clone(&out_schema),
        });
        Ok((exec, out_schema))
    }

    fn row_key(row: &Tuple) -> Result<Vec<Value>> {
        row.values()
    }

    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let mut inputs = Vec::with_capacity(self.children.len());
        for id in self.children.iter() {
            inputs.push(ctx.take_child(*id)?);
        }
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));

        match self.kind {
            SetOpKind::UnionAll => {
                for input in inputs.iter() {
                    for row in input.iter() {
                        out.append_tuple(&row)?;
                    }
                }
            }
            SetOpKind::Union => {
                let mut seen: HashSet<Vec<Value>> = HashSet::new();
                for input in inputs.iter() {
                    for row in input.iter() {
                        if seen.insert(Self::row_key(&row)?) {
                            out.append_tuple(&row)?;
                        }
                    }
                }
            }
            SetOpKind::PassThrough => {
                for (i, input) in inputs.iter().enumerate() {
                    for row in input.iter() {
                        let mut tagged = OwnedTuple::new(Arc::clone(&self.out_schema))?;
                        for c in 0..input.schema().count_visible() {
                            tagged.set_value(c, &row.value(c)?)?;
                        }
                        let tag = input.schema().count_visible();
                        tagged.set_value(tag, &Value::Integer(i as i32))?;
                        out.append_tuple(&tagged.as_tuple())?;
                    }
                }
            }
            SetOpKind::Intersect
            | SetOpKind::IntersectAll
            | SetOpKind::Except
            | SetOpKind::ExceptAll => {
                // per-input occurrence counts.
                let mut counts: Vec<HashMap<Vec<Value>, i64>> = vec![];
                for input in inputs.iter() {
                    let mut map: HashMap<Vec<Value>, i64> = HashMap::new();
                    for row in input.iter() {
                        *map.entry(Self::row_key(&row)?).or_insert(0) += 1;
                    }
                    counts.push(map);
                }

                let mut emitted: HashMap<Vec<Value>, i64> = HashMap::new();
                for row in inputs[0].iter() {
                    let key = Self::row_key(&row)?;
                    let allowed = self.allowance(&key, &counts);
                    let done = emitted.entry(key).or_insert(0);
                    if *done < allowed {
                        *done += 1;
                        out.append_tuple(&row)?;
                    }
                }
            }
        }
        Ok(out)
    }

    // how many copies of `key` the result may carry.
    fn allowance(&self, key: &[Value], counts: &[HashMap<Vec<Value>, i64>]) -> i64 {
        let at = |i: usize| -> i64 { counts[i].get(key).copied().unwrap_or(0) };
        match self.kind {
            SetOpKind::IntersectAll => {
                (0..counts.len()).map(at).min().unwrap_or(0)
            }
            SetOpKind::Intersect => {
                match (0..counts.len()).all(|i| at(i) > 0) {
                    true => 1,
                    false => 0,
                }
            }
            SetOpKind::ExceptAll => {
                let others: i64 = (1..counts.len()).map(at).sum();
                (at(0) - others).max(0)
            }
            SetOpKind::Except => {
                let others: i64 = (1..counts.len()).map(at).sum();
                match at(0) > 0 && others == 0 {
                    true => 1,
                    false => 0,
                }
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
#[path = "setop_test.rs"]
mod setop_test;
