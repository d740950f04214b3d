//! Receive-side executors: plain receive and the k-way merge of
//! pre-sorted partition streams.
//!
//! Dependency buffers arrive from the host through
//! [crate::engine::Topend::load_dependency]. A merge-receive buffer is
//! `i32 partition-count`, then per partition `i32 tuple-count` followed
//! by that partition's network-format tuples, pre-sorted under the
//! plan's sort columns.

use std::sync::Arc;

use crate::{
    exec::{inline_agg, inline_limit, scan::RowRouting, scan::RowSink, ExecCtx},
    expr::{EvalCtx, Expr},
    plan::{schema_of, PlanNode},
    schema::TupleSchema,
    table::TempTable,
    tuple::{deserialize_tuple_be, OwnedTuple},
    util,
    value::Value,
    Result,
};

pub struct ReceiveExec {
    pub node_id: i32,
    pub out_schema: Arc<TupleSchema>,
}

impl ReceiveExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));
        let data = match ctx.topend.load_dependency(self.node_id)? {
            Some(data) => data,
            None => return Ok(out),
        };
        let mut off = 0;
        let count = util::read_i32_be(&data, &mut off)?;
        for _ in 0..count {
            let mut row = OwnedTuple::new(Arc::clone(&self.out_schema))?;
            deserialize_tuple_be(&data, &mut off, &mut row.as_mut())?;
            out.append_tuple(&row.as_tuple())?;
        }
        Ok(out)
    }
}

pub struct MergeReceiveExec {
    pub node_id: i32,
    sort_keys: Vec<(Expr, bool)>,
    routing: RowRouting,
    source_schema: Arc<TupleSchema>,
}

impl MergeReceiveExec {
    pub fn build(node: &PlanNode, sort_keys: Vec<(Expr, bool)>) -> Result<MergeReceiveExec> {
        if node.output_schema.is_empty() {
            return err_at!(DecodeFail, msg: "merge-receive {} without schema", node.id);
        }
        let source_schema = schema_of(&node.output_schema)?;
        // inline limit and serial aggregation ride on the merge.
        let agg = inline_agg(node, &source_schema)?;
        let limit = inline_limit(node);
        let routing = RowRouting::with_agg(Arc::clone(&source_schema), agg, limit);
        Ok(MergeReceiveExec {
            node_id: node.id,
            sort_keys,
            routing,
            source_schema,
        })
    }

    pub fn out_schema(&self) -> Arc<TupleSchema> {
        self.routing.out_schema()
    }

    fn sort_key(&self, cx: &EvalCtx, row: &OwnedTuple) -> Result<Vec<Value>> {
        self.sort_keys
            .iter()
            .map(|(e, _)| e.eval(cx, Some(&row.as_tuple()), None))
            .collect()
    }

    fn key_cmp(&self, a: &[Value], b: &[Value]) -> Result<std::cmp::Ordering> {
        for (i, (_, asc)) in self.sort_keys.iter().enumerate() {
            let ord = a[i].cmp_nulls_first(&b[i])?;
            let ord = match asc {
                true => ord,
                false => ord.reverse(),
            };
            if ord != std::cmp::Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(std::cmp::Ordering::Equal)
    }

    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let schema = Arc::clone(&self.source_schema);
        let data = ctx.topend.load_dependency(self.node_id)?;

        // decode per-partition batches; each is already sorted.
        let mut partitions: Vec<Vec<(OwnedTuple, Vec<Value>)>> = vec![];
        {
            let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
            if let Some(data) = &data {
                let mut off = 0;
                let n_parts = util::read_i32_be(data, &mut off)?;
                for _ in 0..n_parts {
                    let count = util::read_i32_be(data, &mut off)?;
                    let mut batch = Vec::with_capacity(count.max(0) as usize);
                    for _ in 0..count {
                        let mut row = OwnedTuple::new(Arc::clone(&schema))?;
                        deserialize_tuple_be(data, &mut off, &mut row.as_mut())?;
                        let key = self.sort_key(&cx, &row)?;
                        batch.push((row, key));
                    }
                    partitions.push(batch);
                }
            }
        }

        let mut sink = RowSink::new(&self.routing, ctx.params, ctx.limits.clone())?;
        let mut merged = 0_u64;
        {
            let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
            let mut heads: Vec<usize> = vec![0; partitions.len()];
            loop {
                if !sink.wants_more() {
                    break;
                }
                // smallest head under the sort comparator.
                let mut best: Option<usize> = None;
                for (p, batch) in partitions.iter().enumerate() {
                    if heads[p] >= batch.len() {
                        continue;
                    }
                    best = match best {
                        None => Some(p),
                        Some(b) => {
                            let cur = &batch[heads[p]].1;
                            let win = &partitions[b][heads[b]].1;
                            match self.key_cmp(cur, win)? {
                                std::cmp::Ordering::Less => Some(p),
                                _ => Some(b),
                            }
                        }
                    };
                }
                let p = match best {
                    Some(p) => p,
                    None => break, // all heads exhausted
                };
                let (row, _key) = &partitions[p][heads[p]];
                sink.push(&cx, &row.as_tuple(), None)?;
                heads[p] += 1;
                merged += 1;
            }
        }
        let out = {
            let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
            sink.finish(&cx, ctx.limits.clone())?
        };
        ctx.tick(merged);
        Ok(out)
    }
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod merge_test;
