//! Join executors: nested-loop, nested-loop-index and merge-join.
//!
//! Join-level expressions bind the outer row as tuple 0 and the inner
//! row as tuple 1. Inside a nested-loop-index join's inner scan the
//! convention flips: the scanned row is tuple 0 and the outer row rides
//! along as tuple 1 for search keys and the scan predicate. LEFT joins
//! pad unmatched outer rows with a pre-built all-null inner tuple.

use std::{collections::HashMap, sync::atomic::Ordering as AtomicOrdering, sync::Arc};

use crate::{
    exec::{node_projector, scan, ExecCtx},
    expr::{eval_predicate, EvalCtx, Expr},
    plan::{JoinType, NodeSpec, PlanNode, PlanNodeType},
    projector::Projector,
    schema::TupleSchema,
    table::{TempTable},
    tuple::{OwnedTuple, Tuple},
    value::Value,
    Result,
};

fn join_projector(
    node: &PlanNode,
    outer_schema: &Arc<TupleSchema>,
) -> Result<Projector> {
    match node_projector(node, outer_schema)? {
        Some(projector) => Ok(projector),
        None => err_at!(DecodeFail, msg: "join {} without output schema", node.id),
    }
}

pub struct NestLoopExec {
    pub outer: i32,
    pub inner: i32,
    pub join: JoinType,
    pub predicate: Option<Expr>,
    projector: Projector,
    inner_schema: Arc<TupleSchema>,
}

impl NestLoopExec {
    pub fn build(
        node: &PlanNode,
        join: JoinType,
        predicate: Option<Expr>,
        schemas: &HashMap<i32, Arc<TupleSchema>>,
    ) -> Result<(crate::exec::Exec, Arc<TupleSchema>)> {
        let (outer, inner) = two_children(node)?;
        let outer_schema = crate::exec::child_schema(schemas, outer)?;
        let inner_schema = crate::exec::child_schema(schemas, inner)?;
        let projector = join_projector(node, &outer_schema)?;
        let out_schema = Arc::clone(projector.out_schema());
        let exec = crate::exec::Exec::NestLoop(NestLoopExec {
            outer,
            inner,
            join,
            predicate,
            projector,
            inner_schema,
        });
        Ok((exec, out_schema))
    }

    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let outer_in = ctx.take_child(self.outer)?;
        let inner_in = ctx.take_child(self.inner)?;
        let mut out = TempTable::new(
            Arc::clone(self.projector.out_schema()),
            Some(ctx.limits.clone()),
        );
        let mut scratch = OwnedTuple::new(Arc::clone(self.projector.out_schema()))?;
        let null_inner = OwnedTuple::new(Arc::clone(&self.inner_schema))?;
        let mut scanned = 0_u64;
        {
            let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
            for outer_row in outer_in.iter() {
                if ctx.interrupt.load(AtomicOrdering::Relaxed) {
                    return err_at!(Interrupted, msg: "nested-loop join");
                }
                let mut matched = false;
                for inner_row in inner_in.iter() {
                    scanned += 1;
                    if !eval_predicate(&self.predicate, &cx, Some(&outer_row), Some(&inner_row))? {
                        continue;
                    }
                    matched = true;
                    self.projector
                        .project(&cx, &outer_row, Some(&inner_row), &mut scratch)?;
                    out.append_tuple(&scratch.as_tuple())?;
                }
                if !matched && self.join == JoinType::Left {
                    self.projector.project(
                        &cx,
                        &outer_row,
                        Some(&null_inner.as_tuple()),
                        &mut scratch,
                    )?;
                    out.append_tuple(&scratch.as_tuple())?;
                }
            }
        }
        ctx.tick(scanned);
        Ok(out)
    }
}

pub struct NestLoopIndexExec {
    pub outer: i32,
    pub join: JoinType,
    inner_scan: scan::IndexScanExec,
    projector: Projector,
    inner_schema: Arc<TupleSchema>,
}

impl NestLoopIndexExec {
    pub fn build(
        node: &PlanNode,
        join: JoinType,
        schemas: &HashMap<i32, Arc<TupleSchema>>,
        catalog_schemas: &dyn Fn(&str) -> Result<Arc<TupleSchema>>,
    ) -> Result<(crate::exec::Exec, Arc<TupleSchema>)> {
        let outer = match node.children.first() {
            Some(id) => *id,
            None => err_at!(DecodeFail, msg: "nlij {} needs an outer child", node.id)?,
        };
        let outer_schema = crate::exec::child_schema(schemas, outer)?;
        let scan_node = match node.inline_of(PlanNodeType::IndexScan) {
            Some(scan_node) => scan_node,
            None => err_at!(DecodeFail, msg: "nlij {} without inline index scan", node.id)?,
        };
        let (inner_scan, inner_schema) = match &scan_node.spec {
            NodeSpec::IndexScan {
                table,
                index,
                lookup,
                end_type,
                search_keys,
                end_keys,
                not_distinct,
                predicate,
                skip_null,
            } => {
                let table_schema = catalog_schemas(table)?;
                let exec = scan::IndexScanExec {
                    table: table.clone(),
                    index: index.clone(),
                    lookup: *lookup,
                    end_type: *end_type,
                    search_keys: search_keys.clone(),
                    end_keys: end_keys.clone(),
                    not_distinct: not_distinct.clone(),
                    predicate: predicate.clone(),
                    skip_null: skip_null.clone(),
                    routing: scan::RowRouting::raw(Arc::clone(&table_schema)),
                };
                (exec, table_schema)
            }
            spec => err_at!(DecodeFail, msg: "nlij inline node {:?}", spec)?,
        };
        let projector = join_projector(node, &outer_schema)?;
        let out_schema = Arc::clone(projector.out_schema());
        let exec = crate::exec::Exec::NestLoopIndex(NestLoopIndexExec {
            outer,
            join,
            inner_scan,
            projector,
            inner_schema,
        });
        Ok((exec, out_schema))
    }

    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let outer_in = ctx.take_child(self.outer)?;
        let mut out = TempTable::new(
            Arc::clone(self.projector.out_schema()),
            Some(ctx.limits.clone()),
        );
        let mut scratch = OwnedTuple::new(Arc::clone(self.projector.out_schema()))?;
        let null_inner = OwnedTuple::new(Arc::clone(&self.inner_schema))?;
        let mut scanned = 0_u64;
        {
            let ExecCtx {
                params,
                outputs,
                catalog,
                interrupt,
                limits,
                ..
            } = ctx;
            let cx = EvalCtx::with_outputs(params, outputs);
            let table = catalog.persistent(&self.inner_scan.table)?;
            let index = table.index(&self.inner_scan.index)?;

            for outer_row in outer_in.iter() {
                if interrupt.load(AtomicOrdering::Relaxed) {
                    return err_at!(Interrupted, msg: "nested-loop-index join");
                }
                let mut sink =
                    scan::RowSink::new(&self.inner_scan.routing, params, limits.clone())?;
                scanned += self.inner_scan.scan_into(
                    &cx,
                    table,
                    index,
                    Some(&outer_row),
                    interrupt,
                    &mut sink,
                )?;
                let matches = sink.finish(&cx, limits.clone())?;

                if matches.is_empty() {
                    if self.join == JoinType::Left {
                        self.projector.project(
                            &cx,
                            &outer_row,
                            Some(&null_inner.as_tuple()),
                            &mut scratch,
                        )?;
                        out.append_tuple(&scratch.as_tuple())?;
                    }
                    continue;
                }
                for inner_row in matches.iter() {
                    self.projector
                        .project(&cx, &outer_row, Some(&inner_row), &mut scratch)?;
                    out.append_tuple(&scratch.as_tuple())?;
                }
            }
        }
        ctx.tick(scanned);
        Ok(out)
    }
}

pub struct MergeJoinExec {
    pub outer: i32,
    pub inner: i32,
    pub join: JoinType,
    outer_keys: Vec<Expr>,
    inner_keys: Vec<Expr>,
    predicate: Option<Expr>,
    projector: Projector,
    inner_schema: Arc<TupleSchema>,
}

impl MergeJoinExec {
    pub fn build(
        node: &PlanNode,
        join: JoinType,
        outer_keys: Vec<Expr>,
        inner_keys: Vec<Expr>,
        predicate: Option<Expr>,
        schemas: &HashMap<i32, Arc<TupleSchema>>,
    ) -> Result<(crate::exec::Exec, Arc<TupleSchema>)> {
        let (outer, inner) = two_children(node)?;
        let outer_schema = crate::exec::child_schema(schemas, outer)?;
        let inner_schema = crate::exec::child_schema(schemas, inner)?;
        let projector = join_projector(node, &outer_schema)?;
        let out_schema = Arc::clone(projector.out_schema());
        let exec = crate::exec::Exec::MergeJoin(MergeJoinExec {
            outer,
            inner,
            join,
            outer_keys,
            inner_keys,
            predicate,
            projector,
            inner_schema,
        });
        Ok((exec, out_schema))
    }

    fn key_of(&self, cx: &EvalCtx, row: &Tuple, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| e.eval(cx, Some(row), None)).collect()
    }

    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let outer_in = ctx.take_child(self.outer)?;
        let inner_in = ctx.take_child(self.inner)?;
        let mut out = TempTable::new(
            Arc::clone(self.projector.out_schema()),
            Some(ctx.limits.clone()),
        );
        let mut scratch = OwnedTuple::new(Arc::clone(self.projector.out_schema()))?;
        let null_inner = OwnedTuple::new(Arc::clone(&self.inner_schema))?;
        {
            let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);

            let mut i = 0;
            let mut j = 0;
            while i < outer_in.len() {
                if ctx.interrupt.load(AtomicOrdering::Relaxed) {
                    return err_at!(Interrupted, msg: "merge join");
                }
                let outer_row = outer_in.tuple_at(i)?;
                let okey = self.key_of(&cx, &outer_row, &self.outer_keys)?;
                if j >= inner_in.len() {
                    if self.join == JoinType::Left {
                        self.projector.project(
                            &cx,
                            &outer_row,
                            Some(&null_inner.as_tuple()),
                            &mut scratch,
                        )?;
                        out.append_tuple(&scratch.as_tuple())?;
                    }
                    i += 1;
                    continue;
                }
                let ikey = self.key_of(&cx, &inner_in.tuple_at(j)?, &self.inner_keys)?;

                match cmp_keys(&okey, &ikey)? {
                    std::cmp::Ordering::Less => {
                        if self.join == JoinType::Left {
                            self.projector.project(
                                &cx,
                                &outer_row,
                                Some(&null_inner.as_tuple()),
                                &mut scratch,
                            )?;
                            out.append_tuple(&scratch.as_tuple())?;
                        }
                        i += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        j += 1;
                    }
                    std::cmp::Ordering::Equal => {
                        // bound the equal-key runs on both sides.
                        let mut i2 = i + 1;
                        while i2 < outer_in.len() {
                            let k = self.key_of(&cx, &outer_in.tuple_at(i2)?, &self.outer_keys)?;
                            if cmp_keys(&k, &okey)? != std::cmp::Ordering::Equal {
                                break;
                            }
                            i2 += 1;
                        }
                        let mut j2 = j + 1;
                        while j2 < inner_in.len() {
                            let k = self.key_of(&cx, &inner_in.tuple_at(j2)?, &self.inner_keys)?;
                            if cmp_keys(&k, &okey)? != std::cmp::Ordering::Equal {
                                break;
                            }
                            j2 += 1;
                        }
                        for oi in i..i2 {
                            let orow = outer_in.tuple_at(oi)?;
                            let mut matched = false;
                            for ij in j..j2 {
                                let irow = inner_in.tuple_at(ij)?;
                                if !eval_predicate(&self.predicate, &cx, Some(&orow), Some(&irow))?
                                {
                                    continue;
                                }
                                matched = true;
                                self.projector.project(&cx, &orow, Some(&irow), &mut scratch)?;
                                out.append_tuple(&scratch.as_tuple())?;
                            }
                            if !matched && self.join == JoinType::Left {
                                self.projector.project(
                                    &cx,
                                    &orow,
                                    Some(&null_inner.as_tuple()),
                                    &mut scratch,
                                )?;
                                out.append_tuple(&scratch.as_tuple())?;
                            }
                        }
                        i = i2;
                        j = j2;
                    }
                }
            }
        }
        ctx.tick((outer_in.len() + inner_in.len()) as u64);
        Ok(out)
    }
}

fn two_children(node: &PlanNode) -> Result<(i32, i32)> {
    match (node.children.first(), node.children.get(1)) {
        (Some(outer), Some(inner)) => Ok((*outer, *inner)),
        _ => err_at!(DecodeFail, msg: "join {} needs two children", node.id),
    }
}

pub(crate) fn cmp_keys(a: &[Value], b: &[Value]) -> Result<std::cmp::Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.cmp_nulls_first(y)?;
        if ord != std::cmp::Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(std::cmp::Ordering::Equal)
}

#[cfg(test)]
#[path = "join_test.rs"]
mod join_test;
