//! Row-source executors: sequential scan, index scan, index count and
//! table count.
//!
//! The index scan carries the cast-failure protocol: while materializing
//! search keys, overflow/underflow/width-mismatch degrade the scan
//! (empty result, edge start, or truncated-prefix probe with a promoted
//! lookup) instead of unwinding. All scans route surviving rows through
//! a shared [RowRouting]: optional inline projection, optional inline
//! aggregation, limit/offset, optional inline insert target.

use std::sync::{atomic::Ordering, Arc};

use crate::{
    exec::{
        agg::{AggProcessor, AggState},
        dml,
        filter::{CountingPostfilter, LimitSpec},
        inline_agg, inline_insert, inline_limit, node_projector, ExecCtx,
    },
    expr::{eval_predicate, EvalCtx, Expr},
    plan::{LookupType, PlanNode},
    projector::Projector,
    schema::TupleSchema,
    table::{PersistentTable, SharedLimits, TempTable},
    tuple::{KeyTuple, OwnedTuple, Tuple},
    value::Value,
    Error, Result,
};

/// Inline-insert target of a scan.
pub struct InsertSink {
    pub table: String,
    pub multi_partition: bool,
}

/// Per-row destination shared by the scan executors.
pub struct RowRouting {
    projector: Option<Projector>,
    agg: Option<AggProcessor>,
    limit: LimitSpec,
    pub insert: Option<InsertSink>,
    out_schema: Arc<TupleSchema>,
}

impl RowRouting {
    pub fn build(node: &PlanNode, in_schema: &Arc<TupleSchema>) -> Result<RowRouting> {
        let projector = node_projector(node, in_schema)?;
        let agg_input = match &projector {
            Some(p) => Arc::clone(p.out_schema()),
            None => Arc::clone(in_schema),
        };
        let agg = inline_agg(node, &agg_input)?;
        let limit = inline_limit(node);
        let insert = inline_insert(node)?;
        let out_schema = match (&agg, &projector) {
            (Some(agg), _) => agg.out_schema(),
            (None, Some(p)) => Arc::clone(p.out_schema()),
            (None, None) => Arc::clone(in_schema),
        };
        Ok(RowRouting {
            projector,
            agg,
            limit,
            insert,
            out_schema,
        })
    }

    /// Pass rows through untouched; used where a parent drives the
    /// scan and shapes the output itself.
    pub fn raw(out_schema: Arc<TupleSchema>) -> RowRouting {
        RowRouting {
            projector: None,
            agg: None,
            limit: LimitSpec::none(),
            insert: None,
            out_schema,
        }
    }

    /// Rows pass straight to an optional inline aggregation under an
    /// optional limit; no projection, no insert target.
    pub fn with_agg(
        source_schema: Arc<TupleSchema>,
        agg: Option<AggProcessor>,
        limit: LimitSpec,
    ) -> RowRouting {
        let out_schema = match &agg {
            Some(agg) => agg.out_schema(),
            None => Arc::clone(&source_schema),
        };
        RowRouting {
            projector: None,
            agg,
            limit,
            insert: None,
            out_schema,
        }
    }

    pub fn out_schema(&self) -> Arc<TupleSchema> {
        Arc::clone(&self.out_schema)
    }
}

/// Run-time sink over a [RowRouting].
pub(crate) struct RowSink<'a> {
    routing: &'a RowRouting,
    post: CountingPostfilter<'a>,
    agg_state: Option<AggState>,
    scratch: Option<OwnedTuple>,
    out: TempTable,
    limit: i64,
    offset: i64,
}

impl<'a> RowSink<'a> {
    pub fn new(
        routing: &'a RowRouting,
        params: &[Value],
        limits: SharedLimits,
    ) -> Result<RowSink<'a>> {
        let (limit, offset) = routing.limit.resolve(params)?;
        let agg_state = routing.agg.as_ref().map(|agg| agg.new_state());
        let scratch = match &routing.projector {
            Some(p) => Some(OwnedTuple::new(Arc::clone(p.out_schema()))?),
            None => None,
        };
        let out_schema = match &routing.agg {
            Some(agg) => agg.out_schema(),
            None => routing.out_schema(),
        };
        // aggregation applies limit/offset to its own output, after
        // the fact; the row-level postfilter stays wide open there.
        let post = match routing.agg.is_some() {
            true => CountingPostfilter::pass_all(None),
            false => CountingPostfilter::new(None, limit, offset),
        };
        Ok(RowSink {
            routing,
            post,
            agg_state,
            scratch,
            out: TempTable::new(out_schema, Some(limits)),
            limit,
            offset,
        })
    }

    /// False once the limit has been reached on the non-aggregating
    /// path; scan loops exit on it.
    pub fn wants_more(&self) -> bool {
        self.agg_state.is_some() || self.post.is_under_limit()
    }

    /// Route one predicate-passing row.
    pub fn push(&mut self, cx: &EvalCtx, row: &Tuple, outer: Option<&Tuple>) -> Result<()> {
        let RowSink {
            routing,
            post,
            agg_state,
            scratch,
            out,
            ..
        } = self;

        let projected: Option<&OwnedTuple> = match (&routing.projector, scratch.as_mut()) {
            (Some(p), Some(scratch)) => {
                p.project(cx, row, outer, scratch)?;
                Some(&*scratch)
            }
            _ => None,
        };

        match (&routing.agg, agg_state.as_mut()) {
            (Some(agg), Some(state)) => {
                match projected {
                    Some(p) => agg.feed(state, cx, &p.as_tuple(), out)?,
                    None => agg.feed(state, cx, row, out)?,
                }
            }
            _ => {
                if post.eval(cx, Some(row), outer)? {
                    match projected {
                        Some(p) => out.append_tuple(&p.as_tuple())?,
                        None => out.append_tuple(row)?,
                    }
                }
            }
        }
        Ok(())
    }

    /// Flush aggregation and apply any post-aggregation limit.
    pub fn finish(mut self, cx: &EvalCtx, limits: SharedLimits) -> Result<TempTable> {
        if let (Some(agg), Some(state)) = (&self.routing.agg, self.agg_state.take()) {
            agg.finish(state, cx, &mut self.out)?;
            if self.limit >= 0 || self.offset > 0 {
                let mut trimmed = TempTable::new(self.out.schema().clone(), Some(limits));
                let from = self.offset.max(0) as usize;
                let to = match self.limit >= 0 {
                    true => (from + self.limit as usize).min(self.out.len()),
                    false => self.out.len(),
                };
                for i in from..to {
                    trimmed.append_tuple(&self.out.tuple_at(i)?)?;
                }
                return Ok(trimmed);
            }
        }
        Ok(self.out)
    }
}

// Apply an inline-insert sink: rows land in the target table, the
// executor's own output becomes a count row.
pub(crate) fn apply_insert_sink(
    ctx: &mut ExecCtx,
    sink: &InsertSink,
    rows: TempTable,
) -> Result<TempTable> {
    let n = dml::insert_rows(ctx, &sink.table, false, sink.multi_partition, &rows)?;
    let mut out = TempTable::new(
        crate::exec::count_schema("modified_tuples")?,
        Some(ctx.limits.clone()),
    );
    out.append_values(&[Value::BigInt(n)])?;
    Ok(out)
}

pub enum ScanSource {
    Table(String),
    Child(i32),
}

pub struct SeqScanExec {
    pub source: ScanSource,
    pub predicate: Option<Expr>,
    pub routing: RowRouting,
}

impl SeqScanExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let child = match &self.source {
            ScanSource::Child(id) => Some(ctx.take_child(*id)?),
            ScanSource::Table(_) => None,
        };

        let mut sink = RowSink::new(&self.routing, ctx.params, ctx.limits.clone())?;
        let mut scanned = 0_u64;
        {
            let ExecCtx {
                params,
                outputs,
                catalog,
                interrupt,
                ..
            } = ctx;
            let cx = EvalCtx::with_outputs(params, outputs);

            match &self.source {
                ScanSource::Table(name) => {
                    let table = catalog.persistent(name)?;
                    for (_row_id, row) in table.iter() {
                        scanned += 1;
                        if scanned % 1024 == 0 && interrupt.load(Ordering::Relaxed) {
                            return err_at!(Interrupted, msg: "seqscan of {}", name);
                        }
                        if !sink.wants_more() {
                            break;
                        }
                        if !eval_predicate(&self.predicate, &cx, Some(&row), None)? {
                            continue;
                        }
                        sink.push(&cx, &row, None)?;
                    }
                }
                ScanSource::Child(_) => {
                    let input = match child.as_ref() {
                        Some(input) => input,
                        None => unreachable!(),
                    };
                    for row in input.iter() {
                        scanned += 1;
                        if !sink.wants_more() {
                            break;
                        }
                        if !eval_predicate(&self.predicate, &cx, Some(&row), None)? {
                            continue;
                        }
                        sink.push(&cx, &row, None)?;
                    }
                }
            }
        }

        let out = {
            let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
            sink.finish(&cx, ctx.limits.clone())?
        };
        ctx.tick(scanned);
        match &self.routing.insert {
            Some(ins) => apply_insert_sink(ctx, ins, out),
            None => Ok(out),
        }
    }
}

// Outcome of materializing a search or end key.
enum KeySetup {
    Empty,
    Edge,
    Key(KeyTuple, LookupType),
}

pub struct IndexScanExec {
    pub table: String,
    pub index: String,
    pub lookup: LookupType,
    pub end_type: LookupType,
    pub search_keys: Vec<Expr>,
    pub end_keys: Vec<Expr>,
    pub not_distinct: Vec<bool>,
    pub predicate: Option<Expr>,
    pub skip_null: Option<Expr>,
    pub routing: RowRouting,
}

impl IndexScanExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let mut sink = RowSink::new(&self.routing, ctx.params, ctx.limits.clone())?;
        let mut scanned = 0_u64;
        {
            let ExecCtx {
                params,
                outputs,
                catalog,
                interrupt,
                ..
            } = ctx;
            let cx = EvalCtx::with_outputs(params, outputs);
            let table = catalog.persistent(&self.table)?;
            let index = table.index(&self.index)?;
            scanned = self.scan_into(&cx, table, index, None, interrupt, &mut sink)?;
        }
        let out = {
            let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
            sink.finish(&cx, ctx.limits.clone())?
        };
        ctx.tick(scanned);
        match &self.routing.insert {
            Some(ins) => apply_insert_sink(ctx, ins, out),
            None => Ok(out),
        }
    }

    /// Drive the scan into `sink`, binding `outer` as tuple 1 for key
    /// and predicate expressions (nested-loop-index join reuse).
    pub(crate) fn scan_into(
        &self,
        cx: &EvalCtx,
        table: &PersistentTable,
        index: &crate::index::TableIndex,
        outer: Option<&Tuple>,
        interrupt: &std::sync::atomic::AtomicBool,
        sink: &mut RowSink,
    ) -> Result<u64> {
        let mut scanned = 0_u64;

        if self.lookup == LookupType::GeoContains {
            return self.scan_geo(cx, table, index, outer, sink);
        }

        let search = self.setup_key(
            cx,
            outer,
            index,
            &self.search_keys,
            self.lookup,
            &self.not_distinct,
        )?;
        let (probe, lookup) = match search {
            KeySetup::Empty => return Ok(0),
            KeySetup::Edge => (None, self.lookup),
            KeySetup::Key(key, lookup) => (Some(key), lookup),
        };

        let end = match self.end_keys.is_empty() {
            true => None,
            false => {
                match self.setup_key(
                    cx,
                    outer,
                    index,
                    &self.end_keys,
                    self.end_type,
                    &self.not_distinct,
                )? {
                    KeySetup::Empty => return Ok(0),
                    KeySetup::Edge => None,
                    KeySetup::Key(key, end_type) => Some((key, end_type)),
                }
            }
        };

        let reverse = lookup.is_reverse();
        let eq_probe = match lookup {
            LookupType::Eq => probe.as_ref(),
            _ => None,
        };

        // hash indexes only answer full equality probes.
        if !index.is_countable() {
            let probe = match (lookup, probe.as_ref()) {
                (LookupType::Eq, Some(probe)) => probe,
                _ => {
                    return err_at!(
                        InvalidInput,
                        msg: "range scan over hash index {}", self.index
                    )
                }
            };
            if let Some(rows) = index.get(probe) {
                for row_id in rows.to_vec() {
                    let row = table.tuple(row_id)?;
                    scanned += 1;
                    if !sink.wants_more() {
                        break;
                    }
                    if !eval_predicate(&self.predicate, cx, Some(&row), outer)? {
                        continue;
                    }
                    sink.push(cx, &row, outer)?;
                }
            }
            return Ok(scanned);
        }

        let mut cursor = match probe.as_ref() {
            None => index.cursor_all(reverse)?,
            Some(key) => {
                let inclusive = matches!(
                    lookup,
                    LookupType::Eq | LookupType::Gte | LookupType::Lte
                );
                index.cursor_from(key, inclusive, reverse)?
            }
        };

        while let Some((key, row_id)) = cursor.next_entry() {
            scanned += 1;
            if scanned % 512 == 0 && interrupt.load(Ordering::Relaxed) {
                return err_at!(Interrupted, msg: "indexscan of {}", self.index);
            }
            if !sink.wants_more() {
                break;
            }
            // equality scans walk matches of one key.
            if let Some(probe) = eq_probe {
                if key.cmp(probe) != std::cmp::Ordering::Equal {
                    break;
                }
            }
            if let Some((end_key, end_type)) = &end {
                let ord = key.cmp(end_key);
                let past = match end_type {
                    LookupType::Lt => ord != std::cmp::Ordering::Less,
                    LookupType::Lte => ord == std::cmp::Ordering::Greater,
                    LookupType::Gt => ord != std::cmp::Ordering::Greater,
                    LookupType::Gte => ord == std::cmp::Ordering::Less,
                    _ => false,
                };
                if past {
                    break;
                }
            }
            let row = table.tuple(row_id)?;
            if !eval_predicate(&self.predicate, cx, Some(&row), outer)? {
                continue;
            }
            sink.push(cx, &row, outer)?;
        }
        Ok(scanned)
    }

    // GEO_CONTAINS: walk the indexed column's rows and test polygon
    // containment of the probe point.
    fn scan_geo(
        &self,
        cx: &EvalCtx,
        table: &PersistentTable,
        index: &crate::index::TableIndex,
        outer: Option<&Tuple>,
        sink: &mut RowSink,
    ) -> Result<u64> {
        let point = match self.search_keys.first() {
            Some(expr) => expr.eval(cx, None, outer)?,
            None => err_at!(InvalidInput, msg: "geo scan without a probe point")?,
        };
        let col = match index.scheme.columns.first() {
            Some(col) => *col,
            None => err_at!(InvalidInput, msg: "geo index without columns")?,
        };
        let mut scanned = 0_u64;
        for (_row_id, row) in table.iter() {
            scanned += 1;
            if !sink.wants_more() {
                break;
            }
            let polygon = row.value(col)?;
            if polygon.is_null() || !polygon.op_contains(&point)?.is_true() {
                continue;
            }
            if !eval_predicate(&self.predicate, cx, Some(&row), outer)? {
                continue;
            }
            sink.push(cx, &row, outer)?;
        }
        Ok(scanned)
    }

    // Materialize a key; cast failures degrade the scan per the
    // lookup flavor and key position.
    fn setup_key(
        &self,
        cx: &EvalCtx,
        outer: Option<&Tuple>,
        index: &crate::index::TableIndex,
        exprs: &[Expr],
        mut lookup: LookupType,
        not_distinct: &[bool],
    ) -> Result<KeySetup> {
        if exprs.is_empty() {
            return Ok(KeySetup::Edge);
        }
        let mut key = KeyTuple::new(Arc::clone(&index.scheme.key_schema))?;
        let reverse = lookup.is_reverse();
        for (i, expr) in exprs.iter().enumerate() {
            let v = expr.eval(cx, None, outer)?;
            if v.is_null() && !not_distinct.get(i).copied().unwrap_or(false) {
                // NULL compares unequal to everything.
                return Ok(KeySetup::Empty);
            }
            match key.set_value(i, &v) {
                Ok(()) => (),
                Err(err) if err.is_cast_failure() => {
                    let last = i == exprs.len() - 1;
                    if lookup == LookupType::Eq || !last {
                        return Ok(KeySetup::Empty);
                    }
                    match err {
                        Error::Overflow(_, _) => {
                            return match reverse {
                                // below the top from above: everything.
                                true => Ok(KeySetup::Edge),
                                false => Ok(KeySetup::Empty),
                            };
                        }
                        Error::Underflow(_, _) => {
                            return match reverse {
                                true => Ok(KeySetup::Empty),
                                false => Ok(KeySetup::Edge),
                            };
                        }
                        Error::WidthMismatch(_, _) => {
                            key.shrink_set_value(i, &v)?;
                            // truncated prefix: the exact boundary moved.
                            lookup = match reverse {
                                false => LookupType::Gt,
                                true => LookupType::Lte,
                            };
                            break;
                        }
                        _ => unreachable!(),
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(KeySetup::Key(key, lookup))
    }
}

pub struct IndexCountExec {
    pub table: String,
    pub index: String,
    pub lookup: LookupType,
    pub end_type: LookupType,
    pub search_keys: Vec<Expr>,
    pub end_keys: Vec<Expr>,
    pub not_distinct: Vec<bool>,
    pub skip_null: Option<Expr>,
    pub out_schema: Arc<TupleSchema>,
}

impl IndexCountExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));
        let count = {
            let ExecCtx {
                params,
                outputs,
                catalog,
                ..
            } = ctx;
            let cx = EvalCtx::with_outputs(params, outputs);
            let table = catalog.persistent(&self.table)?;
            let index = table.index(&self.index)?;
            if !index.is_countable() {
                return err_at!(InvalidInput, msg: "index count over hash index {}", self.index);
            }
            self.count(&cx, table, index)?
        };
        out.append_values(&[Value::BigInt(count)])?;
        Ok(out)
    }

    fn count(
        &self,
        cx: &EvalCtx,
        table: &PersistentTable,
        index: &crate::index::TableIndex,
    ) -> Result<i64> {
        let total = index.len();

        // leading NULL rows sort first and are excluded from ranked
        // ranges in the underflow and end-key-only edge cases.
        let reverse_edge = self.search_keys.len() < self.end_keys.len()
            && matches!(self.end_type, LookupType::Lt | LookupType::Lte);

        let mut start_rank: usize = 0;
        if !self.search_keys.is_empty() {
            let mut key = KeyTuple::new(Arc::clone(&index.scheme.key_schema))?;
            let mut lookup = self.lookup;
            let mut underflow = false;
            for (i, expr) in self.search_keys.iter().enumerate() {
                let v = expr.eval(cx, None, None)?;
                if v.is_null() && !self.not_distinct.get(i).copied().unwrap_or(false) {
                    return Ok(0);
                }
                match key.set_value(i, &v) {
                    Ok(()) => (),
                    Err(err) if err.is_cast_failure() => {
                        let last = i == self.search_keys.len() - 1;
                        if lookup == LookupType::Eq || !last {
                            return Ok(0);
                        }
                        match err {
                            Error::Overflow(_, _) => return Ok(0),
                            Error::Underflow(_, _) => {
                                underflow = true;
                                break;
                            }
                            Error::WidthMismatch(_, _) => {
                                key.shrink_set_value(i, &v)?;
                                lookup = LookupType::Gt;
                                break;
                            }
                            _ => unreachable!(),
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
            start_rank = match (underflow, lookup) {
                (true, _) => self.count_nulls(cx, table, index)?,
                (false, LookupType::Gt) => index.entries_below(&key, true)?,
                (false, LookupType::Eq) => index.entries_below(&key, false)?,
                (false, _) => index.entries_below(&key, false)?,
            };
            if lookup == LookupType::Eq && self.end_keys.is_empty() {
                let upper = index.entries_below(&key, true)?;
                return Ok((upper - start_rank) as i64);
            }
        } else if reverse_edge {
            start_rank = self.count_nulls(cx, table, index)?;
        }

        let end_rank: usize = match self.end_keys.is_empty() {
            true => total,
            false => {
                let mut key = KeyTuple::new(Arc::clone(&index.scheme.key_schema))?;
                let mut end_type = self.end_type;
                let mut unbounded = false;
                for (i, expr) in self.end_keys.iter().enumerate() {
                    let v = expr.eval(cx, None, None)?;
                    if v.is_null() && !self.not_distinct.get(i).copied().unwrap_or(false) {
                        return Ok(0);
                    }
                    match key.set_value(i, &v) {
                        Ok(()) => (),
                        Err(err) if err.is_cast_failure() => {
                            let last = i == self.end_keys.len() - 1;
                            if !last {
                                return Ok(0);
                            }
                            match err {
                                Error::Underflow(_, _) => return Ok(0),
                                Error::Overflow(_, _) => {
                                    unbounded = true;
                                    break;
                                }
                                Error::WidthMismatch(_, _) => {
                                    key.shrink_set_value(i, &v)?;
                                    end_type = LookupType::Lte;
                                    break;
                                }
                                _ => unreachable!(),
                            }
                        }
                        Err(err) => return Err(err),
                    }
                }
                match (unbounded, end_type) {
                    (true, _) => total,
                    (false, LookupType::Lt) => index.entries_below(&key, false)?,
                    (false, _) => index.entries_below(&key, true)?,
                }
            }
        };

        Ok(end_rank.saturating_sub(start_rank) as i64)
    }

    // Count the run of leading rows the skip-null predicate marks.
    fn count_nulls(
        &self,
        cx: &EvalCtx,
        table: &PersistentTable,
        index: &crate::index::TableIndex,
    ) -> Result<usize> {
        let pred = match &self.skip_null {
            Some(pred) => pred,
            None => return Ok(0),
        };
        let mut n = 0;
        let mut cursor = index.cursor_all(false)?;
        while let Some((_key, row_id)) = cursor.next_entry() {
            let row = table.tuple(row_id)?;
            if !pred.eval(cx, Some(&row), None)?.is_true() {
                break;
            }
            n += 1;
        }
        Ok(n)
    }
}

pub struct TableCountExec {
    pub table: String,
    pub out_schema: Arc<TupleSchema>,
}

impl TableCountExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let n = ctx.catalog.persistent(&self.table)?.len() as i64;
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));
        out.append_values(&[Value::BigInt(n)])?;
        Ok(out)
    }
}

#[cfg(test)]
#[path = "scan_test.rs"]
mod scan_test;
