//! Module implement executors: the runtime form of plan nodes.
//!
//! A fragment compiles into an [ExecutorVector]: per statement, an
//! execution-ordered list of executors. Executors are immutable once
//! built; all per-run state lives on the stack of `execute`, and every
//! executor returns a fresh output [TempTable] that the driver registers
//! under the producing node's id. Children are consumed (drained) out
//! of that registry, subquery statement outputs stay visible to later
//! statements' expressions.

use std::{
    collections::HashMap,
    sync::{atomic::AtomicBool, atomic::Ordering, Arc},
};

use crate::{
    engine::Topend,
    expr::{EvalCtx, Expr},
    hasher::Hashinator,
    plan::{schema_of, Fragment, NodeSpec, PlanNode, PlanNodeType},
    projector::Projector,
    schema::{ColumnSpec, TupleSchema},
    table::{Catalog, SharedLimits, TempTable},
    undo::UndoLog,
    value::{Value, ValueType},
    Result,
};

pub mod agg;
pub mod dml;
pub mod filter;
pub mod join;
pub mod merge;
pub mod scan;
pub mod setop;
#[cfg(test)]
pub(crate) mod testing;
pub mod window;

use filter::LimitSpec;

/// Everything an executor touches at run time.
pub struct ExecCtx<'a> {
    pub params: &'a [Value],
    pub catalog: &'a mut Catalog,
    pub outputs: &'a mut HashMap<i32, TempTable>,
    pub topend: &'a mut dyn Topend,
    pub limits: SharedLimits,
    pub interrupt: &'a AtomicBool,
    pub undo: &'a mut UndoLog,
    pub hashinator: &'a Hashinator,
    /// Replicated-table DML agreement cell, when this process hosts
    /// more than one partition.
    pub replicated: Option<Arc<dml::ReplicatedCell>>,
    pub tuples_processed: u64,
}

impl<'a> ExecCtx<'a> {
    /// Cooperative cancellation, tested at loop boundaries.
    pub fn check_interrupt(&self) -> Result<()> {
        match self.interrupt.load(Ordering::Relaxed) {
            true => err_at!(Interrupted, msg: "fragment interrupted"),
            false => Ok(()),
        }
    }

    /// Drain a child's output table out of the registry.
    pub fn take_child(&mut self, id: i32) -> Result<TempTable> {
        match self.outputs.remove(&id) {
            Some(table) => Ok(table),
            None => err_at!(Fatal, msg: "child output {} missing", id),
        }
    }

    pub fn tick(&mut self, n: u64) {
        let before = self.tuples_processed / 1000;
        self.tuples_processed += n;
        if self.tuples_processed / 1000 != before {
            self.topend.progress_update(self.tuples_processed);
        }
    }
}

/// Compiled executor for one plan node.
pub enum Exec {
    SeqScan(scan::SeqScanExec),
    IndexScan(scan::IndexScanExec),
    IndexCount(scan::IndexCountExec),
    TableCount(scan::TableCountExec),
    Projection(ProjectionExec),
    Limit(LimitExec),
    NestLoop(join::NestLoopExec),
    NestLoopIndex(join::NestLoopIndexExec),
    MergeJoin(join::MergeJoinExec),
    Aggregate(agg::AggregateExec),
    Window(window::WindowFunctionExec),
    MergeReceive(merge::MergeReceiveExec),
    Receive(merge::ReceiveExec),
    SetOp(setop::SetOpExec),
    Insert(dml::InsertExec),
    Update(dml::UpdateExec),
    Delete(dml::DeleteExec),
    SwapTables(dml::SwapTablesExec),
    Send(SendExec),
}

impl Exec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        ctx.check_interrupt()?;
        match self {
            Exec::SeqScan(e) => e.execute(ctx),
            Exec::IndexScan(e) => e.execute(ctx),
            Exec::IndexCount(e) => e.execute(ctx),
            Exec::TableCount(e) => e.execute(ctx),
            Exec::Projection(e) => e.execute(ctx),
            Exec::Limit(e) => e.execute(ctx),
            Exec::NestLoop(e) => e.execute(ctx),
            Exec::NestLoopIndex(e) => e.execute(ctx),
            Exec::MergeJoin(e) => e.execute(ctx),
            Exec::Aggregate(e) => e.execute(ctx),
            Exec::Window(e) => e.execute(ctx),
            Exec::MergeReceive(e) => e.execute(ctx),
            Exec::Receive(e) => e.execute(ctx),
            Exec::SetOp(e) => e.execute(ctx),
            Exec::Insert(e) => e.execute(ctx),
            Exec::Update(e) => e.execute(ctx),
            Exec::Delete(e) => e.execute(ctx),
            Exec::SwapTables(e) => e.execute(ctx),
            Exec::Send(e) => e.execute(ctx),
        }
    }
}

pub struct CompiledExec {
    pub node_id: i32,
    pub exec: Exec,
}

/// A fragment's executors, one list per statement.
pub struct ExecutorVector {
    pub fragment_id: i64,
    pub stmts: Vec<Vec<CompiledExec>>,
}

impl ExecutorVector {
    /// Run every statement in order; each executor's output registers
    /// under its node id. The last statement's last node is the
    /// fragment's result.
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<()> {
        for stmt in self.stmts.iter() {
            for ce in stmt.iter() {
                let out = ce.exec.execute(ctx)?;
                ctx.outputs.insert(ce.node_id, out);
            }
        }
        Ok(())
    }

    pub fn root_node(&self) -> Result<i32> {
        match self.stmts.last().and_then(|stmt| stmt.last()) {
            Some(ce) => Ok(ce.node_id),
            None => err_at!(InvalidInput, msg: "fragment {} is empty", self.fragment_id),
        }
    }
}

/// Standalone projection: one output row per input row.
pub struct ProjectionExec {
    pub child: i32,
    pub projector: Projector,
}

impl ProjectionExec {
    fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let input = ctx.take_child(self.child)?;
        let mut out = TempTable::new(
            Arc::clone(self.projector.out_schema()),
            Some(ctx.limits.clone()),
        );
        let mut scratch = crate::tuple::OwnedTuple::new(Arc::clone(self.projector.out_schema()))?;
        let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
        for row in input.iter() {
            self.projector.project(&cx, &row, None, &mut scratch)?;
            out.append_tuple(&scratch.as_tuple())?;
        }
        Ok(out)
    }
}

/// Standalone LIMIT/OFFSET over a child's rows.
pub struct LimitExec {
    pub child: i32,
    pub spec: LimitSpec,
    pub out_schema: Arc<TupleSchema>,
}

impl LimitExec {
    fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let input = ctx.take_child(self.child)?;
        let (limit, offset) = self.spec.resolve(ctx.params)?;
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));
        let mut post = filter::CountingPostfilter::new(None, limit, offset);
        let cx = EvalCtx::with_outputs(ctx.params, ctx.outputs);
        for row in input.iter() {
            if !post.is_under_limit() {
                break;
            }
            if post.eval(&cx, Some(&row), None)? {
                out.append_tuple(&row)?;
            }
        }
        Ok(out)
    }
}

/// Root of a statement: passes its child's table through as the
/// fragment result.
pub struct SendExec {
    pub child: i32,
}

impl SendExec {
    fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        ctx.take_child(self.child)
    }
}

// ---- build ----------------------------------------------------------

/// Synthetic one-BIGINT schema for count-producing executors.
pub(crate) fn count_schema(name: &str) -> Result<Arc<TupleSchema>> {
    TupleSchema::new(vec![ColumnSpec::new(name, ValueType::BigInt)], vec![])
}

// Effective projection of a node: its inline projection's schema, or
// its own output schema, when either is present.
fn node_projector(
    node: &PlanNode,
    in_schema: &Arc<TupleSchema>,
) -> Result<Option<Projector>> {
    let columns = match node.inline_of(PlanNodeType::Projection) {
        Some(proj) => &proj.output_schema,
        None => &node.output_schema,
    };
    if columns.is_empty() {
        return Ok(None);
    }
    let out_schema = schema_of(columns)?;
    let exprs: Vec<Expr> = columns.iter().map(|c| c.expr.clone()).collect();
    let mut projector = Projector::new(out_schema, exprs)?;
    projector.optimize(in_schema);
    Ok(Some(projector))
}

fn inline_limit(node: &PlanNode) -> LimitSpec {
    match node.inline_of(PlanNodeType::Limit) {
        Some(limit) => LimitSpec::from_node(&limit.spec),
        None => LimitSpec::none(),
    }
}

fn inline_agg(node: &PlanNode, in_schema: &Arc<TupleSchema>) -> Result<Option<agg::AggProcessor>> {
    for ntype in [
        PlanNodeType::Aggregate,
        PlanNodeType::HashAggregate,
        PlanNodeType::PartialAggregate,
    ] {
        if let Some(agg_node) = node.inline_of(ntype) {
            return Ok(Some(agg::AggProcessor::build(agg_node, Arc::clone(in_schema))?));
        }
    }
    Ok(None)
}

fn inline_insert(node: &PlanNode) -> Result<Option<scan::InsertSink>> {
    match node.inline_of(PlanNodeType::Insert) {
        None => Ok(None),
        Some(ins) => match &ins.spec {
            NodeSpec::Insert {
                table,
                multi_partition,
                ..
            } => Ok(Some(scan::InsertSink {
                table: table.clone(),
                multi_partition: *multi_partition,
            })),
            spec => err_at!(Fatal, msg: "inline insert with spec {:?}", spec),
        },
    }
}

fn first_child(node: &PlanNode) -> Result<i32> {
    match node.children.first() {
        Some(id) => Ok(*id),
        None => err_at!(DecodeFail, msg: "node {} needs a child", node.id),
    }
}

fn child_schema(
    schemas: &HashMap<i32, Arc<TupleSchema>>,
    id: i32,
) -> Result<Arc<TupleSchema>> {
    match schemas.get(&id) {
        Some(schema) => Ok(Arc::clone(schema)),
        None => err_at!(DecodeFail, msg: "child {} built out of order", id),
    }
}

fn build_node(
    node: &PlanNode,
    schemas: &HashMap<i32, Arc<TupleSchema>>,
    catalog_schemas: &dyn Fn(&str) -> Result<Arc<TupleSchema>>,
) -> Result<(Exec, Arc<TupleSchema>)> {
    let built = match (&node.spec, node.ntype) {
        (NodeSpec::SeqScan { table, predicate }, _) => {
            let (source, in_schema) = match node.children.first() {
                Some(id) => (scan::ScanSource::Child(*id), child_schema(schemas, *id)?),
                None if table.is_empty() => {
                    return err_at!(DecodeFail, msg: "scan node {} without a source", node.id);
                }
                None => (
                    scan::ScanSource::Table(table.clone()),
                    catalog_schemas(table)?,
                ),
            };
            let routing = scan::RowRouting::build(node, &in_schema)?;
            let out_schema = routing.out_schema();
            let exec = Exec::SeqScan(scan::SeqScanExec {
                source,
                predicate: predicate.clone(),
                routing,
            });
            (exec, out_schema)
        }
        (
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
            },
            _,
        ) => {
            let in_schema = catalog_schemas(table)?;
            let routing = scan::RowRouting::build(node, &in_schema)?;
            let out_schema = routing.out_schema();
            let exec = Exec::IndexScan(scan::IndexScanExec {
                table: table.clone(),
                index: index.clone(),
                lookup: *lookup,
                end_type: *end_type,
                search_keys: search_keys.clone(),
                end_keys: end_keys.clone(),
                not_distinct: not_distinct.clone(),
                predicate: predicate.clone(),
                skip_null: skip_null.clone(),
                routing,
            });
            (exec, out_schema)
        }
        (
            NodeSpec::IndexCount {
                table,
                index,
                lookup,
                end_type,
                search_keys,
                end_keys,
                not_distinct,
                skip_null,
            },
            _,
        ) => {
            let out_schema = match node.output_schema.is_empty() {
                false => schema_of(&node.output_schema)?,
                true => count_schema("TUPLE_COUNT")?,
            };
            let exec = Exec::IndexCount(scan::IndexCountExec {
                table: table.clone(),
                index: index.clone(),
                lookup: *lookup,
                end_type: *end_type,
                search_keys: search_keys.clone(),
                end_keys: end_keys.clone(),
                not_distinct: not_distinct.clone(),
                skip_null: skip_null.clone(),
                out_schema: Arc::clone(&out_schema),
            });
            (exec, out_schema)
        }
        (NodeSpec::TableCount { table }, _) => {
            let out_schema = match node.output_schema.is_empty() {
                false => schema_of(&node.output_schema)?,
                true => count_schema("TUPLE_COUNT")?,
            };
            let exec = Exec::TableCount(scan::TableCountExec {
                table: table.clone(),
                out_schema: Arc::clone(&out_schema),
            });
            (exec, out_schema)
        }
        (NodeSpec::Projection, _) => {
            let child = first_child(node)?;
            let in_schema = child_schema(schemas, child)?;
            let projector = match node_projector(node, &in_schema)? {
                Some(projector) => projector,
                None => err_at!(DecodeFail, msg: "projection {} without schema", node.id)?,
            };
            let out_schema = Arc::clone(projector.out_schema());
            (Exec::Projection(ProjectionExec { child, projector }), out_schema)
        }
        (NodeSpec::Limit { .. }, _) => {
            let child = first_child(node)?;
            let out_schema = child_schema(schemas, child)?;
            let exec = Exec::Limit(LimitExec {
                child,
                spec: LimitSpec::from_node(&node.spec),
                out_schema: Arc::clone(&out_schema),
            });
            (exec, out_schema)
        }
        (NodeSpec::NestLoop { join, predicate }, _) => {
            join::NestLoopExec::build(node, *join, predicate.clone(), schemas)?
        }
        (NodeSpec::NestLoopIndex { join }, _) => {
            join::NestLoopIndexExec::build(node, *join, schemas, catalog_schemas)?
        }
        (
            NodeSpec::MergeJoin {
                join,
                outer_keys,
                inner_keys,
                predicate,
            },
            _,
        ) => join::MergeJoinExec::build(
            node,
            *join,
            outer_keys.clone(),
            inner_keys.clone(),
            predicate.clone(),
            schemas,
        )?,
        (NodeSpec::Aggregate { .. }, _) => {
            let child = first_child(node)?;
            let in_schema = child_schema(schemas, child)?;
            let processor = agg::AggProcessor::build(node, in_schema)?;
            let out_schema = processor.out_schema();
            (
                Exec::Aggregate(agg::AggregateExec { child, processor }),
                out_schema,
            )
        }
        (NodeSpec::WindowFunction { .. }, _) => {
            let child = first_child(node)?;
            let in_schema = child_schema(schemas, child)?;
            let exec = window::WindowFunctionExec::build(node, in_schema)?;
            let out_schema = exec.out_schema();
            (Exec::Window(exec), out_schema)
        }
        (NodeSpec::MergeReceive { sort_keys }, _) => {
            let exec = merge::MergeReceiveExec::build(node, sort_keys.clone())?;
            let out_schema = exec.out_schema();
            (Exec::MergeReceive(exec), out_schema)
        }
        (NodeSpec::Receive, _) => {
            let out_schema = match node.output_schema.is_empty() {
                false => schema_of(&node.output_schema)?,
                true => err_at!(DecodeFail, msg: "receive {} without schema", node.id)?,
            };
            let exec = Exec::Receive(merge::ReceiveExec {
                node_id: node.id,
                out_schema: Arc::clone(&out_schema),
            });
            (exec, out_schema)
        }
        (NodeSpec::SetOp { kind }, _) => setop::SetOpExec::build(node, *kind, schemas)?,
        (
            NodeSpec::Insert {
                table,
                upsert,
                multi_partition,
            },
            _,
        ) => {
            let child = first_child(node)?;
            let out_schema = count_schema("modified_tuples")?;
            let exec = Exec::Insert(dml::InsertExec {
                child,
                table: table.clone(),
                upsert: *upsert,
                multi_partition: *multi_partition,
                out_schema: Arc::clone(&out_schema),
            });
            (exec, out_schema)
        }
        (
            NodeSpec::Update {
                table,
                target_columns,
            },
            _,
        ) => {
            let child = first_child(node)?;
            let out_schema = count_schema("modified_tuples")?;
            let exec = Exec::Update(dml::UpdateExec {
                child,
                table: table.clone(),
                target_columns: target_columns.clone(),
                out_schema: Arc::clone(&out_schema),
            });
            (exec, out_schema)
        }
        (NodeSpec::Delete { table, truncate }, _) => {
            let child = match node.children.first() {
                Some(id) => Some(*id),
                None => None,
            };
            let out_schema = count_schema("modified_tuples")?;
            let exec = Exec::Delete(dml::DeleteExec {
                child,
                table: table.clone(),
                truncate: *truncate,
                out_schema: Arc::clone(&out_schema),
            });
            (exec, out_schema)
        }
        (NodeSpec::SwapTables { table, other }, _) => {
            let out_schema = count_schema("modified_tuples")?;
            let exec = Exec::SwapTables(dml::SwapTablesExec {
                table: table.clone(),
                other: other.clone(),
                out_schema: Arc::clone(&out_schema),
            });
            (exec, out_schema)
        }
        (NodeSpec::Send, _) => {
            let child = first_child(node)?;
            let out_schema = child_schema(schemas, child)?;
            (Exec::Send(SendExec { child }), out_schema)
        }
    };
    Ok(built)
}

/// Compile a parsed fragment. `catalog_schemas` resolves target-table
/// names to their schemas for scan/index nodes.
pub fn build_vector(
    frag: &Fragment,
    catalog_schemas: &dyn Fn(&str) -> Result<Arc<TupleSchema>>,
) -> Result<ExecutorVector> {
    let mut stmts = vec![];
    let mut schemas: HashMap<i32, Arc<TupleSchema>> = HashMap::new();
    for stmt in frag.stmts.iter() {
        let mut compiled = vec![];
        for id in stmt.iter() {
            let node = frag.node(*id)?;
            let (exec, out_schema) = build_node(node, &schemas, catalog_schemas)?;
            schemas.insert(*id, out_schema);
            compiled.push(CompiledExec {
                node_id: *id,
                exec,
            });
        }
        stmts.push(compiled);
    }
    Ok(ExecutorVector {
        fragment_id: frag.id,
        stmts,
    })
}
