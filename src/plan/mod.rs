//! Module implement plan nodes: the typed, in-memory form of a
//! fragment's JSON plan.
//!
//! A fragment is one or more statements, each an execution-ordered list
//! of node ids into a shared node table. Nodes carry their children,
//! an optional output schema, inline nodes (projection, limit,
//! aggregate riding inside a scan) and a type-specific [NodeSpec].

use std::{collections::HashMap, sync::Arc};

use crate::{
    expr::Expr,
    schema::{ColumnSpec, TupleSchema},
    value::ValueType,
    Result,
};

mod parse;

pub use parse::fragment_from_json;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlanNodeType {
    SeqScan,
    IndexScan,
    IndexCount,
    TableCount,
    NestLoop,
    NestLoopIndex,
    MergeJoin,
    Update,
    Insert,
    Delete,
    SwapTables,
    Send,
    Receive,
    MergeReceive,
    Aggregate,
    HashAggregate,
    PartialAggregate,
    Union,
    Projection,
    Limit,
    WindowFunction,
}

impl PlanNodeType {
    pub fn from_name(name: &str) -> Result<PlanNodeType> {
        let t = match name {
            "SEQSCAN" => PlanNodeType::SeqScan,
            "INDEXSCAN" => PlanNodeType::IndexScan,
            "INDEXCOUNT" => PlanNodeType::IndexCount,
            "TABLECOUNT" => PlanNodeType::TableCount,
            "NESTLOOP" => PlanNodeType::NestLoop,
            "NESTLOOPINDEX" => PlanNodeType::NestLoopIndex,
            "MERGEJOIN" => PlanNodeType::MergeJoin,
            "UPDATE" => PlanNodeType::Update,
            "INSERT" => PlanNodeType::Insert,
            "DELETE" => PlanNodeType::Delete,
            "SWAPTABLES" => PlanNodeType::SwapTables,
            "SEND" => PlanNodeType::Send,
            "RECEIVE" => PlanNodeType::Receive,
            "MERGERECEIVE" => PlanNodeType::MergeReceive,
            "AGGREGATE" => PlanNodeType::Aggregate,
            "HASHAGGREGATE" => PlanNodeType::HashAggregate,
            "PARTIALAGGREGATE" => PlanNodeType::PartialAggregate,
            "UNION" => PlanNodeType::Union,
            "PROJECTION" => PlanNodeType::Projection,
            "LIMIT" => PlanNodeType::Limit,
            "WINDOWFUNCTION" => PlanNodeType::WindowFunction,
            _ => err_at!(DecodeFail, msg: "unknown plan-node type {}", name)?,
        };
        Ok(t)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LookupType {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    GeoContains,
}

impl LookupType {
    pub fn from_name(name: &str) -> Result<LookupType> {
        let t = match name {
            "EQ" => LookupType::Eq,
            "GT" => LookupType::Gt,
            "GTE" => LookupType::Gte,
            "LT" => LookupType::Lt,
            "LTE" => LookupType::Lte,
            "GEO_CONTAINS" => LookupType::GeoContains,
            _ => err_at!(DecodeFail, msg: "unknown lookup type {}", name)?,
        };
        Ok(t)
    }

    pub fn is_reverse(&self) -> bool {
        matches!(self, LookupType::Lt | LookupType::Lte)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    pub fn from_name(name: &str) -> Result<JoinType> {
        match name {
            "INNER" => Ok(JoinType::Inner),
            "LEFT" => Ok(JoinType::Left),
            _ => err_at!(DecodeFail, msg: "unsupported join type {}", name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SetOpKind {
    UnionAll,
    Union,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
    /// Route rows through unchanged, tagging each with its input index.
    PassThrough,
}

impl SetOpKind {
    pub fn from_name(name: &str) -> Result<SetOpKind> {
        let k = match name {
            "UNION_ALL" => SetOpKind::UnionAll,
            "UNION" => SetOpKind::Union,
            "INTERSECT" => SetOpKind::Intersect,
            "INTERSECT_ALL" => SetOpKind::IntersectAll,
            "EXCEPT" => SetOpKind::Except,
            "EXCEPT_ALL" => SetOpKind::ExceptAll,
            "NOUNION" | "PASS_THROUGH" => SetOpKind::PassThrough,
            _ => err_at!(DecodeFail, msg: "unknown set-op {}", name)?,
        };
        Ok(k)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AggOp {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggOp {
    pub fn from_name(name: &str) -> Result<AggOp> {
        let op = match name {
            "AGGREGATE_COUNT_STAR" => AggOp::CountStar,
            "AGGREGATE_COUNT" => AggOp::Count,
            "AGGREGATE_SUM" => AggOp::Sum,
            "AGGREGATE_MIN" => AggOp::Min,
            "AGGREGATE_MAX" => AggOp::Max,
            "AGGREGATE_AVG" => AggOp::Avg,
            _ => err_at!(DecodeFail, msg: "unknown aggregate {}", name)?,
        };
        Ok(op)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WindowFnKind {
    Rank,
    DenseRank,
    RowNumber,
    Count,
    Max,
    Min,
    Sum,
}

impl WindowFnKind {
    pub fn from_name(name: &str) -> Result<WindowFnKind> {
        let k = match name {
            "AGGREGATE_WINDOWED_RANK" => WindowFnKind::Rank,
            "AGGREGATE_WINDOWED_DENSE_RANK" => WindowFnKind::DenseRank,
            "AGGREGATE_WINDOWED_ROW_NUMBER" => WindowFnKind::RowNumber,
            "AGGREGATE_WINDOWED_COUNT" => WindowFnKind::Count,
            "AGGREGATE_WINDOWED_MAX" => WindowFnKind::Max,
            "AGGREGATE_WINDOWED_MIN" => WindowFnKind::Min,
            "AGGREGATE_WINDOWED_SUM" => WindowFnKind::Sum,
            _ => err_at!(DecodeFail, msg: "unknown window function {}", name)?,
        };
        Ok(k)
    }

    /// Whether the function needs to see the full order-by peer group
    /// before any of its rows can be emitted.
    pub fn needs_lookahead(&self) -> bool {
        matches!(self, WindowFnKind::Count | WindowFnKind::Max | WindowFnKind::Min | WindowFnKind::Sum)
    }
}

/// One output field: name, producing expression, declared type/width.
#[derive(Clone, Debug)]
pub struct OutputColumn {
    pub name: String,
    pub expr: Expr,
    pub vtype: ValueType,
    pub length: usize,
    pub in_bytes: bool,
}

/// Build a row schema from an output-column list.
pub fn schema_of(columns: &[OutputColumn]) -> Result<Arc<TupleSchema>> {
    let specs = columns
        .iter()
        .map(|c| ColumnSpec {
            name: c.name.clone(),
            vtype: c.vtype,
            length: c.length,
            in_bytes: c.in_bytes,
        })
        .collect();
    TupleSchema::new(specs, vec![])
}

/// One aggregate of an aggregation node.
#[derive(Clone, Debug)]
pub struct AggSpec {
    pub op: AggOp,
    pub distinct: bool,
    /// Input expression; None for COUNT(*).
    pub expr: Option<Expr>,
    pub output_col: usize,
}

/// One function of a window-function node.
#[derive(Clone, Debug)]
pub struct WindowFnSpec {
    pub kind: WindowFnKind,
    pub expr: Option<Expr>,
    pub output_col: usize,
}

/// Type-specific plan-node payload.
#[derive(Clone, Debug)]
pub enum NodeSpec {
    SeqScan {
        table: String,
        predicate: Option<Expr>,
    },
    IndexScan {
        table: String,
        index: String,
        lookup: LookupType,
        end_type: LookupType,
        search_keys: Vec<Expr>,
        end_keys: Vec<Expr>,
        not_distinct: Vec<bool>,
        predicate: Option<Expr>,
        skip_null: Option<Expr>,
    },
    IndexCount {
        table: String,
        index: String,
        lookup: LookupType,
        end_type: LookupType,
        search_keys: Vec<Expr>,
        end_keys: Vec<Expr>,
        not_distinct: Vec<bool>,
        skip_null: Option<Expr>,
    },
    TableCount {
        table: String,
    },
    Projection,
    Limit {
        limit: i64,
        offset: i64,
        limit_param: Option<usize>,
        offset_param: Option<usize>,
    },
    NestLoop {
        join: JoinType,
        predicate: Option<Expr>,
    },
    NestLoopIndex {
        join: JoinType,
    },
    MergeJoin {
        join: JoinType,
        outer_keys: Vec<Expr>,
        inner_keys: Vec<Expr>,
        predicate: Option<Expr>,
    },
    Aggregate {
        aggs: Vec<AggSpec>,
        group_by: Vec<Expr>,
        having: Option<Expr>,
        /// Leading group-by expressions the input is already sorted on
        /// (partial aggregation).
        sorted_prefix: usize,
    },
    WindowFunction {
        fns: Vec<WindowFnSpec>,
        partition_by: Vec<Expr>,
        order_by: Vec<(Expr, bool)>,
    },
    MergeReceive {
        /// (key expression, ascending) per sort column.
        sort_keys: Vec<(Expr, bool)>,
    },
    Receive,
    SetOp {
        kind: SetOpKind,
    },
    Insert {
        table: String,
        upsert: bool,
        multi_partition: bool,
    },
    Update {
        table: String,
        /// Target-table columns written, in input-field order (input
        /// field 0 is the source row address).
        target_columns: Vec<usize>,
    },
    Delete {
        table: String,
        truncate: bool,
    },
    SwapTables {
        table: String,
        other: String,
    },
    Send,
}

#[derive(Clone, Debug)]
pub struct PlanNode {
    pub id: i32,
    pub ntype: PlanNodeType,
    pub children: Vec<i32>,
    pub output_schema: Vec<OutputColumn>,
    pub inline: Vec<PlanNode>,
    pub spec: NodeSpec,
}

impl PlanNode {
    pub fn inline_of(&self, ntype: PlanNodeType) -> Option<&PlanNode> {
        self.inline.iter().find(|n| n.ntype == ntype)
    }
}

/// A parsed fragment: statements in execution order over a node table.
#[derive(Debug)]
pub struct Fragment {
    pub id: i64,
    pub stmts: Vec<Vec<i32>>,
    pub nodes: HashMap<i32, PlanNode>,
}

impl Fragment {
    pub fn node(&self, id: i32) -> Result<&PlanNode> {
        match self.nodes.get(&id) {
            Some(node) => Ok(node),
            None => err_at!(DecodeFail, msg: "fragment {}: no node {}", self.id, id),
        }
    }
}
