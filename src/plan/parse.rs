//! Fragment JSON deserialization.
//!
//! The host ships each fragment as one JSON object: `PLAN_NODES`, an
//! array of node objects, and `EXECUTE_LISTS` (or a single
//! `EXECUTE_LIST`), the per-statement execution orders. Unknown keys
//! are tolerated everywhere; missing required keys raise
//! [crate::Error::DecodeFail] citing the fragment id.

use serde_json::Value as Json;

use std::collections::HashMap;

use crate::{
    expr::{expr_from_json, parse::json_i64, parse::json_obj, parse::json_str, Expr},
    plan::{
        AggSpec, Fragment, JoinType, LookupType, NodeSpec, OutputColumn, PlanNode, PlanNodeType,
        SetOpKind, WindowFnKind, WindowFnSpec,
    },
    value::ValueType,
    Result,
};

type JsonMap = serde_json::Map<String, Json>;

fn opt_expr(obj: &JsonMap, key: &str) -> Result<Option<Expr>> {
    match obj.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(json) => Ok(Some(expr_from_json(json)?)),
    }
}

fn expr_list(obj: &JsonMap, key: &str) -> Result<Vec<Expr>> {
    match obj.get(key) {
        None | Some(Json::Null) => Ok(vec![]),
        Some(Json::Array(items)) => items.iter().map(expr_from_json).collect(),
        Some(other) => err_at!(DecodeFail, msg: "{} is not an array: {:?}", key, other),
    }
}

fn bool_list(obj: &JsonMap, key: &str) -> Result<Vec<bool>> {
    match obj.get(key) {
        None | Some(Json::Null) => Ok(vec![]),
        Some(Json::Array(items)) => items
            .iter()
            .map(|v| match (v.as_bool(), v.as_i64()) {
                (Some(b), _) => Ok(b),
                (None, Some(n)) => Ok(n != 0),
                _ => err_at!(DecodeFail, msg: "{}: bad flag {:?}", key, v),
            })
            .collect(),
        Some(other) => err_at!(DecodeFail, msg: "{} is not an array: {:?}", key, other),
    }
}

fn id_list(obj: &JsonMap, key: &str) -> Result<Vec<i32>> {
    match obj.get(key) {
        None | Some(Json::Null) => Ok(vec![]),
        Some(Json::Array(items)) => items
            .iter()
            .map(|v| match v.as_i64() {
                Some(n) => Ok(n as i32),
                None => err_at!(DecodeFail, msg: "{}: bad id {:?}", key, v),
            })
            .collect(),
        Some(other) => err_at!(DecodeFail, msg: "{} is not an array: {:?}", key, other),
    }
}

fn lookup_of(obj: &JsonMap, key: &str, default: LookupType) -> Result<LookupType> {
    match obj.get(key).and_then(|v| v.as_str()) {
        Some(name) => LookupType::from_name(name),
        None => Ok(default),
    }
}

// OUTPUT_SCHEMA: [{COLUMN_NAME, EXPRESSION, VALUE_TYPE?, VALUE_SIZE?,
// IN_BYTES?}]; type/size may also live inside the expression object.
fn output_schema(obj: &JsonMap) -> Result<Vec<OutputColumn>> {
    let items = match obj.get("OUTPUT_SCHEMA") {
        None | Some(Json::Null) => return Ok(vec![]),
        Some(Json::Array(items)) => items,
        Some(other) => return err_at!(DecodeFail, msg: "OUTPUT_SCHEMA: {:?}", other),
    };
    let mut columns = vec![];
    for item in items.iter() {
        let col = json_obj(item, "output column")?;
        let name = json_str(col, "COLUMN_NAME")?.to_string();
        let expr_json = match col.get("EXPRESSION") {
            Some(json) => json,
            None => err_at!(DecodeFail, msg: "column {} without EXPRESSION", name)?,
        };
        let expr = expr_from_json(expr_json)?;

        let expr_obj = json_obj(expr_json, "expression")?;
        let vtype = match type_in(col)?.or(type_in(expr_obj)?) {
            Some(vtype) => vtype,
            None => err_at!(DecodeFail, msg: "column {} without VALUE_TYPE", name)?,
        };
        let length = size_in(col).or_else(|| size_in(expr_obj)).unwrap_or(0);
        let in_bytes = col
            .get("IN_BYTES")
            .or_else(|| expr_obj.get("IN_BYTES"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        columns.push(OutputColumn {
            name,
            expr,
            vtype,
            length,
            in_bytes,
        });
    }
    Ok(columns)
}

fn type_in(obj: &JsonMap) -> Result<Option<ValueType>> {
    match obj.get("VALUE_TYPE") {
        None | Some(Json::Null) => Ok(None),
        Some(Json::Number(n)) => match n.as_i64() {
            Some(code) if (0..=255).contains(&code) => Ok(Some(ValueType::from_wire(code as u8)?)),
            _ => err_at!(DecodeFail, msg: "bad VALUE_TYPE {:?}", n),
        },
        Some(Json::String(s)) => Ok(Some(ValueType::from_name(s)?)),
        Some(other) => err_at!(DecodeFail, msg: "bad VALUE_TYPE {:?}", other),
    }
}

fn size_in(obj: &JsonMap) -> Option<usize> {
    obj.get("VALUE_SIZE").and_then(|v| v.as_i64()).map(|n| n.max(0) as usize)
}

fn node_spec(obj: &JsonMap, ntype: PlanNodeType) -> Result<NodeSpec> {
    let spec = match ntype {
        // scans over a child statement's rows carry no target table.
        PlanNodeType::SeqScan => NodeSpec::SeqScan {
            table: obj
                .get("TARGET_TABLE_NAME")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            predicate: opt_expr(obj, "PREDICATE")?,
        },
        PlanNodeType::IndexScan => NodeSpec::IndexScan {
            table: json_str(obj, "TARGET_TABLE_NAME")?.to_string(),
            index: json_str(obj, "TARGET_INDEX_NAME")?.to_string(),
            lookup: lookup_of(obj, "LOOKUP_TYPE", LookupType::Gte)?,
            end_type: lookup_of(obj, "END_TYPE", LookupType::Lte)?,
            search_keys: expr_list(obj, "SEARCHKEY_EXPRESSIONS")?,
            end_keys: expr_list(obj, "ENDKEY_EXPRESSIONS")?,
            not_distinct: bool_list(obj, "COMPARE_NOTDISTINCT")?,
            predicate: opt_expr(obj, "PREDICATE")?,
            skip_null: opt_expr(obj, "SKIP_NULL_PREDICATE")?,
        },
        PlanNodeType::IndexCount => NodeSpec::IndexCount {
            table: json_str(obj, "TARGET_TABLE_NAME")?.to_string(),
            index: json_str(obj, "TARGET_INDEX_NAME")?.to_string(),
            lookup: lookup_of(obj, "LOOKUP_TYPE", LookupType::Gte)?,
            end_type: lookup_of(obj, "END_TYPE", LookupType::Lte)?,
            search_keys: expr_list(obj, "SEARCHKEY_EXPRESSIONS")?,
            end_keys: expr_list(obj, "ENDKEY_EXPRESSIONS")?,
            not_distinct: bool_list(obj, "COMPARE_NOTDISTINCT")?,
            skip_null: opt_expr(obj, "SKIP_NULL_PREDICATE")?,
        },
        PlanNodeType::TableCount => NodeSpec::TableCount {
            table: json_str(obj, "TARGET_TABLE_NAME")?.to_string(),
        },
        PlanNodeType::Projection => NodeSpec::Projection,
        PlanNodeType::Limit => NodeSpec::Limit {
            limit: json_i64(obj, "LIMIT").unwrap_or(-1),
            offset: json_i64(obj, "OFFSET").unwrap_or(0),
            limit_param: json_i64(obj, "LIMIT_PARAM_IDX").ok().map(|n| n as usize),
            offset_param: json_i64(obj, "OFFSET_PARAM_IDX").ok().map(|n| n as usize),
        },
        PlanNodeType::NestLoop => NodeSpec::NestLoop {
            join: JoinType::from_name(json_str(obj, "JOIN_TYPE")?)?,
            predicate: opt_expr(obj, "JOIN_PREDICATE")?,
        },
        PlanNodeType::NestLoopIndex => NodeSpec::NestLoopIndex {
            join: JoinType::from_name(json_str(obj, "JOIN_TYPE")?)?,
        },
        PlanNodeType::MergeJoin => NodeSpec::MergeJoin {
            join: JoinType::from_name(json_str(obj, "JOIN_TYPE")?)?,
            outer_keys: expr_list(obj, "OUTER_JOIN_KEYS")?,
            inner_keys: expr_list(obj, "INNER_JOIN_KEYS")?,
            predicate: opt_expr(obj, "JOIN_PREDICATE")?,
        },
        PlanNodeType::Aggregate | PlanNodeType::HashAggregate | PlanNodeType::PartialAggregate => {
            let raw = match obj.get("AGGREGATE_COLUMNS") {
                Some(Json::Array(items)) => items.as_slice(),
                _ => &[],
            };
            let mut aggs = vec![];
            for item in raw.iter() {
                let agg = json_obj(item, "aggregate column")?;
                let op = crate::plan::AggOp::from_name(json_str(agg, "AGGREGATE_TYPE")?)?;
                let distinct = agg
                    .get("AGGREGATE_DISTINCT")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0)
                    != 0;
                let expr = opt_expr(agg, "AGGREGATE_EXPRESSION")?;
                let output_col = json_i64(agg, "AGGREGATE_OUTPUT_COLUMN")? as usize;
                aggs.push(AggSpec {
                    op,
                    distinct,
                    expr,
                    output_col,
                });
            }
            NodeSpec::Aggregate {
                aggs,
                group_by: expr_list(obj, "GROUPBY_EXPRESSIONS")?,
                having: opt_expr(obj, "POST_PREDICATE")?,
                sorted_prefix: match ntype {
                    PlanNodeType::Aggregate => usize::MAX, // fully sorted
                    PlanNodeType::PartialAggregate => {
                        json_i64(obj, "SORTED_PREFIX").unwrap_or(1).max(0) as usize
                    }
                    _ => 0,
                },
            }
        }
        PlanNodeType::WindowFunction => {
            let raw = match obj.get("AGGREGATE_COLUMNS") {
                Some(Json::Array(items)) => items.as_slice(),
                _ => &[],
            };
            let mut fns = vec![];
            for item in raw.iter() {
                let f = json_obj(item, "window function")?;
                let kind = WindowFnKind::from_name(json_str(f, "AGGREGATE_TYPE")?)?;
                let expr = opt_expr(f, "AGGREGATE_EXPRESSION")?;
                let output_col = json_i64(f, "AGGREGATE_OUTPUT_COLUMN")? as usize;
                fns.push(WindowFnSpec {
                    kind,
                    expr,
                    output_col,
                });
            }
            NodeSpec::WindowFunction {
                fns,
                partition_by: expr_list(obj, "PARTITIONBY_EXPRESSIONS")?,
                order_by: sort_columns(obj)?,
            }
        }
        PlanNodeType::MergeReceive => NodeSpec::MergeReceive {
            sort_keys: sort_columns(obj)?,
        },
        PlanNodeType::Receive => NodeSpec::Receive,
        PlanNodeType::Union => NodeSpec::SetOp {
            kind: SetOpKind::from_name(json_str(obj, "UNION_TYPE")?)?,
        },
        PlanNodeType::Insert => NodeSpec::Insert {
            table: json_str(obj, "TARGET_TABLE_NAME")?.to_string(),
            upsert: obj.get("UPSERT").and_then(|v| v.as_bool()).unwrap_or(false),
            multi_partition: obj
                .get("MULTI_PARTITION")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        },
        PlanNodeType::Update => NodeSpec::Update {
            table: json_str(obj, "TARGET_TABLE_NAME")?.to_string(),
            target_columns: id_list(obj, "UPDATED_COLUMNS")?
                .into_iter()
                .map(|n| n as usize)
                .collect(),
        },
        PlanNodeType::Delete => NodeSpec::Delete {
            table: json_str(obj, "TARGET_TABLE_NAME")?.to_string(),
            truncate: obj.get("TRUNCATE").and_then(|v| v.as_bool()).unwrap_or(false),
        },
        PlanNodeType::SwapTables => NodeSpec::SwapTables {
            table: json_str(obj, "TARGET_TABLE_NAME")?.to_string(),
            other: json_str(obj, "OTHER_TABLE_NAME")?.to_string(),
        },
        PlanNodeType::Send => NodeSpec::Send,
    };
    Ok(spec)
}

// SORT_COLUMNS: [{SORT_EXPRESSION, SORT_DIRECTION: "ASC"|"DESC"}]
fn sort_columns(obj: &JsonMap) -> Result<Vec<(Expr, bool)>> {
    let items = match obj.get("SORT_COLUMNS") {
        None | Some(Json::Null) => return Ok(vec![]),
        Some(Json::Array(items)) => items,
        Some(other) => return err_at!(DecodeFail, msg: "SORT_COLUMNS: {:?}", other),
    };
    let mut keys = vec![];
    for item in items.iter() {
        let sc = json_obj(item, "sort column")?;
        let expr = match sc.get("SORT_EXPRESSION") {
            Some(json) => expr_from_json(json)?,
            None => err_at!(DecodeFail, msg: "sort column without SORT_EXPRESSION")?,
        };
        let asc = match sc.get("SORT_DIRECTION").and_then(|v| v.as_str()) {
            Some("DESC") => false,
            Some("ASC") | None => true,
            Some(other) => err_at!(DecodeFail, msg: "sort direction {}", other)?,
        };
        keys.push((expr, asc));
    }
    Ok(keys)
}

fn node_from_json(json: &Json) -> Result<PlanNode> {
    let obj = json_obj(json, "plan node")?;
    let id = json_i64(obj, "ID")? as i32;
    let ntype = PlanNodeType::from_name(json_str(obj, "PLAN_NODE_TYPE")?)?;
    let children = id_list(obj, "CHILDREN_IDS")?;
    let output_schema = output_schema(obj)?;
    let inline = match obj.get("INLINE_NODES") {
        None | Some(Json::Null) => vec![],
        Some(Json::Array(items)) => items
            .iter()
            .map(node_from_json)
            .collect::<Result<Vec<PlanNode>>>()?,
        Some(other) => return err_at!(DecodeFail, msg: "INLINE_NODES: {:?}", other),
    };
    let spec = node_spec(obj, ntype)?;
    Ok(PlanNode {
        id,
        ntype,
        children,
        output_schema,
        inline,
        spec,
    })
}

/// Parse one fragment's JSON plan.
pub fn fragment_from_json(fragment_id: i64, text: &str) -> Result<Fragment> {
    let root: Json = match serde_json::from_str(text) {
        Ok(root) => root,
        Err(err) => {
            return err_at!(DecodeFail, msg: "fragment {}: {}", fragment_id, err);
        }
    };
    let obj = match json_obj(&root, "fragment") {
        Ok(obj) => obj,
        Err(_) => return err_at!(DecodeFail, msg: "fragment {}: not an object", fragment_id),
    };

    let mut nodes = HashMap::new();
    let raw_nodes = match obj.get("PLAN_NODES") {
        Some(Json::Array(items)) => items,
        _ => return err_at!(DecodeFail, msg: "fragment {}: missing PLAN_NODES", fragment_id),
    };
    for raw in raw_nodes.iter() {
        let node = match node_from_json(raw) {
            Ok(node) => node,
            Err(err) => {
                return err_at!(DecodeFail, msg: "fragment {}: {}", fragment_id, err);
            }
        };
        nodes.insert(node.id, node);
    }

    // one statement per EXECUTE_LISTS entry, or a single EXECUTE_LIST.
    let stmts: Vec<Vec<i32>> = match (obj.get("EXECUTE_LISTS"), obj.get("EXECUTE_LIST")) {
        (Some(Json::Array(lists)), _) => {
            let mut stmts = vec![];
            for list in lists.iter() {
                let lobj = json_obj(list, "execute list")?;
                stmts.push(id_list(lobj, "EXECUTE_LIST")?);
            }
            stmts
        }
        (None, Some(Json::Array(_))) => vec![id_list(obj, "EXECUTE_LIST")?],
        _ => {
            return err_at!(
                DecodeFail,
                msg: "fragment {}: missing EXECUTE_LIST", fragment_id
            )
        }
    };

    for stmt in stmts.iter() {
        for id in stmt.iter() {
            if !nodes.contains_key(id) {
                return err_at!(
                    DecodeFail,
                    msg: "fragment {}: execute list names unknown node {}", fragment_id, id
                );
            }
        }
    }

    Ok(Fragment {
        id: fragment_id,
        stmts,
        nodes,
    })
}
