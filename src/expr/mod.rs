//! Module implement the typed expression tree evaluated against rows.
//!
//! Expressions form a closed variant family, modeled as one tagged enum
//! with a single match in [Expr::eval]. An expression evaluates against
//! zero, one or two tuples: scans bind the scanned row as tuple 0,
//! joins additionally bind the outer row as tuple 1 for the inner
//! side's bound expressions.
//!
//! Plan JSON carries expressions as nested objects; construction lives
//! in [parse].

use std::collections::HashMap;

use crate::{
    hasher,
    table::TempTable,
    tuple::Tuple,
    value::{Value, ValueType},
    Result,
};

mod fns;
pub(crate) mod parse;

pub use fns::{eval_function, function_id, function_name};
pub use parse::expr_from_json;

/// Evaluation context: the fragment's parameter array plus, when the
/// fragment has subquery statements, their materialized outputs keyed
/// by plan-node id.
#[derive(Clone, Copy, Default)]
pub struct EvalCtx<'a> {
    pub params: &'a [Value],
    pub outputs: Option<&'a HashMap<i32, TempTable>>,
}

impl<'a> EvalCtx<'a> {
    pub fn new(params: &'a [Value]) -> EvalCtx<'a> {
        EvalCtx {
            params,
            outputs: None,
        }
    }

    pub fn with_outputs(
        params: &'a [Value],
        outputs: &'a HashMap<i32, TempTable>,
    ) -> EvalCtx<'a> {
        EvalCtx {
            params,
            outputs: Some(outputs),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ArithOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    Mod,
    Concat,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    StartsWith,
    NotDistinct,
}

/// Typed expression node. Refer to the module documentation.
#[derive(Clone, Debug)]
pub enum Expr {
    Constant(Value),
    /// Column reference; `side` 0 reads tuple 0, `side` 1 reads tuple 1.
    TupleValue { side: usize, col: usize },
    Parameter { idx: usize },
    Arith { op: ArithOp, left: Box<Expr>, right: Box<Expr> },
    UnaryMinus(Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    Cast { to: ValueType, child: Box<Expr> },
    /// CASE WHEN cond THEN then ELSE otherwise END; chained WHENs nest
    /// in the otherwise arm.
    CaseWhen { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Cmp { op: CmpOp, left: Box<Expr>, right: Box<Expr> },
    In { needle: Box<Expr>, list: Box<Expr> },
    Conjunction { and: bool, left: Box<Expr>, right: Box<Expr> },
    Function { id: u32, args: Vec<Expr> },
    /// Materialize an array value from the element expressions.
    Vector(Vec<Expr>),
    /// Partition-token test: murmur-hash column `col`, then binary
    /// search the sorted `(start, end)` token ranges.
    HashRange { col: usize, ranges: Vec<(i64, i64)> },
    /// EXISTS over a subquery statement's materialized output.
    Exists { node_id: i32 },
    /// Scalar value from a subquery statement's materialized output.
    ScalarSubquery { node_id: i32 },
}

impl Expr {
    pub fn eval(
        &self,
        cx: &EvalCtx,
        outer: Option<&Tuple>,
        inner: Option<&Tuple>,
    ) -> Result<Value> {
        match self {
            Expr::Constant(v) => Ok(v.clone()),
            Expr::TupleValue { side, col } => {
                let tuple = match side {
                    0 => outer,
                    _ => inner,
                };
                match tuple {
                    Some(t) => t.value(*col),
                    None => err_at!(InvalidInput, msg: "no tuple bound for side {}", side),
                }
            }
            Expr::Parameter { idx } => match cx.params.get(*idx) {
                Some(v) => Ok(v.clone()),
                None => err_at!(InvalidInput, msg: "parameter {}/{}", idx, cx.params.len()),
            },
            Expr::Arith { op, left, right } => {
                let a = left.eval(cx, outer, inner)?;
                let b = right.eval(cx, outer, inner)?;
                match op {
                    ArithOp::Plus => a.add(&b),
                    ArithOp::Minus => a.sub(&b),
                    ArithOp::Multiply => a.mul(&b),
                    ArithOp::Divide => a.div(&b),
                    ArithOp::Mod => a.modulo(&b),
                    ArithOp::Concat => a.concat(&b),
                }
            }
            Expr::UnaryMinus(child) => child.eval(cx, outer, inner)?.neg(),
            Expr::Not(child) => match child.eval(cx, outer, inner)? {
                Value::Null(_) => Ok(Value::Null(ValueType::Boolean)),
                v => Ok(Value::Boolean(!v.is_true())),
            },
            Expr::IsNull(child) => Ok(Value::Boolean(child.eval(cx, outer, inner)?.is_null())),
            Expr::Cast { to, child } => child.eval(cx, outer, inner)?.cast_to(*to),
            Expr::CaseWhen { cond, then, otherwise } => {
                match cond.eval(cx, outer, inner)?.is_true() {
                    true => then.eval(cx, outer, inner),
                    false => otherwise.eval(cx, outer, inner),
                }
            }
            Expr::Cmp { op, left, right } => {
                if let Some(v) = self.eval_inlined_cmp(cx, outer, inner, *op, left, right)? {
                    return Ok(v);
                }
                let a = left.eval(cx, outer, inner)?;
                let b = right.eval(cx, outer, inner)?;
                match op {
                    CmpOp::Eq => a.op_eq(&b),
                    CmpOp::Ne => a.op_ne(&b),
                    CmpOp::Lt => a.op_lt(&b),
                    CmpOp::Le => a.op_le(&b),
                    CmpOp::Gt => a.op_gt(&b),
                    CmpOp::Ge => a.op_ge(&b),
                    CmpOp::Like => a.op_like(&b),
                    CmpOp::StartsWith => a.op_startswith(&b),
                    CmpOp::NotDistinct => a.op_not_distinct(&b),
                }
            }
            Expr::In { needle, list } => {
                let n = needle.eval(cx, outer, inner)?;
                let l = list.eval(cx, outer, inner)?;
                n.op_in(&l)
            }
            Expr::Conjunction { and, left, right } => {
                let a = left.eval(cx, outer, inner)?;
                // short circuit on the dominating operand.
                match (and, &a) {
                    (true, Value::Boolean(false)) => return Ok(Value::Boolean(false)),
                    (false, Value::Boolean(true)) => return Ok(Value::Boolean(true)),
                    _ => (),
                }
                let b = right.eval(cx, outer, inner)?;
                Ok(combine_three_valued(*and, &a, &b))
            }
            Expr::Function { id, args } => {
                let mut vals = Vec::with_capacity(args.len());
                for arg in args.iter() {
                    vals.push(arg.eval(cx, outer, inner)?);
                }
                eval_function(*id, &vals)
            }
            Expr::Vector(items) => {
                let mut vals = Vec::with_capacity(items.len());
                for item in items.iter() {
                    vals.push(item.eval(cx, outer, inner)?);
                }
                Ok(Value::Array(std::rc::Rc::new(vals)))
            }
            Expr::HashRange { col, ranges } => {
                let tuple = match outer {
                    Some(t) => t,
                    None => err_at!(InvalidInput, msg: "hash-range without a tuple")?,
                };
                let v = tuple.value(*col)?;
                if v.is_null() {
                    return Ok(Value::Null(ValueType::Boolean));
                }
                let token = hasher::value_token(&v);
                let at = ranges.partition_point(|(start, _)| *start <= token);
                let hit = at > 0 && token <= ranges[at - 1].1;
                Ok(Value::Boolean(hit))
            }
            Expr::Exists { node_id } => {
                let table = lookup_subquery(cx, *node_id)?;
                Ok(Value::Boolean(table.len() > 0))
            }
            Expr::ScalarSubquery { node_id } => {
                let table = lookup_subquery(cx, *node_id)?;
                match table.len() {
                    0 => Ok(Value::Null(table.schema().column(0).vtype)),
                    1 => table.tuple_at(0)?.value(0),
                    n => err_at!(InvalidInput, msg: "scalar subquery returned {} rows", n),
                }
            }
        }
    }

    // Devirtualized fast path: integral column against an integral
    // constant compares at i64 without the generic widening dispatch.
    // Produces exactly the general path's result.
    fn eval_inlined_cmp(
        &self,
        cx: &EvalCtx,
        outer: Option<&Tuple>,
        inner: Option<&Tuple>,
        op: CmpOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Option<Value>> {
        let _ = cx;
        let (side, col, constant, flipped) = match (left, right) {
            (Expr::TupleValue { side, col }, Expr::Constant(c))
                if c.vtype().is_integral() && cmp_is_ordering(op) =>
            {
                (*side, *col, c, false)
            }
            (Expr::Constant(c), Expr::TupleValue { side, col })
                if c.vtype().is_integral() && cmp_is_ordering(op) =>
            {
                (*side, *col, c, true)
            }
            _ => return Ok(None),
        };
        let tuple = match if side == 0 { outer } else { inner } {
            Some(t) => t,
            None => return Ok(None),
        };
        let lhs = tuple.value(col)?;
        if lhs.is_null() {
            return Ok(Some(Value::Null(ValueType::Boolean)));
        }
        if !lhs.vtype().is_integral() {
            return Ok(None);
        }
        let (a, b) = match flipped {
            false => (lhs.as_bigint()?, constant.as_bigint()?),
            true => (constant.as_bigint()?, lhs.as_bigint()?),
        };
        let hit = match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            _ => return Ok(None),
        };
        Ok(Some(Value::Boolean(hit)))
    }

    /// Transitive: does any node below reference the parameter array.
    pub fn has_parameter(&self) -> bool {
        match self {
            Expr::Parameter { .. } => true,
            Expr::Constant(_)
            | Expr::TupleValue { .. }
            | Expr::HashRange { .. }
            | Expr::Exists { .. }
            | Expr::ScalarSubquery { .. } => false,
            Expr::UnaryMinus(c) | Expr::Not(c) | Expr::IsNull(c) => c.has_parameter(),
            Expr::Cast { child, .. } => child.has_parameter(),
            Expr::Arith { left, right, .. }
            | Expr::Cmp { left, right, .. }
            | Expr::Conjunction { left, right, .. } => {
                left.has_parameter() || right.has_parameter()
            }
            Expr::In { needle, list } => needle.has_parameter() || list.has_parameter(),
            Expr::CaseWhen { cond, then, otherwise } => {
                cond.has_parameter() || then.has_parameter() || otherwise.has_parameter()
            }
            Expr::Function { args, .. } => args.iter().any(|a| a.has_parameter()),
            Expr::Vector(items) => items.iter().any(|a| a.has_parameter()),
        }
    }

    /// Collect the columns referenced on `side` into `out`.
    pub fn collect_columns(&self, side: usize, out: &mut Vec<usize>) {
        match self {
            Expr::TupleValue { side: s, col } if *s == side => out.push(*col),
            Expr::TupleValue { .. }
            | Expr::Constant(_)
            | Expr::Parameter { .. }
            | Expr::Exists { .. }
            | Expr::ScalarSubquery { .. } => (),
            Expr::HashRange { col, .. } => {
                if side == 0 {
                    out.push(*col)
                }
            }
            Expr::UnaryMinus(c) | Expr::Not(c) | Expr::IsNull(c) => c.collect_columns(side, out),
            Expr::Cast { child, .. } => child.collect_columns(side, out),
            Expr::Arith { left, right, .. }
            | Expr::Cmp { left, right, .. }
            | Expr::Conjunction { left, right, .. } => {
                left.collect_columns(side, out);
                right.collect_columns(side, out);
            }
            Expr::In { needle, list } => {
                needle.collect_columns(side, out);
                list.collect_columns(side, out);
            }
            Expr::CaseWhen { cond, then, otherwise } => {
                cond.collect_columns(side, out);
                then.collect_columns(side, out);
                otherwise.collect_columns(side, out);
            }
            Expr::Function { args, .. } => {
                args.iter().for_each(|a| a.collect_columns(side, out))
            }
            Expr::Vector(items) => items.iter().for_each(|a| a.collect_columns(side, out)),
        }
    }
}

fn cmp_is_ordering(op: CmpOp) -> bool {
    matches!(
        op,
        CmpOp::Eq | CmpOp::Ne | CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge
    )
}

// Three-valued AND/OR. AND: FALSE if any operand FALSE, else NULL if
// any NULL, else TRUE. OR: TRUE if any operand TRUE, else NULL if any
// NULL, else FALSE.
fn combine_three_valued(and: bool, a: &Value, b: &Value) -> Value {
    let (a_null, b_null) = (a.is_null(), b.is_null());
    if and {
        if (!a_null && !a.is_true()) || (!b_null && !b.is_true()) {
            Value::Boolean(false)
        } else if a_null || b_null {
            Value::Null(ValueType::Boolean)
        } else {
            Value::Boolean(true)
        }
    } else if (!a_null && a.is_true()) || (!b_null && b.is_true()) {
        Value::Boolean(true)
    } else if a_null || b_null {
        Value::Null(ValueType::Boolean)
    } else {
        Value::Boolean(false)
    }
}

fn lookup_subquery<'a>(cx: &EvalCtx<'a>, node_id: i32) -> Result<&'a TempTable> {
    let outputs = match cx.outputs {
        Some(outputs) => outputs,
        None => err_at!(InvalidInput, msg: "no subquery outputs in context")?,
    };
    match outputs.get(&node_id) {
        Some(table) => Ok(table),
        None => err_at!(InvalidInput, msg: "subquery output {} not materialized", node_id),
    }
}

/// Evaluate an optional predicate; absent predicates pass everything.
pub fn eval_predicate(
    pred: &Option<Expr>,
    cx: &EvalCtx,
    outer: Option<&Tuple>,
    inner: Option<&Tuple>,
) -> Result<bool> {
    match pred {
        None => Ok(true),
        Some(p) => Ok(p.eval(cx, outer, inner)?.is_true()),
    }
}
