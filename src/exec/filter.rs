//! Counting post-filter: WHERE predicate, then OFFSET skip, then LIMIT
//! stop, applied per candidate row at the emission point of scans,
//! joins and merges.

use crate::{
    expr::{EvalCtx, Expr},
    plan::NodeSpec,
    tuple::Tuple,
    value::Value,
    Result,
};

pub const NO_LIMIT: i64 = -1;

/// Limit/offset as planned: literal values or parameter slots.
#[derive(Clone, Copy, Debug, Default)]
pub struct LimitSpec {
    pub limit: i64,
    pub offset: i64,
    pub limit_param: Option<usize>,
    pub offset_param: Option<usize>,
}

impl LimitSpec {
    pub fn none() -> LimitSpec {
        LimitSpec {
            limit: NO_LIMIT,
            offset: 0,
            limit_param: None,
            offset_param: None,
        }
    }

    pub fn from_node(spec: &NodeSpec) -> LimitSpec {
        match spec {
            NodeSpec::Limit {
                limit,
                offset,
                limit_param,
                offset_param,
            } => LimitSpec {
                limit: *limit,
                offset: *offset,
                limit_param: *limit_param,
                offset_param: *offset_param,
            },
            _ => LimitSpec::none(),
        }
    }

    /// Resolve against the parameter array.
    pub fn resolve(&self, params: &[Value]) -> Result<(i64, i64)> {
        let limit = match self.limit_param {
            Some(idx) => match params.get(idx) {
                Some(v) => v.as_bigint()?,
                None => err_at!(InvalidInput, msg: "limit parameter {}", idx)?,
            },
            None => self.limit,
        };
        let offset = match self.offset_param {
            Some(idx) => match params.get(idx) {
                Some(v) => v.as_bigint()?,
                None => err_at!(InvalidInput, msg: "offset parameter {}", idx)?,
            },
            None => self.offset,
        };
        Ok((limit, offset.max(0)))
    }
}

/// Stateful per-row filter. `eval` returning true means the caller
/// emits the row; the filter has already counted it.
pub struct CountingPostfilter<'a> {
    predicate: Option<&'a Expr>,
    limit: i64,
    offset: i64,
    skipped: i64,
    emitted: i64,
    under_limit: bool,
}

impl<'a> CountingPostfilter<'a> {
    pub fn new(predicate: Option<&'a Expr>, limit: i64, offset: i64) -> CountingPostfilter<'a> {
        CountingPostfilter {
            predicate,
            limit,
            offset,
            skipped: 0,
            emitted: 0,
            under_limit: true,
        }
    }

    pub fn pass_all(predicate: Option<&'a Expr>) -> CountingPostfilter<'a> {
        CountingPostfilter::new(predicate, NO_LIMIT, 0)
    }

    /// False once LIMIT has been reached; scan loops exit on it.
    #[inline]
    pub fn is_under_limit(&self) -> bool {
        self.under_limit
    }

    pub fn emitted(&self) -> i64 {
        self.emitted
    }

    pub fn eval(
        &mut self,
        cx: &EvalCtx,
        outer: Option<&Tuple>,
        inner: Option<&Tuple>,
    ) -> Result<bool> {
        if let Some(pred) = self.predicate {
            if !pred.eval(cx, outer, inner)?.is_true() {
                return Ok(false);
            }
        }
        if self.skipped < self.offset {
            self.skipped += 1;
            return Ok(false);
        }
        if self.limit >= 0 && self.emitted >= self.limit {
            self.under_limit = false;
            return Ok(false);
        }
        self.emitted += 1;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod filter_test;
