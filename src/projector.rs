//! Module implement the projection core: per-output-field steps with a
//! raw-copy fast path.
//!
//! A projector maps input rows to output rows through a step per output
//! field, either an expression evaluation or a raw byte copy.
//! Optimization runs two passes: first, tuple-value expressions over
//! metadata-identical columns become copy steps; second, byte-adjacent
//! copy steps coalesce into one. Steps are keyed by their first output
//! field in a [BTreeMap], so copy steps always execute in output-offset
//! order.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    expr::{EvalCtx, Expr},
    schema::TupleSchema,
    tuple::{OwnedTuple, Tuple},
    Result,
};

#[derive(Debug)]
pub enum Step {
    /// Evaluate and store into the keyed output field.
    Eval { expr: Expr },
    /// Copy a byte run covering output fields key..=last_out_col.
    Copy {
        last_out_col: usize,
        first_in_col: usize,
        last_in_col: usize,
        in_off: usize,
        out_off: usize,
        len: usize,
    },
}

pub struct Projector {
    out_schema: Arc<TupleSchema>,
    steps: BTreeMap<usize, Step>,
}

impl Projector {
    /// One expression per visible output field, in field order.
    pub fn new(out_schema: Arc<TupleSchema>, exprs: Vec<Expr>) -> Result<Projector> {
        if exprs.len() != out_schema.count_visible() {
            return err_at!(
                InvalidInput,
                msg: "{} exprs for {} fields", exprs.len(), out_schema.count_visible()
            );
        }
        let steps = exprs
            .into_iter()
            .enumerate()
            .map(|(i, expr)| (i, Step::Eval { expr }))
            .collect();
        Ok(Projector {
            out_schema,
            steps,
        })
    }

    pub fn out_schema(&self) -> &Arc<TupleSchema> {
        &self.out_schema
    }

    pub fn count_steps(&self) -> usize {
        self.steps.len()
    }

    /// Specialize against the input layout: convert eligible
    /// expression steps into copy steps, then coalesce adjacent runs.
    pub fn optimize(&mut self, in_schema: &TupleSchema) {
        // pass 1: tuple-value over metadata-identical columns becomes a
        // raw copy. Out-of-line columns stay expression steps, their
        // stored ids are container-local.
        let keys: Vec<usize> = self.steps.keys().copied().collect();
        for key in keys {
            let col = match self.steps.get(&key) {
                Some(Step::Eval { expr: Expr::TupleValue { side: 0, col } }) => *col,
                _ => continue,
            };
            if col >= in_schema.count_all() {
                continue;
            }
            let (in_col, out_col) = (in_schema.column(col), self.out_schema.column(key));
            if !in_col.matches(out_col) || !in_col.inlined || !out_col.inlined {
                continue;
            }
            self.steps.insert(
                key,
                Step::Copy {
                    last_out_col: key,
                    first_in_col: col,
                    last_in_col: col,
                    in_off: in_col.offset,
                    out_off: out_col.offset,
                    len: out_col.size,
                },
            );
        }

        // pass 2: merge byte-adjacent copies over consecutive fields.
        let keys: Vec<usize> = self.steps.keys().copied().collect();
        let mut run: Option<usize> = None; // key of the open copy run
        for key in keys {
            let (first_in, last_in, in_off, out_off, len) = match self.steps.get(&key) {
                Some(Step::Copy {
                    first_in_col,
                    last_in_col,
                    in_off,
                    out_off,
                    len,
                    ..
                }) => (*first_in_col, *last_in_col, *in_off, *out_off, *len),
                _ => {
                    run = None;
                    continue;
                }
            };
            let run_key = match run {
                None => {
                    run = Some(key);
                    continue;
                }
                Some(run_key) => run_key,
            };
            let mergeable = match self.steps.get(&run_key) {
                Some(Step::Copy {
                    last_out_col,
                    last_in_col: run_last_in,
                    in_off: run_in_off,
                    out_off: run_out_off,
                    len: run_len,
                    ..
                }) => {
                    last_out_col + 1 == key
                        && run_last_in + 1 == first_in
                        && run_in_off + run_len == in_off
                        && run_out_off + run_len == out_off
                }
                _ => false,
            };
            if !mergeable {
                run = Some(key);
                continue;
            }
            self.steps.remove(&key);
            if let Some(Step::Copy {
                last_out_col,
                last_in_col: run_last_in,
                len: run_len,
                ..
            }) = self.steps.get_mut(&run_key)
            {
                *last_out_col = key;
                *run_last_in = last_in;
                *run_len += len;
            }
        }
    }

    /// Project one input row into `out`. An expression step may observe
    /// the effects of earlier steps on the same output row; steps are
    /// never reordered across output offsets.
    pub fn project(
        &self,
        cx: &EvalCtx,
        input: &Tuple,
        inner: Option<&Tuple>,
        out: &mut OwnedTuple,
    ) -> Result<()> {
        for (key, step) in self.steps.iter() {
            match step {
                Step::Eval { expr } => {
                    let value = expr.eval(cx, Some(input), inner)?;
                    out.set_value(*key, &value)?;
                }
                Step::Copy {
                    in_off,
                    out_off,
                    len,
                    ..
                } => {
                    let src = &input.payload()[*in_off..*in_off + *len];
                    out.payload_mut()[*out_off..*out_off + *len].copy_from_slice(src);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "projector_test.rs"]
mod projector_test;
