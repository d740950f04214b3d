//! Row-sink executors: insert, upsert, update, delete and swap-tables.
//!
//! Inserts validate partition placement, re-home out-of-line payloads
//! into the target table and lift the temp-table memory limit for the
//! statement. Updates drive from source-row addresses, stage the new
//! image in a scratch row, refuse partition-column changes, and only
//! maintain indexes whose relevant columns actually changed.
//! Replicated-table DML coordinates through a shared agreement cell:
//! one partition acts, the rest learn the count (or the error) from it.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use crate::{
    exec::ExecCtx,
    table::{Table, TempTable},
    tuple::{OwnedTuple, RowId},
    value::Value,
    Result,
};

const CELL_EMPTY: i64 = i64::MIN + 1;
const CELL_ERROR: i64 = i64::MIN;

/// Cross-partition agreement cell for replicated-table DML: the acting
/// partition publishes the modified-row count, or the error sentinel;
/// the other partitions read instead of mutating.
pub struct ReplicatedCell {
    actor: i32,
    value: AtomicI64,
}

impl ReplicatedCell {
    pub fn new(actor: i32) -> Arc<ReplicatedCell> {
        Arc::new(ReplicatedCell {
            actor,
            value: AtomicI64::new(CELL_EMPTY),
        })
    }

    pub fn is_actor(&self, partition_id: i32) -> bool {
        self.actor == partition_id
    }

    pub fn publish(&self, count: i64) {
        self.value.store(count, Ordering::SeqCst);
    }

    pub fn publish_error(&self) {
        self.value.store(CELL_ERROR, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.value.store(CELL_EMPTY, Ordering::SeqCst);
    }

    /// Read the published count; the acting partition's error
    /// propagates to every reader.
    pub fn read(&self) -> Result<Option<i64>> {
        match self.value.load(Ordering::SeqCst) {
            CELL_EMPTY => Ok(None),
            CELL_ERROR => err_at!(ConstraintFail, msg: "replicated DML failed on acting site"),
            n => Ok(Some(n)),
        }
    }
}

// Replicated-table coordination around a mutating closure: the actor
// runs it and publishes, the rest read.
fn replicated_gate<F>(ctx: &mut ExecCtx, table: &str, mutate: F) -> Result<i64>
where
    F: FnOnce(&mut ExecCtx) -> Result<i64>,
{
    let replicated = match ctx.catalog.get(table)? {
        Table::Persistent(t) => t.is_replicated(),
        Table::Streamed(_) => false,
    };
    let cell = match replicated {
        true => ctx.replicated.clone(),
        false => None,
    };
    let cell = match cell {
        Some(cell) => cell,
        None => return mutate(ctx),
    };
    if !cell.is_actor(ctx.hashinator.partition_id) {
        return match cell.read()? {
            Some(n) => Ok(n),
            None => err_at!(Fatal, msg: "replicated count for {} not published", table),
        };
    }
    match mutate(ctx) {
        Ok(n) => {
            cell.publish(n);
            Ok(n)
        }
        Err(err) => {
            cell.publish_error();
            Err(err)
        }
    }
}

/// Insert `rows` into `table`; shared by the insert executor, the
/// scans' inline insert and the engine's load paths.
pub(crate) fn insert_rows(
    ctx: &mut ExecCtx,
    table: &str,
    upsert: bool,
    multi_partition: bool,
    rows: &TempTable,
) -> Result<i64> {
    // bulk DML lifts the temp-table limit for its duration.
    let was = ctx.limits.borrow_mut().suspend();
    let res = insert_rows_inner(ctx, table, upsert, multi_partition, rows);
    ctx.limits.borrow_mut().restore(was);
    res
}

fn insert_rows_inner(
    ctx: &mut ExecCtx,
    table: &str,
    upsert: bool,
    multi_partition: bool,
    rows: &TempTable,
) -> Result<i64> {
    let is_stream = matches!(ctx.catalog.get(table)?, Table::Streamed(_));
    if is_stream {
        // export target: append-only, no indexes, no partition check.
        let stream = ctx.catalog.streamed_mut(table)?;
        let mut n = 0;
        for row in rows.iter() {
            stream.append_tuple(&row)?;
            n += 1;
        }
        return Ok(n);
    }

    let ExecCtx {
        catalog,
        undo,
        hashinator,
        ..
    } = ctx;
    let target = catalog.persistent_mut(table)?;
    let partition_col = match target.is_replicated() || multi_partition {
        true => None,
        false => target.partition_column(),
    };

    let mut n = 0;
    for row in rows.iter() {
        if let Some(col) = partition_col {
            let key = row.value(col)?;
            if !hashinator.is_local(&key)? {
                return err_at!(
                    ConstraintFail,
                    msg: "row for table {} does not belong on this partition", table
                );
            }
        }

        let hit = match upsert {
            false => None,
            true => match target.primary_key() {
                Some(pk) => {
                    let key = pk.key_for(&row)?;
                    pk.get(&key).and_then(|rows| rows.first().copied())
                }
                None => err_at!(InvalidInput, msg: "upsert into {} without primary key", table)?,
            },
        };

        match hit {
            Some(row_id) => {
                let mut staged = OwnedTuple::new(Arc::clone(target.schema()))?;
                staged.copy_from(&row)?;
                let all: Vec<usize> = (0..target.schema().count_visible()).collect();
                target.update_tuple(row_id, &staged, &all, Some(undo))?;
            }
            None => {
                target.insert_tuple(&row, Some(undo))?;
            }
        }
        n += 1;
    }
    Ok(n)
}

pub struct InsertExec {
    pub child: i32,
    pub table: String,
    pub upsert: bool,
    pub multi_partition: bool,
    pub out_schema: Arc<crate::schema::TupleSchema>,
}

impl InsertExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let input = ctx.take_child(self.child)?;
        let n = replicated_gate(ctx, &self.table, |ctx| {
            insert_rows(ctx, &self.table, self.upsert, self.multi_partition, &input)
        })?;
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));
        out.append_values(&[Value::BigInt(n)])?;
        ctx.tick(n as u64);
        Ok(out)
    }
}

pub struct UpdateExec {
    pub child: i32,
    pub table: String,
    pub target_columns: Vec<usize>,
    pub out_schema: Arc<crate::schema::TupleSchema>,
}

impl UpdateExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let input = ctx.take_child(self.child)?;
        let n = replicated_gate(ctx, &self.table, |ctx| {
            self.apply(ctx, &input)
        })?;
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));
        out.append_values(&[Value::BigInt(n)])?;
        ctx.tick(n as u64);
        Ok(out)
    }

    fn apply(&self, ctx: &mut ExecCtx, input: &TempTable) -> Result<i64> {
        let ExecCtx { catalog, undo, .. } = ctx;
        let target = catalog.persistent_mut(&self.table)?;
        let partition_col = target.partition_column();

        let mut n = 0;
        for row in input.iter() {
            // input field 0 carries the source-row address.
            let row_id = match row.value(0)? {
                Value::Address(a) => RowId(a),
                v => err_at!(Fatal, msg: "update source address, got {}", v)?,
            };

            let mut staged = OwnedTuple::new(Arc::clone(target.schema()))?;
            staged.copy_from(&target.tuple(row_id)?)?;
            for (k, col) in self.target_columns.iter().enumerate() {
                let new_value = row.value(k + 1)?;
                if Some(*col) == partition_col {
                    let old = staged.value(*col)?;
                    if !old.op_not_distinct(&new_value)?.is_true() {
                        return err_at!(
                            ConstraintFail,
                            msg: "update of partition column on table {}", self.table
                        );
                    }
                }
                staged.set_value(*col, &new_value)?;
            }
            target.update_tuple(row_id, &staged, &self.target_columns, Some(undo))?;
            n += 1;
        }
        Ok(n)
    }
}

pub struct DeleteExec {
    pub child: Option<i32>,
    pub table: String,
    pub truncate: bool,
    pub out_schema: Arc<crate::schema::TupleSchema>,
}

impl DeleteExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let input = match self.child {
            Some(id) => Some(ctx.take_child(id)?),
            None => None,
        };
        let n = replicated_gate(ctx, &self.table, |ctx| {
            let ExecCtx { catalog, undo, .. } = ctx;
            let target = catalog.persistent_mut(&self.table)?;
            match (&input, self.truncate) {
                (_, true) => {
                    let rows: Vec<RowId> = target.iter().map(|(id, _)| id).collect();
                    let n = rows.len() as i64;
                    for row_id in rows {
                        target.delete_tuple(row_id, Some(undo))?;
                    }
                    Ok(n)
                }
                (Some(input), false) => {
                    let mut n = 0;
                    for row in input.iter() {
                        let row_id = match row.value(0)? {
                            Value::Address(a) => RowId(a),
                            v => err_at!(Fatal, msg: "delete source address, got {}", v)?,
                        };
                        target.delete_tuple(row_id, Some(undo))?;
                        n += 1;
                    }
                    Ok(n)
                }
                (None, false) => err_at!(DecodeFail, msg: "delete without source rows"),
            }
        })?;
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));
        out.append_values(&[Value::BigInt(n)])?;
        ctx.tick(n as u64);
        Ok(out)
    }
}

pub struct SwapTablesExec {
    pub table: String,
    pub other: String,
    pub out_schema: Arc<crate::schema::TupleSchema>,
}

impl SwapTablesExec {
    pub fn execute(&self, ctx: &mut ExecCtx) -> Result<TempTable> {
        let n = {
            let a = ctx.catalog.persistent(&self.table)?.len();
            let b = ctx.catalog.persistent(&self.other)?.len();
            (a + b) as i64
        };
        ctx.catalog.swap_tables(&self.table, &self.other)?;
        let mut out = TempTable::new(Arc::clone(&self.out_schema), Some(ctx.limits.clone()));
        out.append_values(&[Value::BigInt(n)])?;
        Ok(out)
    }
}

#[cfg(test)]
#[path = "dml_test.rs"]
mod dml_test;
