//! Executor-local, insert-only row buffer. Rows live in an [Arena];
//! clearing the table is one arena reset, no per-row frees.

use std::{cell::RefCell, rc::Rc, sync::Arc};

use crate::{
    arena::{Arena, Slot},
    schema::TupleSchema,
    tuple::{copy_row, BlobStore, OwnedTuple, Tuple},
    value::Value,
    Result,
};

/// Shared per-fragment temp-memory accounting. The log threshold warns
/// once; the hard limit raises [crate::Error::ResourceFail]. Either
/// limit at zero is disabled. DML statements lift the hard limit for
/// their duration.
#[derive(Default, Debug)]
pub struct TempLimits {
    pub log_limit: usize,
    pub hard_limit: usize,
    pub used: usize,
    warned: bool,
    suspended: bool,
}

impl TempLimits {
    pub fn new(log_limit: usize, hard_limit: usize) -> TempLimits {
        TempLimits {
            log_limit,
            hard_limit,
            ..Default::default()
        }
    }

    /// Lift the hard limit (bulk DML path). Returns the previous state.
    pub fn suspend(&mut self) -> bool {
        let old = self.suspended;
        self.suspended = true;
        old
    }

    pub fn restore(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    fn grow(&mut self, bytes: usize) -> Result<()> {
        self.used += bytes;
        if self.log_limit > 0 && self.used > self.log_limit && !self.warned {
            self.warned = true;
            log::warn!("temp-table memory at {} bytes crossed log limit", self.used);
        }
        if self.hard_limit > 0 && self.used > self.hard_limit && !self.suspended {
            return err_at!(
                ResourceFail,
                msg: "temp-table memory {} exceeds limit {}", self.used, self.hard_limit
            );
        }
        Ok(())
    }

    fn shrink(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
    }
}

pub type SharedLimits = Rc<RefCell<TempLimits>>;

/// Arena-backed temp table.
#[derive(Debug)]
pub struct TempTable {
    schema: Arc<TupleSchema>,
    arena: Arena,
    rows: Vec<Slot>,
    blobs: BlobStore,
    limits: Option<SharedLimits>,
    accounted: usize,
}

impl TempTable {
    pub fn new(schema: Arc<TupleSchema>, limits: Option<SharedLimits>) -> TempTable {
        TempTable {
            schema,
            arena: Arena::default(),
            rows: vec![],
            blobs: BlobStore::new(),
            limits,
            accounted: 0,
        }
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn account(&mut self, bytes: usize) -> Result<()> {
        self.accounted += bytes;
        match &self.limits {
            Some(limits) => limits.borrow_mut().grow(bytes),
            None => Ok(()),
        }
    }

    /// Copy a row in, re-homing out-of-line payloads.
    pub fn append_tuple(&mut self, src: &Tuple) -> Result<()> {
        let slot = self.arena.allocate(self.schema.row_bytes());
        let blob_bytes0 = self.blobs.bytes();
        {
            let dst = self.arena.as_mut_slice(&slot);
            copy_row(dst, &mut self.blobs, &self.schema, src)?;
        }
        self.rows.push(slot);
        let delta = self.schema.row_bytes() + (self.blobs.bytes() - blob_bytes0);
        self.account(delta)
    }

    /// Build and append a row from values (visible columns; hidden
    /// columns null).
    pub fn append_values(&mut self, values: &[Value]) -> Result<()> {
        let mut row = OwnedTuple::new(Arc::clone(&self.schema))?;
        for (i, v) in values.iter().enumerate() {
            row.set_value(i, v)?;
        }
        self.append_tuple(&row.as_tuple())
    }

    pub fn tuple_at(&self, i: usize) -> Result<Tuple> {
        match self.rows.get(i) {
            Some(slot) => Ok(Tuple::new(
                self.arena.as_slice(slot),
                &self.schema,
                Some(&self.blobs),
            )),
            None => err_at!(InvalidInput, msg: "row {}/{}", i, self.rows.len()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Tuple<'_>> {
        self.rows.iter().map(move |slot| {
            Tuple::new(self.arena.as_slice(slot), &self.schema, Some(&self.blobs))
        })
    }

    /// Drop every row: one arena reset, no per-row frees.
    pub fn clear(&mut self) {
        if let Some(limits) = &self.limits {
            limits.borrow_mut().shrink(self.accounted);
        }
        self.accounted = 0;
        self.rows.clear();
        self.blobs.clear();
        self.arena.reset();
    }

    pub fn bytes_used(&self) -> usize {
        self.arena.bytes_allocated() + self.blobs.bytes()
    }
}

impl Drop for TempTable {
    fn drop(&mut self) {
        if let Some(limits) = &self.limits {
            limits.borrow_mut().shrink(self.accounted);
        }
    }
}

#[cfg(test)]
#[path = "temp_test.rs"]
mod temp_test;
