//! Module implement the undo quantum: reversible DML bookkeeping.
//!
//! Every persistent-table mutation inside a fragment records its
//! inverse here. On success the quantum is released and the records
//! dropped; on error the engine drains the quantum in reverse and
//! re-applies the inverses through the table's silent (non-recording)
//! mutation paths.

use crate::{tuple::RowId, value::Value};

/// Inverse of one persistent-table mutation. Row images are carried as
/// materialized values (hidden columns included) so the undo path does
/// not depend on blob-store state at rollback time.
pub enum UndoAction {
    /// Undo an insert: delete the row again.
    Insert { table: String, row: RowId },
    /// Undo a delete: reinsert the saved row image.
    Delete { table: String, values: Vec<Value> },
    /// Undo an update: restore the saved row image in place.
    Update {
        table: String,
        row: RowId,
        values: Vec<Value>,
    },
}

/// Append-only log of undo actions, partitioned into quanta.
#[derive(Default)]
pub struct UndoLog {
    actions: Vec<UndoAction>,
    marks: Vec<usize>,
}

/// Token naming one open quantum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UndoToken(usize);

impl UndoLog {
    pub fn new() -> UndoLog {
        UndoLog::default()
    }

    pub fn begin_quantum(&mut self) -> UndoToken {
        self.marks.push(self.actions.len());
        UndoToken(self.actions.len())
    }

    pub fn record(&mut self, action: UndoAction) {
        self.actions.push(action);
    }

    /// Commit: forget everything recorded since `token`.
    pub fn release(&mut self, token: UndoToken) {
        while let Some(mark) = self.marks.last() {
            if *mark >= token.0 {
                self.marks.pop();
            } else {
                break;
            }
        }
        self.actions.truncate(token.0);
    }

    /// Drain the actions recorded since `token`, newest first, for the
    /// engine to re-apply.
    pub fn take_rollback(&mut self, token: UndoToken) -> Vec<UndoAction> {
        while let Some(mark) = self.marks.last() {
            if *mark >= token.0 {
                self.marks.pop();
            } else {
                break;
            }
        }
        let mut actions: Vec<UndoAction> = self.actions.drain(token.0..).collect();
        actions.reverse();
        actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
#[path = "undo_test.rs"]
mod undo_test;
