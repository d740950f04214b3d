//! Long-lived partitioned table: block tuple storage, secondary
//! indexes, replication hook and undo bookkeeping.

use std::sync::Arc;

use crate::{
    index::TableIndex,
    schema::TupleSchema,
    table::StreamedTable,
    tuple::{copy_row, release_row_blobs, BlobStore, OwnedTuple, RowId, Tuple, TupleMut},
    undo::{UndoAction, UndoLog},
    value::Value,
    Result,
};

/// Target bytes per storage block; rows per block derives from the
/// schema's row size.
const BLOCK_TARGET_BYTES: usize = 131_072;

/// Replication record op codes.
pub const DR_INSERT: u8 = 1;
pub const DR_DELETE: u8 = 2;
pub const DR_UPDATE: u8 = 3;

struct Block {
    data: Vec<u8>,
    live: Vec<bool>,
}

impl Block {
    fn new(rows: usize, row_bytes: usize) -> Block {
        Block {
            data: vec![0; rows * row_bytes],
            live: vec![false; rows],
        }
    }
}

pub struct PersistentTable {
    name: String,
    schema: Arc<TupleSchema>,
    rows_per_block: usize,
    blocks: Vec<Block>,
    free: Vec<RowId>,
    blobs: BlobStore,
    indexes: Vec<TableIndex>,
    pk: Option<usize>,
    partition_col: Option<usize>,
    is_replicated: bool,
    visible_count: usize,
    dr: Option<StreamedTable>,
}

impl PersistentTable {
    pub fn new(
        name: &str,
        schema: Arc<TupleSchema>,
        partition_col: Option<usize>,
        is_replicated: bool,
    ) -> PersistentTable {
        let rows_per_block = (BLOCK_TARGET_BYTES / schema.row_bytes()).max(1);
        PersistentTable {
            name: name.to_string(),
            schema,
            rows_per_block,
            blocks: vec![],
            free: vec![],
            blobs: BlobStore::new(),
            indexes: vec![],
            pk: None,
            partition_col,
            is_replicated,
            visible_count: 0,
            dr: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.visible_count
    }

    pub fn is_empty(&self) -> bool {
        self.visible_count == 0
    }

    pub fn partition_column(&self) -> Option<usize> {
        self.partition_col
    }

    pub fn is_replicated(&self) -> bool {
        self.is_replicated
    }

    /// Persistent-table memory, tracked independently of the
    /// per-fragment temp limits.
    pub fn bytes_used(&self) -> usize {
        let block_bytes: usize = self.blocks.iter().map(|b| b.data.len()).sum();
        block_bytes + self.blobs.bytes()
    }

    /// Attach a replication stream; DML appends change records to it.
    pub fn enable_dr(&mut self) {
        if self.dr.is_none() {
            let name = format!("{}$dr", self.name);
            self.dr = Some(StreamedTable::new(&name, Arc::clone(&self.schema)));
        }
    }

    pub fn dr_stream_mut(&mut self) -> Option<&mut StreamedTable> {
        self.dr.as_mut()
    }

    /// Register an index and back-fill it from existing rows.
    pub fn add_index(&mut self, index: TableIndex, is_pk: bool) -> Result<()> {
        let mut index = index;
        {
            let (blocks, blobs, schema) = (&self.blocks, &self.blobs, &self.schema);
            for (row_id, tuple) in iter_rows(blocks, blobs, schema, self.rows_per_block) {
                index.add_tuple(&tuple, row_id)?;
            }
        }
        self.indexes.push(index);
        if is_pk {
            self.pk = Some(self.indexes.len() - 1);
        }
        Ok(())
    }

    pub fn index(&self, name: &str) -> Result<&TableIndex> {
        match self.indexes.iter().find(|ix| ix.name() == name) {
            Some(ix) => Ok(ix),
            None => err_at!(InvalidInput, msg: "no index {} on table {}", name, self.name),
        }
    }

    pub fn primary_key(&self) -> Option<&TableIndex> {
        self.pk.map(|i| &self.indexes[i])
    }

    pub fn indexes(&self) -> &[TableIndex] {
        &self.indexes
    }

    fn slot_range(&self, row: RowId) -> Result<(usize, usize)> {
        let (block, slot) = (row.block() as usize, row.slot() as usize);
        if block >= self.blocks.len() || slot >= self.rows_per_block {
            return err_at!(InvalidInput, msg: "row address {:?} out of range", row);
        }
        let at = slot * self.schema.row_bytes();
        Ok((block, at))
    }

    pub fn tuple(&self, row: RowId) -> Result<Tuple> {
        let (block, at) = self.slot_range(row)?;
        if !self.blocks[block].live[row.slot() as usize] {
            return err_at!(InvalidInput, msg: "row address {:?} is dead", row);
        }
        let bytes = &self.blocks[block].data[at..at + self.schema.row_bytes()];
        Ok(Tuple::new(bytes, &self.schema, Some(&self.blobs)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, Tuple<'_>)> {
        iter_rows(&self.blocks, &self.blobs, &self.schema, self.rows_per_block)
    }

    fn allocate_slot(&mut self) -> RowId {
        if let Some(row) = self.free.pop() {
            return row;
        }
        let needs_block = match self.blocks.last() {
            Some(_) => self.next_slot_in_last_block().is_none(),
            None => true,
        };
        if needs_block {
            self.blocks.push(Block::new(self.rows_per_block, self.schema.row_bytes()));
        }
        let block = self.blocks.len() - 1;
        let slot = self.next_slot_in_last_block().unwrap_or(0);
        RowId::new(block as u32, slot as u32)
    }

    fn next_slot_in_last_block(&self) -> Option<usize> {
        let block = self.blocks.last()?;
        block.live.iter().position(|l| !*l)
    }

    /// Insert a copy of `src`, maintain every index, record undo and
    /// replication. On a constraint failure nothing is left behind.
    pub fn insert_tuple(&mut self, src: &Tuple, mut undo: Option<&mut UndoLog>) -> Result<RowId> {
        let row_id = self.allocate_slot();
        let (block, at) = self.slot_range(row_id)?;
        let row_bytes = self.schema.row_bytes();

        {
            let dst = &mut self.blocks[block].data[at..at + row_bytes];
            copy_row(dst, &mut self.blobs, &self.schema, src)?;
            let mut tm = TupleMut::new(dst, &self.schema, None);
            tm.set_active(true);
            tm.set_dirty(false);
        }
        self.blocks[block].live[row_id.slot() as usize] = true;

        // index maintenance; unwind already-added entries on failure.
        let mut added = 0;
        let mut index_err = None;
        for i in 0..self.indexes.len() {
            let tuple = {
                let bytes = &self.blocks[block].data[at..at + row_bytes];
                Tuple::new(bytes, &self.schema, Some(&self.blobs))
            };
            let key = match self.indexes[i].qualifies(&tuple)? {
                false => continue,
                true => self.indexes[i].key_for(&tuple)?,
            };
            match self.indexes[i].insert_key(key, row_id) {
                Ok(()) => added = i + 1,
                Err(err) => {
                    index_err = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = index_err {
            for i in 0..added {
                let tuple = {
                    let bytes = &self.blocks[block].data[at..at + row_bytes];
                    Tuple::new(bytes, &self.schema, Some(&self.blobs))
                };
                let key = self.indexes[i].key_for(&tuple)?;
                self.indexes[i].remove_key(&key, row_id)?;
            }
            let dst = &mut self.blocks[block].data[at..at + row_bytes];
            release_row_blobs(dst, &self.schema, &mut self.blobs)?;
            self.blocks[block].live[row_id.slot() as usize] = false;
            self.free.push(row_id);
            return Err(err);
        }

        self.visible_count += 1;
        if let Some(undo) = undo.as_mut() {
            undo.record(UndoAction::Insert {
                table: self.name.clone(),
                row: row_id,
            });
        }
        if self.dr.is_some() {
            let mut buf = vec![];
            {
                let bytes = &self.blocks[block].data[at..at + row_bytes];
                let tuple = Tuple::new(bytes, &self.schema, Some(&self.blobs));
                crate::tuple::serialize_tuple_le(&tuple, &mut buf)?;
            }
            if let Some(dr) = self.dr.as_mut() {
                dr.append_serialized(DR_INSERT, &buf);
            }
        }
        Ok(row_id)
    }

    /// Insert from materialized values; used by load paths and undo.
    pub fn insert_values(
        &mut self,
        values: &[Value],
        undo: Option<&mut UndoLog>,
    ) -> Result<RowId> {
        let mut scratch = OwnedTuple::new(Arc::clone(&self.schema))?;
        for (i, v) in values.iter().enumerate() {
            scratch.set_value(i, v)?;
        }
        self.insert_tuple(&scratch.as_tuple(), undo)
    }

    /// Delete a row: unindex, release blobs, free the slot. The saved
    /// row image goes to the undo log.
    pub fn delete_tuple(&mut self, row_id: RowId, mut undo: Option<&mut UndoLog>) -> Result<()> {
        let (block, at) = self.slot_range(row_id)?;
        let row_bytes = self.schema.row_bytes();
        if !self.blocks[block].live[row_id.slot() as usize] {
            return err_at!(InvalidInput, msg: "delete of dead row {:?}", row_id);
        }

        // materialize the image before the storage goes away.
        let values: Vec<Value> = {
            let bytes = &self.blocks[block].data[at..at + row_bytes];
            let tuple = Tuple::new(bytes, &self.schema, Some(&self.blobs));
            (0..self.schema.count_all())
                .map(|i| tuple.value(i))
                .collect::<Result<Vec<Value>>>()?
        };

        {
            let dst = &mut self.blocks[block].data[at..at + row_bytes];
            let mut tm = TupleMut::new(dst, &self.schema, None);
            tm.set_pending_delete(true);
        }

        for i in 0..self.indexes.len() {
            let tuple = {
                let bytes = &self.blocks[block].data[at..at + row_bytes];
                Tuple::new(bytes, &self.schema, Some(&self.blobs))
            };
            self.indexes[i].remove_tuple(&tuple, row_id)?;
        }

        if self.dr.is_some() {
            let mut buf = vec![];
            {
                let bytes = &self.blocks[block].data[at..at + row_bytes];
                let tuple = Tuple::new(bytes, &self.schema, Some(&self.blobs));
                crate::tuple::serialize_tuple_le(&tuple, &mut buf)?;
            }
            if let Some(dr) = self.dr.as_mut() {
                dr.append_serialized(DR_DELETE, &buf);
            }
        }

        {
            let dst = &mut self.blocks[block].data[at..at + row_bytes];
            release_row_blobs(dst, &self.schema, &mut self.blobs)?;
            for byte in dst.iter_mut() {
                *byte = 0;
            }
        }
        self.blocks[block].live[row_id.slot() as usize] = false;
        self.free.push(row_id);
        self.visible_count -= 1;

        if let Some(undo) = undo.as_mut() {
            undo.record(UndoAction::Delete {
                table: self.name.clone(),
                values,
            });
        }
        Ok(())
    }

    /// Update a row in place from a staged image. Only indexes whose
    /// relevant columns intersect `changed` are maintained.
    pub fn update_tuple(
        &mut self,
        row_id: RowId,
        staged: &OwnedTuple,
        changed: &[usize],
        mut undo: Option<&mut UndoLog>,
    ) -> Result<()> {
        let (block, at) = self.slot_range(row_id)?;
        let row_bytes = self.schema.row_bytes();
        if !self.blocks[block].live[row_id.slot() as usize] {
            return err_at!(InvalidInput, msg: "update of dead row {:?}", row_id);
        }

        let old_values: Vec<Value> = {
            let bytes = &self.blocks[block].data[at..at + row_bytes];
            let tuple = Tuple::new(bytes, &self.schema, Some(&self.blobs));
            (0..self.schema.count_all())
                .map(|i| tuple.value(i))
                .collect::<Result<Vec<Value>>>()?
        };

        // unindex under the old image where affected.
        for i in 0..self.indexes.len() {
            if !self.indexes[i].relevant_to_update(changed) {
                continue;
            }
            let tuple = {
                let bytes = &self.blocks[block].data[at..at + row_bytes];
                Tuple::new(bytes, &self.schema, Some(&self.blobs))
            };
            self.indexes[i].remove_tuple(&tuple, row_id)?;
        }

        {
            let dst = &mut self.blocks[block].data[at..at + row_bytes];
            copy_row(dst, &mut self.blobs, &self.schema, &staged.as_tuple())?;
            let mut tm = TupleMut::new(dst, &self.schema, None);
            tm.set_active(true);
            tm.set_dirty(true);
        }

        let mut index_err = None;
        for i in 0..self.indexes.len() {
            if !self.indexes[i].relevant_to_update(changed) {
                continue;
            }
            let tuple = {
                let bytes = &self.blocks[block].data[at..at + row_bytes];
                Tuple::new(bytes, &self.schema, Some(&self.blobs))
            };
            let key = match self.indexes[i].qualifies(&tuple)? {
                false => continue,
                true => self.indexes[i].key_for(&tuple)?,
            };
            if let Err(err) = self.indexes[i].insert_key(key, row_id) {
                index_err = Some(err);
                break;
            }
        }
        if let Some(err) = index_err {
            // restoring the old image re-runs full index maintenance,
            // which also drops the just-added keys.
            self.write_values(row_id, &old_values)?;
            return Err(err);
        }

        if self.dr.is_some() {
            let mut buf = vec![];
            {
                let bytes = &self.blocks[block].data[at..at + row_bytes];
                let tuple = Tuple::new(bytes, &self.schema, Some(&self.blobs));
                crate::tuple::serialize_tuple_le(&tuple, &mut buf)?;
            }
            if let Some(dr) = self.dr.as_mut() {
                dr.append_serialized(DR_UPDATE, &buf);
            }
        }

        if let Some(undo) = undo.as_mut() {
            undo.record(UndoAction::Update {
                table: self.name.clone(),
                row: row_id,
                values: old_values,
            });
        }
        Ok(())
    }

    /// Silent in-place write used by undo rollback; maintains all
    /// indexes, records nothing.
    pub fn write_values(&mut self, row_id: RowId, values: &[Value]) -> Result<()> {
        let mut staged = OwnedTuple::new(Arc::clone(&self.schema))?;
        for (i, v) in values.iter().enumerate() {
            staged.set_value(i, v)?;
        }
        let all: Vec<usize> = (0..self.schema.count_all()).collect();
        // bypass undo and replication for the restore.
        let dr = self.dr.take();
        let res = self.update_tuple(row_id, &staged, &all, None);
        self.dr = dr;
        res
    }

    /// Undo an insert: silent delete, no undo record, no replication.
    pub fn rollback_insert(&mut self, row_id: RowId) -> Result<()> {
        let dr = self.dr.take();
        let res = self.delete_tuple(row_id, None);
        self.dr = dr;
        res
    }

    /// Undo a delete: silent reinsert of the saved row image.
    pub fn rollback_delete(&mut self, values: &[Value]) -> Result<()> {
        let dr = self.dr.take();
        let res = self.insert_values(values, None).map(|_| ());
        self.dr = dr;
        res
    }

    /// Undo an update: silent restore of the saved row image.
    pub fn rollback_update(&mut self, row_id: RowId, values: &[Value]) -> Result<()> {
        self.write_values(row_id, values)
    }

    /// Drop every row and clear every index.
    pub fn truncate(&mut self) {
        self.blocks.clear();
        self.free.clear();
        self.blobs.clear();
        self.visible_count = 0;
        for index in self.indexes.iter_mut() {
            index.clear();
        }
    }

    /// Exchange storage and index contents with a same-schema table.
    pub fn swap_contents(&mut self, other: &mut PersistentTable) -> Result<()> {
        if !self.schema.compatible(&other.schema) {
            return err_at!(
                InvalidInput,
                msg: "swap of incompatible tables {} {}", self.name, other.name
            );
        }
        std::mem::swap(&mut self.blocks, &mut other.blocks);
        std::mem::swap(&mut self.free, &mut other.free);
        std::mem::swap(&mut self.blobs, &mut other.blobs);
        std::mem::swap(&mut self.indexes, &mut other.indexes);
        std::mem::swap(&mut self.pk, &mut other.pk);
        std::mem::swap(&mut self.visible_count, &mut other.visible_count);
        std::mem::swap(&mut self.rows_per_block, &mut other.rows_per_block);
        Ok(())
    }
}

fn iter_rows<'a>(
    blocks: &'a [Block],
    blobs: &'a BlobStore,
    schema: &'a Arc<TupleSchema>,
    rows_per_block: usize,
) -> impl Iterator<Item = (RowId, Tuple<'a>)> {
    let row_bytes = schema.row_bytes();
    blocks.iter().enumerate().flat_map(move |(b, block)| {
        (0..rows_per_block).filter_map(move |s| {
            if !block.live[s] {
                return None;
            }
            let at = s * row_bytes;
            let bytes = &block.data[at..at + row_bytes];
            Some((
                RowId::new(b as u32, s as u32),
                Tuple::new(bytes, schema, Some(blobs)),
            ))
        })
    })
}

#[cfg(test)]
#[path = "persistent_test.rs"]
mod persistent_test;
