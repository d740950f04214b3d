//! Block-paged temp table with disk-backed overflow.
//!
//! Rows append into fixed-capacity blocks; when the resident block
//! budget is exceeded the coldest full block spills to a file. Reload
//! re-inserts the block's out-of-line payloads in id order, which
//! reproduces the ids the stored rows carry; that is this design's
//! replacement for pointer relocation when a block comes back at a new
//! address.

use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use crate::{
    schema::TupleSchema,
    tuple::{copy_row, BlobStore, Tuple},
    util, Result,
};

const ROWS_PER_BLOCK: usize = 1024;

enum BlockState {
    Loaded { data: Vec<u8>, blobs: BlobStore },
    Spilled { file: PathBuf },
}

struct LttBlock {
    rows: usize,
    state: BlockState,
}

pub struct LargeTempTable {
    name: String,
    schema: Arc<TupleSchema>,
    dir: PathBuf,
    blocks: Vec<LttBlock>,
    resident_budget: usize,
    total_rows: usize,
}

impl LargeTempTable {
    pub fn new(
        name: &str,
        schema: Arc<TupleSchema>,
        dir: &Path,
        resident_budget: usize,
    ) -> LargeTempTable {
        LargeTempTable {
            name: name.to_string(),
            schema,
            dir: dir.to_path_buf(),
            blocks: vec![],
            resident_budget: resident_budget.max(1),
            total_rows: 0,
        }
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.total_rows
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn resident_blocks(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b.state, BlockState::Loaded { .. }))
            .count()
    }

    fn block_file(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}-block-{}.ltt", self.name, index))
    }

    pub fn append_tuple(&mut self, src: &Tuple) -> Result<()> {
        let needs_block = match self.blocks.last() {
            Some(block) => block.rows >= ROWS_PER_BLOCK,
            None => true,
        };
        if needs_block {
            self.spill_over_budget()?;
            self.blocks.push(LttBlock {
                rows: 0,
                state: BlockState::Loaded {
                    data: vec![],
                    blobs: BlobStore::new(),
                },
            });
        }

        let row_bytes = self.schema.row_bytes();
        let block = match self.blocks.last_mut() {
            Some(block) => block,
            None => unreachable!(),
        };
        match &mut block.state {
            BlockState::Loaded { data, blobs } => {
                let at = data.len();
                data.resize(at + row_bytes, 0);
                copy_row(&mut data[at..at + row_bytes], blobs, &self.schema, src)?;
            }
            BlockState::Spilled { .. } => {
                return err_at!(Fatal, msg: "append into spilled block");
            }
        }
        block.rows += 1;
        self.total_rows += 1;
        Ok(())
    }

    // Spill the oldest loaded full block once the budget is exceeded.
    fn spill_over_budget(&mut self) -> Result<()> {
        if self.resident_blocks() < self.resident_budget {
            return Ok(());
        }
        for i in 0..self.blocks.len() {
            let spill = matches!(self.blocks[i].state, BlockState::Loaded { .. })
                && self.blocks[i].rows >= ROWS_PER_BLOCK;
            if spill {
                self.spill_block(i)?;
                return Ok(());
            }
        }
        Ok(())
    }

    fn spill_block(&mut self, index: usize) -> Result<()> {
        let file = self.block_file(index);
        let (data, blobs) = match &self.blocks[index].state {
            BlockState::Loaded { data, blobs } => (data, blobs),
            BlockState::Spilled { .. } => return Ok(()),
        };

        let mut image = vec![];
        util::write_i64_le(&mut image, data.len() as i64);
        image.extend_from_slice(data);
        let exported = blobs.export();
        util::write_i32_le(&mut image, exported.len() as i32);
        for (_id, blob) in exported.iter() {
            util::write_i32_le(&mut image, blob.len() as i32);
            image.extend_from_slice(blob);
        }

        let mut fd = err_at!(IOError, fs::File::create(&file), "{:?}", file)?;
        err_at!(IOError, fd.write_all(&image))?;
        err_at!(IOError, fd.sync_all())?;

        self.blocks[index].state = BlockState::Spilled { file };
        Ok(())
    }

    fn load_block(&mut self, index: usize) -> Result<()> {
        let file = match &self.blocks[index].state {
            BlockState::Loaded { .. } => return Ok(()),
            BlockState::Spilled { file } => file.clone(),
        };

        let mut image = vec![];
        let mut fd = err_at!(IOError, fs::File::open(&file), "{:?}", file)?;
        err_at!(IOError, fd.read_to_end(&mut image))?;

        let mut off = 0;
        let data_len = util::read_i64_le(&image, &mut off)? as usize;
        let data = util::read_bytes(&image, &mut off, data_len)?.to_vec();
        let n_blobs = util::read_i32_le(&image, &mut off)?;
        let mut blobs = BlobStore::new();
        for _ in 0..n_blobs {
            let n = util::read_i32_le(&image, &mut off)? as usize;
            let payload = util::read_bytes(&image, &mut off, n)?;
            // re-inserting in id order reproduces the stored ids.
            blobs.put(Rc::from(payload));
        }

        err_at!(IOError, fs::remove_file(&file))?;
        self.blocks[index].state = BlockState::Loaded { data, blobs };
        Ok(())
    }

    /// Sequential scan; spilled blocks load back on demand.
    pub fn for_each<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Tuple) -> Result<()>,
    {
        let row_bytes = self.schema.row_bytes();
        for i in 0..self.blocks.len() {
            self.load_block(i)?;
            let block = &self.blocks[i];
            let (data, blobs) = match &block.state {
                BlockState::Loaded { data, blobs } => (data, blobs),
                BlockState::Spilled { .. } => unreachable!(),
            };
            for r in 0..block.rows {
                let at = r * row_bytes;
                let tuple = Tuple::new(&data[at..at + row_bytes], &self.schema, Some(blobs));
                f(tuple)?;
            }
        }
        Ok(())
    }

    /// Drop all rows; spilled block files are removed.
    pub fn clear(&mut self) -> Result<()> {
        for block in self.blocks.drain(..) {
            if let BlockState::Spilled { file } = block.state {
                fs::remove_file(&file).ok();
            }
        }
        self.total_rows = 0;
        Ok(())
    }
}

impl Drop for LargeTempTable {
    fn drop(&mut self) {
        self.clear().ok();
    }
}

#[cfg(test)]
#[path = "large_test.rs"]
mod large_test;
