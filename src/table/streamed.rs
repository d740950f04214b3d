//! Append-only export pipe. Rows serialize straight into a wire buffer
//! that the host drains; there is no rewind and no row access.

use std::sync::Arc;

use crate::{
    schema::TupleSchema,
    tuple::{self, Tuple},
    util, Result,
};

pub struct StreamedTable {
    name: String,
    schema: Arc<TupleSchema>,
    buffer: Vec<u8>,
    row_count: usize,
}

impl StreamedTable {
    pub fn new(name: &str, schema: Arc<TupleSchema>) -> StreamedTable {
        StreamedTable {
            name: name.to_string(),
            schema,
            buffer: vec![],
            row_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Export append: network (big-endian) tuple format.
    pub fn append_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        tuple::serialize_tuple_be(tuple, &mut self.buffer)?;
        self.row_count += 1;
        Ok(())
    }

    /// Replication append: op byte then the little-endian row image.
    pub fn append_record(&mut self, op: u8, tuple: &Tuple) -> Result<()> {
        util::write_u8(&mut self.buffer, op);
        tuple::serialize_tuple_le(tuple, &mut self.buffer)?;
        self.row_count += 1;
        Ok(())
    }

    /// Replication append of an already-serialized row image.
    pub fn append_serialized(&mut self, op: u8, row_image: &[u8]) {
        util::write_u8(&mut self.buffer, op);
        self.buffer.extend_from_slice(row_image);
        self.row_count += 1;
    }

    /// Hand the accumulated bytes to the host and reset the pipe.
    pub fn drain(&mut self) -> Vec<u8> {
        self.row_count = 0;
        std::mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
#[path = "streamed_test.rs"]
mod streamed_test;
