//! Module implement the bump allocator backing intra-query temporaries.
//!
//! An [Arena] owns a list of fixed-size chunks plus a separate list of
//! oversize chunks. Allocation advances an 8-byte-aligned offset within
//! the current chunk; requests larger than the chunk size get a chunk of
//! their own. [Arena::reset] releases everything in one sweep, keeping a
//! configured number of normal chunks warm for the next fragment.
//!
//! The arena hands out [Slot] handles instead of raw pointers; callers
//! resolve a handle against the owning arena for the actual bytes. Slots
//! must not be resolved after `reset`. Nothing with a non-trivial drop
//! may live inside arena memory.

use crate::util::align8;

/// Default chunk size, 256 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 262_144;

/// Default number of chunks retained across [Arena::reset].
pub const DEFAULT_RESERVED_CHUNKS: usize = 1;

/// Handle to a byte-range allocated from an [Arena].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Slot {
    chunk: u32,
    off: u32,
    len: u32,
    oversize: bool,
}

impl Slot {
    /// Offset of this slot within its chunk, always 8-byte aligned.
    #[inline]
    pub fn offset(&self) -> usize {
        self.off as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct Chunk {
    data: Vec<u8>,
    off: usize,
}

impl Chunk {
    fn new(size: usize) -> Chunk {
        Chunk {
            data: vec![0; size],
            off: 0,
        }
    }
}

/// Chunked bump allocator with oversize fallback and bulk reset.
#[derive(Debug)]
pub struct Arena {
    chunk_size: usize,
    reserve: usize,
    chunks: Vec<Chunk>,
    oversize: Vec<Vec<u8>>,
}

impl Arena {
    pub fn new(chunk_size: usize, reserve: usize) -> Arena {
        Arena {
            chunk_size,
            reserve,
            chunks: vec![],
            oversize: vec![],
        }
    }

    /// Allocate `n` bytes, wasting the current chunk's remainder when it
    /// cannot fit the request. Requests beyond the chunk size land in a
    /// dedicated oversize chunk of exactly `n` bytes.
    pub fn allocate(&mut self, n: usize) -> Slot {
        if n > self.chunk_size {
            self.oversize.push(vec![0; n]);
            return Slot {
                chunk: (self.oversize.len() - 1) as u32,
                off: 0,
                len: n as u32,
                oversize: true,
            };
        }

        let fits = match self.chunks.last() {
            Some(chunk) => chunk.data.len() - chunk.off >= n,
            None => false,
        };
        if !fits {
            self.chunks.push(Chunk::new(self.chunk_size));
        }

        let index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[index];
        let off = chunk.off;
        chunk.off = align8(off + n);

        Slot {
            chunk: index as u32,
            off: off as u32,
            len: n as u32,
            oversize: false,
        }
    }

    /// As [Arena::allocate], zero-initialized.
    pub fn allocate_zeroes(&mut self, n: usize) -> Slot {
        let slot = self.allocate(n);
        for byte in self.as_mut_slice(&slot).iter_mut() {
            *byte = 0
        }
        slot
    }

    pub fn as_slice(&self, slot: &Slot) -> &[u8] {
        let (off, len) = (slot.off as usize, slot.len as usize);
        match slot.oversize {
            true => &self.oversize[slot.chunk as usize][off..off + len],
            false => &self.chunks[slot.chunk as usize].data[off..off + len],
        }
    }

    pub fn as_mut_slice(&mut self, slot: &Slot) -> &mut [u8] {
        let (off, len) = (slot.off as usize, slot.len as usize);
        match slot.oversize {
            true => &mut self.oversize[slot.chunk as usize][off..off + len],
            false => &mut self.chunks[slot.chunk as usize].data[off..off + len],
        }
    }

    /// Free all oversize chunks, truncate the normal chunk list to the
    /// reserve and rewind retained offsets. Outstanding [Slot] handles
    /// are invalidated; no destructors run.
    pub fn reset(&mut self) {
        self.oversize.clear();
        self.chunks.truncate(self.reserve);
        for chunk in self.chunks.iter_mut() {
            chunk.off = 0
        }
    }

    /// Bytes held by this arena, counted for memory-limit accounting.
    pub fn bytes_allocated(&self) -> usize {
        let oversize: usize = self.oversize.iter().map(|c| c.len()).sum();
        (self.chunks.len() * self.chunk_size) + oversize
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for Arena {
    fn default() -> Arena {
        Arena::new(DEFAULT_CHUNK_SIZE, DEFAULT_RESERVED_CHUNKS)
    }
}

#[cfg(test)]
#[path = "arena_test.rs"]
mod arena_test;
