//! Module implement value hashing for partition placement.
//!
//! Partition tokens use murmur3-x64-128 (low 64 bits), the same function
//! the cluster's row-distribution layer computes, so that the engine can
//! validate locally that a row belongs on this partition. Partitioning
//! policy itself lives outside this package; only the placement hook is
//! exposed here.

use std::convert::TryInto;

use crate::{value::Value, Result};

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^= k >> 33;
    k
}

/// murmur3 x64 128-bit, returned as (h1, h2).
pub fn murmur3_x64_128(data: &[u8], seed: u32) -> (u64, u64) {
    const C1: u64 = 0x87c37b91114253d5;
    const C2: u64 = 0x4cf5ad432745937f;

    let nblocks = data.len() / 16;
    let mut h1 = seed as u64;
    let mut h2 = seed as u64;

    for i in 0..nblocks {
        let base = i * 16;
        let mut k1 = u64::from_le_bytes(data[base..base + 8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(data[base + 8..base + 16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dce729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x38495ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;
    for i in (8..tail.len()).rev() {
        k2 ^= (tail[i] as u64) << ((i - 8) * 8);
    }
    if tail.len() > 8 {
        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
    }
    for i in (0..tail.len().min(8)).rev() {
        k1 ^= (tail[i] as u64) << (i * 8);
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u64;
    h2 ^= data.len() as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

/// Partition token for a value, the low 64 bits of murmur3 over the
/// value's canonical byte image.
pub fn value_token(value: &Value) -> i64 {
    let mut data = vec![];
    value.hash_bytes(&mut data);
    murmur3_x64_128(&data, 0).0 as i64
}

/// Local-placement hook. Answers whether a partition-key value hashes to
/// this engine's partition.
#[derive(Clone, Debug)]
pub struct Hashinator {
    pub partition_id: i32,
    pub partition_count: i32,
}

impl Hashinator {
    pub fn new(partition_id: i32, partition_count: i32) -> Hashinator {
        Hashinator {
            partition_id,
            partition_count,
        }
    }

    pub fn partition_for(&self, value: &Value) -> i32 {
        let token = value_token(value);
        (token.rem_euclid(self.partition_count.max(1) as i64)) as i32
    }

    pub fn is_local(&self, value: &Value) -> Result<bool> {
        if self.partition_count <= 1 {
            return Ok(true);
        }
        Ok(self.partition_for(value) == self.partition_id)
    }
}

/// Type uses google's city hash to convert [std::hash::Hash]able keys
/// into `u64`. Backs the hash-table flavored containers in this package:
/// hash indexes, group-by tables, distinct sets.
#[derive(Clone, Default)]
pub struct CityHasher {
    buf: Vec<u8>,
}

impl CityHasher {
    pub fn new() -> CityHasher {
        CityHasher::default()
    }
}

impl std::hash::BuildHasher for CityHasher {
    type Hasher = Self;

    #[inline]
    fn build_hasher(&self) -> Self {
        CityHasher::new()
    }
}

impl std::hash::Hasher for CityHasher {
    fn finish(&self) -> u64 {
        let digest = cityhash_rs::cityhash_110_128(&self.buf);
        ((digest >> 64) as u64) ^ ((digest & 0xFFFFFFFFFFFFFFFF) as u64)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

/// CityHash digest of a byte image, folded to 64 bits.
pub fn city64(bytes: &[u8]) -> u64 {
    let digest = cityhash_rs::cityhash_110_128(bytes);
    ((digest >> 64) as u64) ^ ((digest & 0xFFFFFFFFFFFFFFFF) as u64)
}

#[cfg(test)]
#[path = "hasher_test.rs"]
mod hasher_test;
