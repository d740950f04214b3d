//! Module implement common utility functions for byte-level codecs.
//!
//! Wire formats handled by this package are position based, there is no
//! self-describing framing below the tuple level. Readers take a mutable
//! offset and advance it; writers append onto a `Vec<u8>`.

use std::convert::TryInto;

use crate::Result;

#[macro_export]
macro_rules! check_remaining {
    ($buf:expr, $off:expr, $want:expr, $msg:expr) => {
        if $buf.len() < ($off + $want) {
            err_at!(
                DecodeFail, msg: "insufficient input {}/{} ({})", $buf.len(), $off + $want, $msg
            )
        } else {
            Ok(())
        }
    };
}

pub fn read_u8(buf: &[u8], off: &mut usize) -> Result<u8> {
    check_remaining!(buf, *off, 1, "u8")?;
    let val = buf[*off];
    *off += 1;
    Ok(val)
}

pub fn read_i16_be(buf: &[u8], off: &mut usize) -> Result<i16> {
    check_remaining!(buf, *off, 2, "i16")?;
    let val = i16::from_be_bytes(buf[*off..*off + 2].try_into().unwrap());
    *off += 2;
    Ok(val)
}

pub fn read_i32_be(buf: &[u8], off: &mut usize) -> Result<i32> {
    check_remaining!(buf, *off, 4, "i32")?;
    let val = i32::from_be_bytes(buf[*off..*off + 4].try_into().unwrap());
    *off += 4;
    Ok(val)
}

pub fn read_i64_be(buf: &[u8], off: &mut usize) -> Result<i64> {
    check_remaining!(buf, *off, 8, "i64")?;
    let val = i64::from_be_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    Ok(val)
}

pub fn read_f64_be(buf: &[u8], off: &mut usize) -> Result<f64> {
    check_remaining!(buf, *off, 8, "f64")?;
    let val = f64::from_be_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    Ok(val)
}

pub fn read_i128_be(buf: &[u8], off: &mut usize) -> Result<i128> {
    check_remaining!(buf, *off, 16, "i128")?;
    let val = i128::from_be_bytes(buf[*off..*off + 16].try_into().unwrap());
    *off += 16;
    Ok(val)
}

pub fn read_i16_le(buf: &[u8], off: &mut usize) -> Result<i16> {
    check_remaining!(buf, *off, 2, "i16")?;
    let val = i16::from_le_bytes(buf[*off..*off + 2].try_into().unwrap());
    *off += 2;
    Ok(val)
}

pub fn read_i32_le(buf: &[u8], off: &mut usize) -> Result<i32> {
    check_remaining!(buf, *off, 4, "i32")?;
    let val = i32::from_le_bytes(buf[*off..*off + 4].try_into().unwrap());
    *off += 4;
    Ok(val)
}

pub fn read_i64_le(buf: &[u8], off: &mut usize) -> Result<i64> {
    check_remaining!(buf, *off, 8, "i64")?;
    let val = i64::from_le_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    Ok(val)
}

pub fn read_f64_le(buf: &[u8], off: &mut usize) -> Result<f64> {
    check_remaining!(buf, *off, 8, "f64")?;
    let val = f64::from_le_bytes(buf[*off..*off + 8].try_into().unwrap());
    *off += 8;
    Ok(val)
}

pub fn read_i128_le(buf: &[u8], off: &mut usize) -> Result<i128> {
    check_remaining!(buf, *off, 16, "i128")?;
    let val = i128::from_le_bytes(buf[*off..*off + 16].try_into().unwrap());
    *off += 16;
    Ok(val)
}

pub fn read_bytes<'a>(buf: &'a [u8], off: &mut usize, n: usize) -> Result<&'a [u8]> {
    check_remaining!(buf, *off, n, "bytes")?;
    let val = &buf[*off..*off + n];
    *off += n;
    Ok(val)
}

pub fn write_u8(buf: &mut Vec<u8>, val: u8) {
    buf.push(val)
}

pub fn write_i16_be(buf: &mut Vec<u8>, val: i16) {
    buf.extend_from_slice(&val.to_be_bytes())
}

pub fn write_i32_be(buf: &mut Vec<u8>, val: i32) {
    buf.extend_from_slice(&val.to_be_bytes())
}

pub fn write_i64_be(buf: &mut Vec<u8>, val: i64) {
    buf.extend_from_slice(&val.to_be_bytes())
}

pub fn write_f64_be(buf: &mut Vec<u8>, val: f64) {
    buf.extend_from_slice(&val.to_be_bytes())
}

pub fn write_i128_be(buf: &mut Vec<u8>, val: i128) {
    buf.extend_from_slice(&val.to_be_bytes())
}

pub fn write_i16_le(buf: &mut Vec<u8>, val: i16) {
    buf.extend_from_slice(&val.to_le_bytes())
}

pub fn write_i32_le(buf: &mut Vec<u8>, val: i32) {
    buf.extend_from_slice(&val.to_le_bytes())
}

pub fn write_i64_le(buf: &mut Vec<u8>, val: i64) {
    buf.extend_from_slice(&val.to_le_bytes())
}

pub fn write_f64_le(buf: &mut Vec<u8>, val: f64) {
    buf.extend_from_slice(&val.to_le_bytes())
}

pub fn write_i128_le(buf: &mut Vec<u8>, val: i128) {
    buf.extend_from_slice(&val.to_le_bytes())
}

/// Round `n` up to the next multiple of 8. Offsets handed out by the
/// arena and fixed row layouts keep 8-byte alignment.
pub fn align8(n: usize) -> usize {
    (n + 7) & !7
}

#[cfg(test)]
#[path = "util_test.rs"]
mod util_test;
