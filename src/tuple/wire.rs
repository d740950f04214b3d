//! Tuple wire codecs.
//!
//! Network format (big-endian): i32 tuple length prefix, then each
//! visible column's serialized value. Replication format
//! (little-endian): i32 length, a null bitmap covering all columns
//! including hidden ones, then the non-null column payloads.

use crate::{
    tuple::{Tuple, TupleMut},
    util,
    value::{self, Value},
    Result,
};

/// Serialize visible columns, big-endian, with an i32 length prefix.
pub fn serialize_tuple_be(tuple: &Tuple, out: &mut Vec<u8>) -> Result<()> {
    let body_at = out.len() + 4;
    util::write_i32_be(out, 0); // patched below
    for i in 0..tuple.schema().count_visible() {
        let vtype = tuple.schema().column(i).vtype;
        value::write_value_be(out, vtype, &tuple.value(i)?)?;
    }
    let body_len = (out.len() - body_at) as i32;
    out[body_at - 4..body_at].copy_from_slice(&body_len.to_be_bytes());
    Ok(())
}

/// Decode one network tuple into `dst`, which must carry the same
/// schema the sender serialized with.
pub fn deserialize_tuple_be(buf: &[u8], off: &mut usize, dst: &mut TupleMut) -> Result<()> {
    let body_len = util::read_i32_be(buf, off)?;
    if body_len < 0 {
        return err_at!(DecodeFail, msg: "negative tuple length {}", body_len);
    }
    check_remaining!(buf, *off, body_len as usize, "tuple body")?;
    let end = *off + (body_len as usize);

    let ncols = dst.schema().count_visible();
    for i in 0..ncols {
        let vtype = dst.schema().column(i).vtype;
        let val = value::read_value_be(buf, off, vtype)?;
        dst.set_value(i, &val)?;
    }
    if *off != end {
        return err_at!(DecodeFail, msg: "tuple length skew {} != {}", *off, end);
    }
    Ok(())
}

/// Serialize all columns, little-endian, null bitmap first. The
/// replication stream and binary-log apply both use this layout.
pub fn serialize_tuple_le(tuple: &Tuple, out: &mut Vec<u8>) -> Result<()> {
    let ncols = tuple.schema().count_all();
    let body_at = out.len() + 4;
    util::write_i32_le(out, 0); // patched below

    let bitmap_at = out.len();
    out.resize(out.len() + (ncols + 7) / 8, 0);
    for i in 0..ncols {
        let val = tuple.value(i)?;
        if val.is_null() {
            out[bitmap_at + i / 8] |= 1 << (i % 8);
        } else {
            let vtype = tuple.schema().column(i).vtype;
            value::write_value_le(out, vtype, &val)?;
        }
    }
    let body_len = (out.len() - body_at) as i32;
    out[body_at - 4..body_at].copy_from_slice(&body_len.to_le_bytes());
    Ok(())
}

/// Decode one replication tuple into `dst`.
pub fn deserialize_tuple_le(buf: &[u8], off: &mut usize, dst: &mut TupleMut) -> Result<()> {
    let body_len = util::read_i32_le(buf, off)?;
    if body_len < 0 {
        return err_at!(DecodeFail, msg: "negative tuple length {}", body_len);
    }
    check_remaining!(buf, *off, body_len as usize, "tuple body")?;
    let end = *off + (body_len as usize);

    let ncols = dst.schema().count_all();
    let bitmap = util::read_bytes(buf, off, (ncols + 7) / 8)?.to_vec();
    for i in 0..ncols {
        let vtype = dst.schema().column(i).vtype;
        let null = bitmap[i / 8] & (1 << (i % 8)) != 0;
        let val = match null {
            true => Value::Null(vtype),
            false => value::read_value_le(buf, off, vtype)?,
        };
        dst.set_value(i, &val)?;
    }
    if *off != end {
        return err_at!(DecodeFail, msg: "tuple length skew {} != {}", *off, end);
    }
    Ok(())
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod wire_test;
