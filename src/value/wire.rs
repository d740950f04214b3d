//! Wire codecs for [Value].
//!
//! Network output is big-endian; the replication stream is
//! little-endian. Fixed-width types use their natural size with the
//! storage null sentinel standing in for SQL NULL; variable-length
//! types carry an i32 length prefix, -1 encoding NULL.

use std::rc::Rc;

use crate::{
    util,
    value::{GeoPoint, GeoPolygon, Value, ValueType, DOUBLE_NULL},
    Result,
};

pub fn write_value_be(out: &mut Vec<u8>, vtype: ValueType, value: &Value) -> Result<()> {
    write_value(out, vtype, value, false)
}

pub fn write_value_le(out: &mut Vec<u8>, vtype: ValueType, value: &Value) -> Result<()> {
    write_value(out, vtype, value, true)
}

fn write_value(out: &mut Vec<u8>, vtype: ValueType, value: &Value, le: bool) -> Result<()> {
    let null = value.is_null();

    macro_rules! put_int {
        ($write_be:ident, $write_le:ident, $val:expr) => {
            match le {
                true => util::$write_le(out, $val),
                false => util::$write_be(out, $val),
            }
        };
    }

    match vtype {
        ValueType::TinyInt => {
            let n = if null { i8::MIN } else { value.as_bigint()? as i8 };
            util::write_u8(out, n as u8);
        }
        ValueType::Boolean => {
            let n = if null { 0x80 } else { value.is_true() as u8 };
            util::write_u8(out, n);
        }
        ValueType::SmallInt => {
            let n = if null { i16::MIN } else { value.as_bigint()? as i16 };
            put_int!(write_i16_be, write_i16_le, n);
        }
        ValueType::Integer => {
            let n = if null { i32::MIN } else { value.as_bigint()? as i32 };
            put_int!(write_i32_be, write_i32_le, n);
        }
        ValueType::BigInt | ValueType::Timestamp => {
            let n = if null { i64::MIN } else { value.as_bigint()? };
            put_int!(write_i64_be, write_i64_le, n);
        }
        ValueType::Address => {
            let n = match value {
                Value::Address(a) => *a as i64,
                _ if null => -1,
                _ => err_at!(InvalidInput, msg: "address from {}", value.vtype().to_name())?,
            };
            put_int!(write_i64_be, write_i64_le, n);
        }
        ValueType::Double => {
            let f = if null { DOUBLE_NULL } else { value.as_double()? };
            put_int!(write_f64_be, write_f64_le, f);
        }
        ValueType::Decimal => {
            let d = if null { i128::MIN } else { value.as_decimal()? };
            put_int!(write_i128_be, write_i128_le, d);
        }
        ValueType::Point => {
            let p = match value {
                Value::Point(p) => *p,
                _ => GeoPoint {
                    lat: f64::NAN,
                    lng: f64::NAN,
                },
            };
            put_int!(write_f64_be, write_f64_le, p.lat);
            put_int!(write_f64_be, write_f64_le, p.lng);
        }
        ValueType::Varchar | ValueType::Varbinary => {
            if null {
                put_int!(write_i32_be, write_i32_le, -1);
            } else {
                let bytes = value.as_bytes()?;
                put_int!(write_i32_be, write_i32_le, bytes.len() as i32);
                out.extend_from_slice(bytes);
            }
        }
        ValueType::Polygon => {
            if null {
                put_int!(write_i32_be, write_i32_le, -1);
            } else {
                let poly = match value {
                    Value::Polygon(p) => p,
                    _ => err_at!(InvalidInput, msg: "polygon from {}", value.vtype().to_name())?,
                };
                let body = polygon_bytes(poly, le);
                put_int!(write_i32_be, write_i32_le, body.len() as i32);
                out.extend_from_slice(&body);
            }
        }
        _ => err_at!(InvalidInput, msg: "cannot serialize {}", vtype.to_name())?,
    }
    Ok(())
}

pub fn read_value_be(buf: &[u8], off: &mut usize, vtype: ValueType) -> Result<Value> {
    read_value(buf, off, vtype, false)
}

pub fn read_value_le(buf: &[u8], off: &mut usize, vtype: ValueType) -> Result<Value> {
    read_value(buf, off, vtype, true)
}

fn read_value(buf: &[u8], off: &mut usize, vtype: ValueType, le: bool) -> Result<Value> {
    macro_rules! get_int {
        ($read_be:ident, $read_le:ident) => {
            match le {
                true => util::$read_le(buf, off)?,
                false => util::$read_be(buf, off)?,
            }
        };
    }

    let value = match vtype {
        ValueType::TinyInt => match util::read_u8(buf, off)? as i8 {
            i8::MIN => Value::Null(vtype),
            n => Value::TinyInt(n),
        },
        ValueType::Boolean => match util::read_u8(buf, off)? {
            0x80 => Value::Null(vtype),
            n => Value::Boolean(n != 0),
        },
        ValueType::SmallInt => match get_int!(read_i16_be, read_i16_le) {
            i16::MIN => Value::Null(vtype),
            n => Value::SmallInt(n),
        },
        ValueType::Integer => match get_int!(read_i32_be, read_i32_le) {
            i32::MIN => Value::Null(vtype),
            n => Value::Integer(n),
        },
        ValueType::BigInt => match get_int!(read_i64_be, read_i64_le) {
            i64::MIN => Value::Null(vtype),
            n => Value::BigInt(n),
        },
        ValueType::Timestamp => match get_int!(read_i64_be, read_i64_le) {
            i64::MIN => Value::Null(vtype),
            n => Value::Timestamp(n),
        },
        ValueType::Address => match get_int!(read_i64_be, read_i64_le) {
            -1 => Value::Null(vtype),
            n => Value::Address(n as u64),
        },
        ValueType::Double => {
            let f = get_int!(read_f64_be, read_f64_le);
            match f == DOUBLE_NULL {
                true => Value::Null(vtype),
                false => Value::Double(f),
            }
        }
        ValueType::Decimal => match get_int!(read_i128_be, read_i128_le) {
            i128::MIN => Value::Null(vtype),
            d => Value::Decimal(d),
        },
        ValueType::Point => {
            let lat = get_int!(read_f64_be, read_f64_le);
            let lng = get_int!(read_f64_be, read_f64_le);
            match lat.is_nan() {
                true => Value::Null(vtype),
                false => Value::Point(GeoPoint { lat, lng }),
            }
        }
        ValueType::Varchar => match get_int!(read_i32_be, read_i32_le) {
            -1 => Value::Null(vtype),
            n if n < 0 => err_at!(DecodeFail, msg: "negative varchar length {}", n)?,
            n => {
                let bytes = util::read_bytes(buf, off, n as usize)?;
                let s = err_at!(DecodeFail, std::str::from_utf8(bytes))?;
                Value::Varchar(Rc::from(s))
            }
        },
        ValueType::Varbinary => match get_int!(read_i32_be, read_i32_le) {
            -1 => Value::Null(vtype),
            n if n < 0 => err_at!(DecodeFail, msg: "negative varbinary length {}", n)?,
            n => Value::Varbinary(Rc::from(util::read_bytes(buf, off, n as usize)?)),
        },
        ValueType::Polygon => match get_int!(read_i32_be, read_i32_le) {
            -1 => Value::Null(vtype),
            n if n < 0 => err_at!(DecodeFail, msg: "negative geography length {}", n)?,
            n => {
                let bytes = util::read_bytes(buf, off, n as usize)?;
                Value::Polygon(Rc::new(polygon_from_bytes(bytes, le)?))
            }
        },
        _ => err_at!(DecodeFail, msg: "cannot deserialize {}", vtype.to_name())?,
    };
    Ok(value)
}

fn polygon_bytes(poly: &GeoPolygon, le: bool) -> Vec<u8> {
    let mut out = vec![];
    let put_i32: fn(&mut Vec<u8>, i32) = if le { util::write_i32_le } else { util::write_i32_be };
    let put_f64: fn(&mut Vec<u8>, f64) = if le { util::write_f64_le } else { util::write_f64_be };

    put_i32(&mut out, poly.rings.len() as i32);
    for ring in poly.rings.iter() {
        put_i32(&mut out, ring.len() as i32);
        for p in ring.iter() {
            put_f64(&mut out, p.lat);
            put_f64(&mut out, p.lng);
        }
    }
    out
}

fn polygon_from_bytes(buf: &[u8], le: bool) -> Result<GeoPolygon> {
    let mut off = 0;
    let get_i32: fn(&[u8], &mut usize) -> Result<i32> =
        if le { util::read_i32_le } else { util::read_i32_be };
    let get_f64: fn(&[u8], &mut usize) -> Result<f64> =
        if le { util::read_f64_le } else { util::read_f64_be };

    let nrings = get_i32(buf, &mut off)?;
    if nrings < 0 {
        return err_at!(DecodeFail, msg: "negative ring count {}", nrings);
    }
    let mut rings = Vec::with_capacity(nrings as usize);
    for _ in 0..nrings {
        let npoints = get_i32(buf, &mut off)?;
        if npoints < 0 {
            return err_at!(DecodeFail, msg: "negative point count {}", npoints);
        }
        let mut ring = Vec::with_capacity(npoints as usize);
        for _ in 0..npoints {
            let lat = get_f64(buf, &mut off)?;
            let lng = get_f64(buf, &mut off)?;
            ring.push(GeoPoint { lat, lng });
        }
        rings.push(ring);
    }
    Ok(GeoPolygon { rings })
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod wire_test;
