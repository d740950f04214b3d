//! Arithmetic and cast semantics for [Value].
//!
//! The widening matrix: double beats decimal beats bigint. Integral
//! arithmetic runs at i64 and detects overflow via checked ops; decimal
//! runs at unscaled i128 with the 38-digit domain enforced after every
//! operation. Every numeric conversion distinguishes [Error::Overflow],
//! [Error::Underflow] and [Error::WidthMismatch]; the index-scan setup
//! keys off exactly these kinds.

use chrono::{NaiveDateTime, TimeZone, Utc};

use std::rc::Rc;

use crate::{
    value::{Value, ValueType, DECIMAL_MAX, DECIMAL_MIN, DECIMAL_ONE, DECIMAL_SCALE},
    Result,
};

fn arith_type(a: ValueType, b: ValueType) -> Result<ValueType> {
    if !a.is_numeric() || !b.is_numeric() {
        return err_at!(
            InvalidInput,
            msg: "arithmetic on {} and {}", a.to_name(), b.to_name()
        );
    }
    let t = if a == ValueType::Double || b == ValueType::Double {
        ValueType::Double
    } else if a == ValueType::Decimal || b == ValueType::Decimal {
        ValueType::Decimal
    } else {
        ValueType::BigInt
    };
    Ok(t)
}

fn check_decimal(d: i128) -> Result<Value> {
    if d > DECIMAL_MAX {
        err_at!(Overflow, msg: "decimal out of range")
    } else if d < DECIMAL_MIN {
        err_at!(Underflow, msg: "decimal out of range")
    } else {
        Ok(Value::Decimal(d))
    }
}

fn check_double(f: f64) -> Result<Value> {
    if f.is_finite() {
        Ok(Value::Double(f))
    } else if f == f64::INFINITY {
        err_at!(Overflow, msg: "double out of range")
    } else if f == f64::NEG_INFINITY {
        err_at!(Underflow, msg: "double out of range")
    } else {
        err_at!(InvalidInput, msg: "double arithmetic produced NaN")
    }
}

impl Value {
    pub fn add(&self, other: &Value) -> Result<Value> {
        let rt = arith_type(self.vtype(), other.vtype())?;
        if self.is_null() || other.is_null() {
            return Ok(Value::Null(rt));
        }
        match rt {
            ValueType::Double => check_double(self.as_double()? + other.as_double()?),
            ValueType::Decimal => match self.as_decimal()?.checked_add(other.as_decimal()?) {
                Some(d) => check_decimal(d),
                None => err_at!(Overflow, msg: "decimal add"),
            },
            _ => match self.as_bigint()?.checked_add(other.as_bigint()?) {
                Some(n) => Ok(Value::BigInt(n)),
                None => err_at!(Overflow, msg: "bigint add"),
            },
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        let rt = arith_type(self.vtype(), other.vtype())?;
        if self.is_null() || other.is_null() {
            return Ok(Value::Null(rt));
        }
        match rt {
            ValueType::Double => check_double(self.as_double()? - other.as_double()?),
            ValueType::Decimal => match self.as_decimal()?.checked_sub(other.as_decimal()?) {
                Some(d) => check_decimal(d),
                None => err_at!(Underflow, msg: "decimal subtract"),
            },
            _ => match self.as_bigint()?.checked_sub(other.as_bigint()?) {
                Some(n) => Ok(Value::BigInt(n)),
                None => err_at!(Underflow, msg: "bigint subtract"),
            },
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        let rt = arith_type(self.vtype(), other.vtype())?;
        if self.is_null() || other.is_null() {
            return Ok(Value::Null(rt));
        }
        match rt {
            ValueType::Double => check_double(self.as_double()? * other.as_double()?),
            ValueType::Decimal => {
                // (a*b) carries scale 24; divide one factor's scale out.
                let (a, b) = (self.as_decimal()?, other.as_decimal()?);
                match a.checked_mul(b) {
                    Some(ab) => check_decimal(ab / DECIMAL_ONE),
                    None => err_at!(Overflow, msg: "decimal multiply"),
                }
            }
            _ => match self.as_bigint()?.checked_mul(other.as_bigint()?) {
                Some(n) => Ok(Value::BigInt(n)),
                None => err_at!(Overflow, msg: "bigint multiply"),
            },
        }
    }

    pub fn div(&self, other: &Value) -> Result<Value> {
        let rt = arith_type(self.vtype(), other.vtype())?;
        if self.is_null() || other.is_null() {
            return Ok(Value::Null(rt));
        }
        match rt {
            ValueType::Double => {
                let d = other.as_double()?;
                if d == 0.0 {
                    return err_at!(InvalidInput, msg: "division by zero");
                }
                check_double(self.as_double()? / d)
            }
            ValueType::Decimal => {
                let (a, b) = (self.as_decimal()?, other.as_decimal()?);
                if b == 0 {
                    return err_at!(InvalidInput, msg: "division by zero");
                }
                // rescale the dividend before dividing to keep scale 12.
                match a.checked_mul(DECIMAL_ONE) {
                    Some(scaled) => check_decimal(scaled / b),
                    None => err_at!(Overflow, msg: "decimal divide"),
                }
            }
            _ => {
                let b = other.as_bigint()?;
                if b == 0 {
                    return err_at!(InvalidInput, msg: "division by zero");
                }
                match self.as_bigint()?.checked_div(b) {
                    Some(n) => Ok(Value::BigInt(n)),
                    None => err_at!(Overflow, msg: "bigint divide"),
                }
            }
        }
    }

    /// Integral modulus; both operands must be exact integrals.
    pub fn modulo(&self, other: &Value) -> Result<Value> {
        if !self.vtype().is_integral() || !other.vtype().is_integral() {
            return err_at!(
                InvalidInput,
                msg: "mod on {} and {}", self.vtype().to_name(), other.vtype().to_name()
            );
        }
        if self.is_null() || other.is_null() {
            return Ok(Value::Null(ValueType::BigInt));
        }
        let b = other.as_bigint()?;
        if b == 0 {
            return err_at!(InvalidInput, msg: "division by zero");
        }
        Ok(Value::BigInt(self.as_bigint()? % b))
    }

    pub fn neg(&self) -> Result<Value> {
        if self.is_null() {
            return Ok(self.clone());
        }
        match self {
            Value::Double(f) => Ok(Value::Double(-f)),
            Value::Decimal(d) => check_decimal(-d),
            _ => match self.as_bigint()?.checked_neg() {
                Some(n) => Ok(Value::BigInt(n)),
                None => err_at!(Overflow, msg: "bigint negate"),
            },
        }
    }

    pub fn concat(&self, other: &Value) -> Result<Value> {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null(ValueType::Varchar));
        }
        let mut s = String::from(self.as_str()?);
        s.push_str(other.as_str()?);
        Ok(Value::Varchar(Rc::from(s.as_str())))
    }

    /// Cast to `target`. Range violations raise Overflow/Underflow; the
    /// destination column's declared width is enforced later, at
    /// tuple-storage time.
    pub fn cast_to(&self, target: ValueType) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null(target));
        }
        if self.vtype() == target {
            return Ok(self.clone());
        }

        match target {
            // the most-negative encoding of each width is the storage
            // null sentinel, it stays out of the live domain.
            ValueType::TinyInt => Ok(Value::TinyInt(self.to_integral_checked(
                (i8::MIN as i64) + 1,
                i8::MAX as i64,
            )? as i8)),
            ValueType::SmallInt => Ok(Value::SmallInt(self.to_integral_checked(
                (i16::MIN as i64) + 1,
                i16::MAX as i64,
            )? as i16)),
            ValueType::Integer => Ok(Value::Integer(self.to_integral_checked(
                (i32::MIN as i64) + 1,
                i32::MAX as i64,
            )? as i32)),
            ValueType::BigInt => {
                Ok(Value::BigInt(self.to_integral_checked(i64::MIN + 1, i64::MAX)?))
            }
            ValueType::Timestamp => match self {
                Value::Varchar(s) => Ok(Value::Timestamp(parse_timestamp(s)?)),
                _ => Ok(Value::Timestamp(
                    self.to_integral_checked(i64::MIN + 1, i64::MAX)?,
                )),
            },
            ValueType::Double => match self {
                Value::Varchar(s) => match s.trim().parse::<f64>() {
                    Ok(f) => check_double(f),
                    Err(_) => err_at!(InvalidInput, msg: "cast '{}' to FLOAT", s),
                },
                _ => Ok(Value::Double(self.as_double()?)),
            },
            ValueType::Decimal => match self {
                Value::Varchar(s) => check_decimal(parse_decimal(s)?),
                Value::Double(f) => {
                    let scaled = f * (DECIMAL_ONE as f64);
                    if scaled > (DECIMAL_MAX as f64) {
                        err_at!(Overflow, msg: "cast {} to DECIMAL", f)
                    } else if scaled < (DECIMAL_MIN as f64) {
                        err_at!(Underflow, msg: "cast {} to DECIMAL", f)
                    } else {
                        Ok(Value::Decimal(scaled.round() as i128))
                    }
                }
                _ => check_decimal(self.as_decimal()?),
            },
            ValueType::Varchar => Ok(Value::Varchar(Rc::from(format!("{}", self).as_str()))),
            ValueType::Varbinary => match self {
                Value::Varchar(s) => Ok(Value::Varbinary(Rc::from(s.as_bytes()))),
                _ => err_at!(
                    InvalidInput,
                    msg: "cast {} to VARBINARY", self.vtype().to_name()
                ),
            },
            _ => err_at!(
                InvalidInput,
                msg: "cast {} to {}", self.vtype().to_name(), target.to_name()
            ),
        }
    }

    // Common integral narrowing with range checks. The most-negative
    // encoding of each width is the storage null sentinel and stays out
    // of the live domain.
    fn to_integral_checked(&self, min: i64, max: i64) -> Result<i64> {
        let n = match self {
            Value::Double(f) => {
                if *f > (max as f64) {
                    return err_at!(Overflow, msg: "cast {} out of range", f);
                } else if *f < (min as f64) {
                    return err_at!(Underflow, msg: "cast {} out of range", f);
                }
                *f as i64
            }
            Value::Decimal(d) => {
                let whole = d / DECIMAL_ONE;
                if whole > (max as i128) {
                    return err_at!(Overflow, msg: "cast decimal out of range");
                } else if whole < (min as i128) {
                    return err_at!(Underflow, msg: "cast decimal out of range");
                }
                whole as i64
            }
            Value::Varchar(s) => match s.trim().parse::<i64>() {
                Ok(n) => n,
                Err(_) => return err_at!(InvalidInput, msg: "cast '{}' to integral", s),
            },
            _ => self.as_bigint()?,
        };
        if n > max {
            err_at!(Overflow, msg: "value {} above {}", n, max)
        } else if n < min {
            err_at!(Underflow, msg: "value {} below {}", n, min)
        } else {
            Ok(n)
        }
    }
}

pub(crate) fn format_decimal(d: i128) -> String {
    let sign = if d < 0 { "-" } else { "" };
    let mag = d.unsigned_abs();
    let whole = mag / (DECIMAL_ONE as u128);
    let frac = mag % (DECIMAL_ONE as u128);
    format!("{}{}.{:012}", sign, whole, frac)
}

pub(crate) fn parse_decimal(text: &str) -> Result<i128> {
    let text = text.trim();
    let (sign, text) = match text.strip_prefix('-') {
        Some(rest) => (-1i128, rest),
        None => (1i128, text),
    };
    let mut parts = text.splitn(2, '.');
    let whole_s = parts.next().unwrap_or("");
    let frac_s = parts.next().unwrap_or("");
    if whole_s.is_empty() && frac_s.is_empty() {
        return err_at!(InvalidInput, msg: "cast '{}' to DECIMAL", text);
    }
    let whole: i128 = match whole_s {
        "" => 0,
        s => err_at!(InvalidInput, s.parse::<i128>(), "decimal '{}'", text)?,
    };
    if frac_s.len() > DECIMAL_SCALE as usize {
        return err_at!(WidthMismatch, msg: "decimal scale exceeds {}", DECIMAL_SCALE);
    }
    let mut frac: i128 = 0;
    for ch in frac_s.chars() {
        match ch.to_digit(10) {
            Some(d) => frac = frac * 10 + (d as i128),
            None => return err_at!(InvalidInput, msg: "cast '{}' to DECIMAL", text),
        }
    }
    frac *= 10i128.pow(DECIMAL_SCALE - (frac_s.len() as u32));
    let magnitude = whole.checked_mul(DECIMAL_ONE).and_then(|w| w.checked_add(frac));
    match magnitude {
        Some(mag) if mag > DECIMAL_MAX => match sign < 0 {
            true => err_at!(Underflow, msg: "decimal '{}'", text),
            false => err_at!(Overflow, msg: "decimal '{}'", text),
        },
        Some(mag) => Ok(sign * mag),
        None => err_at!(Overflow, msg: "decimal '{}'", text),
    }
}

pub(crate) fn format_timestamp(micros: i64) -> String {
    let secs = micros.div_euclid(1_000_000);
    let sub = (micros.rem_euclid(1_000_000)) as u32;
    match Utc.timestamp_opt(secs, sub * 1000).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        None => format!("{}us", micros),
    }
}

pub(crate) fn parse_timestamp(text: &str) -> Result<i64> {
    let text = text.trim();
    let fmts = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d"];
    for fmt in fmts.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(dt.timestamp() * 1_000_000 + (dt.timestamp_subsec_micros() as i64));
        }
        if *fmt == "%Y-%m-%d" {
            if let Ok(d) = chrono::NaiveDate::parse_from_str(text, fmt) {
                let dt = d.and_hms(0, 0, 0);
                return Ok(dt.timestamp() * 1_000_000);
            }
        }
    }
    err_at!(InvalidInput, msg: "cast '{}' to TIMESTAMP", text)
}

#[cfg(test)]
#[path = "arith_test.rs"]
mod arith_test;
