//! Comparison semantics for [Value].
//!
//! Two layers: total ordering over non-null values with numeric
//! widening, used by index keys and sort comparators, and the SQL
//! three-valued predicates built on top of it, where any null operand
//! yields boolean-null.

use std::cmp::Ordering;

use regex::Regex;

use crate::{
    value::{GeoPoint, Value},
    Result,
};

impl Value {
    /// Total order over non-null values. Numeric classes widen:
    /// integral×integral compares as i64, anything×double as f64,
    /// integral×decimal as scaled i128. Null operands are the caller's
    /// business, refer to [Value::cmp_nulls_first].
    pub fn cmp_values(&self, other: &Value) -> Result<Ordering> {
        use Value::*;

        let ord = match (self, other) {
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Varchar(a), Varchar(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Varbinary(a), Varbinary(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Address(a), Address(b)) => a.cmp(b),
            (Point(a), Point(b)) => match a.lat.total_cmp(&b.lat) {
                Ordering::Equal => a.lng.total_cmp(&b.lng),
                ord => ord,
            },
            (Double(_), b) if b.vtype().is_numeric() => {
                self.as_double()?.total_cmp(&other.as_double()?)
            }
            (a, Double(_)) if a.vtype().is_numeric() => {
                self.as_double()?.total_cmp(&other.as_double()?)
            }
            (Decimal(_), b) if b.vtype().is_exact_numeric() => {
                self.as_decimal()?.cmp(&other.as_decimal()?)
            }
            (a, Decimal(_)) if a.vtype().is_exact_numeric() => {
                self.as_decimal()?.cmp(&other.as_decimal()?)
            }
            (a, b) if a.vtype().is_integral() && b.vtype().is_integral() => {
                self.as_bigint()?.cmp(&other.as_bigint()?)
            }
            (a, b) => err_at!(
                InvalidInput,
                msg: "cannot compare {} with {}", a.vtype().to_name(), b.vtype().to_name()
            )?,
        };
        Ok(ord)
    }

    /// Ordering with nulls sorting below every value, the index key
    /// order.
    pub fn cmp_nulls_first(&self, other: &Value) -> Result<Ordering> {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ok(Ordering::Equal),
            (true, false) => Ok(Ordering::Less),
            (false, true) => Ok(Ordering::Greater),
            (false, false) => self.cmp_values(other),
        }
    }

    /// Ordering with nulls sorting above every value, used by
    /// descending merge comparators.
    pub fn cmp_nulls_max(&self, other: &Value) -> Result<Ordering> {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ok(Ordering::Equal),
            (true, false) => Ok(Ordering::Greater),
            (false, true) => Ok(Ordering::Less),
            (false, false) => self.cmp_values(other),
        }
    }

    fn three_valued<F>(&self, other: &Value, f: F) -> Result<Value>
    where
        F: Fn(Ordering) -> bool,
    {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null(super::ValueType::Boolean));
        }
        Ok(Value::Boolean(f(self.cmp_values(other)?)))
    }

    pub fn op_eq(&self, other: &Value) -> Result<Value> {
        self.three_valued(other, |ord| ord == Ordering::Equal)
    }

    pub fn op_ne(&self, other: &Value) -> Result<Value> {
        self.three_valued(other, |ord| ord != Ordering::Equal)
    }

    pub fn op_lt(&self, other: &Value) -> Result<Value> {
        self.three_valued(other, |ord| ord == Ordering::Less)
    }

    pub fn op_le(&self, other: &Value) -> Result<Value> {
        self.three_valued(other, |ord| ord != Ordering::Greater)
    }

    pub fn op_gt(&self, other: &Value) -> Result<Value> {
        self.three_valued(other, |ord| ord == Ordering::Greater)
    }

    pub fn op_ge(&self, other: &Value) -> Result<Value> {
        self.three_valued(other, |ord| ord != Ordering::Less)
    }

    /// Null-safe equality: nulls compare equal to nulls, never null
    /// result.
    pub fn op_not_distinct(&self, other: &Value) -> Result<Value> {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ok(Value::Boolean(true)),
            (true, false) | (false, true) => Ok(Value::Boolean(false)),
            (false, false) => Ok(Value::Boolean(self.cmp_values(other)? == Ordering::Equal)),
        }
    }

    /// SQL LIKE. `%` matches any run, `_` matches one character.
    pub fn op_like(&self, pattern: &Value) -> Result<Value> {
        if self.is_null() || pattern.is_null() {
            return Ok(Value::Null(super::ValueType::Boolean));
        }
        let (s, pat) = (self.as_str()?, pattern.as_str()?);
        let re = like_to_regex(pat)?;
        Ok(Value::Boolean(re.is_match(s)))
    }

    pub fn op_startswith(&self, prefix: &Value) -> Result<Value> {
        if self.is_null() || prefix.is_null() {
            return Ok(Value::Null(super::ValueType::Boolean));
        }
        Ok(Value::Boolean(self.as_str()?.starts_with(prefix.as_str()?)))
    }

    /// SQL IN over a materialized array value. A null needle yields
    /// boolean-null; a miss with nulls present in the list also yields
    /// boolean-null.
    pub fn op_in(&self, list: &Value) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null(super::ValueType::Boolean));
        }
        let items = match list {
            Value::Array(items) => items,
            _ => err_at!(InvalidInput, msg: "IN requires an array operand")?,
        };
        let mut saw_null = false;
        for item in items.iter() {
            if item.is_null() {
                saw_null = true;
                continue;
            }
            if self.cmp_values(item)? == Ordering::Equal {
                return Ok(Value::Boolean(true));
            }
        }
        match saw_null {
            true => Ok(Value::Null(super::ValueType::Boolean)),
            false => Ok(Value::Boolean(false)),
        }
    }

    /// GEO_CONTAINS: polygon contains point.
    pub fn op_contains(&self, point: &Value) -> Result<Value> {
        if self.is_null() || point.is_null() {
            return Ok(Value::Null(super::ValueType::Boolean));
        }
        match (self, point) {
            (Value::Polygon(poly), Value::Point(p)) => Ok(Value::Boolean(poly.contains(p))),
            (a, b) => err_at!(
                InvalidInput,
                msg: "contains({}, {})", a.vtype().to_name(), b.vtype().to_name()
            ),
        }
    }
}

impl super::GeoPolygon {
    /// Planar even-odd containment; ring 0 is the shell, remaining
    /// rings are holes.
    pub fn contains(&self, p: &GeoPoint) -> bool {
        let mut inside = false;
        for (i, ring) in self.rings.iter().enumerate() {
            let inside_ring = ring_contains(ring, p);
            if i == 0 && !inside_ring {
                return false;
            }
            if i == 0 {
                inside = true;
            } else if inside_ring {
                return false; // inside a hole
            }
        }
        inside
    }
}

fn ring_contains(ring: &[GeoPoint], p: &GeoPoint) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (&ring[i], &ring[j]);
        if ((a.lat > p.lat) != (b.lat > p.lat))
            && (p.lng < (b.lng - a.lng) * (p.lat - a.lat) / (b.lat - a.lat) + a.lng)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Translate a LIKE pattern to an anchored regex, escaping regex
/// metacharacters in the literal parts.
pub fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str("(?s:.*)"),
            '_' => out.push_str("(?s:.)"),
            ch => out.push_str(&regex::escape(&ch.to_string())),
        }
    }
    out.push('$');
    err_at!(InvalidInput, Regex::new(&out))
}

#[cfg(test)]
#[path = "cmp_test.rs"]
mod cmp_test;
