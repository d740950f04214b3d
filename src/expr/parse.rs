//! Expression-tree construction from plan JSON.
//!
//! Construction is recursive: children first (LEFT, RIGHT, ARGS), then
//! the parent node. Unknown keys are ignored; missing required keys
//! raise [crate::Error::DecodeFail].

use serde_json::Value as Json;

use std::rc::Rc;

use crate::{
    expr::{fns, ArithOp, CmpOp, Expr},
    value::{self, Value, ValueType},
    Result,
};

pub(crate) fn json_obj<'a>(json: &'a Json, what: &str) -> Result<&'a serde_json::Map<String, Json>> {
    match json.as_object() {
        Some(obj) => Ok(obj),
        None => err_at!(DecodeFail, msg: "{} is not a json object", what),
    }
}

pub(crate) fn json_str<'a>(obj: &'a serde_json::Map<String, Json>, key: &str) -> Result<&'a str> {
    match obj.get(key).and_then(|v| v.as_str()) {
        Some(s) => Ok(s),
        None => err_at!(DecodeFail, msg: "missing key {}", key),
    }
}

pub(crate) fn json_i64(obj: &serde_json::Map<String, Json>, key: &str) -> Result<i64> {
    match obj.get(key).and_then(|v| v.as_i64()) {
        Some(n) => Ok(n),
        None => err_at!(DecodeFail, msg: "missing key {}", key),
    }
}

pub(crate) fn opt_i64(obj: &serde_json::Map<String, Json>, key: &str) -> Option<i64> {
    obj.get(key).and_then(|v| v.as_i64())
}

pub(crate) fn opt_bool(obj: &serde_json::Map<String, Json>, key: &str) -> Option<bool> {
    obj.get(key).and_then(|v| v.as_bool())
}

/// Accept a value type either as its wire code or its name.
pub(crate) fn value_type_of(obj: &serde_json::Map<String, Json>, key: &str) -> Result<ValueType> {
    match obj.get(key) {
        Some(Json::Number(n)) => match n.as_i64() {
            Some(code) if (0..=255).contains(&code) => ValueType::from_wire(code as u8),
            _ => err_at!(DecodeFail, msg: "bad value type {:?}", n),
        },
        Some(Json::String(s)) => ValueType::from_name(s),
        _ => err_at!(DecodeFail, msg: "missing key {}", key),
    }
}

fn child(obj: &serde_json::Map<String, Json>, key: &str) -> Result<Box<Expr>> {
    match obj.get(key) {
        Some(json) => Ok(Box::new(expr_from_json(json)?)),
        None => err_at!(DecodeFail, msg: "missing expression child {}", key),
    }
}

fn args(obj: &serde_json::Map<String, Json>) -> Result<Vec<Expr>> {
    match obj.get("ARGS") {
        None => Ok(vec![]),
        Some(json) => match json.as_array() {
            Some(items) => items.iter().map(expr_from_json).collect(),
            None => err_at!(DecodeFail, msg: "ARGS is not an array"),
        },
    }
}

fn constant_from_json(obj: &serde_json::Map<String, Json>) -> Result<Expr> {
    let vtype = value_type_of(obj, "VALUE_TYPE")?;
    if opt_bool(obj, "ISNULL").unwrap_or(false) {
        return Ok(Expr::Constant(Value::Null(vtype)));
    }
    let raw = match obj.get("VALUE") {
        Some(raw) => raw,
        None => return Ok(Expr::Constant(Value::Null(vtype))),
    };
    let value = match vtype {
        ValueType::TinyInt | ValueType::SmallInt | ValueType::Integer | ValueType::BigInt => {
            let n = match raw.as_i64() {
                Some(n) => n,
                None => err_at!(DecodeFail, msg: "integral VALUE {:?}", raw)?,
            };
            Value::BigInt(n).cast_to(vtype)?
        }
        ValueType::Timestamp => match (raw.as_i64(), raw.as_str()) {
            (Some(n), _) => Value::Timestamp(n),
            (None, Some(s)) => Value::varchar(s).cast_to(ValueType::Timestamp)?,
            _ => err_at!(DecodeFail, msg: "timestamp VALUE {:?}", raw)?,
        },
        ValueType::Double => match raw.as_f64() {
            Some(f) => Value::Double(f),
            None => err_at!(DecodeFail, msg: "double VALUE {:?}", raw)?,
        },
        ValueType::Decimal => match (raw.as_str(), raw.as_f64()) {
            (Some(s), _) => Value::varchar(s).cast_to(ValueType::Decimal)?,
            (None, Some(f)) => Value::Double(f).cast_to(ValueType::Decimal)?,
            _ => err_at!(DecodeFail, msg: "decimal VALUE {:?}", raw)?,
        },
        ValueType::Boolean => match raw.as_bool() {
            Some(b) => Value::Boolean(b),
            None => err_at!(DecodeFail, msg: "boolean VALUE {:?}", raw)?,
        },
        ValueType::Varchar => match raw.as_str() {
            Some(s) => Value::varchar(s),
            None => err_at!(DecodeFail, msg: "varchar VALUE {:?}", raw)?,
        },
        // hex encoded
        ValueType::Varbinary => match raw.as_str() {
            Some(s) => Value::Varbinary(Rc::from(hex_decode(s)?.as_slice())),
            None => err_at!(DecodeFail, msg: "varbinary VALUE {:?}", raw)?,
        },
        ValueType::Point => match raw.as_array() {
            Some(pair) if pair.len() == 2 => {
                let lat = pair[0].as_f64();
                let lng = pair[1].as_f64();
                match (lat, lng) {
                    (Some(lat), Some(lng)) => Value::Point(value::GeoPoint { lat, lng }),
                    _ => err_at!(DecodeFail, msg: "point VALUE {:?}", raw)?,
                }
            }
            _ => err_at!(DecodeFail, msg: "point VALUE {:?}", raw)?,
        },
        _ => err_at!(DecodeFail, msg: "constant of type {}", vtype.to_name())?,
    };
    Ok(Expr::Constant(value))
}

fn hex_decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return err_at!(DecodeFail, msg: "odd hex literal length {}", s.len());
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for i in (0..bytes.len()).step_by(2) {
        let hi = (bytes[i] as char).to_digit(16);
        let lo = (bytes[i + 1] as char).to_digit(16);
        match (hi, lo) {
            (Some(hi), Some(lo)) => out.push(((hi << 4) | lo) as u8),
            _ => return err_at!(DecodeFail, msg: "bad hex literal '{}'", s),
        }
    }
    Ok(out)
}

fn subquery_id(obj: &serde_json::Map<String, Json>) -> Result<i32> {
    Ok(json_i64(obj, "SUBQUERY_ID")? as i32)
}

/// Recursively construct an expression from its JSON encoding.
pub fn expr_from_json(json: &Json) -> Result<Expr> {
    let obj = json_obj(json, "expression")?;
    let etype = json_str(obj, "TYPE")?;

    let expr = match etype {
        "VALUE_CONSTANT" => constant_from_json(obj)?,
        "VALUE_PARAMETER" => Expr::Parameter {
            idx: json_i64(obj, "PARAM_IDX")? as usize,
        },
        "VALUE_TUPLE" => Expr::TupleValue {
            side: opt_i64(obj, "TABLE_IDX").unwrap_or(0) as usize,
            col: json_i64(obj, "COLUMN_IDX")? as usize,
        },
        "VALUE_VECTOR" => Expr::Vector(args(obj)?),

        "OPERATOR_PLUS" => arith(obj, ArithOp::Plus)?,
        "OPERATOR_MINUS" => arith(obj, ArithOp::Minus)?,
        "OPERATOR_MULTIPLY" => arith(obj, ArithOp::Multiply)?,
        "OPERATOR_DIVIDE" => arith(obj, ArithOp::Divide)?,
        "OPERATOR_MOD" => arith(obj, ArithOp::Mod)?,
        "OPERATOR_CONCAT" => arith(obj, ArithOp::Concat)?,
        "OPERATOR_NOT" => Expr::Not(child(obj, "LEFT")?),
        "OPERATOR_IS_NULL" => Expr::IsNull(child(obj, "LEFT")?),
        "OPERATOR_UNARY_MINUS" => Expr::UnaryMinus(child(obj, "LEFT")?),
        "OPERATOR_CAST" => Expr::Cast {
            to: value_type_of(obj, "VALUE_TYPE")?,
            child: child(obj, "LEFT")?,
        },
        "OPERATOR_EXISTS" => {
            let sub = json_obj(
                obj.get("LEFT")
                    .map(Ok)
                    .unwrap_or_else(|| err_at!(DecodeFail, msg: "EXISTS without subquery"))?,
                "subquery",
            )?;
            Expr::Exists {
                node_id: subquery_id(sub)?,
            }
        }
        "OPERATOR_CASE_WHEN" => {
            let cond = child(obj, "LEFT")?;
            let alt = json_obj(
                obj.get("RIGHT")
                    .map(Ok)
                    .unwrap_or_else(|| err_at!(DecodeFail, msg: "CASE WHEN without alternative"))?,
                "alternative",
            )?;
            if json_str(alt, "TYPE")? != "OPERATOR_ALTERNATIVE" {
                return err_at!(DecodeFail, msg: "CASE WHEN wants OPERATOR_ALTERNATIVE");
            }
            Expr::CaseWhen {
                cond,
                then: child(alt, "LEFT")?,
                otherwise: child(alt, "RIGHT")?,
            }
        }

        "COMPARE_EQUAL" => cmp(obj, CmpOp::Eq)?,
        "COMPARE_NOT_EQUAL" | "COMPARE_NOTEQUAL" => cmp(obj, CmpOp::Ne)?,
        "COMPARE_LESSTHAN" => cmp(obj, CmpOp::Lt)?,
        "COMPARE_LESSTHANOREQUALTO" => cmp(obj, CmpOp::Le)?,
        "COMPARE_GREATERTHAN" => cmp(obj, CmpOp::Gt)?,
        "COMPARE_GREATERTHANOREQUALTO" => cmp(obj, CmpOp::Ge)?,
        "COMPARE_LIKE" => cmp(obj, CmpOp::Like)?,
        "COMPARE_STARTSWITH" => cmp(obj, CmpOp::StartsWith)?,
        "COMPARE_NOTDISTINCT" => cmp(obj, CmpOp::NotDistinct)?,
        "COMPARE_IN" => Expr::In {
            needle: child(obj, "LEFT")?,
            list: child(obj, "RIGHT")?,
        },

        "CONJUNCTION_AND" => Expr::Conjunction {
            and: true,
            left: child(obj, "LEFT")?,
            right: child(obj, "RIGHT")?,
        },
        "CONJUNCTION_OR" => Expr::Conjunction {
            and: false,
            left: child(obj, "LEFT")?,
            right: child(obj, "RIGHT")?,
        },

        "FUNCTION" => {
            let id = match opt_i64(obj, "FUNCTION_ID") {
                Some(id) => id as u32,
                None => fns::function_id(json_str(obj, "NAME")?)?,
            };
            Expr::Function {
                id,
                args: args(obj)?,
            }
        }

        "HASH_RANGE" => {
            let col = json_i64(obj, "HASH_COLUMN")? as usize;
            let raw = match obj.get("RANGES").and_then(|v| v.as_array()) {
                Some(raw) => raw,
                None => err_at!(DecodeFail, msg: "HASH_RANGE without RANGES")?,
            };
            let mut ranges = Vec::with_capacity(raw.len());
            for item in raw.iter() {
                let o = json_obj(item, "range")?;
                ranges.push((json_i64(o, "RANGE_START")?, json_i64(o, "RANGE_END")?));
            }
            ranges.sort_unstable();
            Expr::HashRange { col, ranges }
        }

        "SELECT_SUBQUERY" | "ROW_SUBQUERY" => Expr::Exists {
            node_id: subquery_id(obj)?,
        },
        "VALUE_SCALAR" => {
            let sub = json_obj(
                obj.get("LEFT")
                    .map(Ok)
                    .unwrap_or_else(|| err_at!(DecodeFail, msg: "VALUE_SCALAR without subquery"))?,
                "subquery",
            )?;
            Expr::ScalarSubquery {
                node_id: subquery_id(sub)?,
            }
        }

        _ => err_at!(DecodeFail, msg: "unknown expression type {}", etype)?,
    };
    Ok(expr)
}

fn arith(obj: &serde_json::Map<String, Json>, op: ArithOp) -> Result<Expr> {
    Ok(Expr::Arith {
        op,
        left: child(obj, "LEFT")?,
        right: child(obj, "RIGHT")?,
    })
}

fn cmp(obj: &serde_json::Map<String, Json>, op: CmpOp) -> Result<Expr> {
    Ok(Expr::Cmp {
        op,
        left: child(obj, "LEFT")?,
        right: child(obj, "RIGHT")?,
    })
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod parse_test;
