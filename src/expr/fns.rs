//! Built-in SQL function dispatch, by function id.
//!
//! The id table is engine-defined; planners address functions through
//! [function_id]. Null arguments propagate as null results except where
//! SQL says otherwise.

use lazy_static::lazy_static;

use std::{collections::HashMap, rc::Rc};

use crate::{
    value::{Value, ValueType},
    Result,
};

lazy_static! {
    static ref FUNCTIONS: Vec<(u32, &'static str)> = vec![
        (1, "ABS"),
        (2, "CEILING"),
        (3, "FLOOR"),
        (4, "SQRT"),
        (5, "POWER"),
        (6, "MOD"),
        (7, "CHAR_LENGTH"),
        (8, "OCTET_LENGTH"),
        (9, "CONCAT"),
        (10, "SUBSTRING"),
        (11, "UPPER"),
        (12, "LOWER"),
    ];
    static ref BY_NAME: HashMap<&'static str, u32> =
        FUNCTIONS.iter().map(|(id, name)| (*name, *id)).collect();
    static ref BY_ID: HashMap<u32, &'static str> =
        FUNCTIONS.iter().map(|(id, name)| (*id, *name)).collect();
}

pub fn function_id(name: &str) -> Result<u32> {
    match BY_NAME.get(name.to_uppercase().as_str()) {
        Some(id) => Ok(*id),
        None => err_at!(DecodeFail, msg: "unknown function {}", name),
    }
}

pub fn function_name(id: u32) -> &'static str {
    BY_ID.get(&id).copied().unwrap_or("UNKNOWN")
}

fn arity(id: u32, args: &[Value], want: usize) -> Result<()> {
    if args.len() != want {
        err_at!(
            InvalidInput,
            msg: "{} takes {} arguments, got {}", function_name(id), want, args.len()
        )
    } else {
        Ok(())
    }
}

pub fn eval_function(id: u32, args: &[Value]) -> Result<Value> {
    match id {
        1 => {
            arity(id, args, 1)?;
            match &args[0] {
                Value::Null(t) => Ok(Value::Null(*t)),
                Value::Double(f) => Ok(Value::Double(f.abs())),
                Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
                v => match v.as_bigint()?.checked_abs() {
                    Some(n) => Ok(Value::BigInt(n)),
                    None => err_at!(Overflow, msg: "ABS"),
                },
            }
        }
        2 | 3 => {
            arity(id, args, 1)?;
            let ceiling = id == 2;
            match &args[0] {
                Value::Null(t) => Ok(Value::Null(*t)),
                Value::Double(f) => Ok(Value::Double(if ceiling { f.ceil() } else { f.floor() })),
                Value::Decimal(d) => {
                    let one = crate::value::DECIMAL_ONE;
                    let whole = match ceiling {
                        true => d.div_euclid(one) + (d.rem_euclid(one) != 0) as i128,
                        false => d.div_euclid(one),
                    };
                    Ok(Value::Decimal(whole * one))
                }
                v => Ok(Value::BigInt(v.as_bigint()?)),
            }
        }
        4 => {
            arity(id, args, 1)?;
            if args[0].is_null() {
                return Ok(Value::Null(ValueType::Double));
            }
            let f = args[0].as_double()?;
            if f < 0.0 {
                return err_at!(InvalidInput, msg: "SQRT of negative value");
            }
            Ok(Value::Double(f.sqrt()))
        }
        5 => {
            arity(id, args, 2)?;
            if args[0].is_null() || args[1].is_null() {
                return Ok(Value::Null(ValueType::Double));
            }
            let f = args[0].as_double()?.powf(args[1].as_double()?);
            if f.is_finite() {
                Ok(Value::Double(f))
            } else {
                err_at!(Overflow, msg: "POWER")
            }
        }
        6 => {
            arity(id, args, 2)?;
            args[0].modulo(&args[1])
        }
        7 => {
            arity(id, args, 1)?;
            match &args[0] {
                Value::Null(_) => Ok(Value::Null(ValueType::BigInt)),
                v => Ok(Value::BigInt(v.as_str()?.chars().count() as i64)),
            }
        }
        8 => {
            arity(id, args, 1)?;
            match &args[0] {
                Value::Null(_) => Ok(Value::Null(ValueType::BigInt)),
                v => Ok(Value::BigInt(v.as_bytes()?.len() as i64)),
            }
        }
        9 => {
            // CONCAT is variadic; null arguments render as nothing.
            let mut s = String::new();
            for arg in args.iter() {
                if !arg.is_null() {
                    s.push_str(arg.as_str()?);
                }
            }
            Ok(Value::Varchar(Rc::from(s.as_str())))
        }
        10 => {
            if args.len() != 2 && args.len() != 3 {
                return err_at!(InvalidInput, msg: "SUBSTRING takes 2 or 3 arguments");
            }
            if args.iter().any(|a| a.is_null()) {
                return Ok(Value::Null(ValueType::Varchar));
            }
            let s = args[0].as_str()?;
            // SQL positions are 1-based.
            let start = (args[1].as_bigint()?.max(1) - 1) as usize;
            let taken: String = match args.len() {
                3 => {
                    let n = args[2].as_bigint()?.max(0) as usize;
                    s.chars().skip(start).take(n).collect()
                }
                _ => s.chars().skip(start).collect(),
            };
            Ok(Value::Varchar(Rc::from(taken.as_str())))
        }
        11 => {
            arity(id, args, 1)?;
            match &args[0] {
                Value::Null(_) => Ok(Value::Null(ValueType::Varchar)),
                v => Ok(Value::Varchar(Rc::from(v.as_str()?.to_uppercase().as_str()))),
            }
        }
        12 => {
            arity(id, args, 1)?;
            match &args[0] {
                Value::Null(_) => Ok(Value::Null(ValueType::Varchar)),
                v => Ok(Value::Varchar(Rc::from(v.as_str()?.to_lowercase().as_str()))),
            }
        }
        _ => err_at!(InvalidInput, msg: "unknown function id {}", id),
    }
}

#[cfg(test)]
#[path = "fns_test.rs"]
mod fns_test;
