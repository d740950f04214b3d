use super::*;

#[test]
fn test_value_type_codes() {
    let types = [
        ValueType::Invalid,
        ValueType::Null,
        ValueType::TinyInt,
        ValueType::SmallInt,
        ValueType::Integer,
        ValueType::BigInt,
        ValueType::Double,
        ValueType::Varchar,
        ValueType::Address,
        ValueType::Timestamp,
        ValueType::Decimal,
        ValueType::Boolean,
        ValueType::Varbinary,
        ValueType::Point,
        ValueType::Polygon,
        ValueType::Array,
    ];
    for t in types.iter() {
        assert_eq!(ValueType::from_wire(t.to_wire()).unwrap(), *t);
        assert_eq!(ValueType::from_name(t.to_name()).unwrap(), *t);
    }
    assert!(ValueType::from_wire(99).is_err());
    assert!(ValueType::from_name("BLOB").is_err());
}

#[test]
fn test_null_carries_type() {
    let v = Value::Null(ValueType::Integer);
    assert!(v.is_null());
    assert_eq!(v.vtype(), ValueType::Integer);
    assert!(!v.is_true());
}

#[test]
fn test_widening_accessors() {
    assert_eq!(Value::TinyInt(7).as_bigint().unwrap(), 7);
    assert_eq!(Value::SmallInt(-300).as_bigint().unwrap(), -300);
    assert_eq!(Value::Integer(1 << 20).as_double().unwrap(), 1048576.0);
    assert_eq!(
        Value::BigInt(2).as_decimal().unwrap(),
        2_000_000_000_000_i128
    );
    assert!(Value::varchar("x").as_bigint().is_err());
}

#[test]
fn test_integral_hash_eq_across_widths() {
    assert_eq!(Value::TinyInt(5), Value::BigInt(5));
    assert_eq!(Value::TinyInt(5).hash64(), Value::BigInt(5).hash64());
    assert_ne!(Value::TinyInt(5), Value::BigInt(6));

    // nulls compare equal for de-duplication purposes.
    assert_eq!(
        Value::Null(ValueType::Integer),
        Value::Null(ValueType::BigInt)
    );
}

#[test]
fn test_distinct_set_semantics() {
    use std::collections::HashSet;

    let mut seen: HashSet<Value> = HashSet::new();
    assert!(seen.insert(Value::Integer(1)));
    assert!(!seen.insert(Value::Integer(1)));
    assert!(seen.insert(Value::Integer(2)));
    assert!(seen.insert(Value::varchar("a")));
    assert!(!seen.insert(Value::varchar("a")));
    assert_eq!(seen.len(), 3);
}

#[test]
fn test_display() {
    assert_eq!(format!("{}", Value::Null(ValueType::BigInt)), "NULL");
    assert_eq!(format!("{}", Value::BigInt(-42)), "-42");
    assert_eq!(format!("{}", Value::varchar("ab")), "ab");
    assert_eq!(format!("{}", Value::varbinary(&[0xDE, 0xAD])), "DEAD");
    assert_eq!(
        format!("{}", Value::Decimal(1_500_000_000_000)),
        "1.500000000000"
    );
}
