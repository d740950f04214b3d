use std::rc::Rc;

use super::*;

fn sample_values() -> Vec<(ValueType, Value)> {
    vec![
        (ValueType::TinyInt, Value::TinyInt(-5)),
        (ValueType::SmallInt, Value::SmallInt(1000)),
        (ValueType::Integer, Value::Integer(-70_000)),
        (ValueType::BigInt, Value::BigInt(1 << 40)),
        (ValueType::Timestamp, Value::Timestamp(1_700_000_000_000_000)),
        (ValueType::Double, Value::Double(-2.75)),
        (ValueType::Decimal, Value::Decimal(1_234_567_890_123)),
        (ValueType::Boolean, Value::Boolean(true)),
        (ValueType::Varchar, Value::varchar("wire")),
        (ValueType::Varbinary, Value::varbinary(&[9, 8, 7])),
        (
            ValueType::Point,
            Value::Point(GeoPoint { lat: 1.5, lng: -2.5 }),
        ),
        (
            ValueType::Polygon,
            Value::Polygon(Rc::new(GeoPolygon {
                rings: vec![vec![
                    GeoPoint { lat: 0.0, lng: 0.0 },
                    GeoPoint { lat: 0.0, lng: 1.0 },
                    GeoPoint { lat: 1.0, lng: 0.0 },
                ]],
            })),
        ),
    ]
}

#[test]
fn test_value_round_trip_be() {
    for (vtype, value) in sample_values() {
        let mut buf = vec![];
        write_value_be(&mut buf, vtype, &value).unwrap();
        let mut off = 0;
        let back = read_value_be(&buf, &mut off, vtype).unwrap();
        assert_eq!(off, buf.len(), "{:?}", vtype);
        assert_eq!(back, value, "{:?}", vtype);
    }
}

#[test]
fn test_value_round_trip_le() {
    for (vtype, value) in sample_values() {
        let mut buf = vec![];
        write_value_le(&mut buf, vtype, &value).unwrap();
        let mut off = 0;
        let back = read_value_le(&buf, &mut off, vtype).unwrap();
        assert_eq!(off, buf.len(), "{:?}", vtype);
        assert_eq!(back, value, "{:?}", vtype);
    }
}

#[test]
fn test_null_round_trip() {
    for (vtype, _) in sample_values() {
        let mut buf = vec![];
        write_value_be(&mut buf, vtype, &Value::Null(vtype)).unwrap();
        let mut off = 0;
        let back = read_value_be(&buf, &mut off, vtype).unwrap();
        assert!(back.is_null(), "{:?}", vtype);
        assert_eq!(back.vtype(), vtype);
    }
}

#[test]
fn test_fixed_width_sizes() {
    for (vtype, value) in sample_values() {
        if let Some(width) = vtype.fixed_width() {
            let mut buf = vec![];
            write_value_be(&mut buf, vtype, &value).unwrap();
            assert_eq!(buf.len(), width, "{:?}", vtype);
        }
    }
}

#[test]
fn test_varchar_endianness_of_prefix() {
    let mut be = vec![];
    write_value_be(&mut be, ValueType::Varchar, &Value::varchar("ab")).unwrap();
    assert_eq!(&be, &[0, 0, 0, 2, b'a', b'b']);

    let mut le = vec![];
    write_value_le(&mut le, ValueType::Varchar, &Value::varchar("ab")).unwrap();
    assert_eq!(&le, &[2, 0, 0, 0, b'a', b'b']);
}

#[test]
fn test_truncated_input() {
    let mut buf = vec![];
    write_value_be(&mut buf, ValueType::Varchar, &Value::varchar("hello")).unwrap();
    buf.truncate(buf.len() - 1);
    let mut off = 0;
    assert!(read_value_be(&buf, &mut off, ValueType::Varchar).is_err());
}

#[test]
fn test_equality_includes_polygon_geometry() {
    let a = Value::Polygon(Rc::new(GeoPolygon {
        rings: vec![vec![GeoPoint { lat: 0.0, lng: 0.0 }]],
    }));
    let b = Value::Polygon(Rc::new(GeoPolygon {
        rings: vec![vec![GeoPoint { lat: 0.0, lng: 1.0 }]],
    }));
    assert_ne!(a, b);
}
