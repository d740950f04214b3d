use super::*;
use crate::value::Value;

#[test]
fn test_murmur3_reference() {
    // reference vectors for murmur3 x64_128, seed 0.
    let (h1, _) = murmur3_x64_128(b"", 0);
    assert_eq!(h1, 0);

    let (h1, h2) = murmur3_x64_128(b"hello", 0);
    assert_eq!(h1, 0xcbd8a7b341bd9b02);
    assert_eq!(h2, 0x5b1e906a48ae1d19);

    let (h1, h2) = murmur3_x64_128(b"hello, world", 0);
    assert_eq!(h1, 0x342fac623a5ebc8e);
    assert_eq!(h2, 0x4cdcbc079642414d);

    let (h1, h2) = murmur3_x64_128(b"The quick brown fox jumps over the lazy dog.", 0);
    assert_eq!(h1, 0xcd99481f9ee902c9);
    assert_eq!(h2, 0x695da1a38987b6e7);
}

#[test]
fn test_hashinator_stability() {
    let hh = Hashinator::new(0, 8);
    let v = Value::BigInt(12345);
    let p = hh.partition_for(&v);
    assert_eq!(p, hh.partition_for(&Value::BigInt(12345)));
    assert!(p >= 0 && p < 8);

    // integral widths hash identically.
    assert_eq!(p, hh.partition_for(&Value::Integer(12345)));
}

#[test]
fn test_single_partition_always_local() {
    let hh = Hashinator::new(0, 1);
    assert!(hh.is_local(&Value::BigInt(987)).unwrap());
}
