use super::*;

#[test]
fn test_codec_round_trip() {
    let mut buf: Vec<u8> = vec![];
    write_u8(&mut buf, 0xAB);
    write_i16_be(&mut buf, -2);
    write_i32_be(&mut buf, 7_000_000);
    write_i64_be(&mut buf, -9_000_000_000);
    write_f64_be(&mut buf, 3.25);
    write_i128_be(&mut buf, -1);
    write_i32_le(&mut buf, 42);
    write_i64_le(&mut buf, i64::MIN);

    let mut off = 0;
    assert_eq!(read_u8(&buf, &mut off).unwrap(), 0xAB);
    assert_eq!(read_i16_be(&buf, &mut off).unwrap(), -2);
    assert_eq!(read_i32_be(&buf, &mut off).unwrap(), 7_000_000);
    assert_eq!(read_i64_be(&buf, &mut off).unwrap(), -9_000_000_000);
    assert_eq!(read_f64_be(&buf, &mut off).unwrap(), 3.25);
    assert_eq!(read_i128_be(&buf, &mut off).unwrap(), -1);
    assert_eq!(read_i32_le(&buf, &mut off).unwrap(), 42);
    assert_eq!(read_i64_le(&buf, &mut off).unwrap(), i64::MIN);
    assert_eq!(off, buf.len());
}

#[test]
fn test_codec_underrun() {
    let buf = vec![0_u8; 3];
    let mut off = 0;
    assert!(read_i32_be(&buf, &mut off).is_err());
    assert_eq!(off, 0);

    let mut off = 1;
    assert!(read_i16_be(&buf, &mut off).is_ok());
    assert!(read_u8(&buf, &mut off).is_err());
}

#[test]
fn test_align8() {
    assert_eq!(align8(0), 0);
    assert_eq!(align8(1), 8);
    assert_eq!(align8(8), 8);
    assert_eq!(align8(9), 16);
    assert_eq!(align8(255), 256);
}
