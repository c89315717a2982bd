/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use exi_codec::structs::bit_reader::BitReader;
use exi_codec::structs::bit_writer::BitWriter;
use exi_codec::structs::exi_value::{DateTimeKind, ExiDateTime, ExiDecimal, ExiFloat};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rstest::rstest;

use std::io::Cursor;

fn writer(aligned: bool) -> BitWriter<Vec<u8>> {
    let mut w = BitWriter::new(Vec::new());
    w.set_byte_aligned(aligned);
    w
}

fn reader(bytes: Vec<u8>, aligned: bool) -> BitReader<Cursor<Vec<u8>>> {
    let mut r = BitReader::new(Cursor::new(bytes));
    r.set_byte_aligned(aligned);
    r
}

#[rstest]
#[case::bit_packed(false)]
#[case::byte_aligned(true)]
fn n_bit_unsigned_integer_vectors(#[case] aligned: bool) {
    let mut w = writer(aligned);
    w.write_n_bits(17, 5).unwrap();
    let bytes = w.finish().unwrap();

    if aligned {
        // five bits become one little-endian byte
        assert_eq!(bytes, vec![0x11]);
    } else {
        // 10001 packed from the byte's MSB
        assert_eq!(bytes, vec![0b1000_1000]);
    }

    let mut r = reader(bytes, aligned);
    assert_eq!(r.read_n_bits(5).unwrap(), 17);
}

#[rstest]
#[case::bit_packed(false)]
#[case::byte_aligned(true)]
fn unsigned_integer_boundaries(#[case] aligned: bool) {
    let values = [0u64, 1, 127, 128, 16383, 16384, 1351980000, u32::MAX as u64, u64::MAX / 2];

    let mut w = writer(aligned);
    for &v in &values {
        w.write_unsigned_integer(v).unwrap();
    }
    let bytes = w.finish().unwrap();

    let mut r = reader(bytes, aligned);
    for &v in &values {
        assert_eq!(r.read_unsigned_integer().unwrap(), v);
    }
}

#[rstest]
#[case::bit_packed(false)]
#[case::byte_aligned(true)]
fn signed_integer_boundaries(#[case] aligned: bool) {
    let values = [0i64, 1, -1, 63, -64, 8191, -8192, i32::MAX as i64, i32::MIN as i64 + 1];

    let mut w = writer(aligned);
    for &v in &values {
        w.write_integer(v).unwrap();
    }
    let bytes = w.finish().unwrap();

    let mut r = reader(bytes, aligned);
    for &v in &values {
        assert_eq!(r.read_integer().unwrap(), v);
    }
}

#[rstest]
#[case::bit_packed(false)]
#[case::byte_aligned(true)]
fn string_code_points_round_trip(#[case] aligned: bool) {
    let samples = ["", "port", "größer", "日本語テキスト", "a\u{1F600}b"];

    let mut w = writer(aligned);
    for s in samples {
        w.write_string(s).unwrap();
    }
    let bytes = w.finish().unwrap();

    let mut r = reader(bytes, aligned);
    for s in samples {
        assert_eq!(r.read_string().unwrap(), s);
    }
}

#[rstest]
#[case::bit_packed(false)]
#[case::byte_aligned(true)]
fn float_specials_round_trip(#[case] aligned: bool) {
    let values = [
        ExiFloat { mantissa: 144, exponent: -2 },
        ExiFloat { mantissa: -5, exponent: 3 },
        ExiFloat::INFINITY,
        ExiFloat::NEG_INFINITY,
        ExiFloat::NAN,
    ];

    let mut w = writer(aligned);
    for v in &values {
        w.write_float(v).unwrap();
    }
    let bytes = w.finish().unwrap();

    let mut r = reader(bytes, aligned);
    for v in &values {
        let decoded = r.read_float().unwrap();
        assert_eq!(decoded, *v);
    }
    assert!(ExiFloat::NAN.to_f64().is_nan());
}

#[rstest]
#[case::bit_packed(false)]
#[case::byte_aligned(true)]
fn decimal_preserves_fraction_zeros(#[case] aligned: bool) {
    // ".070" style fractions survive through the reversed-digit form
    let d = ExiDecimal::from_parts(false, 5, "070");

    let mut w = writer(aligned);
    w.write_decimal(&d).unwrap();
    let bytes = w.finish().unwrap();

    let mut r = reader(bytes, aligned);
    let decoded = r.read_decimal().unwrap();
    assert_eq!(decoded, d);
    assert_eq!(decoded.fractional_reversed, 70);
}

#[rstest]
#[case::bit_packed(false)]
#[case::byte_aligned(true)]
fn date_time_fields_round_trip(#[case] aligned: bool) {
    let mut dt = ExiDateTime::new(DateTimeKind::DateTime);
    dt.year = 2012;
    dt.month = 11;
    dt.day = 3;
    dt.hour = 22;
    dt.minute = 0;
    dt.second = 0;
    dt.timezone_minutes = Some(60);

    let mut t = ExiDateTime::new(DateTimeKind::Time);
    t.hour = 13;
    t.minute = 37;
    t.second = 59;
    t.fractional_secs = Some(250);

    let mut gy = ExiDateTime::new(DateTimeKind::GYear);
    gy.year = 1969;

    let mut w = writer(aligned);
    w.write_date_time(&dt).unwrap();
    w.write_date_time(&t).unwrap();
    w.write_date_time(&gy).unwrap();
    let bytes = w.finish().unwrap();

    let mut r = reader(bytes, aligned);
    assert_eq!(r.read_date_time(DateTimeKind::DateTime).unwrap(), dt);
    assert_eq!(r.read_date_time(DateTimeKind::Time).unwrap(), t);
    assert_eq!(r.read_date_time(DateTimeKind::GYear).unwrap(), gy);
}

#[rstest]
#[case::bit_packed(false)]
#[case::byte_aligned(true)]
fn binary_round_trip(#[case] aligned: bool) {
    let payload = vec![0xA0u8, 0x30, 0x11, 0x4C, 0xC2];

    let mut w = writer(aligned);
    w.write_binary(&payload).unwrap();
    w.write_binary(&[]).unwrap();
    let bytes = w.finish().unwrap();

    let mut r = reader(bytes, aligned);
    assert_eq!(r.read_binary().unwrap(), payload);
    assert_eq!(r.read_binary().unwrap(), Vec::<u8>::new());
}

#[rstest]
#[case::bit_packed(false)]
#[case::byte_aligned(true)]
fn randomized_scalar_sweep(#[case] aligned: bool) {
    let mut rng = ChaCha8Rng::seed_from_u64(0x0EC1);

    let unsigned: Vec<u64> = (0..200).map(|_| rng.gen_range(0..=u64::from(u32::MAX))).collect();
    let signed: Vec<i64> = (0..200).map(|_| rng.gen_range(i32::MIN as i64..=i32::MAX as i64)).collect();
    let widths: Vec<(u8, u32)> = (0..200)
        .map(|_| {
            let n = rng.gen_range(1..=32u8);
            let max = if n == 32 { u32::MAX } else { (1u32 << n) - 1 };
            (n, rng.gen_range(0..=max))
        })
        .collect();

    let mut w = writer(aligned);
    for &v in &unsigned {
        w.write_unsigned_integer(v).unwrap();
    }
    for &v in &signed {
        w.write_integer(v).unwrap();
    }
    for &(n, v) in &widths {
        w.write_n_bits(v, n).unwrap();
    }
    let bytes = w.finish().unwrap();

    let mut r = reader(bytes, aligned);
    for &v in &unsigned {
        assert_eq!(r.read_unsigned_integer().unwrap(), v);
    }
    for &v in &signed {
        assert_eq!(r.read_integer().unwrap(), v);
    }
    for &(n, v) in &widths {
        assert_eq!(r.read_n_bits(n).unwrap(), v);
    }
}

#[test]
fn interleaved_bit_and_byte_fields_stay_in_sync() {
    // n-bit fields inside an otherwise octet-based sequence must not shift
    // the cursor in bit-packed mode
    let mut w = writer(false);
    w.write_bits(0b101, 3).unwrap();
    w.write_unsigned_integer(300).unwrap();
    w.write_bits(0b01, 2).unwrap();
    w.write_string("x").unwrap();
    let bytes = w.finish().unwrap();

    let mut r = reader(bytes, false);
    assert_eq!(r.read_bits(3).unwrap(), 0b101);
    assert_eq!(r.read_unsigned_integer().unwrap(), 300);
    assert_eq!(r.read_bits(2).unwrap(), 0b01);
    assert_eq!(r.read_string().unwrap(), "x");
}
