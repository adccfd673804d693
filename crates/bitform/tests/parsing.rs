//! Parsing, layout and round-trip behavior over whole specs.

use bitform::{
    Endianness, Error, Options, Spec, Value, array, bit, boolean, field, field_with, int8, int64,
    intx, nibble, options, padding, parse, parse_reader, semi_nibble, string, substruct, uint8,
    uint16, uint32, uint64, unnamed, write,
};
use hex_literal::hex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn flags_and_ints_spec() -> Spec {
    vec![
        options(Options::new().endianness(Endianness::Big)),
        field("flag_one", boolean()),
        field("flag_two", boolean()),
        field("flag_three", boolean()),
        field("flag_four", boolean()),
        field("first", uint8()),
        unnamed(padding(2)),
        unnamed(padding(2)),
        field("blah", uint16()),
        field("second", int64()),
        field("third", uint64()),
        field("fourth", int8()),
    ]
}

fn nested_array_spec() -> Spec {
    vec![
        options(Options::new().endianness(Endianness::Big)),
        field("first", uint8()),
        field("matrix", array(3, array(3, uint8()))),
        field("last", uint8()),
    ]
}

fn deeply_nested_spec() -> Spec {
    vec![
        options(Options::new().endianness(Endianness::Big)),
        field("ubermatrix", array(3, nested_array_spec())),
        substruct(
            "dummy",
            vec![field("length", uint8()), field("ok", boolean())],
        ),
    ]
}

#[test]
fn flags_and_ints_big_endian() {
    let data = hex!("af b0 dd dd ff ff ff ff ff ff ff c7 00 00 00 00 00 00 00 5a 00");
    let form = parse(data, &flags_and_ints_spec()).unwrap();

    let offsets = form.offsets().unwrap();
    assert_eq!(offsets["flag_one"], 0);
    assert_eq!(offsets["flag_two"], 1);
    assert_eq!(offsets["flag_three"], 2);
    assert_eq!(offsets["flag_four"], 3);
    assert_eq!(offsets["first"], 4);
    assert_eq!(offsets["blah"], 16);
    assert_eq!(offsets["second"], 32);
    assert_eq!(offsets["third"], 96);
    assert_eq!(offsets["fourth"], 160);

    assert_eq!(form.bit_len().unwrap(), 168);

    assert!(form.get_bool("flag_one").unwrap());
    assert!(!form.get_bool("flag_two").unwrap());
    assert!(form.get_bool("flag_three").unwrap());
    assert!(!form.get_bool("flag_four").unwrap());
    assert_eq!(form.get_int("first").unwrap(), 0xfb);
    assert_eq!(form.get_int("blah").unwrap(), 0xdddd);
    assert_eq!(form.get_int("second").unwrap(), -57);
    assert_eq!(form.get_int("third").unwrap(), 90);
    assert_eq!(form.get_int("fourth").unwrap(), 0);

    assert_eq!(write(&form).unwrap(), data);

    let json = serde_json::from_str::<serde_json::Value>(&form.as_json().unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "flag_one": true,
            "flag_two": false,
            "flag_three": true,
            "flag_four": false,
            "first": 0xfb,
            "blah": 0xdddd,
            "second": -57,
            "third": 90,
            "fourth": 0,
        })
    );
}

#[test]
fn bit_flag_array() {
    let spec = vec![
        options(Options::new().endianness(Endianness::Big)),
        field("first", uint8()),
        field("flags", array(8, boolean())),
        field("last", uint8()),
    ];
    let data = hex!("ff 95 11");
    let form = parse(data, &spec).unwrap();

    let offsets = form.offsets().unwrap();
    assert_eq!(offsets["first"], 0);
    assert_eq!(offsets["flags"], 8);
    assert_eq!(offsets["last"], 16);
    assert_eq!(form.bit_len().unwrap(), 24);

    assert_eq!(
        form.get("flags").unwrap(),
        Value::from(vec![true, false, false, true, false, true, false, true])
    );

    assert_eq!(write(&form).unwrap(), data);
}

#[test]
fn non_power_of_eight_widths() {
    let spec = vec![
        field("unsigned_10b", intx(10, false)),
        field("unsigned_14b", intx(14, false)),
        field("signed_20b", intx(20, true)),
        field("signed_4b", intx(4, true)),
    ];
    let data = hex!("d5 ea 35 d5 ea 35");
    let form = parse(data, &spec).unwrap();

    assert_eq!(form.get_int("unsigned_10b").unwrap(), 0b11_0101_0111);
    assert_eq!(form.get_int("unsigned_14b").unwrap(), 0b10_1010_0011_0101);
    assert_eq!(form.get_int("signed_20b").unwrap(), -0b10_1010_0001_0101_1101);
    assert_eq!(form.get_int("signed_4b").unwrap(), 0b0101);

    assert_eq!(write(&form).unwrap(), data);
}

#[test]
fn wider_than_sixty_four_bit_fields() {
    let spec = vec![
        options(Options::new().endianness(Endianness::Big)),
        field("id", intx(96, false)),
    ];
    let data = hex!("00 01 02 03 04 05 06 07 08 09 0a 0b");
    let form = parse(data, &spec).unwrap();

    assert_eq!(
        form.get_int("id").unwrap(),
        0x0001_0203_0405_0607_0809_0a0b
    );
    assert_eq!(write(&form).unwrap(), data);
}

#[test]
fn endianness_is_per_field() {
    let spec = vec![
        field_with(
            "big_endian",
            uint32(),
            Options::new().endianness(Endianness::Big),
        ),
        field_with(
            "little_endian",
            uint32(),
            Options::new().endianness(Endianness::Little),
        ),
        field("default_endian", uint32()),
    ];
    let data = hex!("01020304 01020304 01020304");
    let form = parse(data, &spec).unwrap();

    assert_eq!(form.get_int("big_endian").unwrap(), 0x0102_0304);
    assert_eq!(form.get_int("little_endian").unwrap(), 0x0403_0201);
    assert_eq!(
        form.get_int("default_endian").unwrap(),
        form.get_int("little_endian").unwrap()
    );

    assert_eq!(write(&form).unwrap(), data);
}

#[test]
fn sub_byte_integer_fields() {
    let spec = vec![
        field("bit_0", bit()),
        field("bit_1", bit()),
        field("semi_nibble", semi_nibble()),
        field("nibble", nibble()),
    ];
    let data = [0b1011_0010];
    let form = parse(data, &spec).unwrap();

    assert_eq!(form.get_int("bit_0").unwrap(), 1);
    assert_eq!(form.get_int("bit_1").unwrap(), 0);
    assert_eq!(form.get_int("semi_nibble").unwrap(), 0b11);
    assert_eq!(form.get_int("nibble").unwrap(), 0b0010);

    assert_eq!(write(&form).unwrap(), data);
}

#[test]
fn nested_arrays() {
    let data = [42, 0, 1, 2, 3, 4, 5, 6, 7, 8, 0xdb];
    let form = parse(data, &nested_array_spec()).unwrap();

    let offsets = form.offsets().unwrap();
    assert_eq!(offsets["first"], 0);
    assert_eq!(offsets["matrix"], 8);
    assert_eq!(offsets["last"], 80);
    assert_eq!(form.bit_len().unwrap(), 88);

    assert_eq!(form.get_int("first").unwrap(), 42);
    let matrix = form.child("matrix").unwrap();
    for index in 0..9 {
        assert_eq!(
            matrix
                .at(index / 3)
                .unwrap()
                .at(index % 3)
                .unwrap()
                .get()
                .unwrap(),
            Value::from(index as u8)
        );
    }
    assert_eq!(form.get_int("last").unwrap(), 0xdb);

    assert_eq!(write(&form).unwrap(), data);

    let json = serde_json::from_str::<serde_json::Value>(&form.as_json().unwrap()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "first": 42,
            "matrix": [[0, 1, 2], [3, 4, 5], [6, 7, 8]],
            "last": 0xdb,
        })
    );
}

#[test]
fn deeply_nested_structures() {
    let data = (0..36).collect::<Vec<u8>>();
    let form = parse(&data, &deeply_nested_spec()).unwrap();

    let offsets = form.offsets().unwrap();
    assert_eq!(offsets["ubermatrix"], 0);
    assert_eq!(offsets["dummy"], 264);
    assert_eq!(form.bit_len().unwrap(), 273);

    let ubermatrix = form.child("ubermatrix").unwrap();
    assert_eq!(ubermatrix.item_count().unwrap(), 3);

    let mut current_byte = 0_u8;
    for entry in ubermatrix.iter().unwrap() {
        assert_eq!(entry.child("first").unwrap().get().unwrap(), Value::from(current_byte));
        current_byte += 1;

        for row in 0..3_usize {
            for column in 0..3_usize {
                assert_eq!(
                    entry
                        .child("matrix")
                        .unwrap()
                        .at(row)
                        .unwrap()
                        .at(column)
                        .unwrap()
                        .get()
                        .unwrap(),
                    Value::from(current_byte + (row * 3 + column) as u8)
                );
            }
        }
        current_byte += 9;

        assert_eq!(entry.child("last").unwrap().get().unwrap(), Value::from(current_byte));
        current_byte += 1;
    }

    let dummy = form.child("dummy").unwrap();
    assert_eq!(dummy.child("length").unwrap().get().unwrap(), Value::from(current_byte));
    assert!(!dummy
        .child("ok")
        .unwrap()
        .get()
        .unwrap()
        .as_bool()
        .unwrap());

    // 273 bits round up to 35 bytes; the final byte keeps one data bit and zero-fills the rest
    let mut expected = (0..34).collect::<Vec<u8>>();
    expected.push(0);
    assert_eq!(write(&form).unwrap(), expected);
}

#[test]
fn strings_decode_in_declared_encoding() {
    let spec = vec![field("msg", string(5))];
    let data = *b"hello";
    let form = parse(data, &spec).unwrap();

    assert_eq!(form.get_str("msg").unwrap(), "hello");
    assert_eq!(write(&form).unwrap(), data);
}

#[test]
fn underflow_is_rejected() {
    let spec = vec![field("length", uint8()), field("ok", boolean())];
    assert!(matches!(
        parse([0x01], &spec),
        Err(Error::Underflow {
            expected_bits: 9,
            actual_bits: 8,
        })
    ));
}

#[test]
fn unknown_fields_are_rejected() {
    let spec = vec![field("length", uint8())];
    let form = parse([0x01], &spec).unwrap();
    assert!(matches!(
        form.get("width"),
        Err(Error::NoSuchField { name }) if name == "width"
    ));
}

#[test]
fn parsed_forms_share_no_state() {
    let spec = flags_and_ints_spec();
    let data_one = hex!("af b3 dd dd ff ff ff ff ff ff ff c7 00 00 00 00 00 00 00 5a 00");
    let data_two = hex!("1d e0 fa fe 00 00 00 00 00 00 00 18 00 00 00 00 00 0f 42 3f 01");

    let one = parse(data_one, &spec).unwrap();
    let mut two = parse(data_two, &spec).unwrap();

    assert_eq!(two.offsets().unwrap(), one.offsets().unwrap());
    assert!(!two.get_bool("flag_one").unwrap());
    assert_eq!(two.get_int("first").unwrap(), 0xde);
    assert_eq!(two.get_int("blah").unwrap(), 0xfafe);
    assert_eq!(two.get_int("second").unwrap(), 24);
    assert_eq!(two.get_int("third").unwrap(), 999_999);
    assert_eq!(two.get_int("fourth").unwrap(), 1);

    two.set("first", 0x11).unwrap();
    two.set("flag_one", true).unwrap();

    // The other instance is untouched
    assert!(one.get_bool("flag_one").unwrap());
    assert_eq!(one.get_int("first").unwrap(), 0xfb);
    assert_eq!(write(&one).unwrap(), data_one);
}

#[test]
fn readers_parse_like_byte_slices() {
    let spec = vec![field("length", uint8()), field("ok", boolean())];
    let data = [0x21, 0x80];
    let from_reader = parse_reader(std::io::Cursor::new(data), &spec).unwrap();
    let from_bytes = parse(data, &spec).unwrap();
    assert_eq!(from_reader, from_bytes);
}

#[test]
fn random_buffers_roundtrip_bit_exactly() {
    let mut rng = StdRng::seed_from_u64(0x00b1_7f08);
    let specs = [flags_and_ints_spec(), nested_array_spec()];

    for spec in &specs {
        for _ in 0..64 {
            let probe = parse(vec![0; 64], spec).unwrap();
            let byte_len = probe.bit_len().unwrap().div_ceil(8);

            let mut data = vec![0_u8; byte_len];
            rng.fill_bytes(&mut data);

            let form = parse(&data, spec).unwrap();
            assert_eq!(write(&form).unwrap(), data);
        }
    }
}
