use bitform::{
    Endianness, Options, Spec, boolean, field, int8, int64, options, padding, parse, uint8,
    uint16, uint64, unnamed, write,
};
use criterion::{Criterion, criterion_group, criterion_main};
use hex_literal::hex;
use std::hint::black_box;

fn header_spec() -> Spec {
    vec![
        options(Options::new().endianness(Endianness::Big)),
        field("flag_one", boolean()),
        field("flag_two", boolean()),
        field("flag_three", boolean()),
        field("flag_four", boolean()),
        field("first", uint8()),
        unnamed(padding(4)),
        field("blah", uint16()),
        field("second", int64()),
        field("third", uint64()),
        field("fourth", int8()),
    ]
}

fn criterion_benchmark(c: &mut Criterion) {
    let spec = header_spec();
    let data = hex!("af b0 dd dd ff ff ff ff ff ff ff c7 00 00 00 00 00 00 00 5a 00");

    c.bench_function("parse", |b| {
        b.iter(|| parse(black_box(&data[..]), &spec).unwrap());
    });

    c.bench_function("decode", |b| {
        b.iter(|| {
            let form = parse(black_box(&data[..]), &spec).unwrap();
            black_box(form.get_int("second").unwrap());
        });
    });

    let form = parse(data, &spec).unwrap();
    c.bench_function("write", |b| {
        b.iter(|| black_box(write(&form).unwrap()));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
