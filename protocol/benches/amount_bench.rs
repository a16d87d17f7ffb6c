// Amount serializer and ciphertext codec benchmarks.
//
// Covers decimal parsing, display formatting, input sanitizing, and bundle
// framing at several batch sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use shroud_protocol::amount::{format_amount, parse_amount, sanitize_input, Amount};
use shroud_protocol::codec::{CiphertextBundle, CiphertextHandle, FheType, InputProof};

fn bench_parse(c: &mut Criterion) {
    c.bench_function("amount/parse", |b| {
        b.iter(|| parse_amount("18446744073709.551615").unwrap());
    });
}

fn bench_format(c: &mut Criterion) {
    let amount = Amount::from_raw(1_234_567_890);
    c.bench_function("amount/format", |b| {
        b.iter(|| format_amount(amount));
    });
}

fn bench_sanitize(c: &mut Criterion) {
    c.bench_function("amount/sanitize", |b| {
        b.iter(|| sanitize_input("  1,2a34.5.6789 "));
    });
}

fn bench_bundle_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/bundle_round_trip");
    for size in [1usize, 16, 256] {
        let handles = (0..size)
            .map(|i| {
                let mut digest = [0u8; 32];
                digest[..8].copy_from_slice(&(i as u64).to_be_bytes());
                CiphertextHandle::from_digest(&digest, FheType::Uint64)
            })
            .collect();
        let bundle = CiphertextBundle::new(handles, InputProof::new(vec![1; 33]).unwrap());

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bundle, |b, bundle| {
            b.iter(|| CiphertextBundle::decode(&bundle.encode().unwrap()).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_format, bench_sanitize, bench_bundle_codec);
criterion_main!(benches);
