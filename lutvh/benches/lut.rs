//! Remap benchmarks: every supported strategy on a 512x512 sample buffer.
//! Run with: cargo bench -p lutvh --bench lut

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use lutvh::{Lut, LutMethod, Strategy};
use strum::IntoEnumIterator;

const WIDTH: usize = 512;
const WINDOW: (i32, i32) = (0, 255);

/// Source buffer `source[i] = i mod 65536`.
fn make_source() -> Vec<u16> {
    (0..WIDTH * WIDTH).map(|i| (i & 0xFFFF) as u16).collect()
}

fn benchmark_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("lut_create");
    group.throughput(Throughput::Elements(lutvh::LUT_SIZE as u64));
    let mut lut = Lut::new();

    for method in LutMethod::iter().filter(|m| m.supports_create() && m.is_supported()) {
        group.bench_function(BenchmarkId::from_parameter(method), |b| {
            b.iter(|| lut.create_with(method, black_box(WINDOW.0), black_box(WINDOW.1)))
        });
    }

    group.finish();
}

fn benchmark_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("lut_convert");
    let src = make_source();
    let mut dst = vec![0u8; src.len()];
    group.throughput(Throughput::Elements(src.len() as u64));

    let mut lut = Lut::new();
    if let Err(err) = lut.create(WINDOW.0, WINDOW.1) {
        panic!("Failed to create window {WINDOW:?}: {err}");
    }

    for method in LutMethod::iter().filter(|m| m.is_supported()) {
        group.bench_function(BenchmarkId::from_parameter(method), |b| {
            b.iter(|| lut.convert_with(method, black_box(&src), black_box(&mut dst)))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_create, benchmark_convert);
criterion_main!(benches);
