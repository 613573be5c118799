//! Sliding-window sum benchmarks: every supported strategy on a 512x512 image.
//! Run with: cargo bench -p lutvh --bench vhadd

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use lutvh::{Geometry, Strategy, VhAdd, VhAddMethod};
use strum::IntoEnumIterator;

const WIDTH: usize = 512;

fn make_source() -> Vec<u16> {
    (0..WIDTH * WIDTH).map(|i| (i & 0xFF) as u16).collect()
}

fn benchmark_passes(c: &mut Criterion) {
    let src = make_source();
    let mut engine = VhAdd::new(WIDTH, WIDTH);

    for (name, geometry) in [
        ("3x3", Geometry::new(-1, -1, 3, 3)),
        ("15x15", Geometry::new(-7, -7, 15, 15)),
        ("63x1", Geometry::new(0, 0, 63, 1)),
    ] {
        let mut group = c.benchmark_group(format!("vhadd_{name}"));
        group.throughput(Throughput::Elements(src.len() as u64));

        for method in VhAddMethod::iter().filter(|m| m.is_supported()) {
            group.bench_function(BenchmarkId::new("v", method), |b| {
                b.iter(|| {
                    engine
                        .calc_v_with(method, black_box(&src), &geometry)
                        .map(|r| black_box(r.data.len()))
                })
            });
            group.bench_function(BenchmarkId::new("h", method), |b| {
                b.iter(|| {
                    engine
                        .calc_h_with(method, black_box(&src), &geometry)
                        .map(|r| black_box(r.data.len()))
                })
            });
            group.bench_function(BenchmarkId::new("vh", method), |b| {
                b.iter(|| {
                    engine
                        .calc_vh_with(method, black_box(&src), &geometry)
                        .map(|(v, h)| black_box(v.data.len() + h.data.len()))
                })
            });
        }

        group.finish();
    }
}

criterion_group!(benches, benchmark_passes);
criterion_main!(benches);
