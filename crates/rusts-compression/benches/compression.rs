//! Rank/select and block compression benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rusts_compression::{BitVector, BitVectorView, BlockCompressor, RankSelect};

fn build_vector(size: usize) -> BitVector {
    let mut bv = BitVector::with_capacity(size);
    for i in 0..size {
        bv.push_back(i % 3 == 0 || i % 11 == 0);
    }
    bv
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");

    for size in [10_000usize, 1_000_000].iter() {
        let bv = build_vector(*size);
        let bytes = bv.marshal_binary().unwrap();
        let view = BitVectorView::new(&bytes).unwrap();

        group.throughput(Throughput::Elements(1000));
        group.bench_function(format!("view_rank_{}", size), |b| {
            b.iter(|| {
                let mut acc = 0;
                for i in 0..1000 {
                    acc += view.rank(black_box(i * (size / 1000)), true);
                }
                black_box(acc)
            });
        });
    }

    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    for size in [10_000usize, 1_000_000].iter() {
        let bv = build_vector(*size);
        let ones = bv.count(true);

        group.throughput(Throughput::Elements(1000));
        group.bench_function(format!("select1_{}", size), |b| {
            b.iter(|| {
                let mut acc = 0;
                for i in 0..1000 {
                    acc += bv.select(black_box(i * (ones / 1000)), true);
                }
                black_box(acc)
            });
        });
        group.bench_function(format!("select0_{}", size), |b| {
            let zeros = bv.count(false);
            b.iter(|| {
                let mut acc = 0;
                for i in 0..1000 {
                    acc += bv.select(black_box(i * (zeros / 1000)), false);
                }
                black_box(acc)
            });
        });
    }

    group.finish();
}

fn bench_snappy(c: &mut Criterion) {
    let mut group = c.benchmark_group("snappy_group");

    let mut group_bytes = Vec::new();
    for i in 0..256 {
        let value = format!("host-{:05}.us-east-1.compute.internal", i);
        group_bytes.push(value.len() as u8);
        group_bytes.extend_from_slice(value.as_bytes());
    }

    let mut compressor = BlockCompressor::new();
    let compressed = compressor.compress(&group_bytes).unwrap();

    group.throughput(Throughput::Bytes(group_bytes.len() as u64));
    group.bench_function("compress", |b| {
        let mut compressor = BlockCompressor::new();
        b.iter(|| black_box(compressor.compress(black_box(&group_bytes)).unwrap()));
    });
    group.bench_function("decompress_into", |b| {
        let mut compressor = BlockCompressor::new();
        let mut scratch = Vec::new();
        b.iter(|| {
            compressor
                .decompress_into(black_box(&compressed), &mut scratch)
                .unwrap();
            black_box(scratch.len())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_rank, bench_select, bench_snappy);
criterion_main!(benches);
