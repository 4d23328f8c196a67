//! Trie build and query benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusts_index::{TrieBuilder, TrieQuerier};

fn generate_keys(count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            format!(
                "{}-{}-{:05}",
                ["us-east", "us-west", "eu-central", "ap-south"][rng.gen_range(0..4)],
                ["web", "db", "cache"][rng.gen_range(0..3)],
                rng.gen_range(0..100_000)
            )
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("trie_build");

    for count in [1_000usize, 100_000].iter() {
        let keys = generate_keys(*count);
        let mut builder = TrieBuilder::new();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("add_marshal", count), &keys, |b, keys| {
            b.iter(|| {
                builder.reset();
                for (i, key) in keys.iter().enumerate() {
                    builder.add(key.as_bytes(), i);
                }
                black_box(builder.marshal_binary().unwrap().tree_len())
            });
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("trie_query");

    let keys = generate_keys(100_000);
    let mut builder = TrieBuilder::new();
    for (i, key) in keys.iter().enumerate() {
        builder.add(key.as_bytes(), i);
    }
    let tree = builder.marshal_binary().unwrap().tree_bytes().unwrap();
    let querier = TrieQuerier::new(&tree).unwrap();

    group.throughput(Throughput::Elements(1000));
    group.bench_function("equal", |b| {
        b.iter(|| {
            let mut found = 0;
            for key in keys.iter().take(1000) {
                found += querier.find_offsets_by_equal(black_box(key.as_bytes())).len();
            }
            black_box(found)
        });
    });

    group.throughput(Throughput::Elements(1));
    group.bench_function("like_prefix", |b| {
        b.iter(|| black_box(querier.find_offsets_by_like(black_box(b"eu-central-db-0")).len()));
    });

    group.throughput(Throughput::Elements(1000));
    group.bench_function("key_at", |b| {
        b.iter(|| {
            let mut total = 0;
            for offset in 0..1000 {
                total += querier.key_at(black_box(offset)).map_or(0, |k| k.len());
            }
            black_box(total)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_query);
criterion_main!(benches);
