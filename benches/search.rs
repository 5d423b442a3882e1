//! Graph search versus brute force on a seeded uniform set.

use criterion::{criterion_group, criterion_main, Criterion};

use prox::eval::generate_uniform;
use prox::{build_index, BruteSearch, IndexSearch, VectorStore};

fn bench_search(c: &mut Criterion) {
    let data = generate_uniform("bench", 2000, 16, 11).unwrap();
    let index = build_index(&data, 20).unwrap();
    let queries = generate_uniform("bench-queries", 64, 16, 12).unwrap();

    let mut group = c.benchmark_group("search");

    group.bench_function("graph_k10", |b| {
        let mut search = IndexSearch::new(&index, &data, 10, false).unwrap();
        let mut at = 0u32;
        b.iter(|| {
            let query = queries.vector(at % queries.len() as u32);
            at = at.wrapping_add(1);
            search.search(query).unwrap()
        });
    });

    group.bench_function("brute_k10", |b| {
        let mut brute = BruteSearch::new(&data, 10, false).unwrap();
        let mut at = 0u32;
        b.iter(|| {
            let query = queries.vector(at % queries.len() as u32);
            at = at.wrapping_add(1);
            brute.search(query).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
