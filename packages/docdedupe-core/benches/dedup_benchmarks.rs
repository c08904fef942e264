//! Hot-path benchmarks: shingling, signature computation, Jaccard
//! estimation and LSH candidate retrieval.
//!
//! Run with `cargo bench -p docdedupe-core`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use docdedupe_core::features::dedup::domain::shingler::shingles;
use docdedupe_core::features::dedup::infrastructure::lsh::{LshIndex, MinHashSignature};

fn corpus_text(words: usize) -> String {
    (0..words)
        .map(|i| format!("word{}", i % 997))
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_shingling(c: &mut Criterion) {
    let mut group = c.benchmark_group("shingles");
    for &words in &[200usize, 2_000, 20_000] {
        let text = corpus_text(words);
        group.bench_with_input(BenchmarkId::from_parameter(words), &text, |b, text| {
            b.iter(|| shingles(black_box(text), 3, 20));
        });
    }
    group.finish();
}

fn bench_minhash(c: &mut Criterion) {
    let mut group = c.benchmark_group("minhash_signature");
    let text = corpus_text(2_000);
    let set = shingles(&text, 3, 20).unwrap();
    for &permutations in &[128usize, 192, 512] {
        group.bench_with_input(
            BenchmarkId::from_parameter(permutations),
            &permutations,
            |b, &permutations| {
                b.iter(|| MinHashSignature::from_shingles(black_box(&set), permutations));
            },
        );
    }
    group.finish();
}

fn bench_jaccard_estimate(c: &mut Criterion) {
    let a_set = shingles(&corpus_text(2_000), 3, 20).unwrap();
    let b_set = shingles(&corpus_text(1_900), 3, 20).unwrap();
    let a = MinHashSignature::from_shingles(&a_set, 192);
    let b = MinHashSignature::from_shingles(&b_set, 192);

    c.bench_function("jaccard_estimate_192", |bench| {
        bench.iter(|| black_box(&a).jaccard_estimate(black_box(&b)));
    });
}

fn bench_lsh_candidates(c: &mut Criterion) {
    let signatures: Vec<MinHashSignature> = (0..1_000)
        .map(|i| {
            let text = format!("{} {}", corpus_text(200), i);
            let set = shingles(&text, 3, 20).unwrap();
            MinHashSignature::from_shingles(&set, 192)
        })
        .collect();

    let mut index = LshIndex::for_config(192, 20);
    for (i, signature) in signatures.iter().enumerate() {
        index.insert(i as i64, signature);
    }

    c.bench_function("lsh_candidates_1k", |bench| {
        bench.iter(|| index.candidates(black_box(&signatures[500])));
    });
}

criterion_group!(
    benches,
    bench_shingling,
    bench_minhash,
    bench_jaccard_estimate,
    bench_lsh_candidates
);
criterion_main!(benches);
