//! Batch throughput benchmarks
//!
//! Measures tokenization, padding and post-processing overhead with the
//! in-memory keyword classifier, so results isolate the analyzer from model
//! compute.
//!
//! Run with: cargo bench -p sentistream-analyzer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sentistream_analyzer::testing::sample_analyzer;
use sentistream_analyzer::AnalyzerConfig;

fn comments(n: usize) -> Vec<String> {
    let samples = [
        "great stream today",
        "I hate this chat",
        "the movie was okay",
        "best product and amazing service",
        "worst stream",
    ];
    (0..n).map(|i| samples[i % samples.len()].to_string()).collect()
}

fn benchmark_batch_sizes(c: &mut Criterion) {
    let analyzer = sample_analyzer(&AnalyzerConfig::default());

    let mut group = c.benchmark_group("predict_labels_with_scores");
    for size in [1usize, 8, 32, 128] {
        let texts = comments(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &texts, |b, texts| {
            b.iter(|| analyzer.predict_labels_with_scores(black_box(texts)).unwrap());
        });
    }
    group.finish();
}

fn benchmark_truncation(c: &mut Criterion) {
    let analyzer = sample_analyzer(&AnalyzerConfig::default().with_max_length(64));
    let long = "okay stream ".repeat(2_000);

    c.bench_function("truncate_long_text", |b| {
        b.iter(|| analyzer.predict_labels(black_box(long.as_str())).unwrap());
    });
}

criterion_group!(benches, benchmark_batch_sizes, benchmark_truncation);
criterion_main!(benches);
