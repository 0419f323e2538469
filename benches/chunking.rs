use criterion::{Criterion, criterion_group, criterion_main};
use ragchat::embeddings::chunking::{ChunkingConfig, chunk_text};
use std::hint::black_box;

pub fn criterion_benchmark(c: &mut Criterion) {
    let paragraph = "Retrieval-augmented generation pairs a search index with a language model. ";
    let text = paragraph.repeat(2_000);
    let config = ChunkingConfig::default();
    c.bench_function("chunking", |b| {
        b.iter(|| chunk_text("bench.txt", black_box(&text), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
