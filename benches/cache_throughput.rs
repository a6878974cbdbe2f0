//! Benchmarks for the in-memory cache path
//!
//! This benchmark measures:
//! - Key derivation (normalize + SHA-256)
//! - Hit path through `ResponseCache`
//! - Insert path with LRU eviction at capacity

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reply_cache::cache::{CacheConfig, CacheKeyGenerator, MemoryCache, ResponseCache};
use tokio::runtime::Runtime;

const PROMPT: &str = "I have been feeling overwhelmed at work lately, any advice?";

fn bench_key_derivation(c: &mut Criterion) {
    let keys = CacheKeyGenerator::new();
    let long_prompt = PROMPT.repeat(40);

    let mut group = c.benchmark_group("key_derivation");
    group.bench_with_input(BenchmarkId::new("generate", "short"), PROMPT, |b, p| {
        b.iter(|| keys.generate(black_box(p), None, None))
    });
    group.bench_with_input(
        BenchmarkId::new("generate", "long"),
        long_prompt.as_str(),
        |b, p| b.iter(|| keys.generate(black_box(p), Some("gpt-4o-mini"), Some(0.7))),
    );
    group.finish();
}

fn bench_cache_ops(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = ResponseCache::new(CacheConfig::default(), Box::new(MemoryCache::new(1024)));
    rt.block_on(cache.cache_response(PROMPT, "Try taking short breaks.", None))
        .unwrap();

    let mut group = c.benchmark_group("response_cache");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hit", |b| {
        let cache = &cache;
        b.to_async(&rt)
            .iter(move || async move { black_box(cache.get_cached_response(PROMPT).await) })
    });

    let prompts: Vec<String> = (0..4096).map(|i| format!("message number {i}")).collect();
    group.bench_function("insert_with_eviction", |b| {
        let (prompts, cache) = (&prompts, &cache);
        let mut i = 0usize;
        b.to_async(&rt).iter(move || {
            i = (i + 1) % prompts.len();
            let prompt = prompts[i].as_str();
            async move { cache.cache_response(prompt, "reply", None).await.unwrap() }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_key_derivation, bench_cache_ops);
criterion_main!(benches);
