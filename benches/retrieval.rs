//! Benchmarks for retrieval operations.
//!
//! Covers the two hot paths of a retrieval call:
//! - Deduplication and reranking of merged candidates
//! - Concurrent fan-out over namespaces backed by the memory engine

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::cast_precision_loss)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use nsrecall::services::dedup::{DEFAULT_DEDUP_WINDOW, Deduplicator};
use nsrecall::services::rerank::{DEFAULT_MAX_SCORE, DEFAULT_PRIMARY_BOOST, rerank};
use nsrecall::storage::StoreConfig;
use nsrecall::{
    HashEmbedder, MemoryEngine, NamespaceRetriever, Payload, RetrieverConfig, SearchResult,
    VectorStore,
};

/// Sample catalog content for populating namespaces.
const SAMPLE_CONTENT: &[&str] = &[
    "Running shoes with carbon plate, free returns within 30 days",
    "Store opening hours are 9 to 5 on weekdays",
    "Winter boots on sale this week only",
    "Noodle bar menu with vegetarian options",
    "Price match guarantee for all electronics",
    "Gift cards can be redeemed online or in store",
];

const NAMESPACES: [&str; 4] = ["catalog", "faq", "promotions", "support"];

/// Builds `count` candidates where every third one repeats an earlier key.
fn candidates(count: usize) -> Vec<SearchResult> {
    (0..count)
        .map(|i| {
            let key = if i % 3 == 0 { i / 3 } else { i };
            SearchResult::new(
                format!("doc-{key}"),
                Payload::new(format!("{} #{key}", SAMPLE_CONTENT[key % SAMPLE_CONTENT.len()])),
                (i % 100) as f32 / 100.0,
                NAMESPACES[i % NAMESPACES.len()],
            )
        })
        .collect()
}

/// Builds a store with `per_namespace` records in each namespace.
fn populated_store(per_namespace: usize) -> Arc<VectorStore> {
    let store = VectorStore::new(
        Arc::new(MemoryEngine::new()),
        Arc::new(HashEmbedder::default()),
        StoreConfig::default(),
    )
    .expect("store");

    for ns in NAMESPACES {
        for i in 0..per_namespace {
            let content = format!("{} - {ns} {i}", SAMPLE_CONTENT[i % SAMPLE_CONTENT.len()]);
            store
                .put(ns, &format!("{ns}-{i}"), Payload::new(content))
                .expect("put");
        }
    }
    Arc::new(store)
}

// ============================================================================
// Merge Benchmarks
// ============================================================================

fn bench_dedup_rerank(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedup_rerank");

    for size in [50usize, 500, 5_000] {
        let input = candidates(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                let mut dedup = Deduplicator::new(DEFAULT_DEDUP_WINDOW);
                let mut merged = dedup.filter(input.clone());
                rerank(
                    &mut merged,
                    "catalog",
                    DEFAULT_PRIMARY_BOOST,
                    DEFAULT_MAX_SCORE,
                );
                black_box(merged)
            });
        });
    }

    group.finish();
}

// ============================================================================
// Fan-out Benchmarks
// ============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("runtime");

    let mut group = c.benchmark_group("fan_out");
    group.measurement_time(Duration::from_secs(10));

    for per_namespace in [100usize, 1_000] {
        let store = populated_store(per_namespace);
        let namespaces: Vec<String> = NAMESPACES.iter().map(ToString::to_string).collect();
        let retriever =
            NamespaceRetriever::new(store, RetrieverConfig::new(namespaces, "catalog"))
                .expect("retriever");

        group.bench_function(BenchmarkId::new("comprehensive", per_namespace), |b| {
            b.iter(|| {
                runtime
                    .block_on(retriever.search_all_namespaces("shoes on sale", 5))
                    .expect("search")
            });
        });

        group.bench_function(BenchmarkId::new("fallback", per_namespace), |b| {
            b.iter(|| {
                runtime
                    .block_on(retriever.search_with_fallback(
                        "opening hours",
                        "faq",
                        10,
                        0.65,
                        4,
                    ))
                    .expect("search")
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dedup_rerank, bench_fan_out);
criterion_main!(benches);
