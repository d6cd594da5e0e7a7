//! Chaos testing for concurrent retrieval.
//!
//! Tests concurrent operations to find races, lost counter updates, and
//! starvation:
//! - Many top-level retrievals sharing one retriever
//! - Writers mutating the store while retrievals run
//! - Faulty namespaces under concurrent load
//! - Circuit breaking around a dead engine
//! - Breaker recovery after a panicking engine call

// Chaos tests use expect/unwrap/panic for simplicity - panics are acceptable in tests
// Needless collect is sometimes needed for clearer concurrent test structure
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::needless_collect
)]

mod common;

use common::{Fault, KeywordEmbedder, faulty_store, memory_store, namespaces, put_scored};
use nsrecall::storage::{EngineResilienceConfig, ResilientEngine, StoreConfig, VectorEngine};
use nsrecall::{NamespaceRetriever, Payload, RetrieverConfig, SearchStrategy, VectorStore};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SHOES: usize = 0;

/// Test: concurrent top-level retrievals share one retriever without lost counts.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retrievals_keep_counters_consistent() {
    let store = memory_store();
    for ns in ["a", "b", "c"] {
        for i in 0..10 {
            put_scored(&store, ns, &format!("{ns}{i}"), &format!("{ns} doc {i}"), SHOES, 0.5);
        }
    }
    let retriever = Arc::new(
        NamespaceRetriever::new(store, RetrieverConfig::new(namespaces(&["a", "b", "c"]), "a"))
            .unwrap(),
    );

    let tasks: Vec<_> = (0..30)
        .map(|i| {
            let retriever = Arc::clone(&retriever);
            tokio::spawn(async move {
                let strategy = match i % 3 {
                    0 => SearchStrategy::PrimaryOnly,
                    1 => SearchStrategy::Fallback,
                    _ => SearchStrategy::Comprehensive,
                };
                retriever.search("shoes", strategy, 4).await.unwrap()
            })
        })
        .collect();

    for task in tasks {
        let results = task.await.unwrap();
        assert!(!results.is_empty());
    }

    let stats = retriever.stats();
    assert_eq!(stats.total_searches, 30);
    assert_eq!(stats.namespace_failures, 0);
    assert_eq!(stats.namespace_timeouts, 0);
}

/// Test: writers on plain threads do not disturb concurrent retrievals.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writes_during_retrieval() {
    let store = memory_store();
    put_scored(&store, "a", "seed", "seed shoes", SHOES, 0.9);
    let retriever = Arc::new(
        NamespaceRetriever::new(
            Arc::clone(&store),
            RetrieverConfig::new(namespaces(&["a", "b"]), "a"),
        )
        .unwrap(),
    );

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    let ns = if i % 2 == 0 { "a" } else { "b" };
                    store
                        .put(ns, &format!("w{t}-{i}"), Payload::new(format!("shoes {t} {i}")))
                        .unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..10)
        .map(|_| {
            let retriever = Arc::clone(&retriever);
            tokio::spawn(async move {
                retriever
                    .search_with_fallback("shoes", "a", 8, 0.65, 4)
                    .await
                    .unwrap()
            })
        })
        .collect();

    for reader in readers {
        let results = reader.await.unwrap();
        assert!(results.len() <= 8);
        assert!(results.iter().any(|r| r.namespace == "a"));
    }
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(store.count().unwrap(), 101);
    assert_eq!(store.count_namespace("a").unwrap(), 53);
}

/// Test: faults in one namespace are counted once per affected call under load.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_faults_under_concurrent_load() {
    let (store, engine) = faulty_store();
    for ns in ["ok", "err", "boom"] {
        put_scored(&store, ns, "k", &format!("from {ns}"), SHOES, 0.7);
    }
    engine.inject("err", Fault::Error);
    engine.inject("boom", Fault::Panic);
    let retriever = Arc::new(
        NamespaceRetriever::new(
            store,
            RetrieverConfig::new(namespaces(&["ok", "err", "boom"]), "ok"),
        )
        .unwrap(),
    );

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let retriever = Arc::clone(&retriever);
            tokio::spawn(async move { retriever.search_all_namespaces("shoes", 3).await.unwrap() })
        })
        .collect();

    for task in tasks {
        let results = task.await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].namespace, "ok");
    }

    let stats = retriever.stats();
    assert_eq!(stats.total_searches, 12);
    assert_eq!(stats.namespace_failures, 24);
}

/// Test: a stalled namespace does not hold worker slots beyond its timeout.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_task_releases_its_slot() {
    let (store, engine) = faulty_store();
    for ns in ["slow", "x", "y", "z"] {
        put_scored(&store, ns, "k", &format!("from {ns}"), SHOES, 0.7);
    }
    engine.inject("slow", Fault::Stall(Duration::from_secs(2)));
    let retriever = NamespaceRetriever::new(
        store,
        RetrieverConfig::new(namespaces(&["slow", "x", "y", "z"]), "x")
            .with_max_workers(1)
            .with_task_timeout(Duration::from_millis(150)),
    )
    .unwrap();

    let results = retriever.search_all_namespaces("shoes", 1).await.unwrap();

    let mut found: Vec<&str> = results.iter().map(|r| r.namespace.as_str()).collect();
    found.sort_unstable();
    assert_eq!(found, vec!["x", "y", "z"]);
    assert_eq!(retriever.stats().namespace_timeouts, 1);
}

/// Test: the breaker opens after repeated engine failures and reads degrade to empty.
#[test]
fn test_breaker_opens_on_dead_engine() {
    let (_, engine) = faulty_store();
    let resilient = Arc::new(ResilientEngine::new(
        Arc::clone(&engine),
        &EngineResilienceConfig::default()
            .with_failure_threshold(2)
            .with_reset_timeout_ms(60_000),
    ));
    let store = VectorStore::new(
        Arc::clone(&resilient) as Arc<dyn VectorEngine>,
        Arc::new(KeywordEmbedder),
        StoreConfig::default(),
    )
    .unwrap();
    put_scored(&store, "a", "k", "shoes", SHOES, 0.9);
    engine.inject("a", Fault::Error);

    for _ in 0..3 {
        assert!(store.search("a", "shoes", 5).is_empty());
    }
    assert_eq!(resilient.breaker_state(), 1);

    // Open circuit short-circuits before reaching the engine.
    let before = engine.searches();
    engine.clear("a");
    assert!(store.search("a", "shoes", 5).is_empty());
    assert_eq!(engine.searches(), before);
}

/// Test: a half-open trial that panics re-opens the breaker, which later recovers.
#[test]
fn test_breaker_recovers_after_panicking_trial() {
    let (_, engine) = faulty_store();
    let resilient = Arc::new(ResilientEngine::new(
        Arc::clone(&engine),
        &EngineResilienceConfig::default()
            .with_failure_threshold(1)
            .with_reset_timeout_ms(10),
    ));
    let store = VectorStore::new(
        Arc::clone(&resilient) as Arc<dyn VectorEngine>,
        Arc::new(KeywordEmbedder),
        StoreConfig::default(),
    )
    .unwrap();
    put_scored(&store, "a", "k", "shoes", SHOES, 0.9);

    engine.inject("a", Fault::Error);
    assert!(store.search("a", "shoes", 5).is_empty());
    assert_eq!(resilient.breaker_state(), 1);

    thread::sleep(Duration::from_millis(20));
    engine.inject("a", Fault::Panic);
    let trial = catch_unwind(AssertUnwindSafe(|| store.search("a", "shoes", 5)));
    assert!(trial.is_err());
    assert_eq!(resilient.breaker_state(), 1);

    engine.clear("a");
    thread::sleep(Duration::from_millis(20));
    for _ in 0..3 {
        assert_eq!(store.search("a", "shoes", 5).len(), 1);
    }
    assert_eq!(resilient.breaker_state(), 0);
}
