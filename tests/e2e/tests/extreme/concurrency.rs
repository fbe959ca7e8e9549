//! Concurrency Tests
//!
//! Writers and readers sharing one store and one pipeline.

use std::sync::Arc;

use semdex_core::{Store, StoreOptions, EMBEDDING_DIMENSIONS};
use semdex_e2e_tests::harness::TestStoreManager;
use semdex_e2e_tests::mocks::{synthetic_vector, MIXED_TOPICS};

#[test]
fn test_parallel_inserts_and_queries_never_see_partial_writes() {
    let store = Store::open_in_memory(StoreOptions::default()).unwrap();

    std::thread::scope(|scope| {
        for writer in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for i in 0..50 {
                    let seed = writer * 1000 + i;
                    let id = format!("w{writer}-{i}");
                    store
                        .insert(&id, &synthetic_vector(seed, EMBEDDING_DIMENSIONS), &id)
                        .unwrap();
                }
            });
        }

        for reader in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for i in 0..50 {
                    let query = synthetic_vector(reader * 31 + i, EMBEDDING_DIMENSIONS);
                    // MissingText here would mean a vector was visible before its text
                    for hit in store.query(&query, 5).unwrap() {
                        assert_eq!(hit.text, hit.id);
                    }
                }
            });
        }
    });

    assert_eq!(store.len().unwrap(), 200);
    assert_eq!(store.stats().unwrap().documents, 200);
}

#[test]
fn test_concurrent_duplicate_inserts_admit_exactly_one() {
    let store = Store::open_in_memory(StoreOptions::default()).unwrap();
    let vector = synthetic_vector(7, EMBEDDING_DIMENSIONS);

    let successes: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = &store;
                let vector = &vector;
                scope.spawn(move || store.insert("contested", vector, &format!("thread {t}")).is_ok())
            })
            .collect();
        handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum()
    });

    assert_eq!(successes, 1);
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_async_searches() {
    let db = TestStoreManager::new_in_memory();
    db.seed(MIXED_TOPICS);

    let mut handles = Vec::new();
    for round in 0..20 {
        let pipeline = Arc::clone(&db.pipeline);
        let query = if round % 2 == 0 { "feline on a rug" } else { "shares rallied" };
        handles.push(tokio::spawn(async move {
            pipeline.search_async(query.to_string(), 1).await
        }));
    }

    for handle in handles {
        let results = handle.await.unwrap().unwrap();
        assert_eq!(results.len(), 1);
        assert!(
            results[0].text == MIXED_TOPICS[0] || results[0].text == MIXED_TOPICS[1],
            "unexpected top hit: {}",
            results[0].text
        );
    }
}
