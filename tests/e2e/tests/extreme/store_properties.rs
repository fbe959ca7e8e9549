//! Store Property Tests
//!
//! Ordering, identity and rejection rules checked against a brute-force model.

use semdex_core::{Embedder, Metric, Store, StoreError, StoreOptions, EMBEDDING_DIMENSIONS};
use semdex_e2e_tests::mocks::{synthetic_vector, ConceptEmbedder, MIXED_TOPICS};

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[test]
fn test_exact_top_k_matches_brute_force() {
    let store = Store::open_in_memory(StoreOptions::default()).unwrap();
    let vectors: Vec<Vec<f32>> = (0..200).map(|i| synthetic_vector(i, EMBEDDING_DIMENSIONS)).collect();
    for (i, v) in vectors.iter().enumerate() {
        store.insert(&format!("doc-{i}"), v, &format!("text {i}")).unwrap();
    }

    for seed in [3usize, 77, 150, 512] {
        let query = synthetic_vector(seed, EMBEDDING_DIMENSIONS);

        let mut expected: Vec<(usize, f32)> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2(&query, v)))
            .collect();
        expected.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let results = store.query(&query, 10).unwrap();
        let got: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        let want: Vec<String> = expected[..10].iter().map(|(i, _)| format!("doc-{i}")).collect();
        assert_eq!(got, want, "query seed {seed}");

        for (result, (_, distance)) in results.iter().zip(&expected) {
            assert!((result.distance - distance).abs() <= 1e-3 * distance.max(1.0));
        }
    }
}

#[test]
fn test_stored_embedding_queries_back_at_zero() {
    let store = Store::open_in_memory(StoreOptions::default()).unwrap();
    let embedder = ConceptEmbedder::new();

    for (i, text) in MIXED_TOPICS.iter().enumerate() {
        let embedding = embedder.embed(text).unwrap();
        assert_eq!(embedding.vector.len(), EMBEDDING_DIMENSIONS);
        store.insert(&format!("doc-{i}"), &embedding.vector, text).unwrap();
    }

    for (i, text) in MIXED_TOPICS.iter().enumerate() {
        let embedding = embedder.embed(text).unwrap();
        let results = store.query(&embedding.vector, 1).unwrap();
        assert_eq!(results[0].id, format!("doc-{i}"));
        assert!(results[0].distance.abs() < 1e-6);
        assert_eq!(store.get_text(&results[0].id).unwrap(), *text);
    }
}

#[test]
fn test_ties_resolve_to_earliest_insert() {
    let store = Store::open_in_memory(StoreOptions {
        dimensions: 2,
        ..Default::default()
    })
    .unwrap();

    // All four sit at distance 1 from the origin
    store.insert("east", &[1.0, 0.0], "east").unwrap();
    store.insert("north", &[0.0, 1.0], "north").unwrap();
    store.insert("west", &[-1.0, 0.0], "west").unwrap();
    store.insert("south", &[0.0, -1.0], "south").unwrap();

    let ids: Vec<String> = store
        .query(&[0.0, 0.0], 3)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["east", "north", "west"]);
}

#[test]
fn test_duplicate_key_is_stable() {
    let store = Store::open_in_memory(StoreOptions::default()).unwrap();
    let v = synthetic_vector(1, EMBEDDING_DIMENSIONS);
    store.insert("same", &v, "first").unwrap();

    for attempt in 0..5 {
        let other = synthetic_vector(attempt + 2, EMBEDDING_DIMENSIONS);
        assert!(matches!(
            store.insert("same", &other, "again"),
            Err(StoreError::DuplicateKey { .. })
        ));
    }
    assert_eq!(store.get_text("same").unwrap(), "first");
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn test_adversarial_vectors_rejected() {
    let store = Store::open_in_memory(StoreOptions::default()).unwrap();

    let short = vec![0.5; EMBEDDING_DIMENSIONS - 1];
    assert!(matches!(
        store.insert("short", &short, "short"),
        Err(StoreError::DimensionMismatch { expected: 768, got: 767, .. })
    ));

    let mut infinite = vec![0.0; EMBEDDING_DIMENSIONS];
    infinite[10] = f32::INFINITY;
    assert!(matches!(
        store.insert("inf", &infinite, "inf"),
        Err(StoreError::NonFinite { .. })
    ));

    assert!(store.is_empty().unwrap());
}

#[test]
fn test_adversarial_text_round_trips() {
    let store = Store::open_in_memory(StoreOptions {
        dimensions: 4,
        metric: Some(Metric::Cosine),
        ..Default::default()
    })
    .unwrap();

    let long = "long ".repeat(10_000);
    let texts: [&str; 4] = [
        "'; DROP TABLE documents; --",
        "emoji \u{1F431}\u{1F4C8} and accents: café naïve",
        "nul-free but\ttabbed\nand\r\nwindows lines",
        long.as_str(),
    ];

    for (i, text) in texts.iter().enumerate() {
        let v = [1.0 + i as f32, 0.5, 0.25, 0.125];
        store.insert(&format!("t{i}"), &v, text).unwrap();
        assert_eq!(store.get_text(&format!("t{i}")).unwrap(), *text);
    }
    assert_eq!(store.stats().unwrap().documents, texts.len() as i64);
}
