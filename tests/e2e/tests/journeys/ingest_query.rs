//! Ingest / Query Journey
//!
//! A user writes a text file, ingests it, and asks questions in different
//! words than the documents use.

use semdex_core::{is_blank, FailurePolicy, PipelineError, PipelineOptions, StoreError, StoreOptions};
use semdex_e2e_tests::harness::TestStoreManager;
use semdex_e2e_tests::mocks::{file_contents, ANIMAL_AND_MARKETS, MIXED_TOPICS};

#[test]
fn test_feline_query_ranks_cat_document_first() {
    let db = TestStoreManager::new_in_memory();
    let path = db.write_input("docs.txt", &file_contents(ANIMAL_AND_MARKETS));

    let report = db.pipeline.ingest_file(&path).unwrap();
    assert_eq!(report.inserted.len(), 2);

    let results = db.pipeline.search("A feline rested on a rug.", 3).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].text, "The cat sat on the mat.");
    assert!(results[0].distance < results[1].distance);
}

#[test]
fn test_each_topic_finds_its_document() {
    let db = TestStoreManager::new_temp();
    db.seed(MIXED_TOPICS);

    let cases = [
        ("a puppy lay on the sofa", "The cat sat on the mat."),
        ("investors bought shares", "Stock markets rallied today."),
        ("sunny weather expected", "Heavy rain and wind are forecast for tomorrow."),
        ("bake it in the oven", "Simmer the onions before adding garlic."),
        ("rust program code", "The compiler rejected the borrowed reference."),
    ];

    for (query, expected) in cases {
        let results = db.pipeline.search(query, 1).unwrap();
        assert_eq!(results[0].text, expected, "query: {query}");
    }
}

#[test]
fn test_three_blank_lines_create_no_empty_document() {
    let db = TestStoreManager::new_in_memory();
    let path = db.write_input(
        "gappy.txt",
        "The cat sat on the mat.\n\n\n\nStock markets rallied today.\n\n\n",
    );

    let report = db.pipeline.ingest_file(&path).unwrap();
    assert_eq!(report.inserted.len(), 2);
    assert!(report.skipped_blank >= 1);

    for id in &report.inserted {
        let text = db.store().get_text(id).unwrap();
        assert!(!is_blank(&text));
    }
}

#[test]
fn test_documents_stored_verbatim() {
    let db = TestStoreManager::new_in_memory();
    let document = "  Indented first line\nsecond line with trailing space ";
    let path = db.write_input("verbatim.txt", &format!("{document}\n\nStock markets rallied today."));

    let report = db.pipeline.ingest_file(&path).unwrap();
    assert_eq!(db.store().get_text(&report.inserted[0]).unwrap(), document);
}

#[test]
fn test_results_never_exceed_k_and_are_ascending() {
    let db = TestStoreManager::new_in_memory();
    db.seed(MIXED_TOPICS);

    for k in 0..=7 {
        let results = db.pipeline.search("the cat and the markets", k).unwrap();
        assert_eq!(results.len(), k.min(MIXED_TOPICS.len()));
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }
}

#[test]
fn test_poisoned_document_is_reported_and_skipped() {
    let db = TestStoreManager::new_in_memory();
    let path = db.write_input(
        "mixed.txt",
        &file_contents(&["The cat sat on the mat.", "this one is poison", "Stock markets rallied today."]),
    );

    let report = db.pipeline.ingest_file(&path).unwrap();
    assert_eq!(report.inserted.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert!(report.failed[0].excerpt.contains("poison"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["failed"][0]["index"], 1);
    assert!(json.get("skippedBlank").is_some());
}

#[test]
fn test_abort_policy_stops_at_poisoned_document() {
    let db = TestStoreManager::with_options(
        StoreOptions::default(),
        PipelineOptions {
            failure_policy: FailurePolicy::Abort,
            ..Default::default()
        },
    );
    let path = db.write_input(
        "mixed.txt",
        &file_contents(&["The cat sat on the mat.", "poison", "Stock markets rallied today."]),
    );

    let result = db.pipeline.ingest_file(&path);
    assert!(matches!(result, Err(PipelineError::Embedding { .. })));
    assert_eq!(db.document_count(), 1);
}

#[test]
fn test_flush_then_query_is_empty() {
    let db = TestStoreManager::new_temp();
    let ids = db.seed(ANIMAL_AND_MARKETS);

    db.pipeline.flush().unwrap();
    assert!(db.pipeline.search("cat", 3).unwrap().is_empty());
    assert!(matches!(db.store().get_text(&ids[0]), Err(StoreError::NotFound(_))));

    // Second flush is a no-op
    db.pipeline.flush().unwrap();
    assert!(db.is_empty());
}

#[test]
fn test_missing_input_file() {
    let db = TestStoreManager::new_in_memory();
    let result = db.pipeline.ingest_file(std::path::Path::new("/no/such/input.txt"));
    assert!(matches!(result, Err(PipelineError::Io { .. })));
}

#[tokio::test]
async fn test_async_journey() {
    let db = TestStoreManager::new_in_memory();
    let path = db.write_input("docs.txt", &file_contents(ANIMAL_AND_MARKETS));

    let report = db.pipeline.ingest_file_async(&path).await.unwrap();
    assert_eq!(report.inserted.len(), 2);

    let results = db
        .pipeline
        .search_async("A feline rested on a rug.".to_string(), 1)
        .await
        .unwrap();
    assert_eq!(results[0].text, "The cat sat on the mat.");
}
