//! Real Model Tests
//!
//! Run the actual BERT encoder. Needs `SEMDEX_MODEL_PATH` (ONNX file) and
//! `SEMDEX_TOKENIZER_PATH` (tokenizer.json):
//!
//! ```text
//! SEMDEX_MODEL_PATH=... SEMDEX_TOKENIZER_PATH=... cargo test -p semdex-e2e-tests --test real_model -- --ignored
//! ```

use std::path::PathBuf;

use semdex_core::config::env;
use semdex_core::{
    Embedder, EmbeddingRuntime, Pipeline, PipelineOptions, RuntimeOptions, Store, StoreOptions,
    EMBEDDING_DIMENSIONS,
};
use semdex_e2e_tests::mocks::ANIMAL_AND_MARKETS;

fn runtime_options() -> RuntimeOptions {
    let model_path = std::env::var(env::MODEL_PATH).expect("SEMDEX_MODEL_PATH must point to the ONNX model");
    let tokenizer_path =
        std::env::var(env::TOKENIZER_PATH).expect("SEMDEX_TOKENIZER_PATH must point to tokenizer.json");

    RuntimeOptions {
        tokenizer_model: "bert-base-uncased".to_string(),
        tokenizer_path: Some(PathBuf::from(tokenizer_path)),
        cache_dir: std::env::temp_dir(),
        model_path: PathBuf::from(model_path),
        sessions: 2,
        intra_threads: 1,
    }
}

#[test]
#[ignore = "requires SEMDEX_MODEL_PATH and SEMDEX_TOKENIZER_PATH"]
fn test_real_model_dimension_invariant() {
    let runtime = EmbeddingRuntime::new(&runtime_options()).unwrap();

    let long = "word ".repeat(200);
    let texts: [&str; 3] = ["a", "The cat sat on the mat.", long.as_str()];
    for text in texts {
        let embedding = runtime.embed(text).unwrap();
        assert_eq!(embedding.vector.len(), EMBEDDING_DIMENSIONS);
        assert!(embedding.is_finite());
    }
}

#[test]
#[ignore = "requires SEMDEX_MODEL_PATH and SEMDEX_TOKENIZER_PATH"]
fn test_real_model_is_deterministic() {
    let runtime = EmbeddingRuntime::new(&runtime_options()).unwrap();
    let a = runtime.embed("Stock markets rallied today.").unwrap();
    let b = runtime.embed("Stock markets rallied today.").unwrap();
    assert_eq!(a, b);
}

#[test]
#[ignore = "requires SEMDEX_MODEL_PATH and SEMDEX_TOKENIZER_PATH"]
fn test_real_model_feline_scenario() {
    let runtime = EmbeddingRuntime::new(&runtime_options()).unwrap();
    let store = Store::open_in_memory(StoreOptions::default()).unwrap();
    let pipeline = Pipeline::new(runtime, store, PipelineOptions::default()).unwrap();

    pipeline.ingest_batch(ANIMAL_AND_MARKETS.iter().copied()).unwrap();
    let results = pipeline.search("A feline rested on a rug.", 2).unwrap();

    assert_eq!(results[0].text, "The cat sat on the mat.");
    assert!(results[0].distance < results[1].distance);
}
