use extract::testing::ScriptedGenerator;
use extract::{DraftGraph, ExtractedVariable, RetryConfig, RetryCoordinator, ShapeValidator};
use index::{MemoryStore, OccurrenceSearch, TripleStore};
use resolve::{
    DEFAULT_MINT_NAMESPACE, EntityResolver, Pipeline, PipelineError, ResolveError, ResolverConfig,
};
use std::sync::Arc;

const EXISTING: &str = r#"
    @prefix schema: <http://schema.org/> .
    <http://example.org/ada> a schema:Person ; schema:name "Ada Lovelace" .
    <http://example.org/babbage> a schema:Person ; schema:name "Charles Babbage" .
"#;

const SHAPES: &str = r#"
    @prefix sh: <http://www.w3.org/ns/shacl#> .
    @prefix schema: <http://schema.org/> .
    @prefix ex: <http://example.org/> .

    ex:PersonShape a sh:NodeShape ;
        sh:targetClass schema:Person ;
        sh:property [ sh:path schema:name ; sh:minCount 1 ] .
"#;

const DRAFT: &str = r#"
    @prefix schema: <http://schema.org/> .
    <urn:placeholder:ENTITY_1> a schema:Person ; schema:name "Ada Lovelace" .
    <urn:placeholder:ENTITY_2> a schema:Person ; schema:name "Luigi Menabrea" .
    <urn:placeholder:ENTITY_1> schema:knows <urn:placeholder:ENTITY_2> .
"#;

fn variables() -> Vec<ExtractedVariable> {
    vec![
        ExtractedVariable::new("ENTITY_1", "http://schema.org/Person", "Ada Lovelace"),
        ExtractedVariable::new("ENTITY_2", "http://schema.org/Person", "Luigi Menabrea"),
    ]
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert(EXISTING).await.unwrap();
    store
}

fn pipeline(
    generator: ScriptedGenerator,
    store: Arc<MemoryStore>,
    resolver: &ResolverConfig,
) -> Pipeline {
    let retry = RetryCoordinator::new(
        Arc::new(generator),
        Arc::new(ShapeValidator),
        &RetryConfig::default(),
    );
    let search = Arc::new(OccurrenceSearch::new(store.clone(), 10));
    let resolver = EntityResolver::from_config(search, resolver);
    Pipeline::new(retry, resolver, store)
}

#[tokio::test]
async fn test_existing_entity_is_reused_and_new_one_minted() {
    let store = seeded_store().await;
    let generator = ScriptedGenerator::new().then_draft(DraftGraph::new(DRAFT, variables()));
    let pipeline = pipeline(generator, store.clone(), &ResolverConfig::default());

    let output = pipeline
        .run("Ada Lovelace corresponded with Luigi Menabrea.", Some(SHAPES))
        .await
        .unwrap();

    assert_eq!(output.attempts, 1);
    assert_eq!(output.entities.len(), 2);

    let ada = &output.entities[0];
    assert_eq!(ada.entity.id, "ENTITY_1");
    assert_eq!(ada.subject, "http://example.org/ada");
    assert!(!ada.minted);

    let luigi = &output.entities[1];
    assert!(luigi.minted);
    assert!(luigi.subject.starts_with(DEFAULT_MINT_NAMESPACE));

    assert!(!output.graph.contains("urn:placeholder:"));
    assert!(output.graph.contains("<http://example.org/ada>"));

    let export = store.export_all().await.unwrap();
    assert!(export.contains(&format!(
        "<http://example.org/ada> <http://schema.org/knows> <{}> .",
        luigi.subject
    )));
    // "Ada Lovelace" name and type were already present
    assert_eq!(output.inserted, 3);
}

#[tokio::test]
async fn test_invalid_draft_is_retried_with_feedback() {
    let store = seeded_store().await;
    let missing_name = r#"
        @prefix schema: <http://schema.org/> .
        <urn:placeholder:ENTITY_1> a schema:Person .
    "#;
    let generator = ScriptedGenerator::new()
        .then_draft(DraftGraph::new(missing_name, variables()[..1].to_vec()))
        .then_draft(DraftGraph::new(DRAFT, variables()));
    let pipeline = pipeline(generator, store, &ResolverConfig::default());

    let output = pipeline.run("text", Some(SHAPES)).await.unwrap();
    assert_eq!(output.attempts, 2);
}

#[tokio::test]
async fn test_exhaustion_leaves_store_untouched() {
    let store = seeded_store().await;
    let before = store.export_all().await.unwrap();
    let generator = ScriptedGenerator::new()
        .then_content("not turtle")
        .then_content("still not turtle")
        .then_content("never turtle");
    let pipeline = pipeline(generator, store.clone(), &ResolverConfig::default());

    let err = pipeline.run("text", None).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Generation(extract::ExtractError::GenerationExhausted { attempts: 3, .. })
    ));
    assert_eq!(store.export_all().await.unwrap(), before);
}

#[tokio::test]
async fn test_no_candidate_leaves_store_untouched() {
    let store = seeded_store().await;
    let before = store.len().await;
    let generator = ScriptedGenerator::new().then_draft(DraftGraph::new(DRAFT, variables()));
    let config = ResolverConfig {
        mint_namespace: None,
        ..ResolverConfig::default()
    };
    let pipeline = pipeline(generator, store.clone(), &config);

    let err = pipeline.run("text", None).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Resolution(ResolveError::NoCandidate { ref text }) if text == "Luigi Menabrea"
    ));
    assert_eq!(store.len().await, before);
}

#[tokio::test]
async fn test_undeclared_placeholder_is_fatal() {
    let store = seeded_store().await;
    let before = store.len().await;
    let generator = ScriptedGenerator::new()
        .then_draft(DraftGraph::new(DRAFT, variables()[..1].to_vec()));
    let pipeline = pipeline(generator, store.clone(), &ResolverConfig::default());

    let err = pipeline.run("text", None).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Resolution(ResolveError::UnresolvedPlaceholder { ref id }) if id == "ENTITY_2"
    ));
    assert_eq!(store.len().await, before);
}

#[tokio::test]
async fn test_search_passthrough() {
    let store = seeded_store().await;
    let pipeline = pipeline(ScriptedGenerator::new(), store, &ResolverConfig::default());

    let response = pipeline.search("BABBAGE").await.unwrap();
    assert_eq!(response.text, "BABBAGE");
    assert_eq!(response.hits.len(), 1);
    assert_eq!(response.hits[0].subject, "http://example.org/babbage");
}

#[tokio::test]
async fn test_run_is_spawnable() {
    let store = seeded_store().await;
    let generator = ScriptedGenerator::new().then_draft(DraftGraph::new(DRAFT, variables()));
    let pipeline = Arc::new(pipeline(generator, store, &ResolverConfig::default()));

    let output = tokio::spawn(async move { pipeline.run("text", Some(SHAPES)).await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output.entities.len(), 2);
}

#[tokio::test]
async fn test_prefixed_placeholder_is_not_merged() {
    let store = seeded_store().await;
    let before = store.export_all().await.unwrap();
    let prefixed = r#"
        @prefix schema: <http://schema.org/> .
        @prefix ph: <urn:placeholder:> .
        ph:ENTITY_1 a schema:Person ; schema:name "Ada Lovelace" .
    "#;
    let generator = ScriptedGenerator::new()
        .then_draft(DraftGraph::new(prefixed, variables()[..1].to_vec()));
    let pipeline = pipeline(generator, store.clone(), &ResolverConfig::default());

    let err = pipeline.run("text", None).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Resolution(ResolveError::UnresolvedPlaceholder { ref id }) if id == "ENTITY_1"
    ));
    assert_eq!(store.export_all().await.unwrap(), before);
}
