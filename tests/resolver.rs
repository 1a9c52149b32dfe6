mod common;

use std::fs;
use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;

use common::{MockCatalog, config, experiment_record, file};
use encode_catalog::domain::Accession;
use encode_catalog::error::EncodeError;
use encode_catalog::model::ExperimentSummary;
use encode_catalog::resolver::{MetadataResolver, ResolveState};

fn client() -> MockCatalog {
    MockCatalog::default().with_experiment(experiment_record(
        "ENCSR000CDC",
        vec![
            file("ENCFF001JZK", "bam", "released", Some("2012-01-01")),
            file("ENCFF002BBB", "bigWig", "released", Some("2016-06-01")),
        ],
    ))
}

fn acc(value: &str) -> Accession {
    value.parse().unwrap()
}

#[test]
fn resolves_once_then_serves_from_memory() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = MetadataResolver::new(&config(temp.path()), client());

    let first = resolver.resolve("ENCSR000CDC", None).unwrap();
    let second = resolver.resolve("encsr000cdc", None).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.files().len(), 2);
    assert_eq!(resolver.client().experiment_calls(), 1);
    assert_eq!(resolver.state(&acc("ENCSR000CDC")), ResolveState::Cached);
    assert!(temp.path().join("metadata/SR/ENCSR000CDC.json").is_file());
}

#[test]
fn new_process_reads_disk_tier() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path());
    MetadataResolver::new(&config, client())
        .resolve("ENCSR000CDC", None)
        .unwrap();

    let resolver = MetadataResolver::new(&config, MockCatalog::default());
    let metadata = resolver.resolve("ENCSR000CDC", None).unwrap();
    assert_eq!(resolver.client().experiment_calls(), 0);
    assert_eq!(metadata.summary().biosample_summary.as_deref(), Some("CD20+ B cells"));
    assert_eq!(metadata.files()[0].accession, "ENCFF001JZK");
}

#[test]
fn unknown_experiment_fails_and_retries() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = MetadataResolver::new(&config(temp.path()), client());

    let err = resolver.resolve("ENCSR999ZZZ", None).unwrap_err();
    assert_matches!(err, EncodeError::NotFound(ref id) if id == "ENCSR999ZZZ");
    assert!(err.is_not_found());
    assert_eq!(resolver.state(&acc("ENCSR999ZZZ")), ResolveState::Failed);

    resolver.resolve("ENCSR999ZZZ", None).unwrap_err();
    assert_eq!(resolver.client().experiment_calls(), 2);
}

#[test]
fn record_for_another_experiment_is_not_cached() {
    let temp = tempfile::tempdir().unwrap();
    let mut client = MockCatalog::default();
    client
        .experiments
        .insert("ENCSR000CDC".to_string(), experiment_record("ENCSR111AAA", Vec::new()));
    let resolver = MetadataResolver::new(&config(temp.path()), client);

    let err = resolver.resolve("ENCSR000CDC", None).unwrap_err();
    assert_matches!(err, EncodeError::NotFound(ref id) if id == "ENCSR000CDC");
    assert_eq!(resolver.state(&acc("ENCSR000CDC")), ResolveState::Failed);
    assert!(!temp.path().join("metadata/SR/ENCSR000CDC.json").exists());
    assert!(!temp.path().join("metadata/SR/ENCSR111AAA.json").exists());
}

#[test]
fn malformed_accession_never_reaches_remote() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = MetadataResolver::new(&config(temp.path()), client());

    let err = resolver.resolve("../ENCSR000CDC", None).unwrap_err();
    assert_matches!(err, EncodeError::InvalidIdentifier(_));
    assert!(err.is_not_found());
    assert_eq!(resolver.client().experiment_calls(), 0);
}

#[test]
fn corrupt_entry_is_refetched_and_counted() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = MetadataResolver::new(&config(temp.path()), client());
    let path = temp.path().join("metadata/SR/ENCSR000CDC.json");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"{not json").unwrap();

    let metadata = resolver.resolve("ENCSR000CDC", None).unwrap();
    assert_eq!(metadata.files().len(), 2);
    assert_eq!(resolver.corrupt_reads(), 1);
    assert_eq!(resolver.client().experiment_calls(), 1);
    let repaired: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(repaired["accession"], "ENCSR000CDC");
}

#[test]
fn unembedded_cached_files_trigger_refetch() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = MetadataResolver::new(&config(temp.path()), client());
    resolver
        .cache()
        .put(
            "ENCSR000CDC",
            &json!({"accession": "ENCSR000CDC", "status": "released", "files": ["/files/ENCFF001JZK/"]}),
        )
        .unwrap();

    let metadata = resolver.resolve("ENCSR000CDC", None).unwrap();
    assert_eq!(resolver.client().experiment_calls(), 1);
    assert_eq!(metadata.files().len(), 2);
    assert_eq!(resolver.corrupt_reads(), 0);
}

#[test]
fn refresh_always_refetches() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = MetadataResolver::new(&config(temp.path()), client());
    let first = resolver.resolve("ENCSR000CDC", None).unwrap();
    let refreshed = resolver.refresh("ENCSR000CDC").unwrap();

    assert_eq!(resolver.client().experiment_calls(), 2);
    assert!(!Arc::ptr_eq(&first, &refreshed));
    assert_eq!(first.as_ref(), refreshed.as_ref());
}

#[test]
fn evict_resets_state_and_keeps_handles() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = MetadataResolver::new(&config(temp.path()), client());
    let handle = resolver.resolve("ENCSR000CDC", None).unwrap();

    assert!(resolver.evict("ENCSR000CDC").unwrap());
    assert!(!resolver.evict("ENCSR000CDC").unwrap());
    assert_eq!(resolver.state(&acc("ENCSR000CDC")), ResolveState::Unresolved);
    assert!(!temp.path().join("metadata/SR/ENCSR000CDC.json").exists());
    assert_eq!(handle.files().len(), 2);

    resolver.resolve("ENCSR000CDC", None).unwrap();
    assert_eq!(resolver.client().experiment_calls(), 2);
}

#[test]
fn disabled_cache_skips_disk() {
    let temp = tempfile::tempdir().unwrap();
    let mut config = config(temp.path());
    config.use_cache = false;
    let resolver = MetadataResolver::new(&config, client());

    resolver.resolve("ENCSR000CDC", None).unwrap();
    assert!(!temp.path().join("metadata").exists());
    assert_eq!(resolver.stats().unwrap().total_entries, 0);
}

#[test]
fn experiment_without_files_is_valid() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockCatalog::default().with_experiment(experiment_record("ENCSR000EMP", Vec::new()));
    let resolver = MetadataResolver::new(&config(temp.path()), client);

    let metadata = resolver.resolve("ENCSR000EMP", None).unwrap();
    assert!(metadata.files().is_empty());

    let reread = MetadataResolver::new(&config(temp.path()), MockCatalog::default());
    assert!(reread.resolve("ENCSR000EMP", None).unwrap().files().is_empty());
}

#[test]
fn hint_fills_missing_fields() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockCatalog::default()
        .with_experiment(json!({"accession": "ENCSR000HNT", "status": "released", "files": []}));
    let resolver = MetadataResolver::new(&config(temp.path()), client);
    let hint = ExperimentSummary {
        accession: acc("ENCSR000HNT"),
        organism: Some("Mus musculus".to_string()),
        assay_title: Some("ATAC-seq".to_string()),
        biosample_summary: Some("liver".to_string()),
        biosample_term_name: None,
        lab: None,
        status: "released".into(),
        targets: Vec::new(),
        description: "mouse liver".to_string(),
        replicate_count: 2,
        link: String::new(),
    };

    let metadata = resolver.resolve("ENCSR000HNT", Some(&hint)).unwrap();
    assert_eq!(metadata.summary().organism.as_deref(), Some("Mus musculus"));
    assert_eq!(metadata.summary().description, "mouse liver");
    assert_eq!(metadata.summary().replicate_count, 0);
}

#[test]
fn clear_all_empties_store_and_slots() {
    let temp = tempfile::tempdir().unwrap();
    let resolver = MetadataResolver::new(&config(temp.path()), client());
    resolver.resolve("ENCSR000CDC", None).unwrap();
    assert_eq!(resolver.stats().unwrap().total_entries, 1);

    resolver.clear_all().unwrap();
    assert_eq!(resolver.stats().unwrap().total_entries, 0);
    assert_eq!(resolver.state(&acc("ENCSR000CDC")), ResolveState::Unresolved);
}
