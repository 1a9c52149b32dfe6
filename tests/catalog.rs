mod common;

use std::collections::BTreeSet;

use assert_matches::assert_matches;
use serde_json::json;

use common::{PORTAL, experiment_record, file};
use encode_catalog::catalog::{FileCatalog, RELEASED};
use encode_catalog::error::EncodeError;
use encode_catalog::model::ExperimentMetadata;

fn metadata() -> ExperimentMetadata {
    let mut untyped = file("ENCFF000UNT", "bed", "released", Some("2019-03-03"));
    untyped.as_object_mut().unwrap().remove("file_type");
    untyped.as_object_mut().unwrap().remove("output_category");

    let mut peaks = file("ENCFF000PKS", "bed", "released", Some("2020-01-01T09:30:00.000000+00:00"));
    peaks["output_type"] = json!("conservative IDR thresholded peaks");
    peaks["output_category"] = json!("annotation");

    let mut absolute = file("ENCFF000ABS", "bigWig", "released", Some("2021-07-07"));
    absolute["href"] = json!("https://mirror.test/ENCFF000ABS.bigWig");

    let record = experiment_record(
        "ENCSR000CDC",
        vec![
            file("ENCFF001JZK", "bam", "released", Some("2012-01-01")),
            file("ENCFF002JZK", "bam", "released", Some("2019-12-31")),
            file("ENCFF003OLD", "bam", "archived", Some("2020-06-01")),
            file("ENCFF004NDT", "fastq", "released", None),
            peaks,
            untyped,
            absolute,
        ],
    );
    ExperimentMetadata::from_record(record, PORTAL).unwrap()
}

fn accessions(files: &[&encode_catalog::model::FileRecord]) -> Vec<String> {
    files.iter().map(|file| file.accession.clone()).collect()
}

#[test]
fn unknown_file_is_absent() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);
    assert!(catalog.file_metadata("ENCFF_UNKNOWN").is_none());
    assert!(catalog.file_url("ENCFF_UNKNOWN").is_none());
}

#[test]
fn groups_cover_every_released_file_once() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);
    let groups = catalog.files_by_type(None, RELEASED).unwrap();

    let grouped: Vec<String> = groups.values().flat_map(|files| accessions(files)).collect();
    let unique: BTreeSet<&String> = grouped.iter().collect();
    assert_eq!(grouped.len(), unique.len());

    let released: BTreeSet<String> = metadata
        .files()
        .iter()
        .filter(|file| file.status.as_deref() == Some(RELEASED))
        .map(|file| file.accession.clone())
        .collect();
    assert_eq!(unique.into_iter().cloned().collect::<BTreeSet<_>>(), released);
    assert_eq!(accessions(&groups["unknown"]), vec!["ENCFF000UNT"]);
}

#[test]
fn after_date_is_inclusive() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);
    let groups = catalog.files_by_type(Some("2020-01-01"), RELEASED).unwrap();

    assert_eq!(accessions(&groups["bed"]), vec!["ENCFF000PKS"]);
    assert_eq!(accessions(&groups["bigWig"]), vec!["ENCFF000ABS"]);
    assert!(!groups.contains_key("bam"));
    // no release date
    assert!(!groups.contains_key("fastq"));
}

#[test]
fn status_filter_replaces_released() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);
    let groups = catalog.files_by_type(None, "archived").unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(accessions(&groups["bam"]), vec!["ENCFF003OLD"]);
}

#[test]
fn malformed_after_date_is_rejected() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);
    assert_matches!(
        catalog.files_by_type(Some("01/01/2020"), RELEASED),
        Err(EncodeError::InvalidDate(_))
    );
    assert_matches!(
        catalog.accessions_by_type(Some("2020-13-01"), None),
        Err(EncodeError::InvalidDate(_))
    );
}

#[test]
fn distinct_values_are_sorted() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);
    assert_eq!(
        catalog.file_types(),
        vec!["bam", "bed", "bigWig", "fastq", "unknown"]
    );
    assert_eq!(catalog.output_categories(), vec!["alignment", "annotation"]);
    assert_eq!(
        catalog.output_types(),
        vec!["alignments", "conservative IDR thresholded peaks"]
    );
}

#[test]
fn file_types_match_released_groups() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);
    let groups = catalog.files_by_type(None, RELEASED).unwrap();
    let keys: Vec<String> = groups.keys().cloned().collect();
    assert_eq!(catalog.file_types(), keys);
}

#[test]
fn accession_groupings_respect_allow_lists() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);

    let by_type = catalog.accessions_by_type(None, Some(&["bam", "cram"][..])).unwrap();
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type["bam"], vec!["ENCFF001JZK", "ENCFF002JZK"]);

    let by_category = catalog.accessions_by_output_category(None);
    assert_eq!(by_category["unknown"], vec!["ENCFF000UNT"]);
    assert_eq!(by_category["annotation"], vec!["ENCFF000PKS"]);

    let by_output = catalog.accessions_by_output_type(Some(&["conservative IDR thresholded peaks"][..]));
    assert_eq!(by_output.len(), 1);
    assert!(catalog.accessions_by_output_type(Some(&["signal"][..])).is_empty());
}

#[test]
fn file_url_joins_portal_unless_absolute() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);
    assert_eq!(
        catalog.file_url("ENCFF001JZK").as_deref(),
        Some("https://portal.test/files/ENCFF001JZK/@@download/ENCFF001JZK.bam")
    );
    assert_eq!(
        catalog.file_url("ENCFF000ABS").as_deref(),
        Some("https://mirror.test/ENCFF000ABS.bigWig")
    );
    let archived = catalog.file_metadata("ENCFF003OLD").unwrap();
    assert_eq!(archived.status.as_deref(), Some("archived"));
}

#[test]
fn summary_caps_files_but_not_count() {
    let metadata = metadata();
    let catalog = FileCatalog::new(&metadata, PORTAL);
    let summary = catalog.summary(Some(1)).unwrap();
    assert_eq!(summary["bam"].count, 2);
    assert_eq!(summary["bam"].files.len(), 1);

    let full = catalog.summary(None).unwrap();
    assert_eq!(full["bam"].files.len(), 2);
}
