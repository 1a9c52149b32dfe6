use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{Accession, ExperimentStatus};
use crate::error::EncodeError;

/// Lightweight row of the experiment index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub accession: Accession,
    #[serde(default)]
    pub organism: Option<String>,
    #[serde(default)]
    pub assay_title: Option<String>,
    #[serde(default)]
    pub biosample_summary: Option<String>,
    #[serde(default)]
    pub biosample_term_name: Option<String>,
    #[serde(default)]
    pub lab: Option<String>,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub replicate_count: usize,
    pub link: String,
}

impl ExperimentSummary {
    /// Derives a summary from a raw catalog record. `portal_url` builds the permalink.
    pub fn from_record(record: &Value, portal_url: &str) -> Result<Self, EncodeError> {
        let accession: Accession = record
            .get("accession")
            .and_then(Value::as_str)
            .ok_or_else(|| EncodeError::InvalidIdentifier("<missing accession>".to_string()))?
            .parse()?;
        let replicates = record.get("replicates").and_then(Value::as_array);

        Ok(Self {
            link: format!("{portal_url}/experiments/{accession}/"),
            organism: extract_organism(record),
            assay_title: string_field(record, "assay_title"),
            biosample_summary: string_field(record, "biosample_summary"),
            biosample_term_name: record
                .get("biosample_ontology")
                .and_then(|value| value.get("term_name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            lab: match record.get("lab") {
                Some(Value::Object(lab)) => {
                    lab.get("title").and_then(Value::as_str).map(str::to_string)
                }
                Some(Value::String(lab)) => Some(lab.clone()),
                _ => None,
            },
            status: record
                .get("status")
                .and_then(Value::as_str)
                .map(ExperimentStatus::from)
                .unwrap_or_else(|| ExperimentStatus::Other("unknown".to_string())),
            targets: extract_targets(record),
            description: string_field(record, "description").unwrap_or_default(),
            replicate_count: replicates.map(Vec::len).unwrap_or(0),
            accession,
        })
    }

    /// Target names joined as one searchable string.
    pub fn target_text(&self) -> String {
        self.targets.join(", ")
    }

    fn fill_missing_from(&mut self, hint: &ExperimentSummary) {
        if self.organism.is_none() {
            self.organism = hint.organism.clone();
        }
        if self.assay_title.is_none() {
            self.assay_title = hint.assay_title.clone();
        }
        if self.biosample_summary.is_none() {
            self.biosample_summary = hint.biosample_summary.clone();
        }
        if self.biosample_term_name.is_none() {
            self.biosample_term_name = hint.biosample_term_name.clone();
        }
        if self.lab.is_none() {
            self.lab = hint.lab.clone();
        }
        if self.targets.is_empty() {
            self.targets = hint.targets.clone();
        }
        if self.description.is_empty() {
            self.description = hint.description.clone();
        }
    }
}

/// Full experiment record plus its parsed file list. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentMetadata {
    summary: ExperimentSummary,
    record: Map<String, Value>,
    files: Vec<FileRecord>,
}

impl ExperimentMetadata {
    pub fn from_record(record: Value, portal_url: &str) -> Result<Self, EncodeError> {
        let summary = ExperimentSummary::from_record(&record, portal_url)?;
        let Value::Object(record) = record else {
            return Err(EncodeError::Serialization(format!(
                "record for {} is not an object",
                summary.accession
            )));
        };
        let files = match record.get("files").and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .filter_map(|item| {
                    let file = FileRecord::from_value(item);
                    if file.is_none() {
                        debug!(experiment = %summary.accession, "skipping unembedded file entry");
                    }
                    file
                })
                .collect(),
            None => Vec::new(),
        };
        Ok(Self {
            summary,
            record,
            files,
        })
    }

    pub(crate) fn with_hint(mut self, hint: Option<&ExperimentSummary>) -> Self {
        if let Some(hint) = hint.filter(|hint| hint.accession == self.summary.accession) {
            self.summary.fill_missing_from(hint);
        }
        self
    }

    pub fn accession(&self) -> &Accession {
        &self.summary.accession
    }

    pub fn summary(&self) -> &ExperimentSummary {
        &self.summary
    }

    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// The document persisted in the metadata cache.
    pub fn to_document(&self) -> Value {
        Value::Object(self.record.clone())
    }
}

/// Whether a record's `files` are embedded objects rather than bare references.
pub fn files_are_embedded(record: &Value) -> bool {
    match record.get("files").and_then(Value::as_array) {
        Some(files) => files
            .iter()
            .all(|file| file.get("accession").and_then(Value::as_str).is_some()),
        None => true,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub accession: String,
    pub filename: Option<String>,
    pub file_type: Option<String>,
    pub file_format: Option<String>,
    pub output_type: Option<String>,
    pub output_category: Option<String>,
    pub file_size: Option<u64>,
    pub status: Option<String>,
    pub assembly: Option<String>,
    pub genome_annotation: Option<String>,
    pub derived_from: Vec<String>,
    pub date_released: Option<String>,
    pub date_created: Option<String>,
    pub md5sum: Option<String>,
    pub content_md5sum: Option<String>,
    pub href: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const TYPED_FILE_FIELDS: &[&str] = &[
    "accession",
    "filename",
    "file_type",
    "file_format",
    "output_type",
    "output_category",
    "file_size",
    "status",
    "assembly",
    "genome_annotation",
    "derived_from",
    "date_released",
    "date_created",
    "md5sum",
    "content_md5sum",
    "href",
];

impl FileRecord {
    /// `None` when the value is not an embedded file object with an accession.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let accession = object.get("accession")?.as_str()?.to_string();
        let href = string_field(value, "href");
        let filename = string_field(value, "filename")
            .or_else(|| {
                href.as_deref()
                    .and_then(|href| href.split_once("@@download/"))
                    .map(|(_, name)| name.to_string())
            })
            .or_else(|| {
                string_field(value, "submitted_file_name")
                    .and_then(|name| name.rsplit(['/', '\\']).next().map(str::to_string))
            })
            .filter(|name| !name.is_empty());

        let extra = object
            .iter()
            .filter(|(key, _)| !key.starts_with('@') && !TYPED_FILE_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Some(Self {
            accession,
            filename,
            file_type: string_field(value, "file_type"),
            file_format: string_field(value, "file_format"),
            output_type: string_field(value, "output_type"),
            output_category: string_field(value, "output_category"),
            file_size: object.get("file_size").and_then(Value::as_u64),
            status: string_field(value, "status"),
            assembly: string_field(value, "assembly"),
            genome_annotation: string_field(value, "genome_annotation"),
            derived_from: object
                .get("derived_from")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(reference_accession).collect())
                .unwrap_or_default(),
            date_released: string_field(value, "date_released"),
            date_created: string_field(value, "date_created"),
            md5sum: string_field(value, "md5sum"),
            content_md5sum: string_field(value, "content_md5sum"),
            href,
            extra,
        })
    }

    pub fn file_type_or_unknown(&self) -> &str {
        self.file_type.as_deref().unwrap_or("unknown")
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// `/files/ENCFF001JZK/` or `{"accession": "ENCFF001JZK"}` -> `ENCFF001JZK`.
fn reference_accession(value: &Value) -> Option<String> {
    match value {
        Value::String(path) => path
            .trim_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string),
        Value::Object(object) => object
            .get("accession")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn extract_organism(record: &Value) -> Option<String> {
    record
        .get("replicates")?
        .as_array()?
        .iter()
        .find_map(|replicate| {
            replicate
                .get("library")?
                .get("biosample")?
                .get("organism")?
                .get("scientific_name")?
                .as_str()
                .map(str::to_string)
        })
}

fn extract_targets(record: &Value) -> Vec<String> {
    let label = |value: &Value| -> Option<String> {
        match value {
            Value::Object(target) => target
                .get("label")
                .and_then(Value::as_str)
                .filter(|label| !label.is_empty())
                .map(str::to_string),
            Value::String(target) if !target.is_empty() => Some(target.clone()),
            _ => None,
        }
    };
    match record.get("target") {
        Some(Value::Array(targets)) => targets.iter().filter_map(label).collect(),
        Some(target) => label(target).into_iter().collect(),
        None => Vec::new(),
    }
}
