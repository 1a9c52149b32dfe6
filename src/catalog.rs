use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::EncodeError;
use crate::model::{ExperimentMetadata, FileRecord};

pub const RELEASED: &str = "released";
const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Serialize)]
pub struct TypeSummary<'a> {
    pub count: usize,
    pub files: Vec<&'a FileRecord>,
}

/// Read-only projections over the files of one experiment.
pub struct FileCatalog<'a> {
    metadata: &'a ExperimentMetadata,
    portal_url: &'a str,
}

impl<'a> FileCatalog<'a> {
    pub fn new(metadata: &'a ExperimentMetadata, portal_url: &'a str) -> Self {
        Self {
            metadata,
            portal_url,
        }
    }

    /// Files with `status`, released on or after `after_date`, grouped by file type.
    pub fn files_by_type(
        &self,
        after_date: Option<&str>,
        status: &str,
    ) -> Result<BTreeMap<String, Vec<&'a FileRecord>>, EncodeError> {
        let after_date = after_date.map(validate_date).transpose()?;
        let mut groups: BTreeMap<String, Vec<&'a FileRecord>> = BTreeMap::new();
        for file in self.metadata.files() {
            if file.status.as_deref() != Some(status) {
                continue;
            }
            if let Some(after) = after_date {
                let Some(released) = file.date_released.as_deref() else {
                    continue;
                };
                if date_prefix(released) < after {
                    continue;
                }
            }
            groups
                .entry(file.file_type_or_unknown().to_string())
                .or_default()
                .push(file);
        }
        Ok(groups)
    }

    /// Same keys as `files_by_type(None, RELEASED)`, `unknown` included.
    pub fn file_types(&self) -> Vec<String> {
        self.distinct(|file| Some(file.file_type_or_unknown()))
    }

    pub fn output_categories(&self) -> Vec<String> {
        self.distinct(|file| file.output_category.as_deref())
    }

    pub fn output_types(&self) -> Vec<String> {
        self.distinct(|file| file.output_type.as_deref())
    }

    pub fn accessions_by_type(
        &self,
        after_date: Option<&str>,
        file_types: Option<&[&str]>,
    ) -> Result<BTreeMap<String, Vec<String>>, EncodeError> {
        let groups = self.files_by_type(after_date, RELEASED)?;
        Ok(groups
            .into_iter()
            .filter(|(file_type, _)| allowed(file_types, file_type))
            .map(|(file_type, files)| (file_type, dedup_accessions(files)))
            .collect())
    }

    pub fn accessions_by_output_category(
        &self,
        categories: Option<&[&str]>,
    ) -> BTreeMap<String, Vec<String>> {
        self.group_released(|file| file.output_category.as_deref(), categories)
    }

    pub fn accessions_by_output_type(
        &self,
        output_types: Option<&[&str]>,
    ) -> BTreeMap<String, Vec<String>> {
        self.group_released(|file| file.output_type.as_deref(), output_types)
    }

    pub fn file_metadata(&self, accession: &str) -> Option<&'a FileRecord> {
        self.metadata
            .files()
            .iter()
            .find(|file| file.accession == accession)
    }

    pub fn file_url(&self, accession: &str) -> Option<String> {
        let href = self.file_metadata(accession)?.href.as_deref()?;
        if href.starts_with("http://") || href.starts_with("https://") {
            return Some(href.to_string());
        }
        Some(format!("{}{}", self.portal_url, href))
    }

    /// Released files per type; `files` is capped at `max_per_type`, `count` is not.
    pub fn summary(
        &self,
        max_per_type: Option<usize>,
    ) -> Result<BTreeMap<String, TypeSummary<'a>>, EncodeError> {
        let groups = self.files_by_type(None, RELEASED)?;
        Ok(groups
            .into_iter()
            .map(|(file_type, files)| {
                let count = files.len();
                let files = match max_per_type {
                    Some(max) => files.into_iter().take(max).collect(),
                    None => files,
                };
                (file_type, TypeSummary { count, files })
            })
            .collect())
    }

    fn released(&self) -> impl Iterator<Item = &'a FileRecord> {
        self.metadata
            .files()
            .iter()
            .filter(|file| file.status.as_deref() == Some(RELEASED))
    }

    fn distinct<F>(&self, key: F) -> Vec<String>
    where
        F: Fn(&FileRecord) -> Option<&str>,
    {
        let values: BTreeSet<&str> = self.released().filter_map(|file| key(file)).collect();
        values.into_iter().map(str::to_string).collect()
    }

    fn group_released<F>(&self, key: F, allow: Option<&[&str]>) -> BTreeMap<String, Vec<String>>
    where
        F: Fn(&FileRecord) -> Option<&str>,
    {
        let mut groups: BTreeMap<String, Vec<&FileRecord>> = BTreeMap::new();
        for file in self.released() {
            let group = key(file).unwrap_or(UNKNOWN);
            if allowed(allow, group) {
                groups.entry(group.to_string()).or_default().push(file);
            }
        }
        groups
            .into_iter()
            .map(|(group, files)| (group, dedup_accessions(files)))
            .collect()
    }
}

/// Parses `YYYY-MM-DD`, returning the input for lexicographic comparison.
fn validate_date(value: &str) -> Result<&str, EncodeError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .filter(|_| value.len() == 10)
        .map(|_| value)
        .ok_or_else(|| EncodeError::InvalidDate(value.to_string()))
}

fn date_prefix(value: &str) -> &str {
    value.get(..10).unwrap_or(value)
}

fn allowed(allow: Option<&[&str]>, key: &str) -> bool {
    allow.is_none_or(|allow| allow.contains(&key))
}

fn dedup_accessions(files: Vec<&FileRecord>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut accessions = Vec::new();
    for file in files {
        if seen.insert(file.accession.as_str()) {
            accessions.push(file.accession.clone());
        }
    }
    accessions
}
