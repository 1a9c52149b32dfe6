use serde::Serialize;

use crate::domain::SearchField;
use crate::model::ExperimentSummary;

/// Narrowing predicates applied after the field match.
#[derive(Debug, Clone)]
pub struct SearchFilters {
    pub organism: Option<String>,
    pub assay_title: Option<String>,
    pub target: Option<String>,
    pub exclude_revoked: bool,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            organism: None,
            assay_title: None,
            target: None,
            exclude_revoked: true,
        }
    }
}

impl SearchFilters {
    pub fn organism(mut self, organism: impl Into<String>) -> Self {
        self.organism = Some(organism.into());
        self
    }

    pub fn assay_title(mut self, assay_title: impl Into<String>) -> Self {
        self.assay_title = Some(assay_title.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn include_revoked(mut self) -> Self {
        self.exclude_revoked = false;
        self
    }

    fn admits(&self, summary: &ExperimentSummary, field: Option<SearchField>) -> bool {
        if self.exclude_revoked && summary.status.is_revoked() {
            return false;
        }
        if let Some(organism) = &self.organism
            && !eq_ignore_case(summary.organism.as_deref(), organism)
        {
            return false;
        }
        if let Some(assay) = &self.assay_title
            && !eq_ignore_case(summary.assay_title.as_deref(), assay)
        {
            return false;
        }
        // a target search already matched on targets
        if field != Some(SearchField::Target)
            && let Some(target) = &self.target
            && !contains_ignore_case(&summary.target_text(), target)
        {
            return false;
        }
        true
    }
}

/// Case-insensitive substring search over `candidates`, preserving their order.
pub fn search_by_field<'a>(
    term: &str,
    field: SearchField,
    candidates: &'a [ExperimentSummary],
    filters: &SearchFilters,
) -> Vec<&'a ExperimentSummary> {
    let term = term.trim();
    candidates
        .iter()
        .filter(|summary| field_matches(summary, field, term))
        .filter(|summary| filters.admits(summary, Some(field)))
        .collect()
}

/// Experiments from one organism, optionally narrowed by a biosample term.
pub fn search_by_organism<'a>(
    organism: &str,
    term: Option<&str>,
    candidates: &'a [ExperimentSummary],
    filters: &SearchFilters,
) -> Vec<&'a ExperimentSummary> {
    let term = term.map(str::trim).unwrap_or_default();
    candidates
        .iter()
        .filter(|summary| eq_ignore_case(summary.organism.as_deref(), organism.trim()))
        .filter(|summary| field_matches(summary, SearchField::Biosample, term))
        .filter(|summary| filters.admits(summary, None))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRow {
    pub accession: String,
    pub organism: Option<String>,
    pub assay: Option<String>,
    pub description: String,
    pub biosample: Option<String>,
    pub lab: Option<String>,
    pub status: String,
    pub url: String,
}

impl From<&ExperimentSummary> for SampleRow {
    fn from(summary: &ExperimentSummary) -> Self {
        Self {
            accession: summary.accession.to_string(),
            organism: summary.organism.clone(),
            assay: summary.assay_title.clone(),
            description: summary.description.clone(),
            biosample: summary.biosample_summary.clone(),
            lab: summary.lab.clone(),
            status: summary.status.to_string(),
            url: summary.link.clone(),
        }
    }
}

pub fn samples_table(
    candidates: &[ExperimentSummary],
    organism: Option<&str>,
    assay_types: Option<&[String]>,
) -> Vec<SampleRow> {
    candidates
        .iter()
        .filter(|summary| {
            organism.is_none_or(|organism| eq_ignore_case(summary.organism.as_deref(), organism))
        })
        .filter(|summary| {
            assay_types.is_none_or(|assays| {
                assays
                    .iter()
                    .any(|assay| eq_ignore_case(summary.assay_title.as_deref(), assay))
            })
        })
        .map(SampleRow::from)
        .collect()
}

fn field_matches(summary: &ExperimentSummary, field: SearchField, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    match field {
        SearchField::Biosample => [&summary.biosample_summary, &summary.biosample_term_name]
            .into_iter()
            .flatten()
            .any(|text| contains_ignore_case(text, term)),
        SearchField::Target => contains_ignore_case(&summary.target_text(), term),
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn eq_ignore_case(value: Option<&str>, expected: &str) -> bool {
    value.is_some_and(|value| value.to_lowercase() == expected.to_lowercase())
}
