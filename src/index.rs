use std::fs;
use std::io;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::CatalogConfig;
use crate::domain::{Accession, SearchField};
use crate::error::EncodeError;
use crate::fs_util;
use crate::model::ExperimentSummary;
use crate::remote::CatalogClient;
use crate::search::{self, SampleRow, SearchFilters};
use crate::store::CacheLayout;

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub force_refresh: bool,
    pub use_cache: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            use_cache: true,
        }
    }
}

/// Where the current index contents came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    Snapshot,
    Remote,
}

/// Snapshot files written before summaries were persisted directly.
#[derive(Deserialize)]
struct LegacySnapshot {
    experiments: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ExperimentIndex {
    experiments: Vec<ExperimentSummary>,
    source: IndexSource,
}

impl ExperimentIndex {
    pub fn from_summaries(experiments: Vec<ExperimentSummary>) -> Self {
        Self {
            experiments,
            source: IndexSource::Remote,
        }
    }

    pub fn load<C: CatalogClient>(
        config: &CatalogConfig,
        client: &C,
        options: LoadOptions,
    ) -> Result<Self, EncodeError> {
        let layout = CacheLayout::new(config.cache_root.clone());
        let snapshot_path = layout.snapshot_path();

        if options.use_cache && !options.force_refresh {
            let start = Instant::now();
            match read_snapshot(&snapshot_path, &config.base_url) {
                Ok(Some(experiments)) => {
                    info!(
                        count = experiments.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "loaded experiment index from snapshot"
                    );
                    return Ok(Self {
                        experiments,
                        source: IndexSource::Snapshot,
                    });
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "unreadable index snapshot, refetching"),
            }
        }

        let start = Instant::now();
        let experiments = fetch_all(config, client)?;
        info!(
            count = experiments.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded experiment index from catalog"
        );

        let index = Self {
            experiments,
            source: IndexSource::Remote,
        };
        if options.use_cache {
            match index.write_to(&snapshot_path) {
                Ok(()) => info!(path = %snapshot_path, "cached experiment index"),
                Err(err) => warn!(error = %err, "could not cache experiment index"),
            }
        }
        Ok(index)
    }

    /// Exports the current list to `path`, independent of the managed snapshot.
    pub fn save(&self, path: &Utf8Path) -> Result<Utf8PathBuf, EncodeError> {
        self.write_to(path)?;
        info!(count = self.experiments.len(), path = %path, "saved experiment index");
        Ok(path.to_path_buf())
    }

    /// Deletes the managed snapshot only; per-experiment metadata is untouched.
    pub fn clear_cache(layout: &CacheLayout) -> Result<bool, EncodeError> {
        let path = layout.snapshot_path();
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => {
                info!(path = %path, "cleared index snapshot");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(EncodeError::Filesystem(err.to_string())),
        }
    }

    pub fn experiments(&self) -> &[ExperimentSummary] {
        &self.experiments
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    pub fn source(&self) -> IndexSource {
        self.source
    }

    pub fn get(&self, accession: &Accession) -> Option<&ExperimentSummary> {
        self.experiments
            .iter()
            .find(|summary| &summary.accession == accession)
    }

    pub fn page(&self, offset: usize, limit: usize) -> &[ExperimentSummary] {
        let start = offset.min(self.experiments.len());
        let end = start.saturating_add(limit).min(self.experiments.len());
        &self.experiments[start..end]
    }

    /// Searches `candidates`, or the whole index when none are given.
    pub fn search_by_field<'a>(
        &'a self,
        term: &str,
        field: SearchField,
        candidates: Option<&'a [ExperimentSummary]>,
        filters: &SearchFilters,
    ) -> Vec<&'a ExperimentSummary> {
        search::search_by_field(
            term,
            field,
            candidates.unwrap_or(&self.experiments),
            filters,
        )
    }

    pub fn search_by_organism<'a>(
        &'a self,
        organism: &str,
        term: Option<&str>,
        candidates: Option<&'a [ExperimentSummary]>,
        filters: &SearchFilters,
    ) -> Vec<&'a ExperimentSummary> {
        search::search_by_organism(
            organism,
            term,
            candidates.unwrap_or(&self.experiments),
            filters,
        )
    }

    pub fn samples_table(
        &self,
        organism: Option<&str>,
        assay_types: Option<&[String]>,
    ) -> Vec<SampleRow> {
        search::samples_table(&self.experiments, organism, assay_types)
    }

    fn write_to(&self, path: &Utf8Path) -> Result<(), EncodeError> {
        let content = serde_json::to_vec(&self.experiments)
            .map_err(|err| EncodeError::Serialization(err.to_string()))?;
        fs_util::write_atomic(path.as_std_path(), &content)
    }
}

fn read_snapshot(
    path: &Utf8Path,
    portal_url: &str,
) -> Result<Option<Vec<ExperimentSummary>>, EncodeError> {
    let content = match fs::read(path.as_std_path()) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(EncodeError::Filesystem(err.to_string())),
    };
    match serde_json::from_slice::<Vec<ExperimentSummary>>(&content) {
        Ok(experiments) => Ok(Some(experiments)),
        Err(err) if content.trim_ascii_start().starts_with(b"{") => {
            let legacy: LegacySnapshot =
                serde_json::from_slice(&content).map_err(|_| EncodeError::CacheCorrupt {
                    key: path.to_string(),
                    message: err.to_string(),
                })?;
            Ok(Some(summarize(&legacy.experiments, portal_url)))
        }
        Err(err) => Err(EncodeError::CacheCorrupt {
            key: path.to_string(),
            message: err.to_string(),
        }),
    }
}

fn fetch_all<C: CatalogClient>(
    config: &CatalogConfig,
    client: &C,
) -> Result<Vec<ExperimentSummary>, EncodeError> {
    let mut experiments = Vec::new();
    let mut offset = 0usize;
    loop {
        let page = client.fetch_experiment_page(offset, config.page_size)?;
        let fetched = page.records.len();
        experiments.extend(summarize(&page.records, &config.base_url));
        offset += fetched;
        tracing::debug!(offset, total = ?page.total, "fetched experiment page");

        let reached_total = page.total.is_some_and(|total| offset >= total);
        if fetched < config.page_size || reached_total {
            break;
        }
    }
    Ok(experiments)
}

fn summarize(records: &[Value], portal_url: &str) -> Vec<ExperimentSummary> {
    records
        .iter()
        .filter_map(
            |record| match ExperimentSummary::from_record(record, portal_url) {
                Ok(summary) => Some(summary),
                Err(err) => {
                    warn!(error = %err, "skipping catalog record");
                    None
                }
            },
        )
        .collect()
}
