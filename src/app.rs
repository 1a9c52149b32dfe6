use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::catalog::FileCatalog;
use crate::config::CatalogConfig;
use crate::domain::{Accession, SearchField};
use crate::download::{DownloadOrchestrator, DownloadReport, FileSelection};
use crate::error::EncodeError;
use crate::index::{ExperimentIndex, LoadOptions};
use crate::model::{ExperimentMetadata, ExperimentSummary};
use crate::remote::CatalogClient;
use crate::resolver::MetadataResolver;
use crate::search::{SampleRow, SearchFilters};
use crate::store::{CacheLayout, CacheStats};

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub total: usize,
    pub offset: usize,
    pub experiments: Vec<ExperimentSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    pub experiments: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub index_snapshot: Option<String>,
    pub metadata: CacheStats,
    pub size_mb: f64,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Entry point tying config, index, resolver and downloads together.
pub struct Catalog<C: CatalogClient> {
    config: CatalogConfig,
    layout: CacheLayout,
    resolver: MetadataResolver<C>,
    index: Mutex<Option<Arc<ExperimentIndex>>>,
}

impl<C: CatalogClient> Catalog<C> {
    pub fn new(config: CatalogConfig, client: C) -> Self {
        let layout = CacheLayout::new(config.cache_root.clone());
        let resolver = MetadataResolver::new(&config, client);
        Self {
            config,
            layout,
            resolver,
            index: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn resolver(&self) -> &MetadataResolver<C> {
        &self.resolver
    }

    /// Loads the index on first use. The slot is not held during the load, so
    /// metadata resolution on other threads keeps going.
    pub fn index(&self) -> Result<Arc<ExperimentIndex>, EncodeError> {
        if let Some(index) = self.index_slot().as_ref() {
            return Ok(Arc::clone(index));
        }
        let loaded = Arc::new(self.load_index(false)?);
        let mut slot = self.index_slot();
        Ok(Arc::clone(slot.get_or_insert(loaded)))
    }

    pub fn search(
        &self,
        term: &str,
        field: SearchField,
        filters: &SearchFilters,
    ) -> Result<Vec<ExperimentSummary>, EncodeError> {
        let index = self.index()?;
        Ok(index
            .search_by_field(term, field, None, filters)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn search_by_organism(
        &self,
        organism: &str,
        term: Option<&str>,
        filters: &SearchFilters,
    ) -> Result<Vec<ExperimentSummary>, EncodeError> {
        let index = self.index()?;
        Ok(index
            .search_by_organism(organism, term, None, filters)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn samples_table(
        &self,
        organism: Option<&str>,
        assay_types: Option<&[String]>,
    ) -> Result<Vec<SampleRow>, EncodeError> {
        Ok(self.index()?.samples_table(organism, assay_types))
    }

    pub fn list_experiments(&self, offset: usize, limit: usize) -> Result<ListResult, EncodeError> {
        let index = self.index()?;
        Ok(ListResult {
            total: index.len(),
            offset,
            experiments: index.page(offset, limit).to_vec(),
        })
    }

    /// Uses an already loaded index row as a hint; never loads the index itself.
    pub fn experiment(&self, accession: &str) -> Result<Arc<ExperimentMetadata>, EncodeError> {
        let hint = self.loaded_hint(accession);
        self.resolver.resolve(accession, hint.as_ref())
    }

    pub fn file_catalog<'a>(&'a self, metadata: &'a ExperimentMetadata) -> FileCatalog<'a> {
        FileCatalog::new(metadata, &self.config.base_url)
    }

    /// Downloads into `output_dir`, or `<files_dir>/<accession>` when omitted.
    pub fn download(
        &self,
        accession: &str,
        output_dir: Option<&Utf8Path>,
        selection: &FileSelection,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, EncodeError> {
        let parsed: Accession = accession.parse()?;
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => self.default_download_dir(&parsed),
        };
        let hint = self.loaded_hint(accession);
        DownloadOrchestrator::new(&self.resolver).download(
            parsed.as_str(),
            &output_dir,
            selection,
            hint.as_ref(),
            sink,
        )
    }

    pub fn default_download_dir(&self, accession: &Accession) -> Utf8PathBuf {
        self.config.files_dir.join(accession.as_str())
    }

    pub fn cache_stats(&self) -> Result<StatsResult, EncodeError> {
        let metadata = self.resolver.stats()?;
        let snapshot = self.layout.snapshot_path();
        Ok(StatsResult {
            index_snapshot: snapshot
                .as_std_path()
                .is_file()
                .then(|| snapshot.to_string()),
            size_mb: metadata.size_mb(),
            metadata,
        })
    }

    pub fn clear_one(&self, accession: &str) -> Result<ClearResult, EncodeError> {
        let cleared = self.resolver.evict(accession)?;
        Ok(ClearResult { cleared })
    }

    pub fn clear_all(&self) -> Result<ClearResult, EncodeError> {
        self.resolver.clear_all()?;
        Ok(ClearResult { cleared: true })
    }

    /// Removes the snapshot file; an index already in memory stays usable.
    pub fn clear_index(&self) -> Result<ClearResult, EncodeError> {
        let cleared = ExperimentIndex::clear_cache(&self.layout)?;
        Ok(ClearResult { cleared })
    }

    pub fn refresh_one(&self, accession: &str) -> Result<Arc<ExperimentMetadata>, EncodeError> {
        self.resolver.refresh(accession)
    }

    /// Refetches the index only; cached experiment metadata is left alone.
    pub fn refresh_index(&self) -> Result<RefreshResult, EncodeError> {
        let index = Arc::new(self.load_index(true)?);
        let experiments = index.len();
        *self.index_slot() = Some(index);
        info!(experiments, "refreshed experiment index");
        Ok(RefreshResult { experiments })
    }

    fn load_index(&self, force_refresh: bool) -> Result<ExperimentIndex, EncodeError> {
        ExperimentIndex::load(
            &self.config,
            self.resolver.client(),
            LoadOptions {
                force_refresh,
                use_cache: self.config.use_cache,
            },
        )
    }

    fn loaded_hint(&self, accession: &str) -> Option<ExperimentSummary> {
        let accession: Accession = accession.parse().ok()?;
        self.index_slot()
            .as_ref()
            .and_then(|index| index.get(&accession).cloned())
    }

    fn index_slot(&self) -> MutexGuard<'_, Option<Arc<ExperimentIndex>>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
