use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;
use crate::domain::Accession;
use crate::error::EncodeError;
use crate::model::{self, ExperimentMetadata, ExperimentSummary};
use crate::remote::CatalogClient;
use crate::store::{CacheLayout, CacheStats, DiskCache, ShardScheme};

/// Resolution state of one accession as seen by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveState {
    Unresolved,
    Resolving,
    Cached,
    Failed,
}

#[derive(Debug)]
enum Slot {
    Resolving,
    Cached(Arc<ExperimentMetadata>),
    Failed,
}

impl Slot {
    fn state(&self) -> ResolveState {
        match self {
            Slot::Resolving => ResolveState::Resolving,
            Slot::Cached(_) => ResolveState::Cached,
            Slot::Failed => ResolveState::Failed,
        }
    }
}

/// Accession to full metadata: memory, then disk, then the remote catalog.
///
/// Concurrent resolutions of the same accession may both reach the remote;
/// the disk entry is last-writer-wins.
pub struct MetadataResolver<C: CatalogClient> {
    client: C,
    cache: DiskCache,
    portal_url: String,
    use_cache: bool,
    slots: Mutex<HashMap<Accession, Slot>>,
    corrupt_reads: AtomicU64,
    write_failures: AtomicU64,
}

impl<C: CatalogClient> MetadataResolver<C> {
    pub fn new(config: &CatalogConfig, client: C) -> Self {
        let layout = CacheLayout::new(config.cache_root.clone());
        Self {
            client,
            cache: DiskCache::new(layout.metadata_root(), ShardScheme::TYPE_PREFIX),
            portal_url: config.base_url.clone(),
            use_cache: config.use_cache,
            slots: Mutex::new(HashMap::new()),
            corrupt_reads: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn portal_url(&self) -> &str {
        &self.portal_url
    }

    pub fn resolve(
        &self,
        accession: &str,
        hint: Option<&ExperimentSummary>,
    ) -> Result<Arc<ExperimentMetadata>, EncodeError> {
        let accession: Accession = accession.parse()?;
        {
            let mut slots = self.slots();
            if let Some(Slot::Cached(metadata)) = slots.get(&accession) {
                return Ok(Arc::clone(metadata));
            }
            slots.insert(accession.clone(), Slot::Resolving);
        }

        let result = self.load(&accession, hint);
        self.settle(accession, result)
    }

    /// Always refetches and overwrites the cache entry.
    pub fn refresh(&self, accession: &str) -> Result<Arc<ExperimentMetadata>, EncodeError> {
        let accession: Accession = accession.parse()?;
        let previous = {
            let mut slots = self.slots();
            match slots.insert(accession.clone(), Slot::Resolving) {
                Some(Slot::Cached(metadata)) => Some(metadata),
                _ => None,
            }
        };
        let hint = previous.as_deref().map(ExperimentMetadata::summary);
        let result = self.fetch_remote(&accession, hint);
        self.settle(accession, result)
    }

    /// Returns whether a disk entry was removed. Handles already returned stay valid.
    pub fn evict(&self, accession: &str) -> Result<bool, EncodeError> {
        let accession: Accession = accession.parse()?;
        self.slots().remove(&accession);
        let removed = self.cache.delete(accession.as_str())?;
        info!(experiment = %accession, removed, "evicted experiment metadata");
        Ok(removed)
    }

    pub fn clear_all(&self) -> Result<(), EncodeError> {
        self.slots().clear();
        self.cache.delete_all()?;
        info!(path = %self.cache.root(), "cleared metadata cache");
        Ok(())
    }

    pub fn state(&self, accession: &Accession) -> ResolveState {
        self.slots()
            .get(accession)
            .map(Slot::state)
            .unwrap_or(ResolveState::Unresolved)
    }

    pub fn stats(&self) -> Result<CacheStats, EncodeError> {
        self.cache.stats()
    }

    /// Cache documents that could not be parsed and were refetched.
    pub fn corrupt_reads(&self) -> u64 {
        self.corrupt_reads.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Accession, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(
        &self,
        accession: Accession,
        result: Result<ExperimentMetadata, EncodeError>,
    ) -> Result<Arc<ExperimentMetadata>, EncodeError> {
        let mut slots = self.slots();
        match result {
            Ok(metadata) => {
                let metadata = Arc::new(metadata);
                slots.insert(accession, Slot::Cached(Arc::clone(&metadata)));
                Ok(metadata)
            }
            Err(err) => {
                slots.insert(accession, Slot::Failed);
                Err(err)
            }
        }
    }

    fn load(
        &self,
        accession: &Accession,
        hint: Option<&ExperimentSummary>,
    ) -> Result<ExperimentMetadata, EncodeError> {
        if self.use_cache
            && let Some(metadata) = self.read_cached(accession)
        {
            return Ok(metadata.with_hint(hint));
        }
        self.fetch_remote(accession, hint)
    }

    /// Any unusable entry is a miss.
    fn read_cached(&self, accession: &Accession) -> Option<ExperimentMetadata> {
        let document = match self.cache.get(accession.as_str()) {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!(experiment = %accession, "metadata cache miss");
                return None;
            }
            Err(err @ EncodeError::CacheCorrupt { .. }) => {
                self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "discarding corrupt metadata cache entry");
                return None;
            }
            Err(err) => {
                warn!(experiment = %accession, error = %err, "metadata cache unreadable");
                return None;
            }
        };

        if !model::files_are_embedded(&document) {
            debug!(experiment = %accession, "cached files are not embedded, refetching");
            return None;
        }
        match ExperimentMetadata::from_record(document, &self.portal_url) {
            Ok(metadata) if metadata.accession() == accession => {
                debug!(experiment = %accession, "metadata cache hit");
                Some(metadata)
            }
            Ok(_) => {
                self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
                warn!(experiment = %accession, "cache entry holds another accession");
                None
            }
            Err(err) => {
                self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
                warn!(experiment = %accession, error = %err, "discarding invalid metadata cache entry");
                None
            }
        }
    }

    fn fetch_remote(
        &self,
        accession: &Accession,
        hint: Option<&ExperimentSummary>,
    ) -> Result<ExperimentMetadata, EncodeError> {
        let start = Instant::now();
        let record: Value = self
            .client
            .fetch_experiment(accession)?
            .ok_or_else(|| EncodeError::NotFound(accession.to_string()))?;
        let metadata = ExperimentMetadata::from_record(record, &self.portal_url)?.with_hint(hint);
        if metadata.accession() != accession {
            warn!(
                experiment = %accession,
                returned = %metadata.accession(),
                "catalog returned a different experiment"
            );
            return Err(EncodeError::NotFound(accession.to_string()));
        }
        info!(
            experiment = %accession,
            files = metadata.files().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fetched experiment metadata"
        );

        if self.use_cache
            && let Err(err) = self.cache.put(accession.as_str(), &metadata.to_document())
        {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(experiment = %accession, error = %err, "could not cache experiment metadata");
        }
        Ok(metadata)
    }
}
