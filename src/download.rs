use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::{FileCatalog, RELEASED};
use crate::error::EncodeError;
use crate::fs_util;
use crate::model::{ExperimentSummary, FileRecord};
use crate::remote::CatalogClient;
use crate::resolver::MetadataResolver;

/// Which released files to fetch. Accessions win over file types; neither selects all.
#[derive(Debug, Clone, Default)]
pub struct FileSelection {
    pub file_types: Option<Vec<String>>,
    pub accessions: Option<Vec<String>>,
}

impl FileSelection {
    fn matches(&self, file: &FileRecord) -> bool {
        if let Some(accessions) = self.accessions.as_ref().filter(|list| !list.is_empty()) {
            return accessions
                .iter()
                .any(|accession| accession.eq_ignore_ascii_case(&file.accession));
        }
        if let Some(types) = self.file_types.as_ref().filter(|list| !list.is_empty()) {
            return types
                .iter()
                .any(|file_type| file_type == file.file_type_or_unknown());
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDownload {
    pub accession: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub downloaded: Vec<String>,
    pub failed: Vec<FailedDownload>,
    pub skipped: Vec<String>,
    pub output_dir: String,
}

pub struct DownloadOrchestrator<'a, C: CatalogClient> {
    resolver: &'a MetadataResolver<C>,
}

impl<'a, C: CatalogClient> DownloadOrchestrator<'a, C> {
    pub fn new(resolver: &'a MetadataResolver<C>) -> Self {
        Self { resolver }
    }

    /// Sequentially fetches the selection into `output_dir`. Per-file errors
    /// land in the report; only resolving the experiment can fail the call.
    pub fn download(
        &self,
        accession: &str,
        output_dir: &Utf8Path,
        selection: &FileSelection,
        hint: Option<&ExperimentSummary>,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, EncodeError> {
        let metadata = self.resolver.resolve(accession, hint)?;
        let catalog = FileCatalog::new(&metadata, self.resolver.portal_url());
        fs::create_dir_all(output_dir.as_std_path())
            .map_err(|err| EncodeError::Filesystem(err.to_string()))?;

        let mut report = DownloadReport {
            downloaded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            output_dir: output_dir.to_string(),
        };

        let selected: Vec<&FileRecord> = metadata
            .files()
            .iter()
            .filter(|file| file.status.as_deref() == Some(RELEASED))
            .filter(|file| selection.matches(file))
            .collect();
        let total = selected.len();
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Download; {total} files for {}", metadata.accession()),
            elapsed: None,
        });

        for (position, file) in selected.into_iter().enumerate() {
            let Some(name) = file.filename.as_deref() else {
                report.skipped.push(file.accession.clone());
                continue;
            };
            if fs_util::sanitize_filename(name) != Some(name) {
                report.failed.push(FailedDownload {
                    accession: file.accession.clone(),
                    reason: format!("unsafe filename {name}"),
                });
                continue;
            }

            let destination = output_dir.join(name);
            if destination.as_std_path().exists() {
                report.skipped.push(file.accession.clone());
                continue;
            }

            sink.event(ProgressEvent {
                message: format!("phase=Download; [{}/{total}] {name}", position + 1),
                elapsed: Some(start.elapsed()),
            });
            match self.fetch_one(&catalog, file, &destination) {
                Ok(bytes) => {
                    info!(file = %file.accession, bytes, path = %destination, "downloaded file");
                    report.downloaded.push(file.accession.clone());
                }
                Err(err) => {
                    warn!(file = %file.accession, error = %err, "download failed");
                    report.failed.push(FailedDownload {
                        accession: file.accession.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; downloaded={} skipped={} failed={}",
                report.downloaded.len(),
                report.skipped.len(),
                report.failed.len()
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    fn fetch_one(
        &self,
        catalog: &FileCatalog<'_>,
        file: &FileRecord,
        destination: &Utf8Path,
    ) -> Result<u64, EncodeError> {
        let url = catalog
            .file_url(&file.accession)
            .ok_or_else(|| EncodeError::NotFound(format!("download url for {}", file.accession)))?;
        let temp = Utf8PathBuf::from(format!("{destination}.tmp"));
        let result = self
            .resolver
            .client()
            .download_file(&url, temp.as_std_path())
            .and_then(|bytes| {
                fs::rename(temp.as_std_path(), destination.as_std_path())
                    .map(|()| bytes)
                    .map_err(|err| EncodeError::Filesystem(err.to_string()))
            });
        if result.is_err() {
            let _ = fs::remove_file(temp.as_std_path());
        }
        result
    }
}
