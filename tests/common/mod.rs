#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde_json::{Value, json};

use encode_catalog::config::CatalogConfig;
use encode_catalog::domain::Accession;
use encode_catalog::error::EncodeError;
use encode_catalog::remote::{CatalogClient, ExperimentPage};

pub const PORTAL: &str = "https://portal.test";

#[derive(Default)]
pub struct MockCatalog {
    pub records: Vec<Value>,
    pub experiments: HashMap<String, Value>,
    pub fail_bulk: bool,
    pub failing_urls: Vec<String>,
    pub page_delay: Option<Duration>,
    pub page_calls: Mutex<usize>,
    pub experiment_calls: Mutex<usize>,
    pub download_calls: Mutex<usize>,
}

impl MockCatalog {
    pub fn with_records(records: Vec<Value>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_experiment(mut self, record: Value) -> Self {
        let accession = record["accession"].as_str().unwrap().to_string();
        self.experiments.insert(accession, record);
        self
    }

    pub fn page_calls(&self) -> usize {
        *self.page_calls.lock().unwrap()
    }

    pub fn experiment_calls(&self) -> usize {
        *self.experiment_calls.lock().unwrap()
    }

    pub fn download_calls(&self) -> usize {
        *self.download_calls.lock().unwrap()
    }
}

impl CatalogClient for MockCatalog {
    fn fetch_experiment_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<ExperimentPage, EncodeError> {
        *self.page_calls.lock().unwrap() += 1;
        if let Some(delay) = self.page_delay {
            std::thread::sleep(delay);
        }
        if self.fail_bulk {
            return Err(EncodeError::RemoteStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        let start = offset.min(self.records.len());
        let end = (offset + limit).min(self.records.len());
        Ok(ExperimentPage {
            records: self.records[start..end].to_vec(),
            total: Some(self.records.len()),
        })
    }

    fn fetch_experiment(&self, accession: &Accession) -> Result<Option<Value>, EncodeError> {
        *self.experiment_calls.lock().unwrap() += 1;
        Ok(self.experiments.get(accession.as_str()).cloned())
    }

    fn download_file(&self, url: &str, destination: &Path) -> Result<u64, EncodeError> {
        *self.download_calls.lock().unwrap() += 1;
        if self.failing_urls.iter().any(|failing| url.contains(failing)) {
            fs::write(destination, b"partial").unwrap();
            return Err(EncodeError::RemoteHttp(format!("connection reset for {url}")));
        }
        let body = format!("content of {url}");
        fs::write(destination, body.as_bytes())
            .map_err(|err| EncodeError::Filesystem(err.to_string()))?;
        Ok(body.len() as u64)
    }
}

pub fn config(root: &Path) -> CatalogConfig {
    let mut config =
        CatalogConfig::with_cache_root(Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap());
    config.base_url = PORTAL.to_string();
    config
}

pub fn summary_record(accession: &str, biosample: &str, status: &str) -> Value {
    json!({
        "accession": accession,
        "assay_title": "TF ChIP-seq",
        "biosample_summary": biosample,
        "status": status,
        "target": {"label": "CTCF"},
        "lab": {"title": "Bradley Bernstein, Broad"},
        "replicates": [
            {"library": {"biosample": {"organism": {"scientific_name": "Homo sapiens"}}}}
        ]
    })
}

pub fn file(accession: &str, file_type: &str, status: &str, released: Option<&str>) -> Value {
    let mut value = json!({
        "@id": format!("/files/{accession}/"),
        "accession": accession,
        "file_type": file_type,
        "file_format": file_type,
        "output_type": "alignments",
        "output_category": "alignment",
        "status": status,
        "href": format!("/files/{accession}/@@download/{accession}.{file_type}"),
        "file_size": 1024
    });
    if let Some(released) = released {
        value["date_released"] = json!(released);
    }
    value
}

pub fn experiment_record(accession: &str, files: Vec<Value>) -> Value {
    let mut record = summary_record(accession, "CD20+ B cells", "released");
    record["files"] = Value::Array(files);
    record["description"] = json!("CTCF ChIP-seq on human B cells");
    record
}
