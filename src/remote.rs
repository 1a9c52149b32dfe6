use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::config::CatalogConfig;
use crate::domain::Accession;
use crate::error::EncodeError;

/// One page of the bulk experiment listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExperimentPage {
    #[serde(rename = "@graph", default)]
    pub records: Vec<Value>,
    #[serde(default)]
    pub total: Option<usize>,
}

pub trait CatalogClient: Send + Sync {
    fn fetch_experiment_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<ExperimentPage, EncodeError>;
    /// `Ok(None)` when the catalog has no record for `accession`.
    fn fetch_experiment(&self, accession: &Accession) -> Result<Option<Value>, EncodeError>;
    /// Streams `url` into `destination`, returning the byte count.
    fn download_file(&self, url: &str, destination: &Path) -> Result<u64, EncodeError>;
}

#[derive(Clone)]
pub struct EncodeHttpClient {
    client: Client,
    base_url: String,
}

impl EncodeHttpClient {
    pub fn new(config: &CatalogConfig) -> Result<Self, EncodeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("encode-cat/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EncodeError::RemoteHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| EncodeError::RemoteHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn handle_status(response: Response) -> Result<Response, EncodeError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "catalog request failed".to_string());
        Err(EncodeError::RemoteStatus { status, message })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, EncodeError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "retrying catalog request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(error = %err, attempt, "retrying catalog request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(EncodeError::RemoteHttp(err.to_string()));
                }
            }
        }
    }
}

impl CatalogClient for EncodeHttpClient {
    fn fetch_experiment_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<ExperimentPage, EncodeError> {
        let url = format!("{}/search/", self.base_url);
        let limit = limit.to_string();
        let offset = offset.to_string();
        let response = self.send_with_retries(|| {
            self.client.get(&url).query(&[
                ("type", "Experiment"),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("from", offset.as_str()),
            ])
        })?;
        // the search endpoint answers 404 for an empty result set
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ExperimentPage::default());
        }
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| EncodeError::RemoteHttp(err.to_string()))
    }

    fn fetch_experiment(&self, accession: &Accession) -> Result<Option<Value>, EncodeError> {
        let url = format!("{}/experiments/{}/", self.base_url, accession.as_str());
        let response = self.send_with_retries(|| {
            self.client
                .get(&url)
                .query(&[("format", "json"), ("frame", "embedded")])
        })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::handle_status(response)?;
        let record: Value = response
            .json()
            .map_err(|err| EncodeError::RemoteHttp(err.to_string()))?;
        Ok(record.is_object().then_some(record))
    }

    fn download_file(&self, url: &str, destination: &Path) -> Result<u64, EncodeError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = Self::handle_status(response)?;
        let mut file =
            File::create(destination).map_err(|err| EncodeError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| EncodeError::RemoteHttp(err.to_string()))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
