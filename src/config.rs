use std::fs;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

pub const DEFAULT_BASE_URL: &str = "https://www.encodeproject.org";
pub const DEFAULT_CONFIG_FILE: &str = "encode-catalog.json";
pub const CACHE_DIR_ENV: &str = "ENCODE_CACHE_DIR";

/// Settings file as written by users; every key is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub cache_root: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub use_cache: Option<bool>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub files_dir: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub cache_root: Utf8PathBuf,
    pub base_url: String,
    pub use_cache: bool,
    pub page_size: usize,
    pub files_dir: Utf8PathBuf,
    pub request_timeout_secs: u64,
}

impl CatalogConfig {
    pub fn with_cache_root(cache_root: Utf8PathBuf) -> Self {
        Self {
            cache_root,
            base_url: DEFAULT_BASE_URL.to_string(),
            use_cache: true,
            page_size: 1000,
            files_dir: Utf8PathBuf::from("files"),
            request_timeout_secs: 120,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `encode-catalog.json` from the working directory when it
    /// exists, falling back to defaults otherwise.
    pub fn resolve(path: Option<&str>) -> Result<CatalogConfig, EncodeError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let file = if path.is_none() && !config_path.as_std_path().exists() {
            ConfigFile::default()
        } else {
            let content = fs::read_to_string(config_path.as_std_path())
                .map_err(|_| EncodeError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| EncodeError::ConfigParse(err.to_string()))?
        };

        let env_root = std::env::var(CACHE_DIR_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        Self::resolve_config(file, env_root)
    }

    pub fn resolve_config(
        file: ConfigFile,
        env_cache_root: Option<String>,
    ) -> Result<CatalogConfig, EncodeError> {
        let cache_root = match env_cache_root.or(file.cache_root) {
            Some(root) => Utf8PathBuf::from(root),
            None => default_cache_root()?,
        };

        let mut config = CatalogConfig::with_cache_root(cache_root);
        if let Some(base_url) = file.base_url {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(use_cache) = file.use_cache {
            config.use_cache = use_cache;
        }
        if let Some(page_size) = file.page_size {
            if page_size == 0 {
                return Err(EncodeError::ConfigParse(
                    "page_size must be greater than zero".to_string(),
                ));
            }
            config.page_size = page_size;
        }
        if let Some(files_dir) = file.files_dir {
            config.files_dir = Utf8PathBuf::from(files_dir);
        }
        if let Some(timeout) = file.request_timeout_secs {
            config.request_timeout_secs = timeout;
        }
        Ok(config)
    }
}

pub fn default_cache_root() -> Result<Utf8PathBuf, EncodeError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join(".encode_cache")).ok())
        .ok_or_else(|| EncodeError::Filesystem("unable to resolve cache directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_root_wins_over_file() {
        let file = ConfigFile {
            cache_root: Some("/from/file".to_string()),
            ..ConfigFile::default()
        };
        let config = ConfigLoader::resolve_config(file, Some("/from/env".to_string())).unwrap();
        assert_eq!(config.cache_root, Utf8PathBuf::from("/from/env"));
        assert!(config.use_cache);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let file = ConfigFile {
            cache_root: Some("/tmp/c".to_string()),
            base_url: Some("https://test.encodedcc.org/".to_string()),
            ..ConfigFile::default()
        };
        let config = ConfigLoader::resolve_config(file, None).unwrap();
        assert_eq!(config.base_url, "https://test.encodedcc.org");
    }
}
