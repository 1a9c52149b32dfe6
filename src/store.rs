use std::collections::BTreeMap;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;

use crate::error::EncodeError;
use crate::fs_util;

pub const SNAPSHOT_FILE: &str = "experiments.json";
pub const METADATA_DIR: &str = "metadata";

/// Paths managed under one cache root.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: Utf8PathBuf,
}

impl CacheLayout {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn snapshot_path(&self) -> Utf8PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    pub fn metadata_root(&self) -> Utf8PathBuf {
        self.root.join(METADATA_DIR)
    }
}

/// Which characters of a key select its shard directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardScheme {
    pub prefix_len: usize,
    pub width: usize,
}

impl ShardScheme {
    /// `ENCSR000CDC` -> `SR`.
    pub const TYPE_PREFIX: ShardScheme = ShardScheme {
        prefix_len: 3,
        width: 2,
    };

    pub fn shard<'a>(&self, key: &'a str) -> Result<&'a str, EncodeError> {
        let end = self.prefix_len + self.width;
        key.get(self.prefix_len..end)
            .filter(|shard| !shard.contains(['/', '\\', '.']))
            .ok_or_else(|| EncodeError::InvalidIdentifier(key.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub cache_dir: String,
    pub total_entries: usize,
    pub total_bytes: u64,
    pub shard_counts: BTreeMap<String, usize>,
}

impl CacheStats {
    pub fn size_mb(&self) -> f64 {
        let mb = self.total_bytes as f64 / (1024.0 * 1024.0);
        (mb * 100.0).round() / 100.0
    }
}

/// JSON documents stored as `root/<shard>/<key>.json`.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: Utf8PathBuf,
    scheme: ShardScheme,
}

impl DiskCache {
    pub fn new(root: Utf8PathBuf, scheme: ShardScheme) -> Self {
        Self { root, scheme }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn entry_path(&self, key: &str) -> Result<Utf8PathBuf, EncodeError> {
        if key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(EncodeError::InvalidIdentifier(key.to_string()));
        }
        let shard = self.scheme.shard(key)?;
        Ok(self.root.join(shard).join(format!("{key}.json")))
    }

    pub fn put(&self, key: &str, document: &Value) -> Result<(), EncodeError> {
        let path = self.entry_path(key)?;
        let content = serde_json::to_vec(document)
            .map_err(|err| EncodeError::Serialization(err.to_string()))?;
        fs_util::write_atomic(path.as_std_path(), &content)
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>, EncodeError> {
        let path = self.entry_path(key)?;
        let content = match fs::read(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(EncodeError::Filesystem(err.to_string())),
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|err| EncodeError::CacheCorrupt {
                key: key.to_string(),
                message: err.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entry_path(key)
            .map(|path| path.as_std_path().is_file())
            .unwrap_or(false)
    }

    /// Returns whether an entry was removed.
    pub fn delete(&self, key: &str) -> Result<bool, EncodeError> {
        let path = self.entry_path(key)?;
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(EncodeError::Filesystem(err.to_string())),
        }
    }

    pub fn delete_all(&self) -> Result<(), EncodeError> {
        match fs::remove_dir_all(self.root.as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(EncodeError::Filesystem(err.to_string())),
        }
    }

    /// Walks the whole tree; keep it off hot paths.
    pub fn stats(&self) -> Result<CacheStats, EncodeError> {
        let mut stats = CacheStats {
            cache_dir: self.root.to_string(),
            ..CacheStats::default()
        };
        for path in fs_util::walk_files(self.root.as_std_path())? {
            let is_entry = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(fs_util::TEMP_PREFIX));
            if !is_entry {
                continue;
            }
            let Some(shard) = path
                .parent()
                .and_then(|dir| dir.file_name())
                .and_then(|name| name.to_str())
            else {
                continue;
            };
            let size = fs::metadata(&path)
                .map_err(|err| EncodeError::Filesystem(err.to_string()))?
                .len();
            stats.total_entries += 1;
            stats.total_bytes += size;
            *stats.shard_counts.entry(shard.to_string()).or_default() += 1;
        }
        Ok(stats)
    }
}
