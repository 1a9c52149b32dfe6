use camino::Utf8PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EncodeError {
    #[error("invalid accession: {0}")]
    #[diagnostic(help("accessions look like ENCSR000CDC or ENCFF001JZK"))]
    InvalidIdentifier(String),

    #[error("no catalog record for {0}")]
    NotFound(String),

    #[error("corrupt cache entry {key}: {message}")]
    CacheCorrupt { key: String, message: String },

    #[error("catalog request failed: {0}")]
    RemoteHttp(String),

    #[error("catalog returned status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("invalid date {0}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EncodeError {
    /// Both a malformed accession and a missing record mean "no such experiment".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EncodeError::NotFound(_) | EncodeError::InvalidIdentifier(_)
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            EncodeError::RemoteHttp(_) | EncodeError::RemoteStatus { .. }
        )
    }
}
