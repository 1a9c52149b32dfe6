use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

static ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ENC[A-Z]{2}[0-9]{3}[A-Z]{3}$").unwrap());

/// Catalog accession such as `ENCSR000CDC` (experiment) or `ENCFF001JZK` (file).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two type letters after the `ENC` marker, e.g. `SR` or `FF`.
    pub fn type_code(&self) -> &str {
        &self.0[3..5]
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = EncodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !ACCESSION_RE.is_match(&normalized) {
            return Err(EncodeError::InvalidIdentifier(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for Accession {
    type Error = EncodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Accession> for String {
    fn from(value: Accession) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExperimentStatus {
    Released,
    Archived,
    Revoked,
    Other(String),
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ExperimentStatus::Released => "released",
            ExperimentStatus::Archived => "archived",
            ExperimentStatus::Revoked => "revoked",
            ExperimentStatus::Other(raw) => raw,
        }
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self, ExperimentStatus::Revoked)
    }
}

impl From<&str> for ExperimentStatus {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "released" => ExperimentStatus::Released,
            "archived" => ExperimentStatus::Archived,
            "revoked" => ExperimentStatus::Revoked,
            _ => ExperimentStatus::Other(value.to_string()),
        }
    }
}

impl From<String> for ExperimentStatus {
    fn from(value: String) -> Self {
        ExperimentStatus::from(value.as_str())
    }
}

impl From<ExperimentStatus> for String {
    fn from(value: ExperimentStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which summary field a search term is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Biosample,
    Target,
}
