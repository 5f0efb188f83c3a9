// error.rs - Errors raised while generating a production batch

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::campaign::Artifact;

/// Generator result type
pub type Result<T> = std::result::Result<T, Error>;

/// Generator errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("template not found: {}", path.display())]
    TemplateNotFound { path: PathBuf },

    #[error("cannot read template {}: {source}", path.display())]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed template {name}: {reason} at byte {offset}")]
    MalformedTemplate {
        name: String,
        offset: usize,
        reason: &'static str,
    },

    #[error("missing substitution key `{key}` in {template}")]
    MissingSubstitutionKey { template: String, key: String },

    #[error("invalid {param} `{value}` (expected one of: {})", allowed.join(", "))]
    InvalidCampaignVariant {
        param: &'static str,
        value: String,
        allowed: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot create directory {}: {source}", path.display())]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write manifest {}: {source}", path.display())]
    ManifestWriteFailed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("iteration {index}, {artifact}: {source}")]
    Artifact {
        index: usize,
        artifact: Artifact,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Tag an error with the iteration and artifact that produced it.
    pub fn at(self, index: usize, artifact: Artifact) -> Self {
        Error::Artifact { index, artifact, source: Box::new(self) }
    }

    /// The underlying error, with any iteration tagging stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Artifact { source, .. } => source.root(),
            other => other,
        }
    }
}
