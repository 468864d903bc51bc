//! Failure taxonomy for a single evidence job.
//!
//! Every variant is local to one `(environment, job)` pair. The orchestrator
//! records the variant's [`EvidenceError::category`] and message in the run
//! summary and moves on; nothing here is retried.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    /// A credential or secret variable required by an environment is unset or empty.
    #[error("environment {environment}: required variable {variable} is not set")]
    CredentialsMissing {
        environment: String,
        variable: String,
    },

    /// The external command could not be launched or exited nonzero.
    #[error("command {program} failed: {detail}")]
    Execution { program: String, detail: String },

    /// Network failure, non-2xx status, or an external call exceeding its timeout.
    #[error("transport failure for {target}: {detail}")]
    Transport { target: String, detail: String },

    /// The call succeeded but its output was not the expected JSON shape.
    #[error("unparseable output from {source_label}: {detail}")]
    Parse {
        source_label: String,
        detail: String,
    },

    /// A destination template still contains a placeholder after substitution.
    #[error("path template {template:?}: {detail}")]
    PathResolution { template: String, detail: String },

    /// A page after the first failed, so the collected evidence would be incomplete.
    #[error("pagination stopped after {pages_fetched} page(s): {source}")]
    PartialPagination {
        pages_fetched: usize,
        #[source]
        source: Box<EvidenceError>,
    },

    /// The artifact could not be persisted.
    #[error("write {}: {source}", path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EvidenceError {
    /// Stable label used in summaries and logs.
    pub fn category(&self) -> &'static str {
        match self {
            EvidenceError::CredentialsMissing { .. } => "credentials_missing",
            EvidenceError::Execution { .. } => "execution",
            EvidenceError::Transport { .. } => "transport",
            EvidenceError::Parse { .. } => "parse",
            EvidenceError::PathResolution { .. } => "path_resolution",
            EvidenceError::PartialPagination { .. } => "partial_pagination",
            EvidenceError::ArtifactWrite { .. } => "artifact_write",
        }
    }

    pub(crate) fn parse(source_label: impl Into<String>, detail: impl Into<String>) -> Self {
        EvidenceError::Parse {
            source_label: source_label.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        EvidenceError::ArtifactWrite {
            path: path.to_path_buf(),
            source,
        }
    }
}
