//! Error taxonomy for a metrics collection run.
//!
//! Run-level failures (missing credential, a failed runs fetch, an unwritable output file)
//! are `DoraError`s and terminate the process with a non-zero exit code. Failures of a
//! single pull-request lookup are deliberately *not* represented here: they are logged and
//! the sample is skipped.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoraError {
    #[error("invalid configuration: {0}")]
    Config(#[from] envy::Error),

    #[error("GitHub token not found; set GH_PAT or GH_TOKEN")]
    MissingToken,

    #[error("GitHub API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("GitHub request failed: {0}")]
    Transport(#[source] octocrab::Error),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DoraError {
    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::MissingToken => 10,
            Self::Json(_) => 20,
            Self::Io { .. } => 30,
            Self::Api { .. } | Self::Transport(_) => 40,
        }
    }
}

impl From<octocrab::Error> for DoraError {
    fn from(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => Self::Api {
                status: source.status_code.as_u16(),
                message: source.message,
            },
            other => Self::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DoraError>;
