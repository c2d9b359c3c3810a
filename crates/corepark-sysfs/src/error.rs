use std::path::PathBuf;

use thiserror::Error;

pub type SysfsResult<T> = Result<T, SysfsError>;

/// Failures while reading the host topology.
#[derive(Debug, Error)]
pub enum SysfsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected content in {path}: {content:?}")]
    Parse { path: PathBuf, content: String },
}
