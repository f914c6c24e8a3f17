use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the Change Detector and Tailer.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("watcher backend error: {0}")]
    Notify(#[from] notify::Error),
    #[error("non-utf8 content in {path}")]
    InvalidUtf8 { path: PathBuf },
}
