use thiserror::Error;

/// Errors raised by the core data model and match engine.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid regex for pattern {name}: {source}")]
    InvalidRegex {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("pattern not found: {0}")]
    PatternNotFound(String),
}
