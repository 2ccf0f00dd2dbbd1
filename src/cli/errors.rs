use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Input not found: {path}")]
    InputNotFound { path: String },

    #[error("{failed} of {total} operations failed")]
    BatchFailed { failed: usize, total: usize },

    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Satmatch(#[from] satmatch::Error),
}
