use thiserror::Error;

#[derive(Error, Debug)]
pub enum TsMergeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed stream in {path}: {reason}")]
    MalformedStream { path: String, reason: String },

    #[error("incompatible segment {path}: expected {expected}, found {found}")]
    IncompatibleSegment {
        path: String,
        expected: String,
        found: String,
    },

    #[error("inconsistent cache at {path}: partial length {len} matches no segment prefix")]
    CacheInconsistent { path: String, len: u64 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("merge cancelled")]
    Cancelled,

    #[error("invalid state for {op}: {state}")]
    InvalidState { op: &'static str, state: String },
}

impl TsMergeError {
    /// Builds a `MalformedStream` error for the given file path.
    pub fn malformed(path: impl AsRef<std::path::Path>, reason: impl Into<String>) -> Self {
        Self::MalformedStream {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TsMergeError>;
