use rusqlite::ErrorCode;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading a single input file.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data root does not exist or is not a directory: {0:?}")]
    MissingRoot(PathBuf),

    #[error("Malformed input in {path:?}{}: {reason}", at_line(.line))]
    MalformedInput {
        path: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    #[error("Timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A write or lookup failed for one record of a line-oriented file.
    #[error("Storage error in {path:?} at line {line}: {source}")]
    RecordStorage {
        path: PathBuf,
        line: usize,
        #[source]
        source: rusqlite::Error,
    },
}

fn at_line(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(" at line {}", line),
        None => String::new(),
    }
}

impl EtlError {
    pub fn malformed(path: impl Into<PathBuf>, line: Option<usize>, reason: impl Into<String>) -> Self {
        EtlError::MalformedInput {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    /// Wraps a storage error with the record's 1-based line number.
    pub fn at_record(path: &Path, line: usize) -> impl FnOnce(rusqlite::Error) -> Self + '_ {
        move |source| EtlError::RecordStorage {
            path: path.to_path_buf(),
            line,
            source,
        }
    }

    /// Transient storage contention is worth retrying; everything else
    /// fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        let source = match self {
            EtlError::Storage(source) | EtlError::RecordStorage { source, .. } => source,
            _ => return false,
        };
        match source {
            rusqlite::Error::SqliteFailure(err, _) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
