//! Error taxonomy shared by the counters, the history and the storage backends.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TallyError>;

#[derive(Debug, Error)]
pub enum TallyError {
    /// Zero, negative or non-finite delta. Indicates a caller bug, never surfaced to users.
    #[error("increment must be positive, got {delta}")]
    InvalidIncrement { delta: f64 },

    #[error("can't merge day {found} into day {expected}")]
    DayMismatch {
        expected: NaiveDate,
        found: NaiveDate,
    },

    #[error("io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failure in {context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("remote blob of {size} bytes doesn't fit into quota of {quota} bytes")]
    QuotaExceeded { size: usize, quota: usize },

    #[error("reconciler is no longer running")]
    ChannelClosed,
}

impl TallyError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }
}
