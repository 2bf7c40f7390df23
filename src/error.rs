use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a single scan or extraction operation.
///
/// A dangerous verdict is not one of these: `scan` reports it through
/// [`crate::Verdict`]. Only `extract_all` escalates it to
/// [`DefuseError::MaliciousDetected`].
#[derive(Debug, Error)]
pub enum DefuseError {
    #[error("archive not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("a scan has to complete before this operation")]
    NotScanned,

    #[error("session already scanned, create a new session to scan again")]
    AlreadyScanned,

    #[error("archive ruled malicious: {0}")]
    MaliciousDetected(String),

    #[error("{0} is not supported on this platform")]
    UnsupportedPlatform(&'static str),

    #[error("integrity check failed for {} at entry {entry}", path.display())]
    Corrupted { path: PathBuf, entry: String },

    #[error("not a readable zip archive {}: {reason}", path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DefuseError>;
