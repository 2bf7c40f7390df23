use std::fmt;
use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format_bytes;

/// Outcome of a completed scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Safe,
    Dangerous,
}

impl Verdict {
    pub fn is_dangerous(self) -> bool {
        matches!(self, Verdict::Dangerous)
    }
}

impl From<bool> for Verdict {
    fn from(dangerous: bool) -> Self {
        if dangerous { Verdict::Dangerous } else { Verdict::Safe }
    }
}

/// Snapshot of a finished scan. Produced once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub file_name: String,
    /// Resolved location of the scanned archive
    pub location: PathBuf,
    pub sha256: String,
    pub scanned_at: DateTime<Utc>,
    pub message: String,
    pub dangerous: bool,
    /// On-disk size of the root archive
    pub compressed_size: u64,
    /// Sum of uncompressed sizes of every non-archive entry visited
    pub uncompressed_size: u64,
    pub ratio: f64,
    pub nested_archives: u32,
    pub nested_levels: u32,
    pub symlinks: bool,
    pub directory_traversal: bool,
    pub killswitch: bool,
}

impl ScanReport {
    pub fn verdict(&self) -> Verdict {
        Verdict::from(self.dangerous)
    }

    /// Key/value pairs in the order they are printed.
    pub fn lines(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Message", self.message.clone()),
            ("Dangerous", self.dangerous.to_string()),
            (
                "Compression ratio",
                format!("{:.2} Compressed size: {}", self.ratio, format_bytes(self.compressed_size)),
            ),
            ("Uncompressed size", format_bytes(self.uncompressed_size)),
            ("Nested zips", self.nested_archives.to_string()),
            ("Nested levels", self.nested_levels.to_string()),
            ("Symlinks", self.symlinks.to_string()),
            ("Directory traversal", self.directory_traversal.to_string()),
        ]
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.lines() {
            writeln!(f, "\t{} = {}", key, value)?;
        }
        write!(f, "\tLocation: {}", self.location.display())
    }
}
