use std::path::PathBuf;

use crate::error::Result;
use crate::session::ScanSession;

/// Plain copy of the traversal counters taken once the walk has returned
/// or been cut off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalSnapshot {
    pub uncompressed_size: u64,
    pub nested_archive_count: u32,
    pub max_depth_reached: u32,
    pub traversal_path_found: bool,
    pub symlink_found: bool,
    pub killswitch_triggered: bool,
}

/// How the watchdog-bounded walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// The walker returned on its own with the root's nested count and deepest level
    Completed { nested: u32, deepest: u32 },
    /// The deadline passed and the killswitch was raised
    Killswitched,
}

/// Result of scanning one archive in a batch.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    /// The scanned session, or the error that stopped this file
    pub session: Result<ScanSession>,
}
