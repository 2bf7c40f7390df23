use std::path::PathBuf;
use chrono::{DateTime, Utc};
use log::debug;

use super::types::TraversalSnapshot;
use crate::config::ScanConfiguration;
use crate::types::ScanReport;

pub const MESSAGE_SUCCESS: &str = "Success";
pub const MESSAGE_KILLSWITCH: &str =
    "Killswitch enabled due to too deep recursion or timeout, values collected are valid only to that point";

/// Facts about the root archive that the walk itself does not produce.
#[derive(Debug, Clone)]
pub struct ArchiveFacts {
    pub file_name: String,
    pub location: PathBuf,
    pub sha256: String,
    pub compressed_size: u64,
    pub scanned_at: DateTime<Utc>,
}

/// Turns traversal counters into a verdict. Any single trigger is enough.
pub struct RiskClassifier<'a> {
    config: &'a ScanConfiguration,
}

impl<'a> RiskClassifier<'a> {
    pub fn new(config: &'a ScanConfiguration) -> Self {
        Self { config }
    }

    pub fn compression_ratio(uncompressed: u64, compressed: u64) -> f64 {
        if compressed == 0 {
            0.0
        } else {
            uncompressed as f64 / compressed as f64
        }
    }

    pub fn is_dangerous(&self, snapshot: &TraversalSnapshot, ratio: f64) -> bool {
        let ratio_exceeded = ratio > self.config.ratio_threshold;
        let nested_exceeded = self
            .config
            .nested_zips_limit()
            .is_some_and(|limit| snapshot.nested_archive_count > limit);
        let symlinks = snapshot.symlink_found && !self.config.symlinks_allowed;
        let traversal = snapshot.traversal_path_found && !self.config.directory_traversal_allowed;

        debug!(
            "Triggers: ratio={} nested={} killswitch={} symlinks={} traversal={}",
            ratio_exceeded, nested_exceeded, snapshot.killswitch_triggered, symlinks, traversal
        );

        ratio_exceeded || nested_exceeded || snapshot.killswitch_triggered || symlinks || traversal
    }

    pub fn message(&self, snapshot: &TraversalSnapshot) -> String {
        if snapshot.killswitch_triggered {
            return MESSAGE_KILLSWITCH.to_string();
        }
        match self.config.nested_levels_limit() {
            Some(limit) if snapshot.max_depth_reached > limit => format!(
                "Aborted due to too deep recursion ({}>{})",
                snapshot.max_depth_reached, limit
            ),
            _ => MESSAGE_SUCCESS.to_string(),
        }
    }

    pub fn classify(&self, snapshot: &TraversalSnapshot, facts: ArchiveFacts) -> ScanReport {
        let ratio = Self::compression_ratio(snapshot.uncompressed_size, facts.compressed_size);
        let dangerous = self.is_dangerous(snapshot, ratio);

        ScanReport {
            file_name: facts.file_name,
            location: facts.location,
            sha256: facts.sha256,
            scanned_at: facts.scanned_at,
            message: self.message(snapshot),
            dangerous,
            compressed_size: facts.compressed_size,
            uncompressed_size: snapshot.uncompressed_size,
            ratio,
            nested_archives: snapshot.nested_archive_count,
            nested_levels: snapshot.max_depth_reached,
            symlinks: snapshot.symlink_found,
            directory_traversal: snapshot.traversal_path_found,
            killswitch: snapshot.killswitch_triggered,
        }
    }
}
