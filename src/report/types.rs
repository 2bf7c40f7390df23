use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::types::ScanReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub report: Option<ScanReport>,
    /// Why the archive could not be scanned
    pub error: Option<String>,
}

/// Scan outcomes keyed by archive path, persisted as JSON.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReportDatabase {
    pub archives: BTreeMap<String, ReportEntry>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub total: usize,
    pub safe: usize,
    pub dangerous: usize,
    pub failed: usize,
}
