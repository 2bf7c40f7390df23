use std::path::Path;
use anyhow::Result;
use log;

use super::types::{BatchStats, ReportDatabase, ReportEntry};
use crate::types::ScanReport;

impl ReportDatabase {
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            log::debug!("Loading existing report database from: {}", path.display());
            let file = std::fs::File::open(path)?;
            let db: Self = serde_json::from_reader(file)?;
            log::debug!("Loaded report database with {} archives", db.archives.len());
            Ok(db)
        } else {
            log::debug!("Report database not found, creating new one: {}", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        log::debug!("Saving report database with {} archives to: {}", self.archives.len(), path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                log::debug!("Creating parent directory: {}", parent.display());
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        log::debug!("Report database saved successfully");
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&ReportEntry> {
        self.archives.get(&path.to_string_lossy().to_string())
    }

    pub fn record_report(&mut self, path: &Path, report: &ScanReport) {
        self.archives.insert(
            path.to_string_lossy().to_string(),
            ReportEntry {
                report: Some(report.clone()),
                error: None,
            },
        );
    }

    pub fn record_failure(&mut self, path: &Path, error: &str) {
        self.archives.insert(
            path.to_string_lossy().to_string(),
            ReportEntry {
                report: None,
                error: Some(error.to_string()),
            },
        );
    }

    pub fn get_stats(&self) -> BatchStats {
        let mut stats = BatchStats {
            total: self.archives.len(),
            ..Default::default()
        };

        for entry in self.archives.values() {
            match &entry.report {
                Some(report) if report.dangerous => stats.dangerous += 1,
                Some(_) => stats.safe += 1,
                None => stats.failed += 1,
            }
        }

        stats
    }
}
