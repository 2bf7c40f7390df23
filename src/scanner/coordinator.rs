use std::path::{Path, PathBuf};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use log::{debug, warn};
use walkdir::WalkDir;

use super::types::FileOutcome;
use crate::config::ScanConfiguration;
use crate::error::{DefuseError, Result};
use crate::session::ScanSession;
use crate::utils;

/// Scans a single archive or every `.zip` directly inside a directory.
///
/// Each file gets its own session, so a dangerous verdict or an error on one
/// archive never affects the others.
pub struct ScanCoordinator<'a> {
    input: &'a Path,
    config: ScanConfiguration,
    jobs: usize,
}

impl<'a> ScanCoordinator<'a> {
    pub fn new(input: &'a Path, config: ScanConfiguration, jobs: usize) -> Self {
        Self {
            input,
            config,
            jobs: jobs.max(1),
        }
    }

    /// Archives to scan, in path order. Directories are listed one level deep.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.input.exists() {
            return Err(DefuseError::NotFound(self.input.to_path_buf()));
        }
        if !self.input.is_dir() {
            return Ok(vec![self.input.to_path_buf()]);
        }

        debug!("Finding zip archives in {}", self.input.display());
        let mut paths: Vec<PathBuf> = WalkDir::new(self.input)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| utils::matches_extension(e.path(), utils::NESTED_ARCHIVE_SUFFIX))
            .map(|e| e.path().to_owned())
            .collect();
        paths.sort();

        debug!("Found {} zip archives", paths.len());
        Ok(paths)
    }

    pub async fn run(&self, progress: ProgressBar) -> Result<Vec<FileOutcome>> {
        let paths = self.discover()?;
        progress.set_length(paths.len() as u64);

        let mut outcomes: Vec<FileOutcome> = stream::iter(paths)
            .map(|path| {
                let config = self.config.clone();
                let progress = progress.clone();
                async move {
                    let session = scan_file(&path, config).await;
                    if let Err(e) = &session {
                        warn!("Failed to scan {}: {}", path.display(), e);
                    }
                    progress.inc(1);
                    FileOutcome { path, session }
                }
            })
            .buffer_unordered(self.jobs)
            .collect()
            .await;

        outcomes.sort_by(|a, b| a.path.cmp(&b.path));
        progress.finish_with_message("Scan complete");
        Ok(outcomes)
    }
}

async fn scan_file(path: &Path, config: ScanConfiguration) -> Result<ScanSession> {
    let mut session = ScanSession::new(path, config)?;
    session.scan().await?;
    Ok(session)
}
