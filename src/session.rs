use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::Utc;
use log::{Level, debug, info, log};

use crate::config::{ResourceLimits, ScanConfiguration};
use crate::error::{DefuseError, Result};
use crate::extract::SafeExtractor;
use crate::scanner::{ArchiveFacts, ArchiveWalker, RiskClassifier, TraversalState, Watchdog};
use crate::types::{ScanReport, Verdict};
use crate::utils;

/// Log target for reports of safe archives.
pub const SAFE_TARGET: &str = "defuse::safe";
/// Log target for reports of dangerous archives.
pub const MALICIOUS_TARGET: &str = "defuse::malicious";

#[derive(Debug)]
enum SessionState {
    NotScanned,
    Scanned(ScanReport),
}

/// One archive, scanned at most once.
///
/// Every report or extraction accessor fails with
/// [`DefuseError::NotScanned`] until [`ScanSession::scan`] has completed.
#[derive(Debug)]
pub struct ScanSession {
    path: PathBuf,
    config: ScanConfiguration,
    state: SessionState,
}

impl ScanSession {
    pub fn new(path: impl Into<PathBuf>, config: ScanConfiguration) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(DefuseError::NotFound(path));
        }
        config.validate()?;

        Ok(Self {
            path,
            config,
            state: SessionState::NotScanned,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ScanConfiguration {
        &self.config
    }

    /// Walk the archive under the killswitch deadline and classify it.
    ///
    /// A dangerous archive is a normal outcome, returned as
    /// [`Verdict::Dangerous`].
    pub async fn scan(&mut self) -> Result<Verdict> {
        if matches!(self.state, SessionState::Scanned(_)) {
            return Err(DefuseError::AlreadyScanned);
        }

        let archive = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DefuseError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Scanning {} ({} bytes)", self.path.display(), archive.len());

        let facts = ArchiveFacts {
            file_name: self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            location: std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone()),
            sha256: utils::sha256_hex(&archive),
            compressed_size: archive.len() as u64,
            scanned_at: Utc::now(),
        };

        let state = Arc::new(TraversalState::default());
        let walker = ArchiveWalker::new(Arc::clone(&state), &self.config);
        let outcome = Watchdog::new(self.config.killswitch())
            .run(walker, archive)
            .await
            .map_err(|e| DefuseError::InvalidArchive {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        debug!("Walk outcome for {}: {:?}", self.path.display(), outcome);

        let report = RiskClassifier::new(&self.config).classify(&state.snapshot(), facts);
        let verdict = report.verdict();
        self.state = SessionState::Scanned(report);
        Ok(verdict)
    }

    pub fn report(&self) -> Result<&ScanReport> {
        match &self.state {
            SessionState::Scanned(report) => Ok(report),
            SessionState::NotScanned => Err(DefuseError::NotScanned),
        }
    }

    pub fn is_dangerous(&self) -> Result<bool> {
        Ok(self.report()?.dangerous)
    }

    pub fn has_traversal(&self) -> Result<bool> {
        Ok(self.report()?.directory_traversal)
    }

    pub fn has_symlinks(&self) -> Result<bool> {
        Ok(self.report()?.symlinks)
    }

    /// Compression ratio rounded to two decimals.
    pub fn compression_ratio(&self) -> Result<String> {
        Ok(format!("{:.2}", self.report()?.ratio))
    }

    /// Log the full report, on the malicious channel if the archive is
    /// dangerous and on the safe channel otherwise.
    pub fn output(&self) -> Result<()> {
        let report = self.report()?;
        let (target, level) = if report.dangerous {
            (MALICIOUS_TARGET, Level::Error)
        } else {
            (SAFE_TARGET, Level::Info)
        };

        for (key, value) in report.lines() {
            log!(target: target, level, "[{}] {} = {}", report.file_name, key, value);
        }
        log!(target: target, level, "[{}] Location: {}", report.file_name, report.location.display());
        Ok(())
    }

    /// Extract under process resource limits. Last line of defence for
    /// archives the scan did not catch.
    pub fn safe_extract(&self, destination: &Path, limits: &ResourceLimits) -> Result<bool> {
        self.report()?;
        SafeExtractor::new(*limits).extract(&self.path, destination)
    }

    /// Scan if needed, refuse dangerous archives, then extract without
    /// resource limits. Succeeds when the destination ends up non-empty.
    pub async fn extract_all(&mut self, destination: &Path) -> Result<bool> {
        if matches!(self.state, SessionState::NotScanned) {
            self.scan().await?;
        }
        let report = self.report()?;
        if report.dangerous {
            return Err(DefuseError::MaliciousDetected(report.file_name.clone()));
        }

        let extracted = SafeExtractor::extract_unrestricted(&self.path, destination)?;
        if extracted {
            info!("Archive extracted to: {}", destination.display());
        }
        Ok(extracted)
    }
}
