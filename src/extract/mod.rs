use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;
use log::{debug, info, warn};
use zip::ZipArchive;

use crate::config::ResourceLimits;
use crate::error::{DefuseError, Result};

#[cfg(unix)]
pub mod rlimit;

/// Extracts an archive with CPU, address-space and file-size caps held for
/// the duration of the extraction.
pub struct SafeExtractor {
    limits: ResourceLimits,
}

impl SafeExtractor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits }
    }

    /// Verify checksums, then extract into `destination` under the limits.
    ///
    /// Returns `Ok(false)` when extraction itself fails partway, typically
    /// because a limit was hit. Corruption is reported before anything is
    /// written.
    #[cfg(unix)]
    pub fn extract(&self, archive_path: &Path, destination: &Path) -> Result<bool> {
        let mut archive = open_archive(archive_path)?;
        verify_integrity(&mut archive, archive_path)?;
        std::fs::create_dir_all(destination)?;

        debug!("Extracting {} to {} with {:?}", archive_path.display(), destination.display(), self.limits);
        let result = {
            let _guard = rlimit::RlimitGuard::acquire(&self.limits)?;
            archive.extract(destination)
        };

        match result {
            Ok(()) => {
                info!("Archive extracted to: {}", destination.display());
                Ok(true)
            }
            Err(e) => {
                warn!("Extraction of {} aborted: {}", archive_path.display(), e);
                Ok(false)
            }
        }
    }

    #[cfg(not(unix))]
    pub fn extract(&self, archive_path: &Path, _destination: &Path) -> Result<bool> {
        if !archive_path.exists() {
            return Err(DefuseError::NotFound(archive_path.to_path_buf()));
        }
        Err(DefuseError::UnsupportedPlatform("resource-limited extraction"))
    }

    /// Plain extraction with no limits and no integrity pass. `Ok(false)`
    /// for an archive without entries.
    pub fn extract_unrestricted(archive_path: &Path, destination: &Path) -> Result<bool> {
        let mut archive = open_archive(archive_path)?;
        if archive.len() == 0 {
            return Ok(false);
        }

        std::fs::create_dir_all(destination)?;
        if let Err(e) = archive.extract(destination) {
            warn!("Extraction of {} failed: {}", archive_path.display(), e);
            return Ok(false);
        }

        Ok(std::fs::read_dir(destination)?.next().is_some())
    }
}

fn open_archive(archive_path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = match File::open(archive_path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(DefuseError::NotFound(archive_path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    ZipArchive::new(BufReader::new(file)).map_err(|e| DefuseError::InvalidArchive {
        path: archive_path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Decompress every entry to a sink so the reader checks each CRC.
/// Fails with the first entry that does not verify.
pub fn verify_integrity<R: Read + Seek>(archive: &mut ZipArchive<R>, archive_path: &Path) -> Result<()> {
    for index in 0..archive.len() {
        let corrupted = |entry: String| DefuseError::Corrupted {
            path: archive_path.to_path_buf(),
            entry,
        };

        let mut entry = archive
            .by_index(index)
            .map_err(|e| corrupted(format!("#{} ({})", index, e)))?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        io::copy(&mut entry, &mut io::sink()).map_err(|e| corrupted(format!("{} ({})", name, e)))?;
    }

    debug!("Integrity check passed for {}", archive_path.display());
    Ok(())
}
