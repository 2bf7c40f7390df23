use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use log::{debug, trace, warn};
use zip::ZipArchive;
use zip::result::ZipResult;

use super::types::TraversalSnapshot;
use crate::config::ScanConfiguration;
use crate::utils;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Counters for one scan session.
///
/// Only the walker writes the counters. The killswitch is the single flag
/// shared with the watchdog, so every field is atomic to keep the snapshot
/// readable from the watchdog side after a timeout.
#[derive(Debug, Default)]
pub struct TraversalState {
    uncompressed_size: AtomicU64,
    nested_archive_count: AtomicU32,
    max_depth_reached: AtomicU32,
    traversal_path_found: AtomicBool,
    symlink_found: AtomicBool,
    killswitch: AtomicBool,
}

impl TraversalState {
    pub fn trigger_killswitch(&self) {
        self.killswitch.store(true, Ordering::Release);
    }

    pub fn killswitch_triggered(&self) -> bool {
        self.killswitch.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> TraversalSnapshot {
        TraversalSnapshot {
            uncompressed_size: self.uncompressed_size.load(Ordering::Relaxed),
            nested_archive_count: self.nested_archive_count.load(Ordering::Relaxed),
            max_depth_reached: self.max_depth_reached.load(Ordering::Relaxed),
            traversal_path_found: self.traversal_path_found.load(Ordering::Relaxed),
            symlink_found: self.symlink_found.load(Ordering::Relaxed),
            killswitch_triggered: self.killswitch_triggered(),
        }
    }

    fn nested_archive_count(&self) -> u32 {
        self.nested_archive_count.load(Ordering::Relaxed)
    }

    fn max_depth_reached(&self) -> u32 {
        self.max_depth_reached.load(Ordering::Relaxed)
    }

    fn add_uncompressed(&self, size: u64) {
        // Forged entry sizes can sum past u64::MAX.
        let _ = self.uncompressed_size.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| {
            Some(total.saturating_add(size))
        });
    }

    /// Publish the running nested count of the frame that just finished a
    /// recursion. Overwrites with the frame-local count, never lowering it.
    fn record_nested_count(&self, local_count: u32) {
        self.nested_archive_count.fetch_max(local_count, Ordering::Relaxed);
    }
}

/// Depth-first walker over a ZIP and every `.zip` entry inside it.
pub struct ArchiveWalker {
    state: Arc<TraversalState>,
    nested_zips_limit: Option<u32>,
    nested_levels_limit: Option<u32>,
}

impl ArchiveWalker {
    pub fn new(state: Arc<TraversalState>, config: &ScanConfiguration) -> Self {
        Self {
            state,
            nested_zips_limit: config.nested_zips_limit(),
            nested_levels_limit: config.nested_levels_limit(),
        }
    }

    pub fn state(&self) -> Arc<TraversalState> {
        Arc::clone(&self.state)
    }

    fn should_prune(&self) -> bool {
        if self.state.killswitch_triggered() {
            return true;
        }
        if self
            .nested_zips_limit
            .is_some_and(|limit| self.state.nested_archive_count() >= limit)
        {
            return true;
        }
        self.nested_levels_limit
            .is_some_and(|limit| self.state.max_depth_reached() > limit)
    }

    /// Level reported by a frame the killswitch interrupted: the depth limit,
    /// or 0 when depth is unlimited.
    fn killswitch_level(&self) -> u32 {
        self.nested_levels_limit.unwrap_or(0)
    }

    /// Walk one archive held in memory at `depth` (the root is depth 0).
    ///
    /// Returns the nested archives counted under this archive and the deepest
    /// level this frame saw. A pruned frame returns `(0, depth - 1)`; a frame
    /// interrupted by the killswitch returns its count so far together with
    /// the depth limit, or 0 without one. Only failing to open `archive` is an error.
    pub fn walk(&self, archive: &[u8], depth: u32) -> ZipResult<(u32, u32)> {
        if self.should_prune() {
            trace!("Pruning walk at depth {}", depth);
            return Ok((0, depth.saturating_sub(1)));
        }

        let mut zip = ZipArchive::new(Cursor::new(archive))?;
        debug!("Walking archive with {} entries at depth {}", zip.len(), depth);

        let mut local_count = 0u32;
        let mut top_level = depth;

        for index in 0..zip.len() {
            if self.state.killswitch_triggered() {
                debug!("Killswitch observed at depth {}, unwinding", depth);
                return Ok((local_count, self.killswitch_level()));
            }

            let (name, size, symlink) = match zip.by_index_raw(index) {
                Ok(entry) => (entry.name().to_string(), entry.size(), is_symlink(entry.unix_mode())),
                Err(e) => {
                    warn!("Skipping unreadable entry #{} at depth {}: {}", index, depth, e);
                    continue;
                }
            };

            if utils::has_traversal_segment(&name) {
                debug!("Directory traversal entry: {}", name);
                self.state.traversal_path_found.store(true, Ordering::Relaxed);
                continue;
            }

            if symlink {
                debug!("Symlink entry: {}", name);
                self.state.symlink_found.store(true, Ordering::Relaxed);
                continue;
            }

            if utils::is_nested_archive_name(&name) {
                local_count = local_count.saturating_add(1);
                trace!("Descending into nested archive {} at depth {}", name, depth + 1);

                match self.walk_nested(&mut zip, index, &name, depth + 1) {
                    Some((nested, deepest)) => {
                        local_count = local_count.saturating_add(nested);
                        if deepest > self.state.max_depth_reached() {
                            top_level = deepest;
                            self.state.max_depth_reached.store(deepest, Ordering::Relaxed);
                        }
                    }
                    None => self.state.add_uncompressed(size),
                }
                self.state.record_nested_count(local_count);
            } else {
                trace!("  {} ({} bytes)", name, size);
                self.state.add_uncompressed(size);
            }
        }

        Ok((local_count, top_level))
    }

    /// Buffer a nested entry and recurse into it. `None` when the entry cannot
    /// be read or is not a zip, in which case it counts as a regular file.
    fn walk_nested(
        &self,
        zip: &mut ZipArchive<Cursor<&[u8]>>,
        index: usize,
        name: &str,
        depth: u32,
    ) -> Option<(u32, u32)> {
        let mut data = Vec::new();
        let read = zip
            .by_index(index)
            .and_then(|mut entry| entry.read_to_end(&mut data).map_err(Into::into));
        if let Err(e) = read {
            warn!("Failed to read nested archive {}: {}", name, e);
            return None;
        }

        match self.walk(&data, depth) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Nested entry {} is not a readable zip: {}", name, e);
                None
            }
        }
    }
}

fn is_symlink(unix_mode: Option<u32>) -> bool {
    unix_mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK)
}
