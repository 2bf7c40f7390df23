//! In-memory archives for unit tests.

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone)]
pub enum Fixture<'a> {
    /// Deflated regular file
    File(&'a [u8]),
    /// Stored entry holding another archive
    Nested(Vec<u8>),
    /// Symlink entry pointing at the given target
    Symlink(&'a str),
}

pub fn zip_bytes(entries: &[(&str, Fixture<'_>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, fixture) in entries {
        match fixture {
            Fixture::File(data) => {
                writer.start_file(*name, deflated).unwrap();
                writer.write_all(data).unwrap();
            }
            Fixture::Nested(archive) => {
                writer.start_file(*name, stored).unwrap();
                writer.write_all(archive).unwrap();
            }
            Fixture::Symlink(target) => {
                writer.add_symlink(*name, *target, deflated).unwrap();
            }
        }
    }

    writer.finish().unwrap().into_inner()
}

/// Serializes unit tests that read process rlimits around a guard.
pub static RLIMIT_TESTS: std::sync::Mutex<()> = std::sync::Mutex::new(());

pub fn rlimit_test_lock() -> std::sync::MutexGuard<'static, ()> {
    RLIMIT_TESTS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
