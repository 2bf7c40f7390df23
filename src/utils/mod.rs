use std::path::Path;
use sha2::{Digest, Sha256};

/// Suffix that marks an entry as a nested archive to descend into.
pub const NESTED_ARCHIVE_SUFFIX: &str = ".zip";

const SIZE_LABELS: [&str; 7] = ["", "kilo", "mega", "giga", "tera", "peta", "exa"];

/// Render a byte count on a base-1024 scale with two decimals,
/// e.g. `1048576` -> `"1.00 megabytes"`.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut magnitude = 0;
    while value >= 1024.0 && magnitude < SIZE_LABELS.len() - 1 {
        value /= 1024.0;
        magnitude += 1;
    }
    format!("{:.2} {}bytes", value, SIZE_LABELS[magnitude])
}

/// Hex SHA-256 of an archive's raw bytes, recorded in reports so a verdict
/// can be tied to the exact file that was scanned.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// True if an entry name contains a parent-directory segment in either
/// separator style.
pub fn has_traversal_segment(name: &str) -> bool {
    name.contains("../") || name.contains("..\\")
}

pub fn is_nested_archive_name(name: &str) -> bool {
    name.ends_with(NESTED_ARCHIVE_SUFFIX)
}

/// Case-insensitive extension check for files found on disk.
pub fn matches_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension.trim_start_matches('.')))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, "0.00 bytes" ; "zero")]
    #[test_case(1023, "1023.00 bytes" ; "just below a kilobyte")]
    #[test_case(1024, "1.00 kilobytes" ; "one kilobyte")]
    #[test_case(1536, "1.50 kilobytes" ; "fractional kilobytes")]
    #[test_case(1_048_576, "1.00 megabytes" ; "one megabyte")]
    #[test_case(5 * 1024 * 1024 * 1024, "5.00 gigabytes" ; "gigabytes")]
    #[test_case(1 << 40, "1.00 terabytes" ; "terabytes")]
    #[test_case(1 << 50, "1.00 petabytes" ; "petabytes")]
    #[test_case(u64::MAX, "16.00 exabytes" ; "largest value")]
    fn test_format_bytes(bytes: u64, expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[test]
    fn test_format_bytes_is_stable() {
        assert_eq!(format_bytes(123_456_789), format_bytes(123_456_789));
    }

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex(b"test content");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, sha256_hex(b"test content"));
        assert_ne!(hash, sha256_hex(b"different content"));
    }

    #[test_case("../../etc/passwd", true ; "unix parent segments")]
    #[test_case("dir\\..\\..\\boot.ini", true ; "windows parent segments")]
    #[test_case("a/b/../c", true ; "embedded parent segment")]
    #[test_case("..hidden/file", false ; "dotted name")]
    #[test_case("docs/readme.txt", false ; "plain path")]
    fn test_has_traversal_segment(name: &str, expected: bool) {
        assert_eq!(has_traversal_segment(name), expected);
    }

    #[test]
    fn test_is_nested_archive_name() {
        assert!(is_nested_archive_name("inner/archive.zip"));
        assert!(!is_nested_archive_name("archive.zip.txt"));
        assert!(!is_nested_archive_name("archive.ZIP"));
    }

    #[test]
    fn test_matches_extension() {
        assert!(matches_extension(Path::new("bomb.zip"), "zip"));
        assert!(matches_extension(Path::new("bomb.ZIP"), ".zip"));
        assert!(!matches_extension(Path::new("bomb.tar"), "zip"));
        assert!(!matches_extension(Path::new("bomb"), "zip"));
    }
}
