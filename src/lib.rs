pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod report;
pub mod scanner;
pub mod session;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::{ResourceLimits, ScanConfiguration};
pub use error::{DefuseError, Result};
pub use extract::SafeExtractor;
pub use report::{BatchStats, ReportDatabase};
pub use scanner::{FileOutcome, ScanCoordinator};
pub use session::ScanSession;
pub use types::{ScanReport, Verdict};
pub use utils::format_bytes;
