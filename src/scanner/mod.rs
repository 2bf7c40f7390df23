pub mod types;
pub mod walker;
pub mod watchdog;
pub mod classifier;
pub mod coordinator;

pub use types::*;
pub use walker::{ArchiveWalker, TraversalState};
pub use watchdog::Watchdog;
pub use classifier::{ArchiveFacts, RiskClassifier};
pub use coordinator::ScanCoordinator;
