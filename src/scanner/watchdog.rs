use std::time::Duration;
use log::{debug, warn};
use zip::result::ZipResult;

use super::types::WalkOutcome;
use super::walker::ArchiveWalker;

/// Runs a walk on the blocking pool and raises the killswitch once the
/// deadline passes.
///
/// Cancellation is cooperative: the worker is never aborted, it unwinds the
/// next time it checks the flag. Counters it has written stay in place for the
/// partial report.
pub struct Watchdog {
    deadline: Duration,
}

impl Watchdog {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub async fn run(&self, walker: ArchiveWalker, archive: Vec<u8>) -> ZipResult<WalkOutcome> {
        let state = walker.state();
        debug!("Starting walk of {} bytes with a {:?} deadline", archive.len(), self.deadline);

        let handle = tokio::task::spawn_blocking(move || walker.walk(&archive, 0));

        match tokio::time::timeout(self.deadline, handle).await {
            Ok(Ok(result)) => {
                let (nested, deepest) = result?;
                debug!("Walk completed: {} nested archives, deepest level {}", nested, deepest);
                Ok(WalkOutcome::Completed { nested, deepest })
            }
            Ok(Err(join_error)) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Ok(Err(join_error)) => {
                warn!("Walk worker was cancelled: {}", join_error);
                state.trigger_killswitch();
                Ok(WalkOutcome::Killswitched)
            }
            Err(_) => {
                warn!("Killswitch triggered after {:?}", self.deadline);
                state.trigger_killswitch();
                Ok(WalkOutcome::Killswitched)
            }
        }
    }
}
