//! Scoped process resource limits.
//!
//! # Semantics
//!
//! Limits are process-wide, so a single mutex serializes every guard in the
//! process. While a guard lives:
//!
//! - `RLIMIT_CPU` soft limit is the CPU time already used plus the budget.
//!   The limit counts cumulative process CPU time, not time since the guard.
//! - `RLIMIT_AS` soft limit caps the address space.
//! - `RLIMIT_FSIZE` soft limit caps any single file write, and `SIGXFSZ` is
//!   ignored so an oversize write fails with `EFBIG` instead of killing the
//!   process.
//!
//! Only soft limits are lowered. An unprivileged process cannot raise a hard
//! limit back, so keeping hard limits intact is what makes restoration on
//! drop always possible. A soft limit is never raised above its current value.

use std::io;
use std::sync::{Mutex, MutexGuard};
use log::{debug, warn};

use crate::config::ResourceLimits;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
type Resource = libc::c_int;

static RLIMIT_LOCK: Mutex<()> = Mutex::new(());

/// Holds lowered limits until dropped, then restores the saved ones.
pub struct RlimitGuard {
    saved: Vec<(Resource, libc::rlimit)>,
    previous_sigxfsz: Option<libc::sighandler_t>,
    _lock: MutexGuard<'static, ()>,
}

impl RlimitGuard {
    pub fn acquire(limits: &ResourceLimits) -> io::Result<Self> {
        let lock = RLIMIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut guard = Self {
            saved: Vec::with_capacity(3),
            previous_sigxfsz: None,
            _lock: lock,
        };

        if let Some(seconds) = limits.max_cpu_time {
            let used = cpu_seconds_used();
            guard.lower(libc::RLIMIT_CPU as Resource, used.saturating_add(seconds))?;
        }
        if let Some(bytes) = limits.max_memory {
            guard.lower(libc::RLIMIT_AS as Resource, bytes)?;
        }
        if let Some(bytes) = limits.max_filesize {
            // SAFETY: installing SIG_IGN has no handler code to race with.
            let previous = unsafe { libc::signal(libc::SIGXFSZ, libc::SIG_IGN) };
            guard.previous_sigxfsz = Some(previous);
            guard.lower(libc::RLIMIT_FSIZE as Resource, bytes)?;
        }

        Ok(guard)
    }

    fn lower(&mut self, resource: Resource, requested: u64) -> io::Result<()> {
        let current = get_rlimit(resource)?;
        self.saved.push((resource, current));

        let soft = (requested as libc::rlim_t).min(current.rlim_cur).min(current.rlim_max);
        debug!("Lowering rlimit {} soft limit to {}", resource, soft);
        set_rlimit(resource, &libc::rlimit {
            rlim_cur: soft,
            rlim_max: current.rlim_max,
        })
    }
}

impl Drop for RlimitGuard {
    fn drop(&mut self) {
        for (resource, limit) in self.saved.iter().rev() {
            if let Err(e) = set_rlimit(*resource, limit) {
                warn!("Failed to restore rlimit {}: {}", resource, e);
            }
        }
        if let Some(previous) = self.previous_sigxfsz.take() {
            // SAFETY: restores the disposition returned by the earlier signal() call.
            unsafe {
                libc::signal(libc::SIGXFSZ, previous);
            }
        }
    }
}

fn get_rlimit(resource: Resource) -> io::Result<libc::rlimit> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(resource, &mut limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(limit)
}

fn set_rlimit(resource: Resource, limit: &libc::rlimit) -> io::Result<()> {
    // SAFETY: `limit` points to a valid rlimit for the duration of the call.
    if unsafe { libc::setrlimit(resource, limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Whole CPU seconds (user + system) consumed by this process, rounded up.
fn cpu_seconds_used() -> u64 {
    // SAFETY: zeroed rusage is valid, and the error return is handled.
    let usage = unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
            return 0;
        }
        usage
    };

    let seconds = usage.ru_utime.tv_sec.max(0) as u64 + usage.ru_stime.tv_sec.max(0) as u64;
    let micros = usage.ru_utime.tv_usec.max(0) as u64 + usage.ru_stime.tv_usec.max(0) as u64;
    seconds + micros.div_ceil(1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::rlimit_test_lock;

    #[test]
    fn test_limits_restored_on_drop() {
        let _serial = rlimit_test_lock();
        let before = get_rlimit(libc::RLIMIT_FSIZE as Resource).unwrap();
        {
            let limits = ResourceLimits {
                max_cpu_time: None,
                max_memory: None,
                max_filesize: Some(1024 * 1024 * 1024),
            };
            let _guard = RlimitGuard::acquire(&limits).unwrap();
            let during = get_rlimit(libc::RLIMIT_FSIZE as Resource).unwrap();
            assert!(during.rlim_cur <= 1024 * 1024 * 1024);
            assert_eq!(during.rlim_max, before.rlim_max);
        }
        let after = get_rlimit(libc::RLIMIT_FSIZE as Resource).unwrap();
        assert_eq!(after.rlim_cur, before.rlim_cur);
        assert_eq!(after.rlim_max, before.rlim_max);
    }

    #[test]
    fn test_cpu_budget_is_relative() {
        let _serial = rlimit_test_lock();
        let limits = ResourceLimits {
            max_cpu_time: Some(3600),
            max_memory: None,
            max_filesize: None,
        };
        let used = cpu_seconds_used();
        let before = get_rlimit(libc::RLIMIT_CPU as Resource).unwrap();
        let _guard = RlimitGuard::acquire(&limits).unwrap();
        let during = get_rlimit(libc::RLIMIT_CPU as Resource).unwrap();

        let floor = ((used + 3600) as libc::rlim_t).min(before.rlim_cur);
        assert!(during.rlim_cur >= floor);
        assert!(during.rlim_cur <= before.rlim_cur);
        assert_eq!(during.rlim_max, before.rlim_max);
    }

    #[test]
    fn test_no_limits_is_noop() {
        let _serial = rlimit_test_lock();
        let guard = RlimitGuard::acquire(&ResourceLimits::unlimited()).unwrap();
        assert!(guard.saved.is_empty());
        assert!(guard.previous_sigxfsz.is_none());
    }
}
