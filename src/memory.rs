//! Optional cap on the builder's resident memory.
//!
//! The limit is the configured cap, lowered to what the OS reported as
//! available when the guard was created (plus what the process already
//! used). Usage is the resident set size. Both readings are Linux-only; on
//! other platforms only the configured cap applies and usage is never
//! observed.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct MemoryGuard {
    limit: u64,
}

impl MemoryGuard {
    /// Builds a guard for a cap of `configured` bytes.
    pub fn new(configured: u64) -> Self {
        let limit = match (resident_bytes(), available_bytes()) {
            (Some(resident), Some(available)) => configured.min(resident.saturating_add(available)),
            _ => configured,
        };
        if limit < configured {
            tracing::info!(
                configured = configured,
                limit = limit,
                "Memory limit lowered to available memory"
            );
        }
        Self { limit }
    }

    /// A guard with exactly `limit`, ignoring what the OS reports.
    pub fn with_limit(limit: u64) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Checks the current resident set against the limit.
    pub fn check(&self) -> Result<()> {
        match resident_bytes() {
            Some(used) => self.check_usage(used),
            None => Ok(()),
        }
    }

    pub fn check_usage(&self, used: u64) -> Result<()> {
        if used > self.limit {
            return Err(Error::ResourceExhausted {
                used,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// Resident set size of this process, from `/proc/self/statm`.
#[cfg(target_os = "linux")]
pub fn resident_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(pages * page_size as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn resident_bytes() -> Option<u64> {
    None
}

/// Free plus buffer memory reported by `sysinfo(2)`.
#[cfg(target_os = "linux")]
pub fn available_bytes() -> Option<u64> {
    let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
    if unsafe { libc::sysinfo(&mut info) } != 0 {
        return None;
    }
    let unit = info.mem_unit.max(1) as u64;
    Some((info.freeram as u64 + info.bufferram as u64) * unit)
}

#[cfg(not(target_os = "linux"))]
pub fn available_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_usage() {
        let guard = MemoryGuard::with_limit(1_000);
        assert!(guard.check_usage(999).is_ok());
        assert!(guard.check_usage(1_000).is_ok());
        match guard.check_usage(1_001) {
            Err(Error::ResourceExhausted { used, limit }) => assert_eq!((used, limit), (1_001, 1_000)),
            other => panic!("expected ResourceExhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_limit_never_exceeds_configured() {
        let guard = MemoryGuard::new(64 * 1024 * 1024);
        assert!(guard.limit() <= 64 * 1024 * 1024);
        assert!(MemoryGuard::new(u64::MAX).check().is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_reads_process_memory() {
        assert!(resident_bytes().unwrap() > 0);
        assert!(available_bytes().is_some());
    }
}
