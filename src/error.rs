//! Error taxonomy and the single fatal path.

use core::fmt;
use log::error;
use thiserror::Error;

/// The protected region a lock guards.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Region {
    /// The one table-wide lock of the coarse variant.
    Table,
    /// The lock of one bucket in the fine variant.
    Bucket(usize),
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Table => write!(f, "the whole table"),
            Region::Bucket(i) => write!(f, "bucket {}", i),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("table capacity must be positive")]
    ZeroCapacity,
    #[error("failed to allocate {what} ({bytes} bytes)")]
    Allocation { what: &'static str, bytes: usize },
    /// A thread panicked while holding the lock; mutual exclusion over the
    /// region's chain can no longer be trusted.
    #[error("lock guarding {0} is poisoned")]
    LockPoisoned(Region),
}

/// Log `err` and terminate the process.
///
/// Every non-`try_` table operation funnels its failures through here. By
/// the time this runs, the caller has already dropped any lock guard it held.
#[cold]
pub fn fatal(err: TableError) -> ! {
    error!("unrecoverable table error: {}", err);
    std::process::abort()
}
