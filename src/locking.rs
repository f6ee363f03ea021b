//! Locking strategies: which lock protects the chain a key hashes to.
//!
//! Both strategies own the bucket chains and hand out a guard that derefs to
//! exactly one chain. The guard is the only way to reach a chain, and it
//! releases the lock when dropped on every exit path.

use crate::chain::Chain;
use crate::error::{Region, TableError};
use core::ops::{Deref, DerefMut};
use log::warn;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What a teardown released, for callers that want to audit it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Teardown {
    pub entries_released: usize,
    pub locks_disposed: usize,
    /// Locks that were poisoned at disposal. Their chains are still released.
    pub poisoned_locks: usize,
}

/// A locking granularity over a fixed array of bucket chains.
pub trait Locking: Sized + Send + Sync {
    /// Short name used in log lines.
    const NAME: &'static str;

    type Guard<'a>: DerefMut<Target = Chain>
    where
        Self: 'a;

    /// Allocate `capacity` empty chains and their lock(s).
    fn try_with_capacity(capacity: usize) -> Result<Self, TableError>;

    /// Lock the region protecting bucket `index` and return a guard over
    /// that bucket's chain.
    fn acquire(&self, index: usize) -> Result<Self::Guard<'_>, TableError>;

    /// Dispose every lock and release every chain. Requires that no other
    /// thread is still operating on the table, which `self` by value ensures.
    fn teardown(self) -> Teardown;
}

fn alloc_buckets<T>(
    capacity: usize,
    mut make: impl FnMut() -> T,
) -> Result<Vec<T>, TableError> {
    let mut buckets = Vec::new();
    buckets
        .try_reserve_exact(capacity)
        .map_err(|_| TableError::Allocation {
            what: "bucket array",
            bytes: capacity.saturating_mul(core::mem::size_of::<T>()),
        })?;
    buckets.extend((0..capacity).map(|_| make()));
    Ok(buckets)
}

/// Take the protected data out of a lock being disposed, tolerating poison.
fn dispose<T>(lock: Mutex<T>, region: Region, report: &mut Teardown) -> T {
    report.locks_disposed += 1;
    lock.into_inner().unwrap_or_else(|poisoned: PoisonError<T>| {
        warn!(
            "disposing poisoned lock guarding {}; releasing its entries anyway",
            region
        );
        report.poisoned_locks += 1;
        poisoned.into_inner()
    })
}

/// One lock shared by every bucket.
#[derive(Debug)]
pub struct Coarse {
    chains: Mutex<Box<[Chain]>>,
}

/// Guard over the whole table, narrowed to one bucket's chain.
pub struct CoarseGuard<'a> {
    chains: MutexGuard<'a, Box<[Chain]>>,
    index: usize,
}

impl Deref for CoarseGuard<'_> {
    type Target = Chain;
    fn deref(&self) -> &Chain {
        &self.chains[self.index]
    }
}

impl DerefMut for CoarseGuard<'_> {
    fn deref_mut(&mut self) -> &mut Chain {
        &mut self.chains[self.index]
    }
}

impl Locking for Coarse {
    const NAME: &'static str = "coarse";

    type Guard<'a>
        = CoarseGuard<'a>
    where
        Self: 'a;

    fn try_with_capacity(capacity: usize) -> Result<Self, TableError> {
        let chains = alloc_buckets(capacity, Chain::new)?;
        Ok(Self {
            chains: Mutex::new(chains.into_boxed_slice()),
        })
    }

    fn acquire(&self, index: usize) -> Result<CoarseGuard<'_>, TableError> {
        let chains = self
            .chains
            .lock()
            .map_err(|_| TableError::LockPoisoned(Region::Table))?;
        debug_assert!(index < chains.len());
        Ok(CoarseGuard { chains, index })
    }

    fn teardown(self) -> Teardown {
        let mut report = Teardown::default();
        let chains = dispose(self.chains, Region::Table, &mut report);
        for chain in chains.into_vec() {
            report.entries_released += chain.destroy_all();
        }
        report
    }
}

/// One lock per bucket. Operations on different buckets never contend.
#[derive(Debug)]
pub struct Fine {
    buckets: Box<[Mutex<Chain>]>,
}

impl Locking for Fine {
    const NAME: &'static str = "fine";

    type Guard<'a>
        = MutexGuard<'a, Chain>
    where
        Self: 'a;

    fn try_with_capacity(capacity: usize) -> Result<Self, TableError> {
        let buckets = alloc_buckets(capacity, || Mutex::new(Chain::new()))?;
        Ok(Self {
            buckets: buckets.into_boxed_slice(),
        })
    }

    fn acquire(&self, index: usize) -> Result<MutexGuard<'_, Chain>, TableError> {
        self.buckets[index]
            .lock()
            .map_err(|_| TableError::LockPoisoned(Region::Bucket(index)))
    }

    fn teardown(self) -> Teardown {
        let mut report = Teardown::default();
        for (i, lock) in self.buckets.into_vec().into_iter().enumerate() {
            let chain = dispose(lock, Region::Bucket(i), &mut report);
            report.entries_released += chain.destroy_all();
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::own_key;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn fill<L: Locking>(l: &L, capacity: usize) {
        for i in 0..capacity {
            let mut chain = l.acquire(i).unwrap();
            chain.insert_head(own_key(format!("k{}", i).as_bytes()).unwrap(), i as u32);
        }
    }

    #[test]
    fn every_bucket_starts_empty_and_locked_independently() {
        let fine = Fine::try_with_capacity(16).unwrap();
        for i in 0..16 {
            assert!(fine.acquire(i).unwrap().is_empty());
        }
        let coarse = Coarse::try_with_capacity(16).unwrap();
        for i in 0..16 {
            assert!(coarse.acquire(i).unwrap().is_empty());
        }
    }

    #[test]
    fn coarse_guard_narrows_to_one_bucket() {
        let coarse = Coarse::try_with_capacity(4).unwrap();
        coarse
            .acquire(2)
            .unwrap()
            .insert_head(own_key(b"x").unwrap(), 1);
        assert!(coarse.acquire(1).unwrap().is_empty());
        assert_eq!(coarse.acquire(2).unwrap().len(), 1);
    }

    #[test]
    fn teardown_counts_entries_and_locks() {
        let fine = Fine::try_with_capacity(8).unwrap();
        fill(&fine, 8);
        assert_eq!(
            fine.teardown(),
            Teardown {
                entries_released: 8,
                locks_disposed: 8,
                poisoned_locks: 0
            }
        );

        let coarse = Coarse::try_with_capacity(8).unwrap();
        fill(&coarse, 8);
        assert_eq!(
            coarse.teardown(),
            Teardown {
                entries_released: 8,
                locks_disposed: 1,
                poisoned_locks: 0
            }
        );
    }

    #[test]
    fn huge_capacity_reports_allocation_failure() {
        let err = Fine::try_with_capacity(usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            TableError::Allocation {
                what: "bucket array",
                ..
            }
        ));
    }

    // Two threads each hold a different bucket's lock and meet at a barrier
    // inside their critical sections. With per-bucket locks both arrive.
    #[test]
    #[cfg_attr(miri, ignore)]
    fn fine_buckets_are_held_concurrently() {
        let fine = Arc::new(Fine::try_with_capacity(2).unwrap());
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let fine = Arc::clone(&fine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut chain = fine.acquire(i).unwrap();
                    barrier.wait();
                    chain.insert_head(own_key(&[i as u8]).unwrap(), i as u32);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(Arc::try_unwrap(fine).unwrap().teardown().entries_released, 2);
    }

    #[test]
    fn poisoned_bucket_is_reported_and_still_released() {
        let fine = Arc::new(Fine::try_with_capacity(4).unwrap());
        fill(&*fine, 4);
        let f = Arc::clone(&fine);
        let res = thread::spawn(move || {
            let _chain = f.acquire(3).unwrap();
            panic!("poison bucket 3");
        })
        .join();
        assert!(res.is_err());

        assert_eq!(
            fine.acquire(3).err(),
            Some(TableError::LockPoisoned(Region::Bucket(3)))
        );
        assert!(fine.acquire(2).is_ok());

        let report = Arc::try_unwrap(fine).unwrap().teardown();
        assert_eq!(report.entries_released, 4);
        assert_eq!(report.poisoned_locks, 1);
        assert_eq!(report.locks_disposed, 4);
    }
}
