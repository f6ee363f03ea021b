//! Table: fixed-capacity add-or-update map from byte-string keys to `u32`,
//! parameterized by its locking strategy.

use crate::chain::own_key;
use crate::error::{fatal, TableError};
use crate::hash::bernstein_hash;
use crate::locking::{Coarse, Fine, Locking, Teardown};
use log::{debug, trace};

/// Bucket count used by `Table::default()`.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Table serializing every operation behind one lock.
pub type CoarseTable = Table<Coarse>;
/// Table locking only the bucket a key hashes to.
pub type FineTable = Table<Fine>;

/// A fixed-capacity hash table of chained buckets.
///
/// All operations take `&self` and may be called from many threads at once;
/// share the table with `Arc` or scoped threads. Keys are copied on first
/// insertion, so the caller's buffer may be reused as soon as a call returns.
///
/// The plain methods treat allocation failure and poisoned locks as fatal
/// and abort the process. The `try_` methods return those as `TableError`.
///
/// # Examples
///
/// ```rust
/// use bucket_table::FineTable;
///
/// let t = FineTable::with_capacity(8);
/// t.add_or_update("alpha", 1);
/// t.add_or_update("beta", 2);
/// t.add_or_update("alpha", 99);
/// assert_eq!(t.get_value("alpha"), 99);
/// assert_eq!(t.get_value("beta"), 2);
/// assert!(!t.contains("gamma"));
/// assert_eq!(t.destroy().entries_released, 2);
/// ```
#[derive(Debug)]
pub struct Table<L> {
    pub(crate) buckets: L,
    capacity: usize,
}

impl<L: Locking> Table<L> {
    /// Create a table with `capacity` empty buckets. Aborts if `capacity` is
    /// zero or the buckets cannot be allocated.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::try_with_capacity(capacity).unwrap_or_else(|e| fatal(e))
    }

    pub fn try_with_capacity(capacity: usize) -> Result<Self, TableError> {
        if capacity == 0 {
            return Err(TableError::ZeroCapacity);
        }
        let buckets = L::try_with_capacity(capacity)?;
        debug!("created {} table with {} buckets", L::NAME, capacity);
        Ok(Self { buckets, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index of the bucket `key` belongs to. Stable for the table's lifetime.
    #[inline]
    pub fn bucket_of(&self, key: impl AsRef<[u8]>) -> usize {
        bernstein_hash(key.as_ref()) as usize % self.capacity
    }

    /// Insert `key` with `value`, or overwrite the value if `key` is present.
    pub fn add_or_update(&self, key: impl AsRef<[u8]>, value: u32) {
        self.try_add_or_update(key, value).unwrap_or_else(|e| fatal(e))
    }

    pub fn try_add_or_update(&self, key: impl AsRef<[u8]>, value: u32) -> Result<(), TableError> {
        let key = key.as_ref();
        let index = self.bucket_of(key);
        let mut chain = self.buckets.acquire(index)?;
        if let Some(entry) = chain.find_mut(key) {
            entry.set_value(value);
            return Ok(());
        }
        // Copy only once we know the key is new, so an update never
        // allocates a duplicate.
        let owned = own_key(key)?;
        chain.insert_head(owned, value);
        trace!("inserted new key into bucket {}", index);
        Ok(())
    }

    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        self.try_contains(key).unwrap_or_else(|e| fatal(e))
    }

    pub fn try_contains(&self, key: impl AsRef<[u8]>) -> Result<bool, TableError> {
        let key = key.as_ref();
        let chain = self.buckets.acquire(self.bucket_of(key))?;
        Ok(chain.find(key).is_some())
    }

    /// Copy of the value stored under `key`, if any.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<u32> {
        self.try_get(key).unwrap_or_else(|e| fatal(e))
    }

    pub fn try_get(&self, key: impl AsRef<[u8]>) -> Result<Option<u32>, TableError> {
        let key = key.as_ref();
        let chain = self.buckets.acquire(self.bucket_of(key))?;
        Ok(chain.find(key).map(|e| e.value()))
    }

    /// Value stored under `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is absent. Callers establish presence first, with
    /// [`contains`](Self::contains) or by construction; use
    /// [`get`](Self::get) when absence is an expected outcome. The lock is
    /// released before the panic is raised.
    pub fn get_value(&self, key: impl AsRef<[u8]>) -> u32 {
        match self.get(key) {
            Some(v) => v,
            None => panic!("get_value called for a key that is not in the table"),
        }
    }

    /// Number of entries. Each region is locked in turn, so under concurrent
    /// inserts the result is only a snapshot.
    pub fn len(&self) -> usize {
        self.try_len().unwrap_or_else(|e| fatal(e))
    }

    pub fn try_len(&self) -> Result<usize, TableError> {
        let mut total = 0;
        for index in 0..self.capacity {
            total += self.buckets.acquire(index)?.len();
        }
        Ok(total)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every entry and dispose every lock.
    ///
    /// Taking `self` by value means no other operation can still be running;
    /// threads sharing the table must have been joined. A poisoned lock is
    /// logged and its chain released regardless.
    pub fn destroy(self) -> Teardown {
        let report = self.buckets.teardown();
        debug!(
            "destroyed {} table: {} entries released, {} locks disposed ({} poisoned)",
            L::NAME,
            report.entries_released,
            report.locks_disposed,
            report.poisoned_locks
        );
        report
    }
}

impl<L: Locking> Default for Table<L> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Region;
    use std::sync::Barrier;
    use std::thread;

    fn keys_in_distinct_buckets<L: Locking>(t: &Table<L>) -> (String, String) {
        let first = "k0".to_string();
        let b = t.bucket_of(&first);
        let second = (1..)
            .map(|i| format!("k{}", i))
            .find(|k| t.bucket_of(k) != b)
            .unwrap();
        (first, second)
    }

    fn poison<L: Locking>(t: &Table<L>, key: &str) {
        let index = t.bucket_of(key);
        let res = thread::scope(|s| {
            s.spawn(|| {
                let _chain = t.buckets.acquire(index).unwrap();
                panic!("poisoning the lock for {}", key);
            })
            .join()
        });
        assert!(res.is_err());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            FineTable::try_with_capacity(0).unwrap_err(),
            TableError::ZeroCapacity
        );
        assert_eq!(
            CoarseTable::try_with_capacity(0).unwrap_err(),
            TableError::ZeroCapacity
        );
    }

    #[test]
    fn default_uses_default_capacity() {
        let t = CoarseTable::default();
        assert_eq!(t.capacity(), DEFAULT_CAPACITY);
        assert!(t.is_empty());
    }

    #[test]
    fn update_does_not_add_a_second_entry() {
        let t = FineTable::with_capacity(1);
        t.add_or_update("k", 1);
        t.add_or_update("k", 2);
        let chain = t.buckets.acquire(0).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.find(b"k").unwrap().value(), 2);
    }

    // Both threads hold their bucket's lock while waiting on the barrier.
    // With a single table lock this would deadlock.
    #[test]
    #[cfg_attr(miri, ignore)]
    fn fine_critical_sections_overlap() {
        let t = FineTable::with_capacity(64);
        let (a, b) = keys_in_distinct_buckets(&t);
        let barrier = Barrier::new(2);
        thread::scope(|s| {
            for (key, value) in [(&a, 1u32), (&b, 2u32)] {
                let t = &t;
                let barrier = &barrier;
                s.spawn(move || {
                    let mut chain = t.buckets.acquire(t.bucket_of(key)).unwrap();
                    barrier.wait();
                    chain.insert_head(own_key(key.as_bytes()).unwrap(), value);
                });
            }
        });
        assert_eq!(t.get_value(&a), 1);
        assert_eq!(t.get_value(&b), 2);
    }

    #[test]
    fn fine_poison_is_confined_to_one_bucket() {
        let t = FineTable::with_capacity(64);
        let (a, b) = keys_in_distinct_buckets(&t);
        t.add_or_update(&a, 1);
        t.add_or_update(&b, 2);
        poison(&t, &a);

        let region = Region::Bucket(t.bucket_of(&a));
        assert_eq!(
            t.try_add_or_update(&a, 3),
            Err(TableError::LockPoisoned(region))
        );
        assert_eq!(t.try_contains(&a), Err(TableError::LockPoisoned(region)));
        assert_eq!(t.try_get(&b), Ok(Some(2)));

        let report = t.destroy();
        assert_eq!(report.entries_released, 2);
        assert_eq!(report.poisoned_locks, 1);
        assert_eq!(report.locks_disposed, 64);
    }

    #[test]
    fn coarse_poison_affects_every_key() {
        let t = CoarseTable::with_capacity(64);
        let (a, b) = keys_in_distinct_buckets(&t);
        t.add_or_update(&a, 1);
        poison(&t, &a);

        assert_eq!(
            t.try_get(&b),
            Err(TableError::LockPoisoned(Region::Table))
        );
        assert_eq!(t.try_len(), Err(TableError::LockPoisoned(Region::Table)));

        let report = t.destroy();
        assert_eq!(report.entries_released, 1);
        assert_eq!(report.poisoned_locks, 1);
        assert_eq!(report.locks_disposed, 1);
    }

    #[test]
    fn get_value_panic_leaves_lock_usable() {
        let t = CoarseTable::with_capacity(8);
        t.add_or_update("present", 7);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            t.get_value("absent");
        }));
        assert!(res.is_err());
        // The panic happened after the guard was dropped, so nothing is poisoned.
        assert_eq!(t.try_get("present"), Ok(Some(7)));
        assert_eq!(t.destroy().poisoned_locks, 0);
    }
}
