//! bucket-table: a fixed-capacity, byte-string keyed hash table for
//! concurrent use, with two interchangeable locking granularities.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: compare a single table-wide lock against one lock per bucket
//!   without duplicating the table logic between the two.
//! - Layers:
//!   - `hash`: Bernstein (djb2) hash of the key bytes; the bucket index is
//!     `hash % capacity`.
//!   - `Chain`: the collision list of one bucket. A singly linked list
//!     threaded through a `SlotMap` arena, with head insertion and linear
//!     lookup. Performs no locking.
//!   - `Locking`: owns the chains and hands out a guard over exactly one
//!     chain. `Coarse` locks the whole array; `Fine` locks one bucket.
//!   - `Table<L: Locking>`: public API (`add_or_update`, `contains`,
//!     `get_value`, `destroy`), written once against the guard.
//!
//! Constraints
//! - Capacity is fixed at construction; there is no resizing and no
//!   deletion of individual entries.
//! - A key appears at most once. Add-or-update enforces this under the lock
//!   of the key's region.
//! - Every entry owns a private copy of its key, made after the lookup
//!   misses, so an update never allocates a copy it then has to discard.
//! - Values are `u32` and are copied out; no reference into the table
//!   escapes a critical section.
//!
//! Locking
//! - Each operation computes the bucket index, acquires the region guard,
//!   runs the chain operation, and drops the guard before returning.
//! - `Coarse`: every operation takes the same lock, so all operations are
//!   serialized.
//! - `Fine`: an operation takes only its bucket's lock. Operations on
//!   different buckets never wait on each other.
//!
//! Failure policy
//! - Allocation failure and poisoned locks surface as `TableError` from the
//!   `try_` methods. The plain methods pass them to `error::fatal`, which
//!   logs and aborts. Guards are dropped before that happens.
//! - `get_value` on an absent key is a caller bug and panics after the lock
//!   is released. `get` is the non-panicking lookup.
//! - Teardown is best effort complete: a poisoned lock is logged and its
//!   chain is released anyway.
//!
//! Notes and non-goals
//! - No iteration order, persistence, or rehashing.
//! - `destroy` consumes the table, so the borrow checker guarantees that
//!   no operation is in flight. Dropping a table releases the same
//!   resources without the report.

pub mod chain;
pub mod error;
pub mod hash;
pub mod locking;
pub mod logger;
mod table;
mod table_proptest;

// Public surface
pub use error::{Region, TableError};
pub use hash::bernstein_hash;
pub use locking::{Coarse, Fine, Locking, Teardown};
pub use table::{CoarseTable, FineTable, Table, DEFAULT_CAPACITY};
