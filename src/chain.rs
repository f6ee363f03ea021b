//! Chain: the collision list of one bucket.
//!
//! Entries live in a per-chain `SlotMap` arena and are linked head-first
//! through generational keys, so the chain is a singly linked list without
//! raw pointers. The chain performs no locking; callers hold the lock of the
//! region that owns it.

use crate::error::TableError;
use slotmap::{DefaultKey, SlotMap};

/// One stored key/value pair. The key is a private copy owned by the entry.
#[derive(Debug)]
pub struct Entry {
    key: Box<[u8]>,
    value: u32,
    next: Option<DefaultKey>,
}

impl Entry {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn set_value(&mut self, value: u32) {
        self.value = value;
    }
}

#[derive(Debug, Default)]
pub struct Chain {
    entries: SlotMap<DefaultKey, Entry>,
    head: Option<DefaultKey>,
}

/// Iterator over a chain from head to tail.
pub struct Iter<'a> {
    entries: &'a SlotMap<DefaultKey, Entry>,
    cursor: Option<DefaultKey>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Entry;
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.cursor?)?;
        self.cursor = entry.next;
        Some(entry)
    }
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            entries: &self.entries,
            cursor: self.head,
        }
    }

    fn slot_of(&self, key: &[u8]) -> Option<DefaultKey> {
        let mut cursor = self.head;
        while let Some(k) = cursor {
            let entry = self.entries.get(k)?;
            if *entry.key == *key {
                return Some(k);
            }
            cursor = entry.next;
        }
        None
    }

    /// Linear scan by exact byte equality.
    pub fn find(&self, key: &[u8]) -> Option<&Entry> {
        self.slot_of(key).and_then(|k| self.entries.get(k))
    }

    pub fn find_mut(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let k = self.slot_of(key)?;
        self.entries.get_mut(k)
    }

    /// Link a new entry at the head. Takes ownership of `key`; the caller
    /// has already checked that no entry for it exists.
    pub fn insert_head(&mut self, key: Box<[u8]>, value: u32) {
        debug_assert!(self.slot_of(&key).is_none(), "duplicate key in chain");
        let next = self.head;
        let k = self.entries.insert(Entry { key, value, next });
        self.head = Some(k);
    }

    /// Release every entry and its key copy, walking the links from the head.
    /// Returns how many entries were released.
    pub fn destroy_all(mut self) -> usize {
        let mut released = 0;
        let mut cursor = self.head.take();
        while let Some(k) = cursor {
            match self.entries.remove(k) {
                Some(entry) => {
                    cursor = entry.next;
                    released += 1;
                }
                None => break,
            }
        }
        debug_assert!(self.entries.is_empty(), "unlinked entries left in chain");
        released
    }
}

/// Make the table's private copy of a caller key.
pub(crate) fn own_key(key: &[u8]) -> Result<Box<[u8]>, TableError> {
    let mut owned = Vec::new();
    owned
        .try_reserve_exact(key.len())
        .map_err(|_| TableError::Allocation {
            what: "key copy",
            bytes: key.len(),
        })?;
    owned.extend_from_slice(key);
    Ok(owned.into_boxed_slice())
}
