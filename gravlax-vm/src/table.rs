// gravlax-vm - Bytecode compiler and virtual machine for the Gravlax programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Open-addressed hash table keyed by interned strings.
//!
//! One table type backs globals, class method tables, instance fields, and
//! the heap's string-interning set. Keys are handles to interned strings,
//! so ordinary lookups compare handles only; [`Table::find_string`] is the
//! single operation that compares content, and it is how interning decides
//! whether a string already exists.
//!
//! Linear probing with tombstones. The table grows at 3/4 load; tombstones
//! count toward load and are reclaimed on resize.

use crate::heap::Handle;
use crate::value::Value;

const MAX_LOAD_NUMERATOR: usize = 3;
const MAX_LOAD_DENOMINATOR: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
enum Entry {
    #[default]
    Empty,
    Tombstone,
    Full {
        key: Handle,
        hash: u32,
        value: Value,
    },
}

/// A hash table from interned-string handles to values.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<Entry>,
    /// Full entries plus tombstones; drives the load factor.
    count: usize,
}

impl Table {
    /// Create a new empty table.
    pub fn new() -> Self {
        Table::default()
    }

    /// Look up a key. `hash` must be the key string's cached hash.
    pub fn get(&self, key: Handle, hash: u32) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        match self.entries[self.find_slot(key, hash)] {
            Entry::Full { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Insert or update a key. Returns true if the key was not present.
    pub fn set(&mut self, key: Handle, hash: u32, value: Value) -> bool {
        if (self.count + 1) * MAX_LOAD_DENOMINATOR > self.entries.len() * MAX_LOAD_NUMERATOR {
            self.grow();
        }

        let slot = self.find_slot(key, hash);
        let is_new = !matches!(self.entries[slot], Entry::Full { .. });
        // Only a truly empty slot adds to the load; a reused tombstone was
        // already counted.
        if matches!(self.entries[slot], Entry::Empty) {
            self.count += 1;
        }
        self.entries[slot] = Entry::Full { key, hash, value };
        is_new
    }

    /// Remove a key, leaving a tombstone. Returns true if it was present.
    pub fn delete(&mut self, key: Handle, hash: u32) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let slot = self.find_slot(key, hash);
        if matches!(self.entries[slot], Entry::Full { .. }) {
            self.entries[slot] = Entry::Tombstone;
            true
        } else {
            false
        }
    }

    /// Copy every entry of `other` into this table.
    pub fn extend_from(&mut self, other: &Table) {
        for entry in &other.entries {
            if let Entry::Full { key, hash, value } = *entry {
                self.set(key, hash, value);
            }
        }
    }

    /// Find an interned string by content. `content` resolves a candidate
    /// key handle to its character data.
    pub fn find_string<'a, F>(&self, hash: u32, needle: &str, content: F) -> Option<Handle>
    where
        F: Fn(Handle) -> &'a str,
    {
        if self.entries.is_empty() {
            return None;
        }
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            match self.entries[index] {
                Entry::Empty => return None,
                Entry::Tombstone => {}
                Entry::Full {
                    key,
                    hash: entry_hash,
                    ..
                } => {
                    if entry_hash == hash && content(key) == needle {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Tombstone every entry whose key fails the predicate. Used by the
    /// collector to drop weak references to unmarked strings.
    pub fn retain_keys<F>(&mut self, keep: F)
    where
        F: Fn(Handle) -> bool,
    {
        for entry in &mut self.entries {
            if let Entry::Full { key, .. } = *entry
                && !keep(key)
            {
                *entry = Entry::Tombstone;
            }
        }
    }

    /// Iterate over the live entries.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, Value)> + '_ {
        self.entries.iter().filter_map(|entry| match *entry {
            Entry::Full { key, value, .. } => Some((key, value)),
            _ => None,
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True if the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Backing-store footprint in bytes, for GC accounting.
    pub fn byte_size(&self) -> usize {
        self.entries.len() * std::mem::size_of::<Entry>()
    }

    /// Index of the entry for `key`, or of the slot where it would be
    /// inserted (preferring the first tombstone passed on the way).
    fn find_slot(&self, key: Handle, hash: u32) -> usize {
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        let mut tombstone = None;
        loop {
            match self.entries[index] {
                Entry::Empty => return tombstone.unwrap_or(index),
                Entry::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Entry::Full { key: existing, .. } => {
                    if existing == key {
                        return index;
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Double the capacity (minimum 8) and rehash, dropping tombstones.
    fn grow(&mut self) {
        let capacity = (self.entries.len() * 2).max(8);
        let old = std::mem::replace(&mut self.entries, vec![Entry::Empty; capacity]);
        self.count = 0;
        for entry in old {
            if let Entry::Full { key, hash, value } = entry {
                let slot = self.find_slot(key, hash);
                self.entries[slot] = Entry::Full { key, hash, value };
                self.count += 1;
            }
        }
    }
}
