//! In-memory entry store

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::semantic_cache::{CacheEntry, SlotOwner, SlotResolver};
use crate::domain::DomainError;

/// Key → entry map plus the slot → key reverse map
///
/// Every slot in the reverse map belongs to exactly one stored entry. Slots of
/// removed or replaced entries drop out of the map and stay dead in the index
/// until compaction.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: HashMap<String, CacheEntry>,
    slots: HashMap<usize, String>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Entry under `key` if it has not expired at `now`
    pub fn get_valid(&self, key: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        self.entries.get(key).filter(|entry| entry.is_valid_at(now))
    }

    pub fn is_valid(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.get_valid(key, now).is_some()
    }

    /// Owner of `slot`, if any live entry claims it
    pub fn slot_owner(&self, slot: usize) -> Option<&CacheEntry> {
        self.slots.get(&slot).and_then(|key| self.entries.get(key))
    }

    /// Store an entry, returning the one it replaced
    pub fn put(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let previous = self.remove(entry.key());

        if let Some(slot) = entry.slot() {
            if let Some(stale_key) = self.slots.insert(slot, entry.key().to_string()) {
                // Older claimant loses its vector binding
                if let Some(stale) = self.entries.get_mut(&stale_key) {
                    stale.clear_slot();
                }
            }
        }

        self.entries.insert(entry.key().to_string(), entry);
        previous
    }

    /// Insert a persisted entry after checking it against the loaded index
    pub fn restore(
        &mut self,
        entry: CacheEntry,
        index_len: usize,
        index_dimension: Option<usize>,
    ) -> Result<(), DomainError> {
        entry.validate(index_len, index_dimension)?;

        if self.entries.contains_key(entry.key()) {
            return Err(DomainError::corrupt_entry(entry.key(), "duplicate key"));
        }

        if let Some(slot) = entry.slot() {
            if self.slots.contains_key(&slot) {
                return Err(DomainError::corrupt_entry(
                    entry.key(),
                    format!("slot {} already claimed", slot),
                ));
            }
        }

        self.put(entry);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;

        if let Some(slot) = entry.slot() {
            if self.slots.get(&slot).map(String::as_str) == Some(key) {
                self.slots.remove(&slot);
            }
        }

        Some(entry)
    }

    /// Increment the hit counter of `key`, returning the new count
    pub fn record_hit(&mut self, key: &str) -> Option<u64> {
        let entry = self.entries.get_mut(key)?;
        entry.record_hit();
        Some(entry.hit_count())
    }

    /// Drop every entry stale at `now`; index slots are left in place
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let stale: Vec<String> = self
            .entries
            .values()
            .filter(|entry| !entry.is_valid_at(now))
            .map(|entry| entry.key().to_string())
            .collect();

        for key in &stale {
            self.remove(key);
        }

        stale.len()
    }

    /// Slots in an index of `index_len` vectors that no entry owns
    pub fn dead_slots(&self, index_len: usize) -> usize {
        index_len.saturating_sub(self.slots.len())
    }

    /// Entries that own an index slot, in slot order
    pub fn slotted_keys(&self) -> Vec<(usize, String)> {
        let mut slotted: Vec<(usize, String)> = self
            .slots
            .iter()
            .map(|(slot, key)| (*slot, key.clone()))
            .collect();
        slotted.sort_unstable_by_key(|(slot, _)| *slot);
        slotted
    }

    /// Move the entry under `key` to a new slot
    pub fn rebind(&mut self, key: &str, slot: usize) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };

        if let Some(old) = entry.slot() {
            if self.slots.get(&old).map(String::as_str) == Some(key) {
                self.slots.remove(&old);
            }
        }

        entry.set_slot(slot);
        self.slots.insert(slot, key.to_string());
    }

    /// Forget every slot binding; entries stay, exact lookups keep working
    pub fn clear_slots(&mut self) {
        self.slots.clear();
        for entry in self.entries.values_mut() {
            entry.clear_slot();
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Entries sorted by key, for stable snapshots
    pub fn sorted_entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.slots.clear();
    }
}

impl SlotResolver for EntryStore {
    fn resolve(&self, slot: usize, now: DateTime<Utc>) -> Option<SlotOwner<'_>> {
        let entry = self.slot_owner(slot)?;

        Some(SlotOwner {
            key: entry.key(),
            partition: entry.partition(),
            valid: entry.is_valid_at(now),
        })
    }
}
