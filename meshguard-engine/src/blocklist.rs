//! Blocklist and allowlist
//!
//! Both lists are keyed by sender id. Blocklisted senders short-circuit the
//! pipeline; allowlisted senders skip the rate limiter but are still scored.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use meshguard_core::{AllowlistEntry, BlockSource, BlocklistEntry};

#[derive(Debug, Default)]
pub struct Blocklist {
    entries: DashMap<String, BlocklistEntry>,
}

impl Blocklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sender. Returns false if it was already listed; an operator
    /// re-add refreshes the reason, an escalation never overwrites.
    ///
    /// Lookup and insert happen under one shard lock.
    pub fn add(&self, sender_id: &str, reason: &str, source: BlockSource) -> bool {
        match self.entries.entry(sender_id.to_string()) {
            Entry::Occupied(mut existing) => {
                if source == BlockSource::Operator {
                    let entry = existing.get_mut();
                    entry.reason = reason.to_string();
                    entry.source = source;
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(BlocklistEntry::new(sender_id, reason, source));
                true
            }
        }
    }

    pub fn remove(&self, sender_id: &str) -> Option<BlocklistEntry> {
        self.entries.remove(sender_id).map(|(_, entry)| entry)
    }

    pub fn contains(&self, sender_id: &str) -> bool {
        self.entries.contains_key(sender_id)
    }

    pub fn get(&self, sender_id: &str) -> Option<BlocklistEntry> {
        self.entries.get(sender_id).map(|e| e.value().clone())
    }

    /// Count a rejected message against a listed sender
    pub fn record_attempt(&self, sender_id: &str) -> Option<BlocklistEntry> {
        let mut entry = self.entries.get_mut(sender_id)?;
        entry.attempts += 1;
        Some(entry.value().clone())
    }

    /// All entries, oldest first
    pub fn entries(&self) -> Vec<BlocklistEntry> {
        let mut all: Vec<BlocklistEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.added_at.cmp(&b.added_at).then(a.sender_id.cmp(&b.sender_id)));
        all
    }

    pub fn import(&self, entries: Vec<BlocklistEntry>) {
        for entry in entries {
            self.entries.insert(entry.sender_id.clone(), entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Allowlist {
    entries: DashMap<String, AllowlistEntry>,
}

impl Allowlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sender_id: &str, reason: &str) -> bool {
        self.entries
            .insert(sender_id.to_string(), AllowlistEntry::new(sender_id, reason))
            .is_none()
    }

    pub fn remove(&self, sender_id: &str) -> bool {
        self.entries.remove(sender_id).is_some()
    }

    pub fn contains(&self, sender_id: &str) -> bool {
        self.entries.contains_key(sender_id)
    }

    pub fn entries(&self) -> Vec<AllowlistEntry> {
        let mut all: Vec<AllowlistEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.sender_id.cmp(&b.sender_id));
        all
    }

    pub fn import(&self, entries: Vec<AllowlistEntry>) {
        for entry in entries {
            self.entries.insert(entry.sender_id.clone(), entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
