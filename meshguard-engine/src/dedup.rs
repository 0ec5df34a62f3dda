//! Near-duplicate detection
//!
//! Messages are normalized (case-folded, punctuation stripped, whitespace
//! collapsed) and fingerprinted with a truncated SHA-256. Each sender keeps a
//! bounded, time-windowed list of recent fingerprints.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use meshguard_core::{elapsed_secs, DedupParams, SeenFingerprint, SenderState};

/// Canonical form used for fingerprinting
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 16 hex characters of SHA-256 over the normalized text
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    let hash = hasher.finalize();
    format!("{:x}", hash)[..16].to_string()
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    enabled: bool,
    window_secs: f64,
    capacity: usize,
}

impl Deduplicator {
    pub fn from_params(params: &DedupParams) -> Self {
        Self {
            enabled: params.enabled,
            window_secs: params.window_secs,
            capacity: params.capacity,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true if `fingerprint` was already seen inside the window.
    /// Otherwise records it, evicting the oldest entry past capacity.
    pub fn check_and_record(&self, state: &mut SenderState, fingerprint: &str, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }

        let window = self.window_secs;
        state
            .recent_message_hashes
            .retain(|seen| elapsed_secs(seen.seen_at, now) <= window);

        if state
            .recent_message_hashes
            .iter()
            .any(|seen| seen.fingerprint == fingerprint)
        {
            return true;
        }

        state.recent_message_hashes.push_back(SeenFingerprint {
            fingerprint: fingerprint.to_string(),
            seen_at: now,
        });
        while state.recent_message_hashes.len() > self.capacity {
            state.recent_message_hashes.pop_front();
        }
        false
    }
}
