//! Per-patient fingerprint cache for change suppression.
//!
//! The poll loop compares each fetched artifact's fingerprint against the
//! last one seen for that patient; unchanged content produces no
//! notification. Entries age out so a patient reopened much later gets a
//! fresh notification even for unchanged content.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct FingerprintCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl FingerprintCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The last fingerprint seen for this patient, unless it has expired.
    pub fn get(&self, patient_id: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(patient_id) {
            Some((fingerprint, stored_at)) if stored_at.elapsed() < self.ttl => {
                Some(fingerprint.clone())
            }
            Some(_) => {
                entries.remove(patient_id);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, patient_id: &str, fingerprint: &str) {
        self.lock()
            .insert(patient_id.to_string(), (fingerprint.to_string(), Instant::now()));
    }

    pub fn invalidate(&self, patient_id: &str) {
        self.lock().remove(patient_id);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
