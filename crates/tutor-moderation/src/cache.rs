use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::ModerationDecision;

struct Entry {
    decision: ModerationDecision,
    expires_at: Instant,
}

/// Fingerprint-keyed cache of recent moderation decisions, so the same
/// phrasing asked twice in a session skips the model. Bounded by a TTL
/// rather than an LRU size cap — the gate calls this far less often than
/// retrieval, so a small time-boxed map is enough.
pub struct ModerationCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl ModerationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, message: &str) -> Option<ModerationDecision> {
        let key = fingerprint(message);
        let mut entries = self.entries.lock().expect("moderation cache lock poisoned");
        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.decision.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, message: &str, decision: ModerationDecision) {
        let key = fingerprint(message);
        let mut entries = self.entries.lock().expect("moderation cache lock poisoned");
        entries.insert(
            key,
            Entry {
                decision,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

/// Case/whitespace-normalized fingerprint so trivial rephrasing (extra
/// spaces, different casing) still hits the cache.
fn fingerprint(message: &str) -> String {
    message.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_decision_is_returned_before_ttl_expires() {
        let cache = ModerationCache::new(Duration::from_secs(60));
        cache.put("Is collision avoidance required?", ModerationDecision::Allow { pronouns: None });
        assert!(cache.get("is collision avoidance required?").is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = ModerationCache::new(Duration::from_millis(0));
        cache.put("hello", ModerationDecision::Allow { pronouns: None });
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("hello").is_none());
    }
}
