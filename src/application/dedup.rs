//! Trailing set of recently sent identifiers

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug)]
pub struct DedupSet {
    expires: HashMap<String, DateTime<Utc>>,
    ttl: Duration,
}

impl DedupSet {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            expires: HashMap::new(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(365)),
        }
    }

    /// Live membership; an expired entry is dropped on lookup
    pub fn contains(&mut self, product_id: &str, now: DateTime<Utc>) -> bool {
        match self.expires.get(product_id) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                self.expires.remove(product_id);
                false
            }
            None => false,
        }
    }

    /// Insert and return the expiry
    pub fn insert(&mut self, product_id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let expires_at = now + self.ttl;
        self.expires.insert(product_id.to_string(), expires_at);
        expires_at
    }

    /// Restore a persisted entry
    pub fn seed(&mut self, product_id: String, expires_at: DateTime<Utc>) {
        self.expires.insert(product_id, expires_at);
    }

    pub fn remove(&mut self, product_id: &str) -> bool {
        self.expires.remove(product_id).is_some()
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.expires.retain(|_, expires_at| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.expires.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expires.is_empty()
    }

    pub fn clear(&mut self) {
        self.expires.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let mut set = DedupSet::new(std::time::Duration::from_secs(300));
        let now = Utc::now();
        set.insert("B000TESTAA", now);

        assert!(set.contains("B000TESTAA", now + Duration::seconds(299)));
        assert!(!set.contains("B000TESTAA", now + Duration::seconds(300)));
        assert!(set.is_empty());
    }

    #[test]
    fn removal_releases_identifier() {
        let mut set = DedupSet::new(std::time::Duration::from_secs(300));
        let now = Utc::now();
        set.insert("B000TESTAA", now);
        assert!(set.remove("B000TESTAA"));
        assert!(!set.contains("B000TESTAA", now));
        assert!(!set.remove("B000TESTAA"));
    }

    #[test]
    fn purge_drops_only_expired() {
        let mut set = DedupSet::new(std::time::Duration::from_secs(10));
        let now = Utc::now();
        set.seed("old".to_string(), now - Duration::seconds(1));
        set.insert("new", now);
        set.purge_expired(now);
        assert_eq!(set.len(), 1);
    }
}
