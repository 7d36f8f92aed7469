//! Navigation work queue with a per-URL cooldown

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use super::page_agent::PageHandle;
use crate::domain::events::EntryState;

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub page: PageHandle,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub state: EntryState,
}

impl QueueEntry {
    pub fn url(&self) -> &str {
        self.page.url()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueRejection {
    /// Same URL enqueued within the cooldown window
    Cooldown,
    Full,
}

#[derive(Debug)]
pub struct NavigationQueue {
    entries: VecDeque<QueueEntry>,
    recent: HashMap<String, DateTime<Utc>>,
    cooldown: Duration,
    capacity: usize,
}

impl NavigationQueue {
    pub fn new(cooldown: std::time::Duration, capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            recent: HashMap::new(),
            cooldown: Duration::from_std(cooldown).unwrap_or_else(|_| Duration::days(365)),
            capacity,
        }
    }

    /// Remember an enqueue that happened before a restart
    pub fn seed_cooldown(&mut self, url: &str, enqueued_at: DateTime<Utc>) {
        self.recent.insert(url.to_string(), enqueued_at);
    }

    pub fn in_cooldown(&self, url: &str, now: DateTime<Utc>) -> bool {
        self.recent
            .get(url)
            .is_some_and(|last| now.signed_duration_since(*last) < self.cooldown)
    }

    pub fn try_enqueue(&mut self, page: PageHandle, now: DateTime<Utc>) -> Result<(), EnqueueRejection> {
        if self.in_cooldown(page.url(), now) {
            return Err(EnqueueRejection::Cooldown);
        }
        if self.entries.len() >= self.capacity {
            return Err(EnqueueRejection::Full);
        }

        let cooldown = self.cooldown;
        self.recent.retain(|_, last| now.signed_duration_since(*last) < cooldown);
        self.recent.insert(page.url().to_string(), now);
        self.entries.push_back(QueueEntry { page, enqueued_at: now, attempts: 0, state: EntryState::Pending });
        Ok(())
    }

    /// Next entry to extract, marked `Extracting`
    pub fn pop_next(&mut self) -> Option<QueueEntry> {
        let mut entry = self.entries.pop_front()?;
        entry.attempts += 1;
        entry.state = EntryState::Extracting;
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(url: &str) -> PageHandle {
        PageHandle::detached(url, mpsc::channel(1).0)
    }

    fn queue() -> NavigationQueue {
        NavigationQueue::new(std::time::Duration::from_secs(2), 4)
    }

    #[test]
    fn repeat_navigation_within_cooldown_is_skipped() {
        let mut queue = queue();
        let now = Utc::now();
        assert!(queue.try_enqueue(handle("https://x/dp/B000TESTAA"), now).is_ok());
        assert_eq!(
            queue.try_enqueue(handle("https://x/dp/B000TESTAA"), now + Duration::milliseconds(500)).unwrap_err(),
            EnqueueRejection::Cooldown
        );
        assert_eq!(queue.len(), 1);

        assert!(queue.try_enqueue(handle("https://x/dp/B000TESTAA"), now + Duration::seconds(3)).is_ok());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn seeded_cooldown_survives_restart() {
        let mut queue = queue();
        let now = Utc::now();
        queue.seed_cooldown("https://x/dp/B000TESTAA", now - Duration::seconds(1));
        assert!(queue.in_cooldown("https://x/dp/B000TESTAA", now));
        assert!(!queue.in_cooldown("https://x/dp/B000TESTAA", now + Duration::seconds(2)));
    }

    #[test]
    fn pop_marks_extracting_and_counts_attempt() {
        let mut queue = queue();
        queue.try_enqueue(handle("https://x/a"), Utc::now()).unwrap();
        let entry = queue.pop_next().unwrap();
        assert_eq!(entry.state, EntryState::Extracting);
        assert_eq!(entry.attempts, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut queue = NavigationQueue::new(std::time::Duration::from_millis(1), 1);
        let now = Utc::now();
        queue.try_enqueue(handle("https://x/a"), now).unwrap();
        assert_eq!(queue.try_enqueue(handle("https://x/b"), now).unwrap_err(), EnqueueRejection::Full);
    }
}
