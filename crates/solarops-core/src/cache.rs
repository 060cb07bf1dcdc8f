// Bounded recent-results cache with live fan-out
//
// Owned by the engine and shared by reference. Subscribers receive every
// pushed entry; lagging subscribers miss entries rather than block pushes.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::broadcast;

const SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug)]
pub struct RecentResults<T> {
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
    sender: broadcast::Sender<T>,
}

impl<T: Clone> RecentResults<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(SUBSCRIBER_BUFFER.max(capacity.min(1024)));
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            sender,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, evicting the oldest beyond capacity
    pub fn push(&self, entry: T) {
        {
            let mut entries = self.entries.lock();
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        // No receivers is not an error
        let _ = self.sender.send(entry);
    }

    /// Up to `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<T> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Entries matching `predicate`, newest first
    pub fn query<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let cache = RecentResults::new(3);
        for i in 0..5 {
            cache.push(i);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.recent(10), vec![4, 3, 2]);
        assert_eq!(cache.recent(1), vec![4]);
    }

    #[test]
    fn test_query_filters_newest_first() {
        let cache = RecentResults::new(10);
        for i in 0..6 {
            cache.push(i);
        }
        assert_eq!(cache.query(|n| n % 2 == 0), vec![4, 2, 0]);
    }

    #[tokio::test]
    async fn test_subscribers_receive_pushes() {
        let cache = RecentResults::new(2);
        let mut rx = cache.subscribe();
        cache.push("a".to_string());
        cache.push("b".to_string());
        assert_eq!(rx.recv().await.unwrap(), "a");
        assert_eq!(rx.recv().await.unwrap(), "b");
        assert_eq!(cache.subscriber_count(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = RecentResults::new(0);
        cache.push(1);
        cache.push(2);
        assert_eq!(cache.recent(5), vec![2]);
    }
}
