//! Bounded page cache with an insertion-order eviction ledger.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::Page;

/// How [`PageCache`] picks a victim once it is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the oldest inserted page. Reads never reorder the ledger.
    #[default]
    Fifo,
    /// Evict the least recently read page. Every hit moves the page to the back.
    Lru,
}

/// Maps page indices to materialized pages, holding at most `capacity` entries.
#[derive(Debug)]
pub struct PageCache<T> {
    capacity: usize,
    policy: EvictionPolicy,
    entries: HashMap<usize, Page<T>>,
    ledger: VecDeque<usize>,
}

impl<T> PageCache<T> {
    /// Create an empty cache. A zero capacity is raised to one.
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            policy,
            entries: HashMap::with_capacity(capacity),
            ledger: VecDeque::with_capacity(capacity),
        }
    }

    /// Maximum number of resident pages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no page is resident.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `page` is resident.
    pub fn contains(&self, page: usize) -> bool {
        self.entries.contains_key(&page)
    }

    /// Look up a page without touching the ledger.
    pub fn get(&self, page: usize) -> Option<Page<T>> {
        self.entries.get(&page).cloned()
    }

    /// Record a read of `page`. Only reorders the ledger under [`EvictionPolicy::Lru`].
    pub fn touch(&mut self, page: usize) {
        if self.policy != EvictionPolicy::Lru || !self.entries.contains_key(&page) {
            return;
        }
        if let Some(pos) = self.ledger.iter().position(|&p| p == page) {
            self.ledger.remove(pos);
        }
        self.ledger.push_back(page);
    }

    /// Store `contents` under `page`, returning the index of the page evicted
    /// to make room, if any.
    ///
    /// Replacing a resident page keeps its ledger position.
    pub fn put(&mut self, page: usize, contents: Page<T>) -> Option<usize> {
        if self.entries.contains_key(&page) {
            self.entries.insert(page, contents);
            return None;
        }

        let mut evicted = None;
        if self.ledger.len() >= self.capacity {
            if let Some(victim) = self.ledger.pop_front() {
                self.entries.remove(&victim);
                trace!(victim, "evicted page");
                evicted = Some(victim);
            }
        }

        self.ledger.push_back(page);
        self.entries.insert(page, contents);
        evicted
    }

    /// Drop every page and the ledger.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ledger.clear();
    }

    /// Resident page indices in ascending order.
    pub fn resident(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.entries.keys().copied().collect();
        pages.sort_unstable();
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn page(values: &[u32]) -> Page<u32> {
        Arc::from(values.to_vec())
    }

    #[test]
    fn evicts_oldest_insert_first() {
        let mut cache = PageCache::new(2, EvictionPolicy::Fifo);
        assert_eq!(cache.put(0, page(&[0])), None);
        assert_eq!(cache.put(1, page(&[1])), None);
        // Reads do not protect page 0 under FIFO.
        assert!(cache.get(0).is_some());
        cache.touch(0);
        assert_eq!(cache.put(2, page(&[2])), Some(0));
        assert_eq!(cache.resident(), vec![1, 2]);
    }

    #[test]
    fn lru_policy_keeps_recently_read_pages() {
        let mut cache = PageCache::new(2, EvictionPolicy::Lru);
        cache.put(0, page(&[0]));
        cache.put(1, page(&[1]));
        cache.touch(0);
        assert_eq!(cache.put(2, page(&[2])), Some(1));
        assert_eq!(cache.resident(), vec![0, 2]);
    }

    #[test]
    fn replacing_a_page_does_not_evict() {
        let mut cache = PageCache::new(2, EvictionPolicy::Fifo);
        cache.put(0, page(&[0]));
        cache.put(1, page(&[1]));
        assert_eq!(cache.put(1, page(&[10])), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(1).as_deref(), Some(&[10][..]));
        // Page 0 is still the oldest.
        assert_eq!(cache.put(5, page(&[5])), Some(0));
    }

    #[test]
    fn zero_capacity_is_raised_and_clear_empties() {
        let mut cache = PageCache::new(0, EvictionPolicy::Fifo);
        assert_eq!(cache.capacity(), 1);
        cache.put(3, page(&[3]));
        assert_eq!(cache.put(4, page(&[4])), Some(3));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.put(7, page(&[7])), None);
    }
}
