//! Per-genome record of already-emitted array indices.
//!
//! Stored as merged, disjoint, inclusive intervals so that long visited runs
//! cost one map entry and skip-ahead queries land past a whole run at once.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct PositionCache {
    /// start -> inclusive end, non-overlapping, non-adjacent.
    intervals: BTreeMap<i64, i64>,
    size: u64,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pos` as visited. Returns false if it was already present.
    pub fn insert(&mut self, pos: i64) -> bool {
        if let Some((&start, &end)) = self.intervals.range(..=pos).next_back() {
            if pos <= end {
                return false;
            }
            if pos == end + 1 {
                // extend the predecessor, possibly fusing with the successor
                let fuse = self
                    .intervals
                    .get(&(pos + 1))
                    .copied();
                if let Some(succ_end) = fuse {
                    self.intervals.remove(&(pos + 1));
                    self.intervals.insert(start, succ_end);
                } else {
                    self.intervals.insert(start, pos);
                }
                self.size += 1;
                return true;
            }
        }
        if let Some(&succ_end) = self.intervals.get(&(pos + 1)) {
            self.intervals.remove(&(pos + 1));
            self.intervals.insert(pos, succ_end);
        } else {
            self.intervals.insert(pos, pos);
        }
        self.size += 1;
        true
    }

    pub fn contains(&self, pos: i64) -> bool {
        self.intervals
            .range(..=pos)
            .next_back()
            .is_some_and(|(_, &end)| pos <= end)
    }

    /// First index >= `pos` not yet visited.
    pub fn next_unvisited(&self, pos: i64) -> i64 {
        match self.intervals.range(..=pos).next_back() {
            Some((_, &end)) if pos <= end => end + 1,
            _ => pos,
        }
    }

    /// Number of visited positions.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut cache = PositionCache::new();
        assert!(cache.insert(5));
        assert!(!cache.insert(5));
        assert!(cache.contains(5));
        assert!(!cache.contains(4));
        assert!(!cache.contains(6));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_interval_merging() {
        let mut cache = PositionCache::new();
        cache.insert(3);
        cache.insert(5);
        cache.insert(4); // fuses [3,3] and [5,5]
        assert!(cache.contains(3) && cache.contains(4) && cache.contains(5));
        assert_eq!(cache.len(), 3);

        cache.insert(2); // extends downward
        cache.insert(6); // extends upward
        assert_eq!(cache.next_unvisited(2), 7);
    }

    #[test]
    fn test_next_unvisited() {
        let mut cache = PositionCache::new();
        assert_eq!(cache.next_unvisited(0), 0);
        for i in 0..10 {
            cache.insert(i);
        }
        cache.insert(12);
        assert_eq!(cache.next_unvisited(0), 10);
        assert_eq!(cache.next_unvisited(10), 10);
        assert_eq!(cache.next_unvisited(12), 13);
        assert_eq!(cache.next_unvisited(20), 20);
    }
}
