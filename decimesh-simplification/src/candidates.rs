//! Mutable priority queue of vertex-pair merge candidates
//!
//! One entry per unique unordered neighbor pair, keyed by merge cost.
//! Entries are updated in place as quadrics change; a sentinel infinite
//! cost marks pairs that must never be merged, which sink to the bottom of
//! the queue instead of being deleted. Each vertex tracks the partners of
//! its live entries so merges can rewrite or retire them without scanning.

use std::cmp::Ordering;
use std::collections::HashSet;

use priority_queue::PriorityQueue;

use crate::attributes::AttrVec;

/// Sentinel cost marking permanently vetoed pairs.
pub const BLOCKED_COST: f64 = f64::INFINITY;

/// Cost and optimal merged position of a candidate pair.
#[derive(Debug, Clone)]
pub struct CandidatePriority {
    pub cost: f64,
    pub position: AttrVec,
}

impl PartialEq for CandidatePriority {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}

impl Eq for CandidatePriority {}

impl PartialOrd for CandidatePriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CandidatePriority {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smallest cost pops first
        other.cost.total_cmp(&self.cost)
    }
}

#[inline]
fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Candidate heap with per-vertex membership tracking.
pub struct CandidateHeap {
    queue: PriorityQueue<(usize, usize), CandidatePriority>,
    /// For each vertex, the other endpoint of every live entry it is in.
    memberships: Vec<HashSet<usize>>,
}

impl CandidateHeap {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            queue: PriorityQueue::new(),
            memberships: vec![HashSet::new(); vertex_count],
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Insert (or replace) the entry for the unordered pair `(a, b)`.
    pub fn insert(&mut self, a: usize, b: usize, priority: CandidatePriority) {
        self.queue.push(edge_key(a, b), priority);
        self.memberships[a].insert(b);
        self.memberships[b].insert(a);
    }

    /// Pop the cheapest entry, retiring both memberships.
    pub fn pop(&mut self) -> Option<(usize, usize, CandidatePriority)> {
        let ((a, b), priority) = self.queue.pop()?;
        self.memberships[a].remove(&b);
        self.memberships[b].remove(&a);
        Some((a, b, priority))
    }

    /// Re-key an existing entry; no-op if the pair has no live entry.
    pub fn update(&mut self, a: usize, b: usize, priority: CandidatePriority) {
        self.queue.change_priority(&edge_key(a, b), priority);
    }

    /// Current cost of the pair's entry, if live.
    pub fn cost(&self, a: usize, b: usize) -> Option<f64> {
        self.queue.get_priority(&edge_key(a, b)).map(|p| p.cost)
    }

    /// Partners of every live entry containing `v`.
    pub fn partners(&self, v: usize) -> Vec<usize> {
        self.memberships[v].iter().copied().collect()
    }

    /// Rewrite every entry referencing `from` so it references `to`
    /// instead, carrying each entry's priority (including the blocked
    /// sentinel). A rewritten pair that already has a live entry is erased:
    /// at most one entry per unordered pair survives.
    pub fn rewrite_vertex(&mut self, from: usize, to: usize) {
        let partners: Vec<usize> = self.memberships[from].drain().collect();
        for p in partners {
            self.memberships[p].remove(&from);
            let Some((_, priority)) = self.queue.remove(&edge_key(from, p)) else {
                continue;
            };
            if p == to || self.memberships[to].contains(&p) {
                continue;
            }
            self.queue.push(edge_key(to, p), priority);
            self.memberships[to].insert(p);
            self.memberships[p].insert(to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prio(cost: f64) -> CandidatePriority {
        CandidatePriority {
            cost,
            position: AttrVec::zeros(3),
        }
    }

    #[test]
    fn test_pop_order_is_min_cost() {
        let mut heap = CandidateHeap::new(4);
        heap.insert(0, 1, prio(5.0));
        heap.insert(1, 2, prio(1.0));
        heap.insert(2, 3, prio(3.0));

        let (a, b, p) = heap.pop().unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(p.cost, 1.0);
        assert_eq!(heap.pop().unwrap().2.cost, 3.0);
        assert_eq!(heap.pop().unwrap().2.cost, 5.0);
        assert!(heap.pop().is_none());
    }

    #[test]
    fn test_update_reorders() {
        let mut heap = CandidateHeap::new(3);
        heap.insert(0, 1, prio(5.0));
        heap.insert(1, 2, prio(1.0));

        heap.update(0, 1, prio(0.1));
        let (a, b, _) = heap.pop().unwrap();
        assert_eq!((a, b), (0, 1));
    }

    #[test]
    fn test_blocked_entries_sink_to_the_end() {
        let mut heap = CandidateHeap::new(3);
        heap.insert(0, 1, prio(BLOCKED_COST));
        heap.insert(1, 2, prio(9.0));

        assert_eq!(heap.pop().unwrap().2.cost, 9.0);
        assert!(heap.pop().unwrap().2.cost.is_infinite());
    }

    #[test]
    fn test_memberships_track_entries() {
        let mut heap = CandidateHeap::new(4);
        heap.insert(0, 1, prio(1.0));
        heap.insert(0, 2, prio(2.0));
        assert_eq!(heap.partners(0).len(), 2);

        heap.pop().unwrap();
        assert_eq!(heap.partners(0), vec![2]);
        assert_eq!(heap.cost(0, 2), Some(2.0));
        assert_eq!(heap.cost(0, 1), None);
    }

    #[test]
    fn test_rewrite_vertex_merges_and_dedupes() {
        let mut heap = CandidateHeap::new(5);
        heap.insert(1, 2, prio(1.0)); // duplicate-to-be
        heap.insert(3, 2, prio(2.0));
        heap.insert(3, 4, prio(3.0));

        // Merge 3 into 1: (3,2) collides with (1,2) and is erased,
        // (3,4) becomes (1,4).
        heap.rewrite_vertex(3, 1);

        assert_eq!(heap.len(), 2);
        assert_eq!(heap.cost(1, 2), Some(1.0));
        assert_eq!(heap.cost(1, 4), Some(3.0));
        assert!(heap.partners(3).is_empty());
        assert!(heap.partners(4).contains(&1));
    }

    #[test]
    fn test_rewrite_preserves_blocked_sentinel() {
        let mut heap = CandidateHeap::new(4);
        heap.insert(2, 3, prio(BLOCKED_COST));
        heap.rewrite_vertex(2, 0);
        assert!(heap.cost(0, 3).unwrap().is_infinite());
    }
}
