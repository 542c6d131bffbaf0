//! Resident byte accounting for consumed sector geometry.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::state::GeometryKey;

/// Tracks bytes held by consumed pairs against a budget.
#[derive(Debug)]
pub struct MemoryBudget {
    budget: usize,
    usage: FxHashMap<GeometryKey, usize>,
    total: usize,
}

impl MemoryBudget {
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            usage: FxHashMap::default(),
            total: 0,
        }
    }

    pub fn on_consumed(&mut self, key: GeometryKey, bytes: usize) {
        if let Some(old) = self.usage.insert(key, bytes) {
            self.total -= old;
        }
        self.total += bytes;
    }

    pub fn on_released(&mut self, key: &GeometryKey) {
        if let Some(bytes) = self.usage.remove(key) {
            self.total -= bytes;
        }
    }

    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.total > self.budget
    }

    #[must_use]
    pub fn overage(&self) -> usize {
        self.total.saturating_sub(self.budget)
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    #[must_use]
    pub fn usage(&self, key: &GeometryKey) -> Option<usize> {
        self.usage.get(key).copied()
    }
}

/// Pick consumed pairs to release until the budget holds.
///
/// Pairs in `protected` are never chosen. The rest go lowest priority first
/// (missing priorities count as 0), ties by key.
pub fn select_evictions(
    budget: &MemoryBudget,
    priorities: &FxHashMap<GeometryKey, f32>,
    protected: &FxHashSet<GeometryKey>,
) -> Vec<GeometryKey> {
    let mut overage = budget.overage();
    if overage == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<(GeometryKey, usize, f32)> = budget
        .usage
        .iter()
        .filter(|(key, _)| !protected.contains(key))
        .map(|(&key, &bytes)| (key, bytes, priorities.get(&key).copied().unwrap_or(0.0)))
        .collect();
    candidates.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));

    let mut evict = Vec::new();
    for (key, bytes, _) in candidates {
        if overage == 0 {
            break;
        }
        evict.push(key);
        overage = overage.saturating_sub(bytes);
    }
    evict
}

#[cfg(test)]
mod tests {
    use strata_sector::{Fidelity, SectorId};

    use super::*;

    fn key(id: u32) -> GeometryKey {
        (SectorId(id), Fidelity::Detailed)
    }

    #[test]
    fn test_totals_follow_consume_and_release() {
        let mut budget = MemoryBudget::new(100);
        budget.on_consumed(key(1), 60);
        budget.on_consumed(key(2), 30);
        assert_eq!(budget.total_bytes(), 90);
        assert!(!budget.is_over_budget());

        budget.on_consumed(key(2), 50);
        assert_eq!(budget.total_bytes(), 110);
        assert_eq!(budget.overage(), 10);

        budget.on_released(&key(1));
        budget.on_released(&key(1));
        assert_eq!(budget.total_bytes(), 50);
    }

    #[test]
    fn test_under_budget_evicts_nothing() {
        let mut budget = MemoryBudget::new(100);
        budget.on_consumed(key(1), 100);
        assert!(select_evictions(&budget, &FxHashMap::default(), &FxHashSet::default()).is_empty());
    }

    #[test]
    fn test_evicts_lowest_priority_until_within_budget() {
        let mut budget = MemoryBudget::new(100);
        for id in 1..=4 {
            budget.on_consumed(key(id), 40);
        }
        let priorities: FxHashMap<_, _> =
            [(key(1), 0.9), (key(2), 0.1), (key(3), 0.5), (key(4), 0.05)].into_iter().collect();
        let protected: FxHashSet<_> = [key(4)].into_iter().collect();

        let evict = select_evictions(&budget, &priorities, &protected);
        assert_eq!(evict, vec![key(2), key(3)]);
    }
}
