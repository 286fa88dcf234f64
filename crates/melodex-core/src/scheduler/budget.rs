//! Global worker-slot budget shared across jobs — `spec.md` §4.2: global
//! `concurrency` bounded to `[1, 32]`.
//!
//! Grounded in the teacher's `GlobalConnectionBudget` (reserve/release via a
//! CAS loop), repurposed from "HTTP connections per job" to "one slot per
//! concurrently-downloading job" and renamed accordingly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared global concurrency budget. A worker reserves one slot before
/// dispatching a job to `downloading` and releases it when the job leaves
/// that status (completed, failed, paused, or cancelled).
#[derive(Debug)]
pub struct ConcurrencyBudget {
    max_total: usize,
    in_use: AtomicUsize,
}

impl ConcurrencyBudget {
    /// Create a budget with the given maximum concurrency (validated into
    /// `[1, 32]` by the caller — see `config::MIN_CONCURRENCY`/`MAX_CONCURRENCY`).
    pub fn new(max_total: usize) -> Self {
        Self {
            max_total: max_total.max(1),
            in_use: AtomicUsize::new(0),
        }
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    pub fn available(&self) -> usize {
        let used = self.in_use.load(Ordering::Relaxed);
        self.max_total.saturating_sub(used)
    }

    /// Reserve up to `requested` slots. Returns the number actually reserved
    /// (min(requested, available)). Caller must call `release` with that
    /// number when done.
    pub fn reserve(&self, requested: usize) -> usize {
        let mut current = self.in_use.load(Ordering::Relaxed);
        loop {
            let available = self.max_total.saturating_sub(current);
            let take = requested.min(available).min(self.max_total);
            match self.in_use.compare_exchange_weak(
                current,
                current + take,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return take,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn release(&self, n: usize) {
        self.in_use
            .fetch_sub(n.min(self.in_use.load(Ordering::Relaxed)), Ordering::Release);
    }

    /// Reserve exactly one slot, returning a guard that releases it on drop.
    /// Returns `None` if the budget is exhausted.
    pub fn try_acquire_one(self: &Arc<Self>) -> Option<BudgetGuard> {
        if self.reserve(1) == 1 {
            Some(BudgetGuard {
                budget: Arc::clone(self),
            })
        } else {
            None
        }
    }
}

/// RAII guard releasing one budget slot on drop — grounded in the teacher's
/// `execute::guard::BudgetGuard`.
pub struct BudgetGuard {
    budget: Arc<ConcurrencyBudget>,
}

impl Drop for BudgetGuard {
    fn drop(&mut self) {
        self.budget.release(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_reserve_and_release() {
        let budget = ConcurrencyBudget::new(16);
        assert_eq!(budget.available(), 16);
        assert_eq!(budget.reserve(8), 8);
        assert_eq!(budget.in_use(), 8);
        assert_eq!(budget.available(), 8);
        assert_eq!(budget.reserve(10), 8);
        assert_eq!(budget.in_use(), 16);
        assert_eq!(budget.available(), 0);
        assert_eq!(budget.reserve(1), 0);
        budget.release(8);
        assert_eq!(budget.available(), 8);
        budget.release(8);
        assert_eq!(budget.in_use(), 0);
        assert_eq!(budget.available(), 16);
    }

    #[test]
    fn guard_releases_on_drop() {
        let budget = Arc::new(ConcurrencyBudget::new(2));
        let g1 = budget.try_acquire_one().unwrap();
        let g2 = budget.try_acquire_one().unwrap();
        assert!(budget.try_acquire_one().is_none());
        drop(g1);
        assert_eq!(budget.available(), 1);
        let g3 = budget.try_acquire_one().unwrap();
        drop(g2);
        drop(g3);
        assert_eq!(budget.in_use(), 0);
    }
}
