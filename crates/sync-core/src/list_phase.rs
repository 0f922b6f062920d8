use crate::types::ListKind;

/// Refresh phase of one mirrored list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListPhase {
    #[default]
    Idle,
    /// A backend fetch is in flight.
    Fetching,
    /// A fetched snapshot is being merged into the rows.
    Reconciling,
}

/// Per-list reentrancy guard.
///
/// A refresh request that finds the list busy is dropped, not queued.
#[derive(Debug, Clone)]
pub struct ListGuard {
    list: ListKind,
    phase: ListPhase,
    skipped: u64,
    generation: u64,
}

impl ListGuard {
    pub fn new(list: ListKind) -> Self {
        Self {
            list,
            phase: ListPhase::Idle,
            skipped: 0,
            generation: 0,
        }
    }

    pub fn list(&self) -> ListKind {
        self.list
    }

    pub fn phase(&self) -> ListPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != ListPhase::Idle
    }

    /// Number of refresh requests dropped because the list was busy.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Generation of the most recent fetch that was started.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Enter `Fetching` when idle. Returns the fetch generation, or `None`
    /// when the request must be dropped.
    pub fn try_begin_fetch(&mut self) -> Option<u64> {
        if self.is_busy() {
            self.skipped += 1;
            return None;
        }
        self.generation += 1;
        self.phase = ListPhase::Fetching;
        Some(self.generation)
    }

    /// Move from `Fetching` to `Reconciling` for the current generation.
    /// Completions of superseded fetches are rejected.
    pub fn begin_reconcile(&mut self, generation: u64) -> bool {
        if self.phase != ListPhase::Fetching || generation != self.generation {
            return false;
        }
        self.phase = ListPhase::Reconciling;
        true
    }

    /// Return to `Idle` after a completed or failed cycle.
    pub fn finish(&mut self) {
        self.phase = ListPhase::Idle;
    }

    /// Abandon whatever is in flight; its completion will be rejected by
    /// [`ListGuard::begin_reconcile`].
    pub fn reset(&mut self) {
        self.generation += 1;
        self.phase = ListPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_fetch_reconcile_finish_cycle() {
        let mut guard = ListGuard::new(ListKind::Dialogs);

        let generation = guard.try_begin_fetch().expect("idle guard should start");
        assert_eq!(guard.phase(), ListPhase::Fetching);

        assert!(guard.begin_reconcile(generation));
        assert_eq!(guard.phase(), ListPhase::Reconciling);

        guard.finish();
        assert_eq!(guard.phase(), ListPhase::Idle);
    }

    #[test]
    fn drops_requests_while_busy() {
        let mut guard = ListGuard::new(ListKind::Messages);
        guard.try_begin_fetch().expect("first fetch starts");

        assert_eq!(guard.try_begin_fetch(), None);
        assert_eq!(guard.try_begin_fetch(), None);
        assert_eq!(guard.skipped(), 2);
    }

    #[test]
    fn reset_rejects_in_flight_completion() {
        let mut guard = ListGuard::new(ListKind::Messages);
        let generation = guard.try_begin_fetch().expect("fetch starts");

        guard.reset();
        assert!(!guard.is_busy());
        assert!(!guard.begin_reconcile(generation));

        let next = guard.try_begin_fetch().expect("fetch starts after reset");
        assert!(guard.begin_reconcile(next));
    }
}
