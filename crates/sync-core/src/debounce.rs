//! Debounced free-text query.
//!
//! [`DebouncedQuery`] is the pure state machine; [`DebounceTimer`] arms the
//! quiet-period wait on the tokio runtime and reports the firing generation
//! back over a channel, so the owner applies it on its own task.

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::trace;

/// Observable state of the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending,
}

/// Handle describing the timer that must be armed after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTicket {
    pub generation: u64,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct DebouncedQuery {
    quiet: Duration,
    raw: String,
    settled: String,
    generation: u64,
    pending: Option<u64>,
}

impl DebouncedQuery {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            raw: String::new(),
            settled: String::new(),
            generation: 0,
            pending: None,
        }
    }

    /// Record a keystroke. Any previously armed ticket becomes stale.
    pub fn on_edit(&mut self, raw: impl Into<String>) -> DebounceTicket {
        self.raw = raw.into();
        self.generation += 1;
        self.pending = Some(self.generation);
        DebounceTicket {
            generation: self.generation,
            delay: self.quiet,
        }
    }

    /// Apply a timer firing. Returns the newly settled query when the firing
    /// is current, `None` when a newer edit or a cancel superseded it.
    pub fn fire(&mut self, generation: u64) -> Option<&str> {
        if self.pending != Some(generation) {
            trace!(generation, current = self.generation, "stale debounce firing ignored");
            return None;
        }
        self.pending = None;
        self.settled = self.raw.clone();
        Some(&self.settled)
    }

    /// Disarm the pending timer (blur or teardown). Returns whether one was
    /// pending.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn state(&self) -> DebounceState {
        if self.pending.is_some() {
            DebounceState::Pending
        } else {
            DebounceState::Idle
        }
    }

    pub fn raw_query(&self) -> &str {
        &self.raw
    }

    pub fn settled_query(&self) -> &str {
        &self.settled
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }
}

/// Cancellable quiet-period timer. Dropping or re-arming aborts the previous
/// wait, so a cancelled timer never reports.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    task: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `ticket`; `wrap` turns the generation into the
    /// owner's message type.
    pub fn arm<T, F>(&mut self, ticket: DebounceTicket, tx: mpsc::UnboundedSender<T>, wrap: F)
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(ticket.delay).await;
            let _ = tx.send(wrap(ticket.generation));
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_generation_settles() {
        let mut query = DebouncedQuery::new(Duration::from_millis(300));
        let tickets: Vec<_> = ["r", "ru", "rus", "rust", "rusty"]
            .iter()
            .map(|text| query.on_edit(*text))
            .collect();

        let mut fired = Vec::new();
        for ticket in &tickets {
            if let Some(settled) = query.fire(ticket.generation) {
                fired.push(settled.to_owned());
            }
        }

        assert_eq!(fired, vec!["rusty".to_owned()]);
        assert_eq!(query.settled_query(), "rusty");
        assert_eq!(query.state(), DebounceState::Idle);
    }

    #[test]
    fn cancel_leaves_settled_query_untouched() {
        let mut query = DebouncedQuery::new(Duration::from_millis(300));
        let ticket = query.on_edit("draft");
        assert_eq!(query.state(), DebounceState::Pending);

        assert!(query.cancel());
        assert_eq!(query.fire(ticket.generation), None);
        assert_eq!(query.settled_query(), "");
        assert_eq!(query.raw_query(), "draft");
        assert!(!query.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_deliver_a_single_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut query = DebouncedQuery::new(Duration::from_millis(300));
        let mut timer = DebounceTimer::new();

        for text in ["h", "he", "hel", "hell", "hello"] {
            let ticket = query.on_edit(text);
            timer.arm(ticket, tx.clone(), |generation| generation);
            tokio::time::advance(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        let mut settled = Vec::new();
        while let Ok(generation) = rx.try_recv() {
            if let Some(text) = query.fire(generation) {
                settled.push(text.to_owned());
            }
        }
        assert_eq!(settled, vec!["hello".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_reports() {
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let mut query = DebouncedQuery::new(Duration::from_millis(300));
        let mut timer = DebounceTimer::new();

        timer.arm(query.on_edit("abc"), tx, |generation| generation);
        timer.cancel();
        query.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(rx.try_recv().is_err());
        assert!(!timer.is_armed());
    }
}
