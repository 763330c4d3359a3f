use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::store::Removed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<A> {
    id: TimerId,
    deadline: Instant,
    action: A,
}

/// Deadline queue polled by the event loop that owns it. Nothing runs on its
/// own: the owner passes the current instant in and gets back whatever has
/// come due.
#[derive(Debug)]
pub struct Scheduler<A> {
    next_id: u64,
    entries: Vec<Entry<A>>,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: vec![],
        }
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: Instant, after: Duration, action: A) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let deadline = now + after;
        trace!(id = id.0, ?after, "scheduled timer");
        self.entries.push(Entry {
            id,
            deadline,
            action,
        });
        id
    }

    /// Drops a pending timer. `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let cancelled = self.entries.len() != before;
        if cancelled {
            trace!(id = id.0, "cancelled timer");
        }
        cancelled
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every action whose deadline is at or before
    /// `now`, earliest first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<A> {
        let (mut due, pending): (Vec<Entry<A>>, Vec<Entry<A>>) = self
            .entries
            .drain(..)
            .partition(|e| e.deadline <= now);
        self.entries = pending;
        due.sort_by_key(|e| (e.deadline, e.id.0));
        due.into_iter().map(|e| e.action).collect()
    }

    /// Teardown: forget everything still pending.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!(count = self.entries.len(), "dropping pending timers");
        }
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UndoAction {
    Expire,
}

/// Short window after a deletion during which it can be taken back. Only the
/// latest deletion is undoable; a new one cancels the previous window.
#[derive(Debug)]
pub struct UndoWindow {
    window: Duration,
    timers: Scheduler<UndoAction>,
    pending: Option<(TimerId, Removed)>,
}

impl UndoWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timers: Scheduler::new(),
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn open(&mut self, now: Instant, removed: Removed) {
        if let Some((timer, previous)) = self.pending.take() {
            self.timers.cancel(timer);
            debug!(id = %previous.task.id, "superseded undo window");
        }
        let timer = self.timers.schedule(now, self.window, UndoAction::Expire);
        self.pending = Some((timer, removed));
    }

    /// Closes the window if its time is up. Returns the task that can no
    /// longer be restored.
    pub fn expire(&mut self, now: Instant) -> Option<Removed> {
        let fired = self.timers.take_expired(now);
        if !fired.contains(&UndoAction::Expire) {
            return None;
        }
        let (_, removed) = self.pending.take()?;
        debug!(id = %removed.task.id, "undo window closed");
        Some(removed)
    }

    /// The deleted task, if the window is still open at `now`.
    pub fn undo(&mut self, now: Instant) -> Option<Removed> {
        self.expire(now);
        let (timer, removed) = self.pending.take()?;
        self.timers.cancel(timer);
        Some(removed)
    }

    pub fn pending(&self) -> Option<&Removed> {
        self.pending.as_ref().map(|(_, removed)| removed)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let (timer, _) = self.pending.as_ref()?;
        self.timers
            .entries
            .iter()
            .find(|e| e.id == *timer)
            .map(|e| e.deadline.saturating_duration_since(now))
    }

    pub fn close(&mut self) {
        self.pending = None;
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn removed(text: &str) -> Removed {
        Removed {
            task: Task::from_input(text, None).expect("task"),
            index: 0,
        }
    }

    #[test]
    fn fires_in_deadline_order_and_only_once() {
        let start = Instant::now();
        let mut timers = Scheduler::new();
        timers.schedule(start, Duration::from_secs(3), "late");
        timers.schedule(start, Duration::from_secs(1), "early");
        timers.schedule(start, Duration::from_secs(10), "later");

        assert!(timers.take_expired(start).is_empty());
        assert_eq!(
            timers.take_expired(start + Duration::from_secs(5)),
            vec!["early", "late"]
        );
        assert!(timers.take_expired(start + Duration::from_secs(5)).is_empty());
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let start = Instant::now();
        let mut timers = Scheduler::new();
        let id = timers.schedule(start, Duration::from_millis(300), 1);
        assert!(timers.is_pending(id));
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(timers.take_expired(start + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let start = Instant::now();
        let mut timers = Scheduler::new();
        timers.schedule(start, Duration::ZERO, ());
        timers.clear();
        assert!(timers.is_empty());
    }

    #[test]
    fn undo_within_window_returns_task() {
        let start = Instant::now();
        let mut undo = UndoWindow::new(Duration::from_secs(5));
        undo.open(start, removed("milk"));

        let back = undo.undo(start + Duration::from_secs(4)).expect("still open");
        assert_eq!(back.task.text, "milk");
        assert!(undo.undo(start + Duration::from_secs(4)).is_none());
    }

    #[test]
    fn undo_after_window_is_gone() {
        let start = Instant::now();
        let mut undo = UndoWindow::new(Duration::from_secs(5));
        undo.open(start, removed("milk"));

        assert_eq!(undo.remaining(start + Duration::from_secs(2)), Some(Duration::from_secs(3)));
        assert!(undo.undo(start + Duration::from_secs(5)).is_none());
        assert!(undo.pending().is_none());
    }

    #[test]
    fn new_deletion_supersedes_previous_window() {
        let start = Instant::now();
        let mut undo = UndoWindow::new(Duration::from_secs(5));
        undo.open(start, removed("first"));
        undo.open(start + Duration::from_secs(4), removed("second"));

        // The first window's deadline passes without closing the second.
        assert!(undo.expire(start + Duration::from_secs(6)).is_none());
        let back = undo.undo(start + Duration::from_secs(8)).expect("second open");
        assert_eq!(back.task.text, "second");
    }

    #[test]
    fn expire_reports_closed_window() {
        let start = Instant::now();
        let mut undo = UndoWindow::new(Duration::from_secs(1));
        undo.open(start, removed("gone"));
        let closed = undo.expire(start + Duration::from_secs(2)).expect("closed");
        assert_eq!(closed.task.text, "gone");
        undo.close();
        assert!(undo.pending().is_none());
    }
}
