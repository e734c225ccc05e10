//! Generic pending-value-with-deadline primitive.
//!
//! Every timer-driven feature in the engine (typing, scroll, hover dwell,
//! text selection, mutation batching, reconnect, page polling) is a
//! `Debouncer<T>`: a pending value plus a deadline, rescheduled on each
//! relevant signal and drained when the quiet period elapses.

/// A pending value that becomes due after a quiet period.
#[derive(Debug)]
pub struct Debouncer<T> {
    quiet_ms: u64,
    pending: Option<T>,
    deadline_ms: u64,
}

impl<T> Debouncer<T> {
    /// Create a debouncer with the given quiet period.
    #[must_use]
    pub const fn new(quiet_ms: u64) -> Self {
        Self {
            quiet_ms,
            pending: None,
            deadline_ms: 0,
        }
    }

    /// Quiet period in milliseconds.
    #[must_use]
    pub const fn quiet_ms(&self) -> u64 {
        self.quiet_ms
    }

    /// Replace the quiet period for subsequent arms.
    pub fn set_quiet_ms(&mut self, quiet_ms: u64) {
        self.quiet_ms = quiet_ms;
    }

    /// Store a value and schedule the deadline at `now + quiet`.
    pub fn arm(&mut self, value: T, now_ms: u64) {
        self.pending = Some(value);
        self.deadline_ms = now_ms + self.quiet_ms;
    }

    /// Push the deadline out to `now + quiet` without touching the value.
    ///
    /// No-op when nothing is pending.
    pub fn touch(&mut self, now_ms: u64) {
        if self.pending.is_some() {
            self.deadline_ms = now_ms + self.quiet_ms;
        }
    }

    /// Whether a value is pending.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the pending value's deadline has passed.
    #[must_use]
    pub const fn is_due(&self, now_ms: u64) -> bool {
        self.pending.is_some() && now_ms >= self.deadline_ms
    }

    /// Deadline of the pending value, if any.
    #[must_use]
    pub const fn deadline_ms(&self) -> Option<u64> {
        if self.pending.is_some() {
            Some(self.deadline_ms)
        } else {
            None
        }
    }

    /// Mutable access to the pending value for accumulation.
    pub fn pending_mut(&mut self) -> Option<&mut T> {
        self.pending.as_mut()
    }

    /// Read-only access to the pending value.
    #[must_use]
    pub const fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    /// Drain the pending value if its deadline has passed.
    pub fn take_if_due(&mut self, now_ms: u64) -> Option<T> {
        if self.is_due(now_ms) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Drain the pending value unconditionally (explicit flush).
    pub fn take(&mut self) -> Option<T> {
        self.pending.take()
    }

    /// Drop the pending value without emitting it.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_sets_deadline_after_quiet_period() {
        let mut d = Debouncer::new(500);
        d.arm("hello", 1_000);
        assert!(d.is_pending());
        assert_eq!(d.deadline_ms(), Some(1_500));
        assert!(!d.is_due(1_499));
        assert!(d.is_due(1_500));
    }

    #[test]
    fn touch_reschedules_without_replacing_value() {
        let mut d = Debouncer::new(150);
        d.arm(1, 0);
        d.touch(100);
        assert_eq!(d.deadline_ms(), Some(250));
        assert_eq!(d.pending(), Some(&1));
    }

    #[test]
    fn touch_on_empty_is_noop() {
        let mut d: Debouncer<u32> = Debouncer::new(150);
        d.touch(100);
        assert!(!d.is_pending());
        assert_eq!(d.deadline_ms(), None);
    }

    #[test]
    fn take_if_due_respects_deadline() {
        let mut d = Debouncer::new(300);
        d.arm("v", 0);
        assert_eq!(d.take_if_due(299), None);
        assert_eq!(d.take_if_due(300), Some("v"));
        assert!(!d.is_pending());
    }

    #[test]
    fn explicit_take_ignores_deadline() {
        let mut d = Debouncer::new(1_000);
        d.arm(7, 0);
        assert_eq!(d.take(), Some(7));
    }

    #[test]
    fn cancel_discards_pending() {
        let mut d = Debouncer::new(100);
        d.arm(3, 0);
        d.cancel();
        assert_eq!(d.take_if_due(10_000), None);
    }

    #[test]
    fn pending_mut_allows_accumulation() {
        let mut d = Debouncer::new(100);
        d.arm(vec![1], 0);
        d.pending_mut().unwrap().push(2);
        d.touch(50);
        assert_eq!(d.take(), Some(vec![1, 2]));
    }
}
