//! Debounce primitive
//!
//! Coalesces bursts of updates into one emission after a quiet window. The
//! debouncer holds the latest candidate value and a deadline; every
//! [`schedule`](Debouncer::schedule) replaces the candidate and pushes the
//! deadline out. Emission is suppressed when the candidate equals the last
//! emitted value under the configured predicate, so observers never see a
//! repeat of what they already have.
//!
//! The debouncer owns no timer. The owning task sleeps until
//! [`deadline`](Debouncer::deadline) and then calls
//! [`fire`](Debouncer::fire):
//!
//! ```
//! use std::time::Duration;
//! use loopfeed::debounce::Debouncer;
//! use tokio::time::Instant;
//!
//! let mut debouncer = Debouncer::new(Duration::from_millis(500));
//! let t0 = Instant::now();
//! debouncer.schedule(vec![1, 2], t0);
//! assert_eq!(debouncer.fire(t0), None);
//! assert_eq!(debouncer.fire(t0 + Duration::from_millis(500)), Some(vec![1, 2]));
//! ```

use std::time::Duration;

use tokio::time::Instant;

type SamePredicate<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Window-based debouncer with an equality predicate
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
    last: Option<T>,
    same: SamePredicate<T>,
}

impl<T: PartialEq + Clone + 'static> Debouncer<T> {
    /// Create a debouncer comparing values with `==`
    pub fn new(window: Duration) -> Self {
        Self::with_predicate(window, |a: &T, b: &T| a == b)
    }
}

impl<T: Clone + 'static> Debouncer<T> {
    /// Create a debouncer with a custom "same value" predicate
    pub fn with_predicate<F>(window: Duration, same: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            window,
            pending: None,
            last: None,
            same: Box::new(same),
        }
    }

    /// Quiet window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace the candidate and restart the window
    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.window));
    }

    /// When the pending candidate becomes due
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    /// Whether a candidate is waiting
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Borrow the pending candidate
    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(value, _)| value)
    }

    /// Remove the pending candidate without emitting it
    pub fn take_pending(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// Last value that was emitted
    pub fn last_emitted(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Emit the candidate if its deadline has passed and it differs from the
    /// last emission
    pub fn fire(&mut self, now: Instant) -> Option<T> {
        match self.pending {
            Some((_, at)) if now >= at => {}
            _ => return None,
        }
        let value = self.take_pending()?;
        self.admit(value)
    }

    /// Emit the candidate now, ignoring the window
    pub fn flush(&mut self) -> Option<T> {
        let value = self.take_pending()?;
        self.admit(value)
    }

    /// Record a value emitted outside the debounce path
    pub fn mark_emitted(&mut self, value: T) {
        self.last = Some(value);
    }

    /// Drop the pending candidate
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            tracing::trace!("Debounce cancelled with pending value");
        }
    }

    /// Forget the last emission so the next candidate always emits
    pub fn reset(&mut self) {
        self.pending = None;
        self.last = None;
    }

    fn admit(&mut self, value: T) -> Option<T> {
        if let Some(ref last) = self.last {
            if (self.same)(last, &value) {
                return None;
            }
        }
        self.last = Some(value.clone());
        Some(value)
    }
}

impl<T> std::fmt::Debug for Debouncer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("pending", &self.pending.is_some())
            .field("has_emitted", &self.last.is_some())
            .finish()
    }
}
