//! Counting-semaphore admission gate.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct GateState {
    in_flight: usize,
    peak: usize,
    admitted: usize,
}

/// Caps the number of tasks in flight. [`acquire`](Self::acquire) blocks until a slot
/// is free; the returned [`Permit`] gives the slot back when dropped, so a task that
/// fails or panics still releases exactly once.
#[derive(Debug)]
pub struct AdmissionGate {
    limit: usize,
    state: Mutex<GateState>,
    released: Condvar,
}

/// Slot held by one task.
#[derive(Debug)]
pub struct Permit<'a> {
    gate: &'a AdmissionGate,
}

impl AdmissionGate {
    /// `limit` is clamped to at least 1.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            state: Mutex::new(GateState::default()),
            released: Condvar::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    // Counters stay consistent even if a holder panicked, so poisoning is ignored.
    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire(&self) -> Permit<'_> {
        let mut state = self.state();
        while state.in_flight >= self.limit {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.in_flight += 1;
        state.admitted += 1;
        state.peak = state.peak.max(state.in_flight);
        Permit { gate: self }
    }

    pub fn in_flight(&self) -> usize {
        self.state().in_flight
    }

    /// Highest number of simultaneously held permits since construction or the last
    /// [`reset_peak`](Self::reset_peak).
    pub fn peak(&self) -> usize {
        self.state().peak
    }

    /// Restarts peak tracking from the permits held right now.
    pub fn reset_peak(&self) {
        let mut state = self.state();
        state.peak = state.in_flight;
    }

    /// Total permits handed out so far.
    pub fn admitted(&self) -> usize {
        self.state().admitted
    }

    fn release(&self) {
        let mut state = self.state();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.released.notify_one();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn permits_release_on_drop() {
        let gate = AdmissionGate::new(2);
        let a = gate.acquire();
        let b = gate.acquire();
        assert_eq!(gate.in_flight(), 2);
        drop(a);
        assert_eq!(gate.in_flight(), 1);
        drop(b);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.peak(), 2);
        assert_eq!(gate.admitted(), 2);
    }

    #[test]
    fn reset_peak_keeps_only_current_holders() {
        let gate = AdmissionGate::new(4);
        let held: Vec<_> = (0..3).map(|_| gate.acquire()).collect();
        drop(held);
        let kept = gate.acquire();
        gate.reset_peak();
        assert_eq!(gate.peak(), 1);
        drop(kept);
        assert_eq!(gate.admitted(), 4);
    }

    #[test]
    fn zero_limit_is_clamped() {
        assert_eq!(AdmissionGate::new(0).limit(), 1);
    }

    #[test]
    fn never_exceeds_limit_under_contention() {
        let gate = AdmissionGate::new(3);
        let running = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..24 {
                let permit = gate.acquire();
                let (running, max_seen) = (&running, &max_seen);
                s.spawn(move || {
                    let _permit = permit;
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    running.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(max_seen.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.peak(), 3);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.admitted(), 24);
    }

    #[test]
    fn panicking_holder_still_releases() {
        let gate = AdmissionGate::new(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = gate.acquire();
            panic!("task blew up");
        }));
        assert!(result.is_err());
        assert_eq!(gate.in_flight(), 0);
        let _again = gate.acquire();
    }
}
