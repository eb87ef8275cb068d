//! Per-handle timer state machines. Each registered timer tracks its own
//! next deadline and optional repeat interval rather than sharing a
//! tick wheel — simpler than `mio`'s `Timer<T>` (`src/timer.rs`, a
//! slab-backed wheel amortizing many in-flight timeouts), but the right
//! shape here: a loop typically holds a handful of timers, not
//! thousands, and each fires independently against `Instant::now()`.

use std::time::{Duration, Instant};

/// One timer's state. A stopped timer still occupies its slot — the
/// handle remains valid until the caller explicitly removes it — it
/// simply never becomes expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Stopped,
    /// Fires once at `deadline`, then reverts to `Stopped`.
    OneShot,
    /// Fires at `deadline`, then rearms `deadline += interval` on every
    /// poll until all overdue periods are consumed, coalescing any
    /// number of missed periods into a single dispatched expiry.
    Repeating { interval: Duration },
}

#[derive(Debug)]
pub(crate) struct TimerState {
    mode: Mode,
    deadline: Instant,
}

impl TimerState {
    pub(crate) fn stopped() -> TimerState {
        TimerState {
            mode: Mode::Stopped,
            deadline: Instant::now(),
        }
    }

    /// Arms a one-shot timer to fire after `delay`.
    pub(crate) fn start_once(&mut self, now: Instant, delay: Duration) {
        self.mode = Mode::OneShot;
        self.deadline = now + delay;
    }

    /// Arms a repeating timer: first fire after `delay`, then every
    /// `interval` thereafter.
    pub(crate) fn start_repeating(&mut self, now: Instant, delay: Duration, interval: Duration) {
        self.mode = Mode::Repeating { interval };
        self.deadline = now + delay;
    }

    pub(crate) fn stop(&mut self) {
        self.mode = Mode::Stopped;
    }

    pub(crate) fn is_armed(&self) -> bool {
        !matches!(self.mode, Mode::Stopped)
    }

    /// The instant this timer should next be considered for expiry, if
    /// armed — used by the event loop to size its readiness-wait
    /// timeout so a pump never sleeps past a pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.is_armed().then_some(self.deadline)
    }

    /// Checks `now` against the deadline. A one-shot timer that has
    /// expired stops itself and reports true exactly once. A repeating
    /// timer re-arms `deadline += interval` in a loop until the
    /// deadline is back in the future, folding any number of missed
    /// periods into a single expiry event for this poll.
    pub(crate) fn poll_expired(&mut self, now: Instant) -> bool {
        match self.mode {
            Mode::Stopped => false,
            Mode::OneShot => {
                if now >= self.deadline {
                    self.mode = Mode::Stopped;
                    true
                } else {
                    false
                }
            }
            Mode::Repeating { interval } => {
                if now < self.deadline {
                    return false;
                }
                while now >= self.deadline {
                    self.deadline += interval;
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_timer_never_expires() {
        let mut t = TimerState::stopped();
        assert!(!t.is_armed());
        assert!(!t.poll_expired(Instant::now() + Duration::from_secs(1000)));
    }

    #[test]
    fn one_shot_fires_once() {
        let mut t = TimerState::stopped();
        let now = Instant::now();
        t.start_once(now, Duration::from_millis(10));

        assert!(!t.poll_expired(now));
        let fired_at = now + Duration::from_millis(10);
        assert!(t.poll_expired(fired_at));
        assert!(!t.is_armed());
        // Polling again after the timer auto-stopped must stay quiet.
        assert!(!t.poll_expired(fired_at + Duration::from_secs(1)));
    }

    #[test]
    fn repeating_coalesces_missed_periods_into_one_event() {
        let mut t = TimerState::stopped();
        let now = Instant::now();
        t.start_repeating(now, Duration::from_millis(10), Duration::from_millis(10));

        // Far enough past to have missed several periods.
        let late = now + Duration::from_millis(55);
        assert!(t.poll_expired(late));
        // Exactly one expiry is reported per pump regardless of how
        // many periods were skipped; the next deadline must now be in
        // the future relative to `late`.
        assert!(t.next_deadline().unwrap() > late);
        assert!(!t.poll_expired(late));
    }

    #[test]
    fn stop_disarms_immediately() {
        let mut t = TimerState::stopped();
        let now = Instant::now();
        t.start_once(now, Duration::from_millis(1));
        t.stop();
        assert!(!t.is_armed());
        assert!(!t.poll_expired(now + Duration::from_secs(1)));
    }
}
