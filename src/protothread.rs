//! Stackless cooperative tasks. A protothread is not an OS thread and
//! not a Rust async task: it is one `poll` call that resumes at the
//! state it last left itself in, storing only a small integer of
//! state rather than a full call stack. The embedded-systems original
//! of this idea (Dunkels' protothreads, `PT_BEGIN`/`PT_WAIT_UNTIL`/
//! `PT_YIELD`/`PT_END`) gets there with `switch`/`case` fallthrough on
//! `__LINE__`, which has no safe Rust equivalent; this crate uses an
//! explicit typed `Runnable` trait plus an explicit numeric state the
//! implementer advances themselves, with the `pt_*!` macros only
//! covering the repetitive "stay here and report not-ready" plumbing.

/// What a [`Runnable::poll`] call reports about one resumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtStatus {
    /// Blocked on a condition; re-poll later without losing state.
    Waiting,
    /// Made progress and voluntarily gave up its turn this tick.
    Yielded,
    /// Finished. The loop removes this protothread's handle.
    Exited,
}

/// The state a protothread carries between `poll` calls: nothing but
/// an opaque resumption point, set by [`pt_wait_until`] / [`pt_yield`]
/// and read back via [`Protothread::state`] in the implementer's own
/// `match`.
#[derive(Debug, Default)]
pub struct Protothread {
    state: u32,
}

impl Protothread {
    pub fn new() -> Protothread {
        Protothread { state: 0 }
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    pub fn set_state(&mut self, state: u32) {
        self.state = state;
    }
}

/// Implemented by whatever a protothread handle runs. `C` is the
/// caller's context type, the same one parameterizing
/// [`crate::event_loop::EventLoop`] and [`crate::handler::Callback`].
pub trait Runnable<C> {
    fn poll(
        &mut self,
        pt: &mut Protothread,
        event_loop: &mut crate::event_loop::EventLoop<C>,
    ) -> PtStatus;
}

/// Marks the top of a protothread's `poll` body. A no-op today —
/// present for symmetry with [`pt_exit`] and to give call sites a
/// recognizable shape — but the expansion point if a future resumption
/// strategy needs entry-time bookkeeping.
#[macro_export]
macro_rules! pt_begin {
    ($pt:expr) => {
        let _ = &$pt;
    };
}

/// If `$cond` does not hold, records `$state` as the resumption point
/// and returns [`PtStatus::Waiting`] from the enclosing `poll` call.
/// Falls through (does not return) once `$cond` becomes true.
#[macro_export]
macro_rules! pt_wait_until {
    ($pt:expr, $state:expr, $cond:expr) => {
        if !($cond) {
            $pt.set_state($state);
            return $crate::protothread::PtStatus::Waiting;
        }
    };
}

/// Unconditionally records `$next_state` and returns
/// [`PtStatus::Yielded`], giving up this tick's turn. The next `poll`
/// call resumes in the arm matching `$next_state`.
#[macro_export]
macro_rules! pt_yield {
    ($pt:expr, $next_state:expr) => {{
        $pt.set_state($next_state);
        return $crate::protothread::PtStatus::Yielded;
    }};
}

/// Ends the protothread: returns [`PtStatus::Exited`] from the
/// enclosing `poll` call. The loop drops this protothread's handle
/// after seeing it.
#[macro_export]
macro_rules! pt_exit {
    () => {
        return $crate::protothread::PtStatus::Exited;
    };
}

/// Marks the protothread's normal termination point. Identical to
/// [`pt_exit`] at runtime — there is no separate "unwind" step to run
/// first — but written at the tail of a `poll` body the way `pt_exit!`
/// is written at an early-return one, mirroring Dunkels' own
/// `PT_END`/`PT_EXIT` pair (`pt.h`), which differ only in where they're
/// meant to appear, not in what they do.
#[macro_export]
macro_rules! pt_end {
    () => {
        return $crate::protothread::PtStatus::Exited;
    };
}

/// Suspends until `$cond` holds, the same as [`pt_wait_until`]. Spelled
/// out separately for call sites waiting on a resource's dispatched
/// event (a socket becoming readable, say) rather than an arbitrary
/// boolean, the way Contiki's process scheduler defines
/// `PT_WAIT_EVENT_UNTIL` as a named specialization of `PT_YIELD_UNTIL`
/// rather than a distinct primitive.
#[macro_export]
macro_rules! pt_wait_event {
    ($pt:expr, $state:expr, $cond:expr) => {
        $crate::pt_wait_until!($pt, $state, $cond)
    };
}

/// Suspends until `$deadline` (an `std::time::Instant`) has passed.
/// Built directly on [`pt_wait_until`]: "sleep" is "wait until this
/// much time has elapsed" with no separate timer machinery of its own.
#[macro_export]
macro_rules! pt_sleep {
    ($pt:expr, $state:expr, $deadline:expr) => {
        $crate::pt_wait_until!($pt, $state, ::std::time::Instant::now() >= $deadline)
    };
}

/// A one-slot rendezvous between two protothreads sharing the same
/// loop: a producer calling [`pt_send`] suspends until the slot is
/// empty, a consumer calling [`pt_receive`] suspends until it is full.
/// Grounded on Dunkels' `pt-sem.h` bounded-buffer pattern built from
/// `PT_SEM_WAIT`/`PT_SEM_SIGNAL`, specialized here to carry one value
/// of `T` instead of a bare counting semaphore. Single-threaded by
/// design — both ends are driven by the same loop's `run_once` — so a
/// `RefCell` needs no further synchronization.
pub struct Channel<T> {
    slot: std::cell::RefCell<Option<T>>,
}

impl<T> Default for Channel<T> {
    fn default() -> Channel<T> {
        Channel {
            slot: std::cell::RefCell::new(None),
        }
    }
}

impl<T> Channel<T> {
    pub fn new() -> Channel<T> {
        Channel::default()
    }

    /// Places `value` in the slot if it is empty. Returns the value
    /// back if the slot was already full.
    pub fn try_send(&self, value: T) -> Result<(), T> {
        let mut slot = self.slot.borrow_mut();
        if slot.is_some() {
            return Err(value);
        }
        *slot = Some(value);
        Ok(())
    }

    /// Takes the value out of the slot if it is full.
    pub fn try_receive(&self) -> Option<T> {
        self.slot.borrow_mut().take()
    }
}

/// Suspends until `$chan.try_send($value)` succeeds, then falls
/// through. `$value` must be re-evaluable on every resumption — pass a
/// place expression (a field, a local), not a one-shot constructor.
#[macro_export]
macro_rules! pt_send {
    ($pt:expr, $state:expr, $chan:expr, $value:expr) => {
        if $chan.try_send($value).is_err() {
            $pt.set_state($state);
            return $crate::protothread::PtStatus::Waiting;
        }
    };
}

/// Suspends until `$chan` has a value, then evaluates to it (use as
/// an expression: `let v = pt_receive!(pt, state, chan);`).
#[macro_export]
macro_rules! pt_receive {
    ($pt:expr, $state:expr, $chan:expr) => {
        match $chan.try_receive() {
            Some(value) => value,
            None => {
                $pt.set_state($state);
                return $crate::protothread::PtStatus::Waiting;
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;

    struct CountToThree {
        count: u32,
    }

    impl Runnable<()> for CountToThree {
        fn poll(&mut self, pt: &mut Protothread, _event_loop: &mut EventLoop<()>) -> PtStatus {
            pt_begin!(pt);
            match pt.state() {
                0 => {
                    self.count += 1;
                    pt_yield!(pt, 1);
                }
                1 => {
                    self.count += 1;
                    pt_wait_until!(pt, 1, self.count >= 3);
                    pt_yield!(pt, 2);
                }
                2 => {
                    pt_end!();
                }
                _ => pt_exit!(),
            }
        }
    }

    #[test]
    fn resumes_at_recorded_state_across_polls() {
        let mut el = EventLoop::new(()).unwrap();
        let mut pt = Protothread::new();
        let mut task = CountToThree { count: 0 };

        assert_eq!(task.poll(&mut pt, &mut el), PtStatus::Yielded);
        assert_eq!(task.count, 1);

        // State 1's wait condition fails the first two times (count
        // reaches 2, then 3) before falling through to the final yield.
        assert_eq!(task.poll(&mut pt, &mut el), PtStatus::Waiting);
        assert_eq!(task.count, 2);

        assert_eq!(task.poll(&mut pt, &mut el), PtStatus::Yielded);
        assert_eq!(task.count, 3);

        assert_eq!(task.poll(&mut pt, &mut el), PtStatus::Exited);
    }

    struct SleepThenExit {
        deadline: std::time::Instant,
    }

    impl Runnable<()> for SleepThenExit {
        fn poll(&mut self, pt: &mut Protothread, _event_loop: &mut EventLoop<()>) -> PtStatus {
            pt_begin!(pt);
            match pt.state() {
                0 => {
                    pt_sleep!(pt, 0, self.deadline);
                    pt_end!();
                }
                _ => pt_exit!(),
            }
        }
    }

    #[test]
    fn sleep_waits_until_deadline_then_falls_through() {
        let mut el = EventLoop::new(()).unwrap();
        let mut pt = Protothread::new();
        let mut task = SleepThenExit {
            deadline: std::time::Instant::now() + std::time::Duration::from_millis(20),
        };

        assert_eq!(task.poll(&mut pt, &mut el), PtStatus::Waiting);
        std::thread::sleep(std::time::Duration::from_millis(25));
        assert_eq!(task.poll(&mut pt, &mut el), PtStatus::Exited);
    }

    struct WaitOnFlag<'a> {
        flag: &'a std::cell::Cell<bool>,
    }

    impl<'a> Runnable<()> for WaitOnFlag<'a> {
        fn poll(&mut self, pt: &mut Protothread, _event_loop: &mut EventLoop<()>) -> PtStatus {
            pt_begin!(pt);
            match pt.state() {
                0 => {
                    pt_wait_event!(pt, 0, self.flag.get());
                    pt_end!();
                }
                _ => pt_exit!(),
            }
        }
    }

    #[test]
    fn wait_event_blocks_until_condition_then_falls_through() {
        let mut el = EventLoop::new(()).unwrap();
        let mut pt = Protothread::new();
        let flag = std::cell::Cell::new(false);
        let mut task = WaitOnFlag { flag: &flag };

        assert_eq!(task.poll(&mut pt, &mut el), PtStatus::Waiting);
        flag.set(true);
        assert_eq!(task.poll(&mut pt, &mut el), PtStatus::Exited);
    }

    struct Producer<'a> {
        chan: &'a Channel<u32>,
        value: u32,
    }

    impl<'a> Runnable<()> for Producer<'a> {
        fn poll(&mut self, pt: &mut Protothread, _event_loop: &mut EventLoop<()>) -> PtStatus {
            pt_begin!(pt);
            match pt.state() {
                0 => {
                    pt_send!(pt, 0, self.chan, self.value);
                    pt_end!();
                }
                _ => pt_exit!(),
            }
        }
    }

    struct Consumer<'a> {
        chan: &'a Channel<u32>,
        received: Option<u32>,
    }

    impl<'a> Runnable<()> for Consumer<'a> {
        fn poll(&mut self, pt: &mut Protothread, _event_loop: &mut EventLoop<()>) -> PtStatus {
            pt_begin!(pt);
            match pt.state() {
                0 => {
                    self.received = Some(pt_receive!(pt, 0, self.chan));
                    pt_end!();
                }
                _ => pt_exit!(),
            }
        }
    }

    #[test]
    fn send_and_receive_rendezvous_through_one_slot_channel() {
        let mut el = EventLoop::new(()).unwrap();
        let chan = Channel::new();
        let mut producer_pt = Protothread::new();
        let mut consumer_pt = Protothread::new();
        let mut producer = Producer {
            chan: &chan,
            value: 42,
        };
        let mut consumer = Consumer {
            chan: &chan,
            received: None,
        };

        // Consumer polls first and finds the slot empty.
        assert_eq!(consumer.poll(&mut consumer_pt, &mut el), PtStatus::Waiting);
        assert_eq!(producer.poll(&mut producer_pt, &mut el), PtStatus::Exited);
        assert_eq!(consumer.poll(&mut consumer_pt, &mut el), PtStatus::Exited);
        assert_eq!(consumer.received, Some(42));
    }
}
