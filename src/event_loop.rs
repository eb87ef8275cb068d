//! The single-pump, single-threaded event loop. Structured after
//! `mio::deprecated::EventLoop` (`src/deprecated/event_loop.rs`): one
//! `run_once` tick polls readiness, walks the events it got back,
//! dispatches to whatever is registered against each token, runs
//! timers, then gives protothreads their turn — generalized from that
//! file's single `Handler` trait to a per-resource callback table keyed
//! by [`Handle`], and from its `Token`-addressed registry to
//! [`crate::slab::SlotTable`] per [`ResourceKind`].

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorKind, LastError};
use crate::handle::{Handle, ResourceKind};
use crate::handler::{Callback, EventHandler, EventKind};
use crate::protothread::{Protothread, PtStatus, Runnable};
use crate::slab::SlotTable;
use crate::sys::Poller;
use crate::timer::TimerState;
use crate::user_event::UserEventMailbox;

use std::sync::atomic::{AtomicU8, Ordering};

static NEXT_LOOP_ID: AtomicU8 = AtomicU8::new(1);

/// Capacities and tick-shape knobs for an [`EventLoop`]. Every table is
/// allocated once, at construction, to the capacity named here —
/// mirrors `mio::deprecated::event_loop::EventLoopBuilder`
/// (`notify_capacity`, `messages_per_tick`, `timer_capacity`), extended
/// with a capacity per resource kind this toolkit adds.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) timer_capacity: usize,
    pub(crate) protothread_capacity: usize,
    pub(crate) user_event_capacity: usize,
    #[cfg(feature = "net")]
    pub(crate) socket_capacity: usize,
    pub(crate) user_events_per_tick: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            timer_capacity: 256,
            protothread_capacity: 256,
            user_event_capacity: 64,
            #[cfg(feature = "net")]
            socket_capacity: 1024,
            user_events_per_tick: 256,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Config::default())
    }
}

/// Builder for [`Config`]; mirrors `EventLoopBuilder`'s chained setters.
#[derive(Debug, Clone)]
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn timer_capacity(mut self, capacity: usize) -> Self {
        self.0.timer_capacity = capacity;
        self
    }

    pub fn protothread_capacity(mut self, capacity: usize) -> Self {
        self.0.protothread_capacity = capacity;
        self
    }

    pub fn user_event_capacity(mut self, capacity: usize) -> Self {
        self.0.user_event_capacity = capacity;
        self
    }

    #[cfg(feature = "net")]
    pub fn socket_capacity(mut self, capacity: usize) -> Self {
        self.0.socket_capacity = capacity;
        self
    }

    pub fn user_events_per_tick(mut self, count: usize) -> Self {
        self.0.user_events_per_tick = count;
        self
    }

    pub fn build(self) -> Config {
        self.0
    }
}

pub(crate) struct TimerEntry<C> {
    pub(crate) state: TimerState,
    pub(crate) handler: Callback<C>,
}

pub(crate) struct UserEventEntry<C> {
    pub(crate) mailbox: UserEventMailbox,
    pub(crate) handler: Callback<C>,
}

struct ProtothreadEntry<C> {
    pt: Protothread,
    runnable: Box<dyn Runnable<C>>,
}

#[cfg(feature = "net")]
pub(crate) struct SocketEntry<C> {
    pub(crate) fd: RawFd,
    pub(crate) handler: EventHandler<C>,
    pub(crate) pt: Protothread,
}

/// A single-threaded, cooperatively-scheduled event loop: one set of
/// fixed-capacity resource tables plus the readiness multiplexer that
/// drives them.
pub struct EventLoop<C> {
    id: u8,
    context: C,
    running: bool,
    poller: Poller,
    timers: SlotTable<TimerEntry<C>>,
    protothreads: SlotTable<ProtothreadEntry<C>>,
    user_events: SlotTable<UserEventEntry<C>>,
    #[cfg(feature = "net")]
    pub(crate) sockets: SlotTable<SocketEntry<C>>,
    config: Config,
    last_error: LastError,
}

impl<C> EventLoop<C> {
    pub fn new(context: C) -> Result<EventLoop<C>, Error> {
        EventLoop::with_config(context, Config::default())
    }

    pub fn with_config(context: C, config: Config) -> Result<EventLoop<C>, Error> {
        let id = NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed);
        Ok(EventLoop {
            id,
            context,
            running: false,
            poller: Poller::new(),
            timers: SlotTable::with_capacity(config.timer_capacity),
            protothreads: SlotTable::with_capacity(config.protothread_capacity),
            user_events: SlotTable::with_capacity(config.user_event_capacity),
            #[cfg(feature = "net")]
            sockets: SlotTable::with_capacity(config.socket_capacity),
            config,
            last_error: LastError::default(),
        })
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// The diagnostic last-error slot for this loop: set whenever an
    /// operation against one of this loop's handles fails, read back
    /// without needing the original `Result`.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error.get()
    }

    fn record_error(&self, err: &Error) {
        self.last_error.set(err.kind());
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Tells the loop to stop after the current tick finishes.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Runs ticks until [`EventLoop::stop`] is called.
    pub fn run(&mut self) -> Result<(), Error> {
        self.running = true;
        while self.running {
            self.run_once(None)?;
        }
        Ok(())
    }

    // -- Timers --------------------------------------------------------

    /// Registers a stopped timer with `handler` and returns its handle.
    /// Arm it with [`EventLoop::start_timer`] or
    /// [`EventLoop::start_timer_repeating`].
    pub fn register_timer(&mut self, handler: Callback<C>) -> Result<Handle, Error> {
        let (slot, generation) = self.timers.insert(TimerEntry {
            state: TimerState::stopped(),
            handler,
        })?;
        Ok(Handle::compose(ResourceKind::Timer, self.id, generation, slot))
    }

    fn resolve_timer_mut(&mut self, handle: Handle) -> Result<&mut TimerEntry<C>, Error> {
        self.resolve(handle, ResourceKind::Timer)?;
        self.timers
            .get_mut(handle.slot(), handle.generation())
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle))
    }

    pub fn start_timer(&mut self, handle: Handle, delay: Duration) -> Result<(), Error> {
        let now = Instant::now();
        let entry = self.resolve_timer_mut(handle)?;
        entry.state.start_once(now, delay);
        Ok(())
    }

    pub fn start_timer_repeating(
        &mut self,
        handle: Handle,
        delay: Duration,
        interval: Duration,
    ) -> Result<(), Error> {
        let now = Instant::now();
        let entry = self.resolve_timer_mut(handle)?;
        entry.state.start_repeating(now, delay, interval);
        Ok(())
    }

    pub fn stop_timer(&mut self, handle: Handle) -> Result<(), Error> {
        let entry = self.resolve_timer_mut(handle)?;
        entry.state.stop();
        Ok(())
    }

    pub fn remove_timer(&mut self, handle: Handle) -> Result<(), Error> {
        self.resolve(handle, ResourceKind::Timer)?;
        self.timers
            .remove(handle.slot(), handle.generation())
            .map(|_| ())
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle))
    }

    // -- User event sources ---------------------------------------------

    /// Registers a cross-thread mailbox. Use
    /// [`EventLoop::user_event_raiser`] to get a `Send`-able handle that
    /// other threads use to wake this loop.
    pub fn register_user_event_source(&mut self, handler: Callback<C>) -> Result<Handle, Error> {
        let mailbox = UserEventMailbox::new()?;
        let read_fd = mailbox.read_fd();
        let (slot, generation) = self.user_events.insert(UserEventEntry { mailbox, handler })?;
        let handle = Handle::compose(ResourceKind::UserEventSource, self.id, generation, slot);
        self.poller.register(read_fd, handle.as_u64(), true, false);
        Ok(handle)
    }

    pub fn user_event_raiser(&mut self, handle: Handle) -> Result<crate::user_event::Raiser, Error> {
        self.resolve(handle, ResourceKind::UserEventSource)?;
        let entry = self
            .user_events
            .get(handle.slot(), handle.generation())
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle))?;
        Ok(entry.mailbox.raiser())
    }

    pub fn remove_user_event_source(&mut self, handle: Handle) -> Result<(), Error> {
        self.resolve(handle, ResourceKind::UserEventSource)?;
        let entry = self
            .user_events
            .remove(handle.slot(), handle.generation())
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle))?;
        // The mailbox's fd is about to be closed by its `Drop` impl;
        // deregistering first keeps the poller's table from ever
        // holding a stale fd between now and the next `poll` call.
        let _ = self.poller.deregister(entry.mailbox.read_fd());
        Ok(())
    }

    // -- Protothreads -----------------------------------------------------

    pub fn spawn_protothread(
        &mut self,
        runnable: Box<dyn Runnable<C>>,
    ) -> Result<Handle, Error> {
        let (slot, generation) = self.protothreads.insert(ProtothreadEntry {
            pt: Protothread::new(),
            runnable,
        })?;
        Ok(Handle::compose(
            ResourceKind::Protothread,
            self.id,
            generation,
            slot,
        ))
    }

    pub fn remove_protothread(&mut self, handle: Handle) -> Result<(), Error> {
        self.resolve(handle, ResourceKind::Protothread)?;
        self.protothreads
            .remove(handle.slot(), handle.generation())
            .map(|_| ())
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle))
    }

    // -- Dispatch ----------------------------------------------------------

    fn resolve(&self, handle: Handle, expected: ResourceKind) -> Result<(), Error> {
        if handle.is_null() || handle.loop_id() != self.id || handle.kind() != Some(expected) {
            let err = Error::new(ErrorKind::InvalidHandle);
            self.record_error(&err);
            return Err(err);
        }
        Ok(())
    }

    /// The earliest instant at which any armed timer needs attention —
    /// used to cap how long `poll` is allowed to block so a pump never
    /// sleeps past a pending deadline.
    fn next_timer_deadline(&self) -> Option<Instant> {
        self.timers
            .iter()
            .filter_map(|entry| entry.state.next_deadline())
            .min()
    }

    fn effective_wait(&self, requested: Option<Duration>) -> Option<Duration> {
        let now = Instant::now();
        let timer_wait = self
            .next_timer_deadline()
            .map(|deadline| deadline.saturating_duration_since(now));

        match (requested, timer_wait) {
            (None, other) => other,
            (Some(r), None) => Some(r),
            (Some(r), Some(t)) => Some(r.min(t)),
        }
    }

    /// Runs one pump: polls readiness (bounded by `timeout` and any
    /// pending timer deadline, whichever is sooner), dispatches ready
    /// sockets and user events, fires expired timers, then gives every
    /// live protothread one turn.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        ptk_trace!("event loop tick; loop_id={}", self.id);

        let wait = self.effective_wait(timeout);
        let events = match self.poller.poll(wait) {
            Ok(events) => events,
            Err(err) => {
                if err.kind() == ErrorKind::Interrupted {
                    Vec::new()
                } else {
                    return Err(err);
                }
            }
        };

        for (token, readiness) in events {
            self.dispatch_token(token, readiness);
        }

        self.process_timers();
        self.process_protothreads();

        Ok(())
    }

    fn dispatch_token(&mut self, token: u64, readiness: crate::sys::Readiness) {
        let handle = Handle::from_u64(token);
        match handle.kind() {
            Some(ResourceKind::UserEventSource) => self.drain_user_event(handle),
            #[cfg(feature = "net")]
            Some(ResourceKind::Socket) => self.dispatch_socket(handle, readiness),
            _ => {
                let _ = readiness;
            }
        }
    }

    #[cfg(feature = "net")]
    fn dispatch_socket(&mut self, handle: Handle, readiness: crate::sys::Readiness) {
        let kind = if readiness.error {
            Some(EventKind::Error)
        } else if readiness.readable {
            Some(EventKind::Readable)
        } else if readiness.hangup {
            Some(EventKind::Disconnected)
        } else if readiness.writable {
            Some(EventKind::Writable)
        } else {
            None
        };

        let Some(kind) = kind else { return };
        self.invoke_handler(
            handle,
            kind,
            |me| {
                let entry = me.sockets.get_mut(handle.slot(), handle.generation())?;
                let handler = std::mem::replace(
                    &mut entry.handler,
                    EventHandler::Function(|_, _, _| {}),
                );
                let pt = std::mem::take(&mut entry.pt);
                Some((handler, pt))
            },
            |me, handler, pt| {
                if let Some(entry) = me.sockets.get_mut(handle.slot(), handle.generation()) {
                    entry.handler = handler;
                    entry.pt = pt;
                }
            },
        );
    }

    fn drain_user_event(&mut self, handle: Handle) {
        let slot = handle.slot();
        let generation = handle.generation();
        let Some(entry) = self.user_events.get_mut(slot, generation) else {
            return;
        };
        if !entry.mailbox.drain_pending() {
            return;
        }
        let handler = entry.handler;
        handler(self, handle, EventKind::UserEvent);
    }

    /// Runs `handler` for the handle's current `EventHandler`, taking
    /// the handler (and, for a protothread, its resumption state) out
    /// of its slot for the duration of the call so a handler that
    /// re-borrows `self` (e.g. to re-arm itself) can't alias its own
    /// table entry. `put_back` restores both afterward unless the
    /// handle was removed by the handler itself.
    #[cfg(feature = "net")]
    fn invoke_handler(
        &mut self,
        handle: Handle,
        kind: EventKind,
        take: impl FnOnce(&mut Self) -> Option<(EventHandler<C>, Protothread)>,
        put_back: impl FnOnce(&mut Self, EventHandler<C>, Protothread),
    ) {
        let Some((handler, mut pt)) = take(self) else { return };
        match handler {
            EventHandler::Function(f) => {
                f(self, handle, kind);
                put_back(self, EventHandler::Function(f), pt);
            }
            EventHandler::Protothread(mut runnable) => {
                if runnable.poll(&mut pt, self) != PtStatus::Exited {
                    put_back(self, EventHandler::Protothread(runnable), pt);
                }
            }
        }
    }

    fn process_timers(&mut self) {
        let now = Instant::now();
        let expired: Vec<(u32, u16, Callback<C>)> = self
            .timers
            .iter_mut()
            .filter_map(|(slot, generation, entry)| {
                entry
                    .state
                    .poll_expired(now)
                    .then_some((slot, generation, entry.handler))
            })
            .collect();

        for (slot, generation, handler) in expired {
            let handle = Handle::compose(ResourceKind::Timer, self.id, generation, slot);
            handler(self, handle, EventKind::TimerExpired);
        }
    }

    fn process_protothreads(&mut self) {
        let live: Vec<(u32, u16)> = self
            .protothreads
            .iter_mut()
            .map(|(slot, generation, _)| (slot, generation))
            .collect();

        for (slot, generation) in live {
            // Pull this protothread's state and runnable out of the
            // table before polling it, so `poll`'s `&mut EventLoop`
            // argument doesn't alias the table entry it lives in.
            let Some(entry) = self.protothreads.get_mut(slot, generation) else {
                continue;
            };
            let mut pt = std::mem::take(&mut entry.pt);
            let mut runnable = std::mem::replace(&mut entry.runnable, Box::new(NoopRunnable));

            let status = runnable.poll(&mut pt, self);

            if status == PtStatus::Exited {
                self.protothreads.remove(slot, generation);
            } else if let Some(entry) = self.protothreads.get_mut(slot, generation) {
                entry.pt = pt;
                entry.runnable = runnable;
            }
        }
    }

    #[cfg(feature = "net")]
    pub(crate) fn register_socket_fd(
        &mut self,
        fd: RawFd,
        readable: bool,
        writable: bool,
        handler: EventHandler<C>,
    ) -> Result<Handle, Error> {
        let (slot, generation) = self.sockets.insert(SocketEntry {
            fd,
            handler,
            pt: Protothread::new(),
        })?;
        let handle = Handle::compose(ResourceKind::Socket, self.id, generation, slot);
        self.poller.register(fd, handle.as_u64(), readable, writable);
        Ok(handle)
    }

    #[cfg(feature = "net")]
    pub(crate) fn reregister_socket_fd(
        &mut self,
        fd: RawFd,
        readable: bool,
        writable: bool,
    ) -> Result<(), Error> {
        self.poller.reregister(fd, readable, writable)
    }

    #[cfg(feature = "net")]
    pub(crate) fn deregister_socket(&mut self, handle: Handle) -> Result<(), Error> {
        self.resolve(handle, ResourceKind::Socket)?;
        let entry = self
            .sockets
            .remove(handle.slot(), handle.generation())
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle))?;
        self.poller.deregister(entry.fd)
    }
}

struct NoopRunnable;
impl<C> Runnable<C> for NoopRunnable {
    fn poll(&mut self, _pt: &mut Protothread, _event_loop: &mut EventLoop<C>) -> PtStatus {
        PtStatus::Exited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn timer_fires_after_delay() {
        let mut el: EventLoop<Rc<Cell<u32>>> = EventLoop::new(Rc::new(Cell::new(0))).unwrap();
        let handle = el
            .register_timer(|loop_, _handle, kind| {
                assert_eq!(kind, EventKind::TimerExpired);
                loop_.context().set(loop_.context().get() + 1);
            })
            .unwrap();
        el.start_timer(handle, Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        el.run_once(Some(Duration::from_millis(0))).unwrap();
        assert_eq!(el.context().get(), 1);
    }

    #[test]
    fn invalid_handle_from_other_loop_is_rejected() {
        let mut a: EventLoop<()> = EventLoop::new(()).unwrap();
        let b: EventLoop<()> = EventLoop::new(()).unwrap();
        let handle_from_b = Handle::compose(ResourceKind::Timer, b_loop_id(&b), 1, 0);
        let err = a.start_timer(handle_from_b, Duration::from_millis(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    }

    fn b_loop_id(el: &EventLoop<()>) -> u8 {
        el.id
    }

    #[test]
    fn removed_timer_handle_is_rejected() {
        let mut el: EventLoop<()> = EventLoop::new(()).unwrap();
        let handle = el.register_timer(|_, _, _| {}).unwrap();
        el.remove_timer(handle).unwrap();
        assert_eq!(
            el.start_timer(handle, Duration::from_millis(1)).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
    }

    #[test]
    fn stopped_loop_exits_run() {
        let mut el: EventLoop<()> = EventLoop::new(()).unwrap();
        let handle = el
            .register_timer(|loop_, _h, _k| loop_.stop())
            .unwrap();
        el.start_timer(handle, Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        el.running = true;
        // Run a bounded number of ticks rather than `run()`'s unbounded
        // loop, since the test harness has no other wakeup source.
        for _ in 0..3 {
            if !el.running {
                break;
            }
            el.run_once(Some(Duration::from_millis(5))).unwrap();
        }
        assert!(!el.running);
    }
}
