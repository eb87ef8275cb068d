//! Event dispatch: what a loop tells a callback happened, and how a
//! resource's callback is stored. Generalizes `mio::deprecated::Handler`
//! (`src/deprecated/handler.rs`), which dispatched through one
//! `ready`/`notify`/`timeout`/`tick` trait implemented by the whole
//! application, into a per-resource callback table — closer to how
//! the toolkit's caller registers one function per handle rather than
//! one trait for the entire program.

use crate::event_loop::EventLoop;
use crate::handle::Handle;
use crate::protothread::Runnable;

/// What happened to the resource identified by the accompanying
/// [`Handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A socket became readable.
    Readable,
    /// A socket became writable.
    Writable,
    /// An outbound connection finished establishing
    /// ([`crate::event_loop::EventLoop::connect_tcp`]).
    Connected,
    /// The peer closed its end (a hangup observed on the socket's
    /// descriptor, distinct from a plain readable-with-EOF).
    Disconnected,
    /// A timer's deadline (or, for a repeating timer, one coalesced
    /// run of missed deadlines) has passed.
    TimerExpired,
    /// A cross-thread raise arrived on a user event source.
    UserEvent,
    /// The resource's descriptor reported an error condition; the
    /// handle is still valid until explicitly closed.
    Error,
}

/// A plain function callback registered against a handle. `C` is the
/// caller-supplied context type threaded through every loop operation
/// (`EventLoop::context`/`context_mut`) — the toolkit's equivalent of a
/// C `void *user_data` pointer, but typed.
pub type Callback<C> = fn(&mut EventLoop<C>, Handle, EventKind);

/// Either kind of thing a resource's readiness can drive.
pub(crate) enum EventHandler<C> {
    Function(Callback<C>),
    Protothread(Box<dyn Runnable<C>>),
}
