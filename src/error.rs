//! The closed error taxonomy surfaced by every fallible `ptk` operation,
//! plus two auxiliary error slots: a per-loop "last error" and a
//! thread-local "current error" for the handful of accessor paths that
//! return a bare value (or null) rather than a `Result`.

use std::cell::Cell;
use std::fmt;
use std::io;

/// The closed set of error kinds `ptk` can surface. Every operation
/// that can fail returns one of these through a `Result` rather than
/// aborting the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidHandle,
    InvalidArgument,
    OutOfResources,
    Unsupported,
    NetworkError,
    Timeout,
    WouldBlock,
    ConnectionRefused,
    ConnectionReset,
    NotConnected,
    AlreadyConnected,
    AddressInUse,
    NoRoute,
    MessageTooLarge,
    BufferTooSmall,
    OutOfBounds,
    NullPtr,
    BadFormat,
    ProtocolError,
    Closed,
    Interrupted,
    Aborted,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        use ErrorKind::*;
        match self {
            InvalidHandle => "invalid handle",
            InvalidArgument => "invalid argument",
            OutOfResources => "out of resources",
            Unsupported => "unsupported operation",
            NetworkError => "network error",
            Timeout => "timed out",
            WouldBlock => "would block",
            ConnectionRefused => "connection refused",
            ConnectionReset => "connection reset",
            NotConnected => "not connected",
            AlreadyConnected => "already connected",
            AddressInUse => "address in use",
            NoRoute => "no route to host",
            MessageTooLarge => "message too large",
            BufferTooSmall => "buffer too small",
            OutOfBounds => "out of bounds",
            NullPtr => "null pointer",
            BadFormat => "badly formatted data",
            ProtocolError => "protocol error",
            Closed => "closed",
            Interrupted => "interrupted",
            Aborted => "aborted",
        }
    }
}

/// An error returned by a `ptk` operation: a closed [`ErrorKind`] plus
/// optional free-form context (the offending argument, the syscall that
/// failed, ...).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}{}", context.as_ref().map(|c| format!(": {c}")).unwrap_or_default())]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn new(kind: ErrorKind) -> Error {
        Error { kind, context: None }
    }

    pub fn with_context(kind: ErrorKind, context: impl Into<String>) -> Error {
        Error {
            kind,
            context: Some(context.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Translates an OS error from a socket primitive into the closed
/// taxonomy: `ECONNREFUSED`, `ECONNRESET`, `EADDRINUSE`, `ENETUNREACH`,
/// `EMSGSIZE`, `EAGAIN`/`EWOULDBLOCK` each get a named kind; anything
/// else is `NetworkError`.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        use io::ErrorKind as K;

        let kind = match err.kind() {
            K::WouldBlock => ErrorKind::WouldBlock,
            K::ConnectionRefused => ErrorKind::ConnectionRefused,
            K::ConnectionReset | K::UnexpectedEof => ErrorKind::ConnectionReset,
            K::NotConnected => ErrorKind::NotConnected,
            K::AddrInUse => ErrorKind::AddressInUse,
            K::Interrupted => ErrorKind::Interrupted,
            K::TimedOut => ErrorKind::Timeout,
            _ => translate_raw_os_error(&err).unwrap_or(ErrorKind::NetworkError),
        };

        Error::with_context(kind, err.to_string())
    }
}

#[cfg(unix)]
fn translate_raw_os_error(err: &io::Error) -> Option<ErrorKind> {
    match err.raw_os_error()? {
        code if code == libc::ENETUNREACH || code == libc::EHOSTUNREACH => {
            Some(ErrorKind::NoRoute)
        }
        code if code == libc::EMSGSIZE => Some(ErrorKind::MessageTooLarge),
        code if code == libc::EISCONN => Some(ErrorKind::AlreadyConnected),
        _ => None,
    }
}

#[cfg(not(unix))]
fn translate_raw_os_error(_err: &io::Error) -> Option<ErrorKind> {
    None
}

/// A per-loop diagnostic slot: written by any operation that fails
/// against a handle from that loop, read via `EventLoop::last_error`.
/// Not transactional — successive failures overwrite it.
#[derive(Debug, Default)]
pub(crate) struct LastError {
    slot: Cell<Option<ErrorKind>>,
}

impl LastError {
    pub(crate) fn set(&self, kind: ErrorKind) {
        self.slot.set(Some(kind));
    }

    pub(crate) fn get(&self) -> Option<ErrorKind> {
        self.slot.get()
    }
}

thread_local! {
    static CURRENT_ERROR: Cell<Option<ErrorKind>> = Cell::new(None);
}

/// Written by value-returning lookups that cannot signal failure
/// through their return type (array/slot accessors returning `None`
/// rather than a pointer). Cleared by convention on success.
pub fn set_current_error(kind: ErrorKind) {
    CURRENT_ERROR.with(|c| c.set(Some(kind)));
}

pub fn clear_current_error() {
    CURRENT_ERROR.with(|c| c.set(None));
}

pub fn current_error() -> Option<ErrorKind> {
    CURRENT_ERROR.with(|c| c.get())
}
