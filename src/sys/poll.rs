//! A readiness multiplexer built on POSIX `poll(2)`. Any edge- or
//! level-triggered selector would satisfy the event loop's needs — the
//! multiplexer is a platform detail, not part of the public contract —
//! `poll(2)` is simply the one available everywhere `libc` runs without
//! pulling in a second crate. Structured after `mio`'s own
//! `src/sys/unix/selector/poll.rs` backend (register/reregister/
//! deregister by raw fd, one `libc::pollfd` slot per registration,
//! swap-remove on deregister) but without that file's cross-thread
//! wakeup pipe — this toolkit has no woken-from-another-thread `wait`
//! call to protect; cross-thread wakeups go through
//! `crate::user_event`'s own fd instead.

use std::convert::TryInto;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::error::{Error, ErrorKind};

/// Which operations became possible on a registered descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Readiness {
    pub(crate) readable: bool,
    pub(crate) writable: bool,
    /// `POLLHUP` without data still pending: the peer closed its end.
    pub(crate) hangup: bool,
    pub(crate) error: bool,
}

impl Readiness {
    pub(crate) fn is_empty(self) -> bool {
        !self.readable && !self.writable && !self.hangup && !self.error
    }
}

struct Registration {
    fd: RawFd,
    token: u64,
    readable: bool,
    writable: bool,
}

pub(crate) struct Poller {
    regs: Vec<Registration>,
}

fn poll_events(readable: bool, writable: bool) -> libc::c_short {
    let mut events = 0;
    if readable {
        events |= libc::POLLIN;
    }
    if writable {
        events |= libc::POLLOUT;
    }
    events
}

impl Poller {
    pub(crate) fn new() -> Poller {
        Poller { regs: Vec::new() }
    }

    pub(crate) fn register(&mut self, fd: RawFd, token: u64, readable: bool, writable: bool) {
        self.regs.push(Registration {
            fd,
            token,
            readable,
            writable,
        });
    }

    pub(crate) fn reregister(
        &mut self,
        fd: RawFd,
        readable: bool,
        writable: bool,
    ) -> Result<(), Error> {
        let reg = self
            .regs
            .iter_mut()
            .find(|r| r.fd == fd)
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle))?;
        reg.readable = readable;
        reg.writable = writable;
        Ok(())
    }

    pub(crate) fn deregister(&mut self, fd: RawFd) -> Result<(), Error> {
        let before = self.regs.len();
        self.regs.retain(|r| r.fd != fd);
        if self.regs.len() == before {
            return Err(Error::new(ErrorKind::InvalidHandle));
        }
        Ok(())
    }

    /// Blocks until at least one registered descriptor is ready, or
    /// `timeout` elapses (`None` blocks forever). Returns the token and
    /// readiness for every descriptor that became ready.
    pub(crate) fn poll(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<(u64, Readiness)>, Error> {
        if self.regs.is_empty() {
            // Nothing registered: still honor the timeout so callers
            // that poll a bare timer loop don't spin.
            if let Some(d) = timeout {
                std::thread::sleep(d);
            }
            return Ok(Vec::new());
        }

        let mut pollfds: Vec<libc::pollfd> = self
            .regs
            .iter()
            .map(|r| libc::pollfd {
                fd: r.fd,
                events: poll_events(r.readable, r.writable),
                revents: 0,
            })
            .collect();

        let timeout_ms = timeout
            .map(|d| {
                let mut ms: i32 = d.as_millis().try_into().unwrap_or(i32::MAX);
                if Duration::from_millis(ms as u64) < d {
                    ms = ms.saturating_add(1);
                }
                ms
            })
            .unwrap_or(-1);

        let rc = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Err(Error::new(ErrorKind::Interrupted));
            }
            return Err(err.into());
        }

        if rc == 0 {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(rc as usize);
        for (reg, pfd) in self.regs.iter().zip(pollfds.iter()) {
            if pfd.revents == 0 {
                continue;
            }
            let readiness = Readiness {
                readable: pfd.revents & libc::POLLIN != 0,
                writable: pfd.revents & libc::POLLOUT != 0,
                hangup: pfd.revents & libc::POLLHUP != 0,
                error: pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0,
            };
            if !readiness.is_empty() {
                out.push((reg.token, readiness));
            }
        }
        Ok(out)
    }
}
