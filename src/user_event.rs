//! A cross-thread wakeup mailbox. Other threads hold a [`Raiser`] and
//! call [`Raiser::raise`] to wake this loop's pump; any number of
//! raises between two pumps coalesce into exactly one dispatched
//! [`crate::handler::EventKind::UserEvent`] — there is no payload
//! queue, only a pending flag. Grounded in `mio::channel`'s
//! `SenderCtl`/`ReceiverCtl` pair (`src/channel.rs`): a shared atomic
//! counter decides whether a wakeup needs to be sent, and
//! `mio::deprecated::notify::NotifyError` for what can go wrong
//! sending one. Unlike that channel, there is no payload to move
//! across threads — only the binary fact that *something* happened —
//! so the wakeup is a single byte through a self-pipe rather than an
//! `mpsc` channel.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::Error;

fn set_nonblocking(fd: RawFd) -> Result<(), Error> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

struct Shared {
    pending: AtomicUsize,
    write_fd: RawFd,
}

// `write_fd` is closed here, not in `UserEventMailbox::drop`, so an
// outstanding `Raiser` clone on another thread can never call
// `write(2)` on a descriptor this process has since reused for
// something else.
impl Drop for Shared {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.write_fd);
        }
    }
}

/// A `Send`-able handle other threads use to wake the loop that
/// registered this mailbox. Cheap to clone; every clone shares the
/// same pending counter and pipe.
#[derive(Clone)]
pub struct Raiser {
    shared: Arc<Shared>,
}

// Safety: `write_fd` is only ever written to via the `write(2)`
// syscall, which is safe to call concurrently from multiple threads
// on the same fd.
unsafe impl Send for Raiser {}
unsafe impl Sync for Raiser {}

impl Raiser {
    /// Marks the mailbox pending and wakes the loop if it was not
    /// already pending — a raise that lands while a previous raise is
    /// still undrained costs one atomic increment and nothing else.
    pub fn raise(&self) -> Result<(), Error> {
        if self.shared.pending.fetch_add(1, Ordering::AcqRel) == 0 {
            let byte = 1u8;
            let rc = unsafe {
                libc::write(
                    self.shared.write_fd,
                    &byte as *const u8 as *const libc::c_void,
                    1,
                )
            };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::EAGAIN) {
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }
}

pub(crate) struct UserEventMailbox {
    shared: Arc<Shared>,
    read_fd: RawFd,
}

impl UserEventMailbox {
    pub(crate) fn new() -> Result<UserEventMailbox, Error> {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);
        set_nonblocking(read_fd)?;
        set_nonblocking(write_fd)?;

        Ok(UserEventMailbox {
            shared: Arc::new(Shared {
                pending: AtomicUsize::new(0),
                write_fd,
            }),
            read_fd,
        })
    }

    pub(crate) fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    pub(crate) fn raiser(&self) -> Raiser {
        Raiser {
            shared: self.shared.clone(),
        }
    }

    /// Drains the wakeup pipe and clears the pending count. Returns
    /// whether anything had actually been raised, so a spurious
    /// readability notification never dispatches a phantom event.
    pub(crate) fn drain_pending(&mut self) -> bool {
        let mut scratch = [0u8; 64];
        loop {
            let rc = unsafe {
                libc::read(
                    self.read_fd,
                    scratch.as_mut_ptr() as *mut libc::c_void,
                    scratch.len(),
                )
            };
            if rc <= 0 {
                break;
            }
        }
        self.shared.pending.swap(0, Ordering::AcqRel) > 0
    }
}

impl Drop for UserEventMailbox {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
        }
    }
}
