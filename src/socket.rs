//! Non-blocking TCP and UDP resources, registered with an
//! [`crate::event_loop::EventLoop`] the same way a timer or user event
//! source is: a handle back, a callback invoked on readiness. Built on
//! `std::net` rather than re-deriving the raw `socket(2)`/`bind(2)`/
//! `listen(2)` calls `mio::net::tcp::socket.rs`/`mio::sys::tcp` wrap,
//! since `std::net` already gives a safe, portable non-blocking socket
//! — the toolkit's own contribution is registering its descriptor with
//! this crate's handle-addressed, generation-tagged loop rather than a
//! `Token`, and owning the socket lives with the caller (typically
//! inside their loop context), the same way `mio::net::TcpListener`
//! hands a bare value back rather than retaining it itself
//! (`src/net/tcp/listener.rs`).
//!
//! Gated behind the `net` feature so the rest of the crate (handle
//! registry, buffer, codec, timers, protothreads) can be used without
//! ever touching the OS socket API.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};

use crate::error::{Error, ErrorKind};
use crate::event_loop::EventLoop;
use crate::handle::{Handle, ResourceKind};
use crate::handler::{Callback, EventHandler, EventKind};
use crate::protothread::{Protothread, Runnable};

/// A TCP listener registered with an event loop. Accepting, like every
/// other socket operation here, is the caller's responsibility once
/// notified — the loop only owns the readiness registration.
pub struct TcpListenerSocket {
    handle: Handle,
    inner: TcpListener,
}

impl TcpListenerSocket {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.inner.local_addr()?)
    }

    /// Accepts one pending connection. `ErrorKind::WouldBlock` if none
    /// is ready despite the readiness notification — possible under
    /// `poll(2)`'s level-triggered semantics when more than one waiter
    /// raced to accept.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr), Error> {
        self.inner.accept().map_err(Error::from)
    }
}

pub struct TcpStreamSocket {
    handle: Handle,
    inner: TcpStream,
}

impl TcpStreamSocket {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.inner.peer_addr()?)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        use std::io::Read;
        self.inner.read(buf).map_err(Error::from)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        use std::io::Write;
        self.inner.write(buf).map_err(Error::from)
    }
}

pub struct UdpSocketResource {
    handle: Handle,
    inner: UdpSocket,
}

impl UdpSocketResource {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.inner.local_addr()?)
    }

    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize, Error> {
        self.inner.send_to(buf, addr).map_err(Error::from)
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), Error> {
        self.inner.recv_from(buf).map_err(Error::from)
    }

    /// Enables or disables sending to the broadcast address
    /// (`255.255.255.255` or a subnet broadcast address). A broadcast
    /// send is then just [`UdpSocketResource::send_to`] addressed at
    /// that address — `std::net::UdpSocket` has no separate
    /// "send broadcast" call, and neither does this wrapper.
    pub fn set_broadcast(&self, on: bool) -> Result<(), Error> {
        Ok(self.inner.set_broadcast(on)?)
    }

    /// Joins an IPv4 multicast group on the given local interface.
    pub fn join_multicast_v4(&self, multiaddr: Ipv4Addr, interface: Ipv4Addr) -> Result<(), Error> {
        Ok(self.inner.join_multicast_v4(&multiaddr, &interface)?)
    }

    /// Leaves an IPv4 multicast group previously joined with
    /// [`UdpSocketResource::join_multicast_v4`].
    pub fn leave_multicast_v4(&self, multiaddr: Ipv4Addr, interface: Ipv4Addr) -> Result<(), Error> {
        Ok(self.inner.leave_multicast_v4(&multiaddr, &interface)?)
    }

    /// Sets the outbound TTL used for multicast datagrams.
    pub fn set_multicast_ttl_v4(&self, ttl: u32) -> Result<(), Error> {
        Ok(self.inner.set_multicast_ttl_v4(ttl)?)
    }

    /// Enables or disables loopback of this socket's own multicast
    /// sends back to itself.
    pub fn set_multicast_loop_v4(&self, on: bool) -> Result<(), Error> {
        Ok(self.inner.set_multicast_loop_v4(on)?)
    }
}

impl<C> EventLoop<C> {
    /// Binds a non-blocking TCP listener and registers it for
    /// readability (an incoming connection is ready to
    /// [`TcpListenerSocket::accept`]).
    pub fn listen_tcp(
        &mut self,
        addr: SocketAddr,
        handler: Callback<C>,
    ) -> Result<TcpListenerSocket, Error> {
        let inner = TcpListener::bind(addr)?;
        inner.set_nonblocking(true)?;
        let fd = inner.as_raw_fd();
        let handle = self.register_socket_fd(fd, true, false, EventHandler::Function(handler))?;
        Ok(TcpListenerSocket { handle, inner })
    }

    /// Registers an already-connected or already-accepted TCP stream,
    /// taking ownership of it.
    pub fn register_tcp_stream(
        &mut self,
        inner: TcpStream,
        readable: bool,
        writable: bool,
        handler: Callback<C>,
    ) -> Result<TcpStreamSocket, Error> {
        inner.set_nonblocking(true)?;
        let fd = inner.as_raw_fd();
        let handle =
            self.register_socket_fd(fd, readable, writable, EventHandler::Function(handler))?;
        Ok(TcpStreamSocket { handle, inner })
    }

    /// Connects to `addr` and registers the resulting stream.
    /// `std::net::TcpStream::connect` has no non-blocking form, so the
    /// connect itself runs to completion before the socket is switched
    /// to non-blocking and registered — by the time this returns, the
    /// connection already exists. `handler` is invoked once with
    /// [`EventKind::Connected`] right away, for the same reason a
    /// freshly-accepted stream never gets a synthetic "readable" event:
    /// the loop reports what already happened instead of making the
    /// caller wait a tick to find out.
    pub fn connect_tcp(
        &mut self,
        addr: SocketAddr,
        handler: Callback<C>,
    ) -> Result<TcpStreamSocket, Error> {
        let inner = TcpStream::connect(addr)?;
        inner.set_nonblocking(true)?;
        let fd = inner.as_raw_fd();
        let handle =
            self.register_socket_fd(fd, true, false, EventHandler::Function(handler))?;
        handler(self, handle, EventKind::Connected);
        Ok(TcpStreamSocket { handle, inner })
    }

    /// Binds a non-blocking UDP socket and registers it for
    /// readability.
    pub fn bind_udp(
        &mut self,
        addr: SocketAddr,
        handler: Callback<C>,
    ) -> Result<UdpSocketResource, Error> {
        let inner = UdpSocket::bind(addr)?;
        inner.set_nonblocking(true)?;
        let fd = inner.as_raw_fd();
        let handle = self.register_socket_fd(fd, true, false, EventHandler::Function(handler))?;
        Ok(UdpSocketResource { handle, inner })
    }

    /// Changes which readiness kinds wake the loop for this socket —
    /// e.g. adding writable interest while a partial write drains.
    pub fn set_socket_interest(
        &mut self,
        handle: Handle,
        readable: bool,
        writable: bool,
    ) -> Result<(), Error> {
        resolve_socket_kind(handle)?;
        let fd = self.socket_fd(handle)?;
        self.reregister_socket_fd(fd, readable, writable)
    }

    /// Deregisters the handle. Does not close the fd — dropping the
    /// `TcpListenerSocket`/`TcpStreamSocket`/`UdpSocketResource` does
    /// that, via `std::net`'s own `Drop` impls.
    ///
    /// Idempotent: closing a handle that is already closed (or was
    /// never registered with this loop but carries the right resource
    /// kind) is a no-op rather than an error, since the caller-visible
    /// effect — "this handle no longer does anything" — already holds.
    pub fn close_socket(&mut self, handle: Handle) -> Result<(), Error> {
        resolve_socket_kind(handle)?;
        match self.deregister_socket(handle) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::InvalidHandle => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Registers `runnable` as this socket's handler, replacing
    /// whatever handler it had, and arms the poller for `readable`/
    /// `writable` interest. The protothread is then invoked only when
    /// the socket actually becomes ready — a `poll` that returns
    /// `PtStatus::Waiting` simply sits registered until the next
    /// matching readiness, rather than being re-run every tick the way
    /// a loop-spawned protothread (`EventLoop::spawn_protothread`) is.
    pub fn set_protothread_handler(
        &mut self,
        handle: Handle,
        readable: bool,
        writable: bool,
        runnable: Box<dyn Runnable<C>>,
    ) -> Result<(), Error> {
        resolve_socket_kind(handle)?;
        let fd = self.socket_fd(handle)?;
        let entry = self
            .sockets
            .get_mut(handle.slot(), handle.generation())
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle))?;
        entry.handler = EventHandler::Protothread(runnable);
        entry.pt = Protothread::new();
        self.reregister_socket_fd(fd, readable, writable)
    }

    fn socket_fd(&self, handle: Handle) -> Result<RawFd, Error> {
        self.sockets
            .get(handle.slot(), handle.generation())
            .map(|entry| entry.fd)
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle))
    }
}

fn resolve_socket_kind(handle: Handle) -> Result<(), Error> {
    if handle.is_null() || handle.kind() != Some(ResourceKind::Socket) {
        return Err(Error::new(ErrorKind::InvalidHandle));
    }
    Ok(())
}
