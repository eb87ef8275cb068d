#![cfg(feature = "net")]

use std::cell::Cell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use ptk::{EventKind, EventLoop};

#[test]
fn udp_broadcast_and_multicast_setters_do_not_error() {
    let mut el: EventLoop<()> = EventLoop::new(()).unwrap();
    let sock = el.bind_udp("127.0.0.1:0".parse().unwrap(), |_, _, _| {}).unwrap();

    sock.set_broadcast(true).unwrap();
    sock.set_broadcast(false).unwrap();

    let group = Ipv4Addr::new(224, 0, 0, 113);
    let iface = Ipv4Addr::UNSPECIFIED;
    sock.join_multicast_v4(group, iface).unwrap();
    sock.set_multicast_ttl_v4(4).unwrap();
    sock.set_multicast_loop_v4(true).unwrap();
    sock.leave_multicast_v4(group, iface).unwrap();
}

#[test]
fn close_socket_twice_is_idempotent() {
    let mut el: EventLoop<()> = EventLoop::new(()).unwrap();
    let sock = el.bind_udp("127.0.0.1:0".parse().unwrap(), |_, _, _| {}).unwrap();
    let handle = sock.handle();

    el.close_socket(handle).unwrap();
    el.close_socket(handle).unwrap();
}

#[test]
fn connect_tcp_fires_connected_immediately() {
    let connected = Rc::new(Cell::new(false));
    let mut el: EventLoop<Rc<Cell<bool>>> = EventLoop::new(connected.clone()).unwrap();

    let listener = el
        .listen_tcp("127.0.0.1:0".parse().unwrap(), |_, _, _| {})
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let _stream = el
        .connect_tcp(addr, |loop_, _handle, kind| {
            assert_eq!(kind, EventKind::Connected);
            loop_.context().set(true);
        })
        .unwrap();

    assert!(connected.get(), "connect_tcp never fired EventKind::Connected");

    // Give the listener a chance to see the pending connection so the
    // accept backlog doesn't leak a half-open socket for the duration
    // of the test.
    let deadline = Instant::now() + Duration::from_millis(200);
    loop {
        if listener.accept().is_ok() || Instant::now() > deadline {
            break;
        }
        el.run_once(Some(Duration::from_millis(10))).unwrap();
    }
}
