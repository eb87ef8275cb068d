#![cfg(feature = "net")]

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use ptk::EventLoop;

#[test]
fn recv_from_yields_exact_payload_and_sender_address() {
    // The loop only reports readiness; recv'ing from the socket is the
    // caller's job (the socket itself lives with the caller, not in
    // the loop's tables), so the handler just flags that a pump saw
    // the listener readable.
    let readable = Rc::new(Cell::new(false));
    let mut el: EventLoop<Rc<Cell<bool>>> = EventLoop::new(readable.clone()).unwrap();

    let listener = el
        .bind_udp("127.0.0.1:0".parse().unwrap(), |loop_, _handle, _kind| {
            loop_.context().set(true);
        })
        .unwrap();
    let listener_addr = listener.local_addr().unwrap();

    let sender = el
        .bind_udp("127.0.0.1:0".parse().unwrap(), |_, _, _| {})
        .unwrap();
    sender.send_to(b"hello", listener_addr).unwrap();

    let deadline = Instant::now() + Duration::from_millis(200);
    while !readable.get() && Instant::now() < deadline {
        el.run_once(Some(Duration::from_millis(10))).unwrap();
    }
    assert!(readable.get(), "listener never reported readable");

    let mut scratch = [0u8; 64];
    let (n, from) = listener.recv_from(&mut scratch).unwrap();
    assert_eq!(&scratch[..n], b"hello");
    assert_eq!(from.ip().to_string(), "127.0.0.1");
}
