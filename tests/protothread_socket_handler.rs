#![cfg(feature = "net")]

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use ptk::event_loop::EventLoop;
use ptk::protothread::{PtStatus, Protothread, Runnable};
use ptk::socket::UdpSocketResource;
use ptk::{pt_begin, pt_end, pt_exit, pt_wait_event};

struct Shared {
    socket: UdpSocketResource,
    echoed: bool,
}

type Ctx = Rc<RefCell<Option<Shared>>>;

struct EchoOnce;

impl Runnable<Ctx> for EchoOnce {
    fn poll(&mut self, pt: &mut Protothread, event_loop: &mut EventLoop<Ctx>) -> PtStatus {
        pt_begin!(pt);
        match pt.state() {
            0 => {
                let ctx = event_loop.context().clone();
                let mut borrow = ctx.borrow_mut();
                let shared = borrow.as_mut().expect("shared state installed before dispatch");
                let mut scratch = [0u8; 64];
                match shared.socket.recv_from(&mut scratch) {
                    Ok((n, from)) => {
                        shared.socket.send_to(&scratch[..n], from).unwrap();
                        shared.echoed = true;
                        pt_end!();
                    }
                    Err(_) => pt_wait_event!(pt, 0, false),
                }
            }
            _ => pt_exit!(),
        }
    }
}

#[test]
fn socket_bound_protothread_handler_echoes_on_readiness() {
    let shared: Ctx = Rc::new(RefCell::new(None));
    let mut el: EventLoop<Ctx> = EventLoop::new(shared.clone()).unwrap();

    let listener_sock = el
        .bind_udp("127.0.0.1:0".parse().unwrap(), |_, _, _| {})
        .unwrap();
    let listener_addr: SocketAddr = listener_sock.local_addr().unwrap();
    let handle = listener_sock.handle();

    *shared.borrow_mut() = Some(Shared {
        socket: listener_sock,
        echoed: false,
    });

    // Replaces the plain function handler installed by `bind_udp` with
    // a protothread that only runs when this socket is actually
    // readable, rather than every tick.
    el.set_protothread_handler(handle, true, false, Box::new(EchoOnce))
        .unwrap();

    let sender = el
        .bind_udp("127.0.0.1:0".parse().unwrap(), |_, _, _| {})
        .unwrap();
    sender.send_to(b"ping", listener_addr).unwrap();

    let deadline = Instant::now() + Duration::from_millis(500);
    while !shared.borrow().as_ref().unwrap().echoed && Instant::now() < deadline {
        el.run_once(Some(Duration::from_millis(10))).unwrap();
    }
    assert!(shared.borrow().as_ref().unwrap().echoed);

    let mut back = [0u8; 16];
    let mut received = None;
    let deadline = Instant::now() + Duration::from_millis(200);
    while received.is_none() && Instant::now() < deadline {
        if let Ok((n, _from)) = sender.recv_from(&mut back) {
            received = Some(n);
        }
    }
    let n = received.expect("echo never arrived back at sender");
    assert_eq!(&back[..n], b"ping");
}
