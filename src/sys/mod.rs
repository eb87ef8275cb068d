//! Platform glue. Only a unix `poll(2)` backend exists today; the
//! event loop talks to it only through [`Poller`] and [`Readiness`], so
//! a kqueue/epoll/IOCP backend can be dropped in later without
//! disturbing `crate::event_loop`.

mod poll;

pub(crate) use poll::{Poller, Readiness};
