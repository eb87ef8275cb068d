//! `ptk` — a portable toolkit for building industrial-network protocol
//! endpoints (Modbus/TCP, EtherNet/IP and similar request/response
//! protocols) on top of a small, single-threaded, event-driven runtime.
//!
//! The crate has three load-bearing pieces:
//!
//! - [`handle`] + a generation-tagged slot table: opaque tokens that
//!   address timers, sockets, user event sources and protothreads
//!   without the caller ever holding a raw pointer into loop-owned
//!   memory.
//! - [`event_loop`] + [`timer`] + [`socket`]: a single pump that
//!   multiplexes timers, non-blocking sockets and cross-thread
//!   signalled events onto handler dispatch.
//! - [`protothread`] + [`buf`] + [`codec`]: stackless cooperative tasks
//!   that suspend on named events, and the double-cursor buffer/codec
//!   pair they use to frame protocol messages.
//!
//! No protocol (Modbus, EtherNet/IP, CIP) lives in this crate. It gives
//! protocol implementations the plumbing; it does not speak for them.

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod macros;

pub mod buf;
pub mod codec;
pub mod error;
pub mod event_loop;
pub mod handle;
pub mod handler;
pub mod protothread;
mod slab;
#[cfg(unix)]
mod sys;
pub mod timer;
pub mod user_event;

#[cfg(feature = "net")]
pub mod socket;

pub use error::{Error, ErrorKind, Result};
pub use event_loop::{Config, EventLoop};
pub use handle::{Handle, ResourceKind};
pub use handler::EventKind;
pub use protothread::{Protothread, Runnable};
