//! The 64-bit opaque [`Handle`] token and the resource kinds it can
//! address. Generalizes `mio::Token` (a bare `usize` slab index, see
//! `src/token.rs`) with generation tagging and kind/loop-id fields: a
//! handle that outlives its slot's reuse must be rejected, and a handle
//! from one loop must never resolve against another loop's tables.

use std::fmt;

/// `0` is the reserved null handle: no resource ever receives it.
pub const NULL_HANDLE: Handle = Handle(0);

/// The kind of resource table a [`Handle`] addresses. Each kind lives in
/// its own fixed-size table per loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResourceKind {
    EventLoop = 1,
    Timer = 2,
    Socket = 3,
    UserEventSource = 4,
    Protothread = 5,
}

impl ResourceKind {
    fn from_u8(v: u8) -> Option<ResourceKind> {
        match v {
            1 => Some(ResourceKind::EventLoop),
            2 => Some(ResourceKind::Timer),
            3 => Some(ResourceKind::Socket),
            4 => Some(ResourceKind::UserEventSource),
            5 => Some(ResourceKind::Protothread),
            _ => None,
        }
    }
}

/// An opaque, generation-tagged token identifying one resource in one
/// loop. Low to high: resource kind (8 bits), owning-loop id (8 bits),
/// generation counter (16 bits), slot index (32 bits). Comparison is by
/// value; two handles are equal iff all four fields match.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    pub(crate) fn compose(kind: ResourceKind, loop_id: u8, generation: u16, slot: u32) -> Handle {
        let bits = (kind as u64)
            | (loop_id as u64) << 8
            | (generation as u64) << 16
            | (slot as u64) << 32;
        Handle(bits)
    }

    /// Rebuilds a `Handle` from the raw token a [`crate::sys::Poller`]
    /// hands back to the loop that registered it. The bits came from
    /// `Handle::as_u64` on a handle this crate composed, so any kind
    /// byte value is possible but not necessarily one of
    /// [`ResourceKind`]'s current variants.
    pub(crate) fn from_u64(bits: u64) -> Handle {
        Handle(bits)
    }

    pub fn is_null(self) -> bool {
        self == NULL_HANDLE
    }

    pub fn kind(self) -> Option<ResourceKind> {
        ResourceKind::from_u8((self.0 & 0xff) as u8)
    }

    pub fn loop_id(self) -> u8 {
        ((self.0 >> 8) & 0xff) as u8
    }

    pub(crate) fn generation(self) -> u16 {
        ((self.0 >> 16) & 0xffff) as u16
    }

    pub(crate) fn slot(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "Handle(null)");
        }
        f.debug_struct("Handle")
            .field("kind", &self.kind())
            .field("loop_id", &self.loop_id())
            .field("generation", &self.generation())
            .field("slot", &self.slot())
            .finish()
    }
}
