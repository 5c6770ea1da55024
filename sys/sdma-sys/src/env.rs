// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operations implemented by services other than this one.
//!
//! Every function here is an external collaborator per the purpose/scope
//! section: the virtual-memory helper, the capability-slot allocator, and
//! the name-service client. None of their internals live in this
//! repository -- this module exists only so the driver has a single,
//! typed call site for each of them, the same way `userlib::kipc` gives
//! Hubris tasks a typed wrapper around kernel IPC without reimplementing
//! the kernel.

use crate::channel::RecvMessage;
use crate::{Cap, CapError, Endpoint, FrameId};

/// Fatal during bring-up: a setup error per the error-handling design (§7).
/// There is no well-formed reply to send yet, so bring-up aborts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BringUpError(pub &'static str);

/// Maps the device's MMIO window into this task's address space, returning
/// the virtual base address the register layer should use.
pub fn map_device_register(
    phys_base: u32,
    size: u32,
) -> Result<u32, BringUpError> {
    raw::map_device_register(phys_base, size)
        .ok_or(BringUpError("map_device_register failed"))
}

/// Registers `handler`'s owning task to receive the given interrupt line.
/// The actual mechanism (an IDT entry, a GIC route, a kernel notification
/// bit) is entirely the environment's concern; the driver only needs to know
/// that once this call returns `Ok`, its notification / interrupt path will
/// observe the line firing.
pub fn inthandler_setup(line: u32) -> Result<(), BringUpError> {
    raw::inthandler_setup(line)
        .then_some(())
        .ok_or(BringUpError("inthandler_setup failed"))
}

/// Registers this service under a well-known name so clients can discover
/// it without a hardcoded task/endpoint reference.
pub fn register_service(name: &str) -> Result<(), BringUpError> {
    raw::register_service(name)
        .then_some(())
        .ok_or(BringUpError("register_service failed"))
}

/// Allocates a frame of at least `size` bytes and maps it writable into this
/// task's address space. Used once per client session to create the memset
/// scratch buffer (§4.3).
pub fn frame_alloc(size: u32) -> Result<(Cap, *mut u8, u32), BringUpError> {
    raw::frame_alloc(size).ok_or(BringUpError("frame_alloc failed"))
}

/// Resolves a capability to its physical identity. Frame capabilities
/// resolve to a `(base, bytes)` pair; endpoint capabilities are resolved via
/// [`identify_endpoint`] instead.
pub fn frame_identify(cap: Cap) -> Result<FrameId, CapError> {
    raw::frame_identify(cap).ok_or(CapError)
}

/// Resolves an endpoint capability to the `(listener, epoffset)` pair used
/// to key client sessions (§3, §8 "Session uniqueness").
pub fn identify_endpoint(cap: Cap) -> Result<Endpoint, CapError> {
    raw::identify_endpoint(cap).ok_or(CapError)
}

/// Flushes the CPU's data cache so that bytes the driver just wrote to the
/// memset scratch buffer are visible to the DMA engine, which does not
/// snoop the cache on this SoC.
pub fn flush_data_cache() {
    raw::flush_data_cache()
}

/// Allocates a fresh receive slot for an endpoint, as the dispatcher does
/// after every inbound message so the channel stays hot (§4.4 "reallocate
/// receive slot").
pub fn recv_slot_alloc() -> Result<(), BringUpError> {
    raw::recv_slot_alloc()
        .then_some(())
        .ok_or(BringUpError("recv_slot_alloc failed"))
}

/// Registers interest in the next inbound message on `endpoint`. Re-armed
/// after every dispatch (§4.4).
pub fn register_recv(endpoint: Endpoint) {
    raw::register_recv(endpoint)
}

/// Registers an outbound message for delivery once the remote end is ready
/// to receive it.
pub fn register_send(endpoint: Endpoint, words: [u32; 4], cap: Option<Cap>) {
    raw::register_send(endpoint, words, cap)
}

/// Collects the message `event_dispatch` just reported ready on `endpoint`.
/// Called once per `Event::Recv`, before the dispatcher re-arms the slot.
pub fn try_recv(endpoint: Endpoint) -> Option<RecvMessage> {
    raw::try_recv(endpoint)
}

/// Blocks the cooperative loop until one registered source (a receive, a
/// send, or the SDMA interrupt) is ready, then returns which.
pub fn event_dispatch() -> Event {
    raw::event_dispatch()
}

/// Non-blocking variant of [`event_dispatch`]: returns immediately with
/// `None` if nothing is ready.
pub fn event_dispatch_non_block() -> Option<Event> {
    raw::event_dispatch_non_block()
}

/// The cooperative loop's wakeup reasons (§5, §6).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Event {
    Recv(Endpoint),
    SendComplete(Endpoint),
    Interrupt,
}

/// The raw syscall-shaped boundary. On a real deployment these are provided
/// by the microkernel and the paging/cap-slot/name-service tasks; see the
/// module docs. The stub bodies below exist only so this crate is a
/// self-contained, linkable unit for host-side testing of everything that
/// sits above this boundary -- they are never exercised by the driver's own
/// tests, which inject a [`crate::channel::Transport`] test double instead.
#[cfg(not(feature = "test-doubles"))]
mod raw {
    use super::Event;
    use crate::channel::RecvMessage;
    use crate::{Cap, Endpoint, FrameId};

    pub fn map_device_register(_phys_base: u32, _size: u32) -> Option<u32> {
        None
    }

    pub fn inthandler_setup(_line: u32) -> bool {
        false
    }

    pub fn register_service(_name: &str) -> bool {
        false
    }

    pub fn frame_alloc(_size: u32) -> Option<(Cap, *mut u8, u32)> {
        None
    }

    pub fn frame_identify(_cap: Cap) -> Option<FrameId> {
        None
    }

    pub fn identify_endpoint(_cap: Cap) -> Option<Endpoint> {
        None
    }

    pub fn flush_data_cache() {}

    pub fn recv_slot_alloc() -> bool {
        false
    }

    pub fn register_recv(_endpoint: Endpoint) {}

    pub fn register_send(_endpoint: Endpoint, _words: [u32; 4], _cap: Option<Cap>) {}

    pub fn try_recv(_endpoint: Endpoint) -> Option<RecvMessage> {
        None
    }

    pub fn event_dispatch() -> Event {
        Event::Interrupt
    }

    pub fn event_dispatch_non_block() -> Option<Event> {
        None
    }
}

/// Host test double (`test-doubles` feature): `frame_alloc`/`frame_identify`
/// hand back a real heap buffer and a synthetic physical identity derived
/// from the allocation's capability number, so a dependent crate's own unit
/// tests can exercise the memset scratch-buffer path -- allocate, fill,
/// program a transfer -- without real hardware. Every other primitive keeps
/// the same inert stub behavior as the on-target build, since nothing under
/// test drives the main dispatch loop itself.
#[cfg(feature = "test-doubles")]
mod raw {
    use super::Event;
    use crate::channel::RecvMessage;
    use crate::{Cap, Endpoint, FrameId};
    use core::sync::atomic::{AtomicU32, Ordering};

    static NEXT_CAP: AtomicU32 = AtomicU32::new(1);

    pub fn map_device_register(_phys_base: u32, _size: u32) -> Option<u32> {
        None
    }

    pub fn inthandler_setup(_line: u32) -> bool {
        false
    }

    pub fn register_service(_name: &str) -> bool {
        false
    }

    pub fn frame_alloc(size: u32) -> Option<(Cap, *mut u8, u32)> {
        let buf = vec![0u8; size as usize].into_boxed_slice();
        let ptr = Box::leak(buf).as_mut_ptr();
        let cap = Cap(NEXT_CAP.fetch_add(1, Ordering::Relaxed));
        Some((cap, ptr, size))
    }

    pub fn frame_identify(cap: Cap) -> Option<FrameId> {
        Some(FrameId { base: cap.0, bytes: 0 })
    }

    pub fn identify_endpoint(_cap: Cap) -> Option<Endpoint> {
        None
    }

    pub fn flush_data_cache() {}

    pub fn recv_slot_alloc() -> bool {
        false
    }

    pub fn register_recv(_endpoint: Endpoint) {}

    pub fn register_send(_endpoint: Endpoint, _words: [u32; 4], _cap: Option<Cap>) {}

    pub fn try_recv(_endpoint: Endpoint) -> Option<RecvMessage> {
        None
    }

    pub fn event_dispatch() -> Event {
        Event::Interrupt
    }

    pub fn event_dispatch_non_block() -> Option<Event> {
        None
    }
}
