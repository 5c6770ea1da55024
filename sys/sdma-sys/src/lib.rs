// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared primitives for the SDMA driver task and anything that talks to it.
//!
//! This crate plays the role the teacher splits across `sys/abi` and
//! `sys/userlib`: the small set of types and syscall-shaped wrappers that
//! both sides of the wire protocol, and the driver's own internals, need to
//! agree on. It is also the home of every external collaborator the driver
//! consumes but does not implement (the virtual-memory helper, the cap-slot
//! allocator, the name-service client, and the cooperative wait-set) --
//! those are deliberately out of scope, so they are represented here only as
//! thin function signatures, the same way `userlib::kipc` wraps calls to the
//! kernel task without reimplementing the kernel.

#![cfg_attr(target_os = "none", no_std)]

pub mod channel;
pub mod env;

/// Identifies the receive side of a message channel.
///
/// Mirrors the `(listener, epoffset)` pair a capability-based microkernel
/// hands back from `debug_cap_identify` on an endpoint capability. Two
/// sessions are the same session iff their endpoints compare equal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Endpoint {
    pub listener: u32,
    pub epoffset: u32,
}

/// The physical identity of a frame capability: a contiguous run of physical
/// memory, described the way `frame_identify` describes it. The driver never
/// dereferences this memory itself; it only ever hands the addresses to the
/// DMA engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameId {
    pub base: u32,
    pub bytes: u32,
}

impl FrameId {
    /// Bytes available starting at `offset`, or `None` if `offset` is not a
    /// valid position within the frame (§4.3 `V1`).
    pub fn bytes_from(&self, offset: u32) -> Option<u32> {
        if offset < self.bytes {
            Some(self.bytes - offset)
        } else {
            None
        }
    }

    /// Physical address of `offset` bytes into this frame.
    pub fn addr(&self, offset: u32) -> u32 {
        self.base.wrapping_add(offset)
    }
}

/// An opaque capability handle as received in a message. The driver never
/// inspects a capability's contents directly; it is immediately resolved to
/// either a [`FrameId`] (frame capabilities) or an [`Endpoint`] (endpoint
/// capabilities) via the environment, then discarded.
#[derive(Copy, Clone, Debug)]
pub struct Cap(pub u32);

/// Failure to identify or otherwise resolve a capability. Reflects a bug in
/// the caller (a capability that doesn't exist, or is of the wrong kind) and
/// is always a fatal condition for the single request in flight -- the
/// kernel itself does not make this fail for well-formed callers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CapError;
