// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire protocol for the SDMA driver (§4.4, §6).
//!
//! This crate defines *only* the wire format: opcodes, payload layouts, and
//! the reply encoding. It is the single source of truth shared by the
//! server and by tests. It deliberately does not reproduce the client-side
//! `sdma_rpc_*` convenience wrapper (request-pending tracking, automatic
//! handshake, retry-on-transient-error) -- that helper is an explicit
//! collaborator out of scope per §1; callers that want it build it on top
//! of the encode/decode functions here, the same way the original
//! `lib/sdma/sdma_rpc.c` is layered on top of the raw LMP wire format.

#![cfg_attr(target_os = "none", no_std)]

/// Request opcodes, carried in the first word of every inbound message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    MemcpySrc = 1,
    MemcpyDst = 2,
    Memset = 3,
    RotateSrc = 4,
    RotateDst = 5,
}

impl Opcode {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Opcode::Handshake,
            1 => Opcode::MemcpySrc,
            2 => Opcode::MemcpyDst,
            3 => Opcode::Memset,
            4 => Opcode::RotateSrc,
            5 => Opcode::RotateDst,
            _ => return None,
        })
    }
}

/// The domain-specific reply detail code (§6). `Ok` is the only variant that
/// produces an `{OK, ..}` reply; every other variant produces `{FAILED,
/// detail}`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ResponseCode {
    Ok = 0,
    RequestInProgress = 1,
    NoAvailChannel = 2,
    MemcpyInvalid = 3,
    MemsetInvalid = 4,
    RotateInvalid = 5,
    Misaligned = 6,
    Supervisor = 7,
    Transfer = 8,
}

impl ResponseCode {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => ResponseCode::Ok,
            1 => ResponseCode::RequestInProgress,
            2 => ResponseCode::NoAvailChannel,
            3 => ResponseCode::MemcpyInvalid,
            4 => ResponseCode::MemsetInvalid,
            5 => ResponseCode::RotateInvalid,
            6 => ResponseCode::Misaligned,
            7 => ResponseCode::Supervisor,
            8 => ResponseCode::Transfer,
            _ => return None,
        })
    }

    pub fn is_ok(self) -> bool {
        matches!(self, ResponseCode::Ok)
    }

    /// Encodes as the two-word `{OK|FAILED, detail}` reply of §4.4.
    pub fn to_reply_words(self) -> [u32; 2] {
        [if self.is_ok() { 0 } else { 1 }, self as u32]
    }
}

/// One lifetime occurrence count per [`ResponseCode`] variant, so "how many
/// times has the driver produced `NO_AVAIL_CHANNEL`" survives past whatever
/// a ring buffer entry scrolled off of. Hand-written rather than derived,
/// since the `counters` crate in this repository drops the upstream
/// derive-macro convenience (see `lib/counters`).
impl counters::Count for ResponseCode {
    type Counters = [core::sync::atomic::AtomicU32; 9];

    const NEW_COUNTERS: Self::Counters = [
        core::sync::atomic::AtomicU32::new(0),
        core::sync::atomic::AtomicU32::new(0),
        core::sync::atomic::AtomicU32::new(0),
        core::sync::atomic::AtomicU32::new(0),
        core::sync::atomic::AtomicU32::new(0),
        core::sync::atomic::AtomicU32::new(0),
        core::sync::atomic::AtomicU32::new(0),
        core::sync::atomic::AtomicU32::new(0),
        core::sync::atomic::AtomicU32::new(0),
    ];

    fn count(&self, counters: &Self::Counters) {
        counters[*self as usize].fetch_add(1, core::sync::atomic::Ordering::Relaxed);
    }
}

/// `MEMCPY_SRC` payload: offset into the source frame and total transfer
/// length.
#[derive(Copy, Clone, Debug)]
pub struct MemcpySrcArgs {
    pub src_offset: u32,
    pub len: u32,
}

/// `MEMCPY_DST` payload: offset into the destination frame.
#[derive(Copy, Clone, Debug)]
pub struct MemcpyDstArgs {
    pub dst_offset: u32,
}

/// `MEMSET` payload: offset, total length, and fill byte.
#[derive(Copy, Clone, Debug)]
pub struct MemsetArgs {
    pub offset: u32,
    pub len: u32,
    pub value: u8,
}

/// `ROTATE_SRC` payload: offset into the source frame and the image shape.
#[derive(Copy, Clone, Debug)]
pub struct RotateSrcArgs {
    pub src_offset: u32,
    pub width: u32,
    pub height: u32,
}

/// `ROTATE_DST` payload: offset into the destination frame.
#[derive(Copy, Clone, Debug)]
pub struct RotateDstArgs {
    pub dst_offset: u32,
}

pub fn encode_memcpy_src(args: MemcpySrcArgs) -> [u32; 4] {
    [Opcode::MemcpySrc as u32, args.src_offset, args.len, 0]
}

pub fn encode_memcpy_dst(args: MemcpyDstArgs) -> [u32; 4] {
    [Opcode::MemcpyDst as u32, args.dst_offset, 0, 0]
}

pub fn encode_memset(args: MemsetArgs) -> [u32; 4] {
    [
        Opcode::Memset as u32,
        args.offset,
        args.len,
        args.value as u32,
    ]
}

pub fn encode_rotate_src(args: RotateSrcArgs) -> [u32; 4] {
    [
        Opcode::RotateSrc as u32,
        args.src_offset,
        args.width,
        args.height,
    ]
}

pub fn encode_rotate_dst(args: RotateDstArgs) -> [u32; 4] {
    [Opcode::RotateDst as u32, args.dst_offset, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips() {
        for op in [
            Opcode::Handshake,
            Opcode::MemcpySrc,
            Opcode::MemcpyDst,
            Opcode::Memset,
            Opcode::RotateSrc,
            Opcode::RotateDst,
        ] {
            assert_eq!(Opcode::from_u32(op as u32), Some(op));
        }
        assert_eq!(Opcode::from_u32(6), None);
    }

    #[test]
    fn ok_reply_is_two_zero_words() {
        assert_eq!(ResponseCode::Ok.to_reply_words(), [0, 0]);
    }

    #[test]
    fn failure_reply_carries_detail() {
        assert_eq!(
            ResponseCode::NoAvailChannel.to_reply_words(),
            [1, ResponseCode::NoAvailChannel as u32]
        );
    }
}
