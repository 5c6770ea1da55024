// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session & request assembler (C3): per-client state, the two-half request
//! rendezvous, and the validation rules of §4.3.

use crate::channel_programmer::ChannelProgrammer;
use crate::regs::DeviceRegisters;
use drv_sdma_api::ResponseCode;
use ringbuf::ringbuf_entry;
use sdma_sys::{Endpoint, FrameId};

ringbuf::ringbuf!(Trace, 32, Trace::None);

#[derive(Copy, Clone, PartialEq)]
pub enum Trace {
    None,
    DuplicateHandshake { listener: u32, epoffset: u32 },
    RequestInProgress,
    Validated { code: u32 },
}

/// Which half(s) of a two-half request have arrived (§3).
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct HaveCaps {
    pub src: bool,
    pub dst: bool,
}

impl HaveCaps {
    pub fn is_complete(self) -> bool {
        self.src && self.dst
    }
}

/// Which half of a two-half request a message carries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Half {
    Src,
    Dst,
}

/// The operation currently in flight for a session, if any (§3).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpKind {
    None,
    Memcpy,
    Memset,
    Rotate,
}

/// The accumulating state of a not-yet-dispatched two-half request (§3
/// "pending-request record").
#[derive(Copy, Clone, Default)]
pub struct PendingRequest {
    pub have: HaveCaps,
    pub src: Option<FrameId>,
    pub src_offset: u32,
    pub dst: Option<FrameId>,
    pub dst_offset: u32,
    pub len: u32,
    pub width: u32,
    pub height: u32,
}

impl PendingRequest {
    fn clear(&mut self) {
        *self = PendingRequest::default();
    }
}

/// One connected client (§3 "Client session").
pub struct Session {
    pub remote: Endpoint,
    pub scratch: FrameId,
    /// Mapped virtual address of `scratch`, established once at handshake
    /// time; `memset` writes `value` through this pointer before flushing.
    scratch_ptr: *mut u8,
    pub pending: PendingRequest,
    pub op: OpKind,
    pub acked: bool,
    /// How many bytes of a `Memset`'s total `len` have already landed in the
    /// destination; doubles as the memset continuation's cursor (§4.4).
    pub memset_done: u32,
    pub memset_len: u32,
    pub memset_dst: Option<FrameId>,
    pub memset_dst_offset: u32,
    pub channel: Option<u8>,
}

impl Session {
    pub fn new(remote: Endpoint, scratch: FrameId, scratch_ptr: *mut u8) -> Self {
        Session {
            remote,
            scratch,
            scratch_ptr,
            pending: PendingRequest::default(),
            op: OpKind::None,
            acked: false,
            memset_done: 0,
            memset_len: 0,
            memset_dst: None,
            memset_dst_offset: 0,
            channel: None,
        }
    }

    fn in_flight(&self) -> bool {
        self.op != OpKind::None
    }
}

/// Validates `memcpy`/`rotate` halves against V1-V3 of §4.3.
fn validate(
    src: FrameId,
    src_offset: u32,
    dst: FrameId,
    dst_offset: u32,
    len: u32,
) -> Result<(), ResponseCode> {
    // V1
    if !(src_offset < src.bytes && dst_offset < dst.bytes) {
        return Err(ResponseCode::MemcpyInvalid);
    }
    let src_bytes = src.bytes - src_offset;
    let dst_bytes = dst.bytes - dst_offset;
    // V2
    if !(len <= src_bytes && len <= dst_bytes) {
        return Err(ResponseCode::MemcpyInvalid);
    }
    let src_addr = src.base + src_offset;
    let dst_addr = dst.base + dst_offset;
    // V3: disjoint intervals. Per §9's open question, the source equal to
    // destination case is rejected rather than silently accepted.
    let disjoint = src_addr + len <= dst_addr || dst_addr + len <= src_addr;
    if !disjoint {
        return Err(ResponseCode::MemcpyInvalid);
    }
    Ok(())
}

impl Session {
    /// `submit_memcpy_half` (§4.3). Returns `Some(code)` once both halves
    /// have arrived and the request was dispatched (successfully or not);
    /// `None` while still waiting on the other half.
    pub fn submit_memcpy_half<const N: usize, R: DeviceRegisters>(
        &mut self,
        prog: &mut ChannelProgrammer<N>,
        regs: &R,
        half: Half,
        frame: FrameId,
        offset: u32,
        len: Option<u32>,
    ) -> Option<ResponseCode> {
        if self.in_flight() {
            ringbuf_entry!(Trace::RequestInProgress);
            return Some(ResponseCode::RequestInProgress);
        }

        match half {
            Half::Src => {
                self.pending.src = Some(frame);
                self.pending.src_offset = offset;
                self.pending.len = len.unwrap_or(self.pending.len);
                self.pending.have.src = true;
            }
            Half::Dst => {
                self.pending.dst = Some(frame);
                self.pending.dst_offset = offset;
                self.pending.have.dst = true;
            }
        }

        if !self.pending.have.is_complete() {
            return None;
        }

        let src = self.pending.src.unwrap();
        let dst = self.pending.dst.unwrap();
        let src_offset = self.pending.src_offset;
        let dst_offset = self.pending.dst_offset;
        let len = self.pending.len;
        self.pending.clear();

        let result = validate(src, src_offset, dst, dst_offset, len).and_then(|()| {
            prog.start_linear(
                regs,
                self.remote,
                src.addr(src_offset),
                dst.addr(dst_offset),
                len,
            )
        });

        Some(match result {
            Ok(chan) => {
                self.channel = Some(chan);
                self.op = OpKind::Memcpy;
                ringbuf_entry!(Trace::Validated { code: ResponseCode::Ok as u32 });
                ResponseCode::Ok
            }
            Err(code) => {
                ringbuf_entry!(Trace::Validated { code: code as u32 });
                code
            }
        })
    }

    /// `submit_rotate_half` (§4.3): mirrors `submit_memcpy_half`, tracking
    /// `width`/`height` on the source half.
    pub fn submit_rotate_half<const N: usize, R: DeviceRegisters>(
        &mut self,
        prog: &mut ChannelProgrammer<N>,
        regs: &R,
        half: Half,
        frame: FrameId,
        offset: u32,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Option<ResponseCode> {
        if self.in_flight() {
            ringbuf_entry!(Trace::RequestInProgress);
            return Some(ResponseCode::RequestInProgress);
        }

        match half {
            Half::Src => {
                self.pending.src = Some(frame);
                self.pending.src_offset = offset;
                self.pending.width = width.unwrap_or(0);
                self.pending.height = height.unwrap_or(0);
                self.pending.len = self.pending.width * self.pending.height;
                self.pending.have.src = true;
            }
            Half::Dst => {
                self.pending.dst = Some(frame);
                self.pending.dst_offset = offset;
                self.pending.have.dst = true;
            }
        }

        if !self.pending.have.is_complete() {
            return None;
        }

        let src = self.pending.src.unwrap();
        let dst = self.pending.dst.unwrap();
        let src_offset = self.pending.src_offset;
        let dst_offset = self.pending.dst_offset;
        let len = self.pending.len;
        let width = self.pending.width;
        let height = self.pending.height;
        self.pending.clear();

        let result = validate(src, src_offset, dst, dst_offset, len)
            .map_err(|_| ResponseCode::RotateInvalid)
            .and_then(|()| {
                prog.start_rotate(
                    regs,
                    self.remote,
                    src.addr(src_offset),
                    dst.addr(dst_offset),
                    width,
                    height,
                )
            });

        Some(match result {
            Ok(chan) => {
                self.channel = Some(chan);
                self.op = OpKind::Rotate;
                ResponseCode::Ok
            }
            Err(code) => code,
        })
    }

    /// `submit_memset` (§4.3): writes `value` into the first
    /// `min(len, scratch.bytes)` bytes of the scratch buffer and flushes the
    /// cache, mirroring the driver-owned-buffer contract of §5.
    pub fn submit_memset<const N: usize, R: DeviceRegisters>(
        &mut self,
        prog: &mut ChannelProgrammer<N>,
        regs: &R,
        frame: FrameId,
        offset: u32,
        len: u32,
        value: u8,
    ) -> ResponseCode {
        if self.in_flight() {
            ringbuf_entry!(Trace::RequestInProgress);
            return ResponseCode::RequestInProgress;
        }

        if !(offset < frame.bytes && len <= frame.bytes - offset) {
            return ResponseCode::MemsetInvalid;
        }

        let cpy_len = core::cmp::min(len, self.scratch.bytes);
        // SAFETY: `scratch_ptr` was established at handshake time as a
        // valid, exclusively-owned mapping at least `scratch.bytes` long,
        // and `cpy_len <= scratch.bytes` by construction above.
        unsafe {
            core::ptr::write_bytes(self.scratch_ptr, value, cpy_len as usize);
        }
        sdma_sys::env::flush_data_cache();

        let dst_addr = frame.addr(offset);
        match prog.start_linear(regs, self.remote, self.scratch.base, dst_addr, cpy_len) {
            Ok(chan) => {
                self.channel = Some(chan);
                self.op = OpKind::Memset;
                self.memset_dst = Some(frame);
                self.memset_dst_offset = cpy_len;
                self.memset_len = len;
                self.memset_done = cpy_len;
                ResponseCode::Ok
            }
            Err(code) => code,
        }
    }

    /// One step of the memset continuation (§4.4): returns `Some(cpy_len)`
    /// if another sub-transfer was started, or `None` if `memset_done ==
    /// memset_len` already (the caller should send the completion reply).
    pub fn continue_memset<const N: usize, R: DeviceRegisters>(
        &mut self,
        prog: &mut ChannelProgrammer<N>,
        regs: &R,
    ) -> Option<Result<u32, ResponseCode>> {
        if self.memset_done >= self.memset_len {
            return None;
        }
        let cpy_len = core::cmp::min(self.memset_done, self.memset_len - self.memset_done);
        let dst = self.memset_dst.unwrap();
        let dst_addr = dst.addr(self.memset_dst_offset);
        match prog.start_linear(regs, self.remote, self.scratch.base, dst_addr, cpy_len) {
            Ok(chan) => {
                self.channel = Some(chan);
                self.memset_dst_offset += cpy_len;
                self.memset_done += cpy_len;
                Some(Ok(cpy_len))
            }
            Err(code) => Some(Err(code)),
        }
    }

    /// Clears in-flight state once a transfer fully completes (successfully
    /// or with a hardware error); the session itself is never torn down.
    pub fn finish(&mut self) {
        self.op = OpKind::None;
        self.acked = false;
        self.channel = None;
        self.memset_done = 0;
        self.memset_len = 0;
        self.memset_dst = None;
        self.memset_dst_offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::mock::MockRegisters;

    fn frame(base: u32, bytes: u32) -> FrameId {
        FrameId { base, bytes }
    }

    fn new_session() -> Session {
        let scratch_ptr = Box::leak(vec![0u8; 4096].into_boxed_slice()).as_mut_ptr();
        Session::new(Endpoint { listener: 1, epoffset: 7 }, frame(0xF000_0000, 4096), scratch_ptr)
    }

    #[test]
    fn memcpy_waits_for_both_halves() {
        let regs = MockRegisters::default();
        let mut prog: ChannelProgrammer<4> = ChannelProgrammer::new();
        let mut s = new_session();

        let r = s.submit_memcpy_half(
            &mut prog,
            &regs,
            Half::Src,
            frame(0x1000, 4096),
            0,
            Some(4096),
        );
        assert!(r.is_none());
        assert_eq!(s.op, OpKind::None);
    }

    #[test]
    fn memcpy_dispatches_once_complete() {
        let regs = MockRegisters::default();
        let mut prog: ChannelProgrammer<4> = ChannelProgrammer::new();
        let mut s = new_session();

        s.submit_memcpy_half(&mut prog, &regs, Half::Src, frame(0x1000, 4096), 0, Some(4096));
        let r = s.submit_memcpy_half(&mut prog, &regs, Half::Dst, frame(0x2000, 4096), 0, None);

        assert_eq!(r, Some(ResponseCode::Ok));
        assert_eq!(s.op, OpKind::Memcpy);
    }

    #[test]
    fn overlapping_same_frame_is_rejected() {
        let regs = MockRegisters::default();
        let mut prog: ChannelProgrammer<4> = ChannelProgrammer::new();
        let mut s = new_session();

        s.submit_memcpy_half(&mut prog, &regs, Half::Src, frame(0x1000, 8192), 0, Some(4096));
        let r = s.submit_memcpy_half(&mut prog, &regs, Half::Dst, frame(0x1000, 8192), 1024, None);

        assert_eq!(r, Some(ResponseCode::MemcpyInvalid));
        assert_eq!(s.op, OpKind::None);
    }

    #[test]
    fn request_in_progress_is_rejected_without_touching_device() {
        let regs = MockRegisters::default();
        let mut prog: ChannelProgrammer<4> = ChannelProgrammer::new();
        let mut s = new_session();

        s.submit_memcpy_half(&mut prog, &regs, Half::Src, frame(0x1000, 4096), 0, Some(4096));
        s.submit_memcpy_half(&mut prog, &regs, Half::Dst, frame(0x2000, 4096), 0, None);
        assert_eq!(s.op, OpKind::Memcpy);

        let r = s.submit_memcpy_half(&mut prog, &regs, Half::Src, frame(0x1000, 4096), 0, Some(4096));
        assert_eq!(r, Some(ResponseCode::RequestInProgress));
    }

    #[test]
    fn memset_continuation_follows_doubling_schedule() {
        let regs = MockRegisters::default();
        let mut prog: ChannelProgrammer<4> = ChannelProgrammer::new();
        let mut s = new_session();

        let dst = frame(0x5000_0000, 1 << 20);
        let code = s.submit_memset(&mut prog, &regs, dst, 0, 1 << 20, 0xAB);
        assert_eq!(code, ResponseCode::Ok);
        assert_eq!(s.memset_done, 4096);

        let mut steps = vec![s.memset_done];
        loop {
            match s.continue_memset(&mut prog, &regs) {
                Some(Ok(_)) => steps.push(s.memset_done),
                Some(Err(_)) => panic!("unexpected hardware error"),
                None => break,
            }
        }

        assert_eq!(*steps.last().unwrap(), 1 << 20);
        // Geometric ramp: each step at most doubles the filled region.
        for w in steps.windows(2) {
            assert!(w[1] <= w[0] * 2);
        }
    }
}
