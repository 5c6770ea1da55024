// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RPC dispatch & completion (C4): the driver singleton, bring-up, the
//! per-message dispatcher, and the interrupt handler that drives the
//! memset continuation.

use crate::channel_programmer::ChannelProgrammer;
use crate::regs::{Cicr, DeviceRegisters, Gcr};
use crate::session::{Half, OpKind, Session};
use drv_sdma_api::{Opcode, ResponseCode};
use ringbuf::ringbuf_entry;
use sdma_sys::channel::RecvMessage;
use sdma_sys::env::{self, BringUpError};
use sdma_sys::{Cap, CapError, Endpoint, FrameId};

/// Hardware channel count; OMAP44xx SDMA exposes 32 (§3).
pub const N_CHANNELS: usize = 32;
/// Memset scratch buffer size: one page (§4.3).
pub const MEMSET_SIZE: u32 = 4096;
/// Fixed capacity of the client-session table (see `SPEC_FULL.md`
/// "Configuration").
pub const MAX_SESSIONS: usize = 64;

/// Well-known SDMA IRQ line this driver registers for at bring-up.
pub const SDMA_IRQ_LINE: u32 = 12;
/// Name this service registers under (§6).
pub const SERVICE_NAME: &str = "sdma";
/// Max channel FIFO depth, engine-wide (bring-up GCR programming).
pub const GCR_MAX_FIFO_DEPTH: u32 = 255;
/// 1:1 channel arbitration rate, engine-wide (bring-up GCR programming).
pub const GCR_ARBITRATION_1_1: u32 = 0;

ringbuf::ringbuf!(Trace, 64, Trace::None);
counters::counters!(RESPONSE_CODES, ResponseCode);

#[derive(Copy, Clone, PartialEq)]
pub enum Trace {
    None,
    BringUp { revision: u32 },
    Dispatch { opcode: u32, code: u32 },
    UnknownOpcode { opcode: u32 },
    IrqLineStatus { mask: u32 },
    ChannelError { chan: u8, code: u32 },
    BlockComplete { chan: u8 },
    MemsetStep { chan: u8, done_before: u32, done_after: u32 },
}

/// Maps a single channel's `CSR` snapshot to the classification the
/// interrupt handler contract names (§4.4 step 3).
fn classify_csr(csr: crate::regs::Csr) -> Option<ResponseCode> {
    if csr.misaligned_adrs_err() {
        Some(ResponseCode::Misaligned)
    } else if csr.supervisor_err() {
        Some(ResponseCode::Supervisor)
    } else if csr.trans_err() {
        Some(ResponseCode::Transfer)
    } else {
        None
    }
}

/// The driver singleton (§3 "Driver"): owns the register handle, the
/// channel-slot array, and the fixed-capacity client-session table.
pub struct Driver<R: DeviceRegisters> {
    pub regs: R,
    pub channels: ChannelProgrammer<N_CHANNELS>,
    sessions: [Option<Session>; MAX_SESSIONS],
}

impl<R: DeviceRegisters> Driver<R> {
    /// Bring-up (`SPEC_FULL.md` "Bring-up sequence", steps 2-4 -- mapping,
    /// name-service registration, and interrupt-line registration are the
    /// caller's job via `sdma_sys::env`, since they are out-of-process
    /// collaborators the register handle itself knows nothing about).
    pub fn new(regs: R) -> Self {
        let revision = regs.revision();
        ringbuf_entry!(Trace::BringUp { revision });

        let mut gcr = Gcr(0);
        gcr.set_max_channel_fifo_depth(GCR_MAX_FIFO_DEPTH);
        gcr.set_arbitration_rate(GCR_ARBITRATION_1_1);
        regs.write_gcr(gcr);

        for chan in 0..N_CHANNELS as u8 {
            let mut cicr = Cicr(0);
            cicr.set_block_ie(true);
            cicr.set_trans_err_ie(true);
            cicr.set_supervisor_err_ie(true);
            cicr.set_misaligned_err_ie(true);
            regs.write_cicr(chan, cicr);
        }
        regs.clear_irq_line0();
        regs.enable_irq_line0(0xFFFF_FFFF);

        Driver {
            regs,
            channels: ChannelProgrammer::new(),
            sessions: [(); MAX_SESSIONS].map(|_| None),
        }
    }

    /// Looks a session up by endpoint identity. Takes the session table by
    /// reference rather than `&mut self` so callers can borrow `self.regs`
    /// / `self.channels` at the same time (see `dispatch`).
    fn find_session(
        sessions: &mut [Option<Session>; MAX_SESSIONS],
        remote: Endpoint,
    ) -> Option<&mut Session> {
        sessions.iter_mut().flatten().find(|s| s.remote == remote)
    }

    fn insert_session(&mut self, session: Session) -> Result<(), ResponseCode> {
        for slot in self.sessions.iter_mut() {
            if slot.is_none() {
                *slot = Some(session);
                return Ok(());
            }
        }
        Err(ResponseCode::NoAvailChannel)
    }

    /// `handshake` (§4.3). A duplicate handshake on an already-known
    /// endpoint is silently ignored per §4.3/§7; a logged, not-replied-to,
    /// non-error.
    pub fn handshake(&mut self, remote: Endpoint) -> Option<()> {
        if Self::find_session(&mut self.sessions, remote).is_some() {
            ringbuf_entry!(Trace::Dispatch { opcode: Opcode::Handshake as u32, code: u32::MAX });
            return None;
        }

        let (cap, ptr, scratch_bytes) = env::frame_alloc(MEMSET_SIZE).ok()?;
        let identity = env::frame_identify(cap).ok()?;
        let scratch = FrameId { base: identity.base, bytes: scratch_bytes.max(MEMSET_SIZE) };
        let session = Session::new(remote, scratch, ptr);
        self.insert_session(session).ok()?;
        Some(())
    }

    /// Dispatches one fully-decoded inbound message (§4.4 "Dispatcher state
    /// machine"), returning the two-word reply to send, if any.
    pub fn dispatch(
        &mut self,
        remote: Endpoint,
        opcode: Opcode,
        words: [u32; 4],
        frame: Option<FrameId>,
    ) -> Option<[u32; 2]> {
        let code = match opcode {
            Opcode::Handshake => {
                self.handshake(remote);
                return None;
            }
            Opcode::MemcpySrc => {
                let session = Self::find_session(&mut self.sessions, remote)?;
                session.submit_memcpy_half(
                    &mut self.channels,
                    &self.regs,
                    Half::Src,
                    frame?,
                    words[1],
                    Some(words[2]),
                )
            }
            Opcode::MemcpyDst => {
                let session = Self::find_session(&mut self.sessions, remote)?;
                session.submit_memcpy_half(
                    &mut self.channels,
                    &self.regs,
                    Half::Dst,
                    frame?,
                    words[1],
                    None,
                )
            }
            Opcode::Memset => {
                let session = Self::find_session(&mut self.sessions, remote)?;
                Some(session.submit_memset(
                    &mut self.channels,
                    &self.regs,
                    frame?,
                    words[1],
                    words[2],
                    words[3] as u8,
                ))
            }
            Opcode::RotateSrc => {
                let session = Self::find_session(&mut self.sessions, remote)?;
                session.submit_rotate_half(
                    &mut self.channels,
                    &self.regs,
                    Half::Src,
                    frame?,
                    words[1],
                    Some(words[2]),
                    Some(words[3]),
                )
            }
            Opcode::RotateDst => {
                let session = Self::find_session(&mut self.sessions, remote)?;
                session.submit_rotate_half(
                    &mut self.channels,
                    &self.regs,
                    Half::Dst,
                    frame?,
                    words[1],
                    None,
                    None,
                )
            }
        }?;

        ringbuf_entry!(Trace::Dispatch { opcode: opcode as u32, code: code as u32 });
        counters::count!(RESPONSE_CODES, code);
        Some(code.to_reply_words())
    }

    /// Decodes an inbound message's opcode; unknown opcodes are a protocol
    /// error, logged and dropped (§7), never replied to.
    pub fn decode(&self, msg: &RecvMessage) -> Option<Opcode> {
        match Opcode::from_u32(msg.words[0]) {
            Some(op) => Some(op),
            None => {
                ringbuf_entry!(Trace::UnknownOpcode { opcode: msg.words[0] });
                None
            }
        }
    }

    /// Resolves an inbound message's capability, if any, to a `FrameId`.
    /// `Handshake` resolves its capability as an `Endpoint` instead, via
    /// `identify_endpoint`, handled by the caller before calling `dispatch`.
    pub fn resolve_frame(&self, cap: Cap) -> Result<FrameId, CapError> {
        env::frame_identify(cap)
    }

    /// Interrupt handler (§4.4 "Interrupt handler contract"). Returns the
    /// list of `(remote, reply)` pairs ready to send, for each session the
    /// completion path finished or errored this invocation.
    pub fn handle_interrupt(&mut self) -> heapless_replies::Replies {
        let mask = self.regs.read_irq_line0();
        ringbuf_entry!(Trace::IrqLineStatus { mask });
        self.regs.clear_irq_line0();

        let mut replies = heapless_replies::Replies::new();

        for chan in 0..N_CHANNELS as u8 {
            if mask & (1 << chan) == 0 {
                continue;
            }
            let csr = self.regs.read_csr(chan);
            self.regs.write_csr(chan, 0);

            let error = classify_csr(csr);
            let block_complete = csr.block();
            let owner = self.owner_of(chan);

            if let Some(code) = error {
                ringbuf_entry!(Trace::ChannelError { chan, code: code as u32 });
                self.channels.release(chan);
                if let Some(remote) = owner {
                    self.complete_session(remote, code, &mut replies);
                }
                continue;
            }

            if !block_complete {
                continue;
            }
            ringbuf_entry!(Trace::BlockComplete { chan });

            let remote = match owner {
                Some(r) => r,
                None => continue,
            };
            self.channels.release(chan);

            let is_memset_continuing = {
                let session = Self::find_session(&mut self.sessions, remote);
                matches!(session.map(|s| s.op), Some(OpKind::Memset))
            };

            if is_memset_continuing {
                self.step_memset(remote, chan, &mut replies);
            } else {
                self.complete_session(remote, ResponseCode::Ok, &mut replies);
            }
        }

        replies
    }

    fn owner_of(&self, chan: u8) -> Option<Endpoint> {
        self.channels.slot(chan).owner
    }

    fn step_memset(&mut self, remote: Endpoint, _chan: u8, replies: &mut heapless_replies::Replies) {
        let done_before = match Self::find_session(&mut self.sessions, remote) {
            Some(s) => s.memset_done,
            None => return,
        };

        let step = {
            let regs = &self.regs;
            let channels = &mut self.channels;
            match self.sessions.iter_mut().flatten().find(|s| s.remote == remote) {
                Some(session) => session.continue_memset(channels, regs),
                None => return,
            }
        };

        match step {
            Some(Ok(_cpy_len)) => {
                let done_after = Self::find_session(&mut self.sessions, remote).map(|s| s.memset_done).unwrap_or(0);
                ringbuf_entry!(Trace::MemsetStep { chan: _chan, done_before, done_after });
            }
            Some(Err(code)) => self.complete_session(remote, code, replies),
            None => self.complete_session(remote, ResponseCode::Ok, replies),
        }
    }

    fn complete_session(
        &mut self,
        remote: Endpoint,
        code: ResponseCode,
        replies: &mut heapless_replies::Replies,
    ) {
        if let Some(session) = Self::find_session(&mut self.sessions, remote) {
            if !session.acked {
                session.acked = true;
                counters::count!(RESPONSE_CODES, code);
                replies.push(remote, code.to_reply_words());
            }
            session.finish();
        }
    }
}

/// A tiny fixed-capacity reply queue, avoiding a heap allocation for the
/// (at most `N_CHANNELS`) replies a single interrupt invocation can produce.
pub mod heapless_replies {
    use super::{Endpoint, N_CHANNELS};

    pub struct Replies {
        items: [Option<(Endpoint, [u32; 2])>; N_CHANNELS],
        len: usize,
    }

    impl Replies {
        pub fn new() -> Self {
            Replies { items: [None; N_CHANNELS], len: 0 }
        }

        pub fn push(&mut self, remote: Endpoint, words: [u32; 2]) {
            if self.len < N_CHANNELS {
                self.items[self.len] = Some((remote, words));
                self.len += 1;
            }
        }

        pub fn iter(&self) -> impl Iterator<Item = &(Endpoint, [u32; 2])> {
            self.items[..self.len].iter().filter_map(|x| x.as_ref())
        }
    }
}

/// Bring-up failures abort the service (§7 "Setup errors ... fatal").
pub fn bring_up_or_abort<R: DeviceRegisters>(
    phys_base: u32,
    mmio_size: u32,
    map: impl FnOnce(u32) -> R,
) -> Driver<R> {
    let virt_base = env::map_device_register(phys_base, mmio_size)
        .unwrap_or_else(|e: BringUpError| panic!("sdma bring-up: {}", e.0));
    let regs = map(virt_base);
    let driver = Driver::new(regs);

    env::inthandler_setup(SDMA_IRQ_LINE)
        .unwrap_or_else(|e| panic!("sdma bring-up: {}", e.0));
    env::register_service(SERVICE_NAME).unwrap_or_else(|e| panic!("sdma bring-up: {}", e.0));

    driver
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::mock::MockRegisters;

    fn ep(n: u32) -> Endpoint {
        Endpoint { listener: 1, epoffset: n }
    }

    fn frame(base: u32, bytes: u32) -> FrameId {
        FrameId { base, bytes }
    }

    fn new_driver() -> Driver<MockRegisters> {
        Driver::new(MockRegisters::default())
    }

    #[test]
    fn handshake_then_duplicate_is_ignored() {
        let mut d = new_driver();
        assert!(d.handshake(ep(1)).is_some());
        assert!(d.handshake(ep(1)).is_none());
        assert_eq!(d.sessions.iter().flatten().count(), 1);
    }

    #[test]
    fn memcpy_dispatch_produces_ok_reply() {
        let mut d = new_driver();
        d.handshake(ep(1)).unwrap();

        let r1 = d.dispatch(
            ep(1),
            Opcode::MemcpySrc,
            [Opcode::MemcpySrc as u32, 0, 4096, 0],
            Some(frame(0x1000, 4096)),
        );
        assert!(r1.is_none());

        let r2 = d.dispatch(
            ep(1),
            Opcode::MemcpyDst,
            [Opcode::MemcpyDst as u32, 0, 0, 0],
            Some(frame(0x2000, 4096)),
        );
        assert_eq!(r2, Some(ResponseCode::Ok.to_reply_words()));
    }

    #[test]
    fn unknown_opcode_is_dropped() {
        let d = new_driver();
        let msg = RecvMessage { words: [99, 0, 0, 0], cap: None };
        assert!(d.decode(&msg).is_none());
    }

    #[test]
    fn block_complete_interrupt_releases_channel_and_replies() {
        let mut d = new_driver();
        d.handshake(ep(1)).unwrap();
        d.dispatch(
            ep(1),
            Opcode::MemcpySrc,
            [Opcode::MemcpySrc as u32, 0, 4096, 0],
            Some(frame(0x1000, 4096)),
        );
        let reply = d.dispatch(
            ep(1),
            Opcode::MemcpyDst,
            [Opcode::MemcpyDst as u32, 0, 0, 0],
            Some(frame(0x2000, 4096)),
        );
        assert_eq!(reply, Some(ResponseCode::Ok.to_reply_words()));

        let chan = Driver::find_session(&mut d.sessions, ep(1)).unwrap().channel.unwrap();
        assert!(d.channels.slot(chan).in_use);

        // Simulate the hardware raising block-complete on this channel.
        let mut csr = crate::regs::Csr(0);
        csr.set_block(true);
        d.regs.set_csr(chan, csr);
        d.regs.set_irq_line0(1 << chan);

        let replies = d.handle_interrupt();
        let delivered: Vec<_> = replies.iter().collect();
        assert_eq!(delivered, vec![&(ep(1), ResponseCode::Ok.to_reply_words())]);
        assert!(!d.channels.slot(chan).in_use);
    }

    #[test]
    fn channel_error_completes_session_without_requiring_block_complete() {
        let mut d = new_driver();
        d.handshake(ep(1)).unwrap();
        d.dispatch(
            ep(1),
            Opcode::MemcpySrc,
            [Opcode::MemcpySrc as u32, 0, 4096, 0],
            Some(frame(0x1000, 4096)),
        );
        d.dispatch(
            ep(1),
            Opcode::MemcpyDst,
            [Opcode::MemcpyDst as u32, 0, 0, 0],
            Some(frame(0x2000, 4096)),
        );
        let chan = Driver::find_session(&mut d.sessions, ep(1)).unwrap().channel.unwrap();

        let mut csr = crate::regs::Csr(0);
        csr.set_trans_err(true);
        d.regs.set_csr(chan, csr);
        d.regs.set_irq_line0(1 << chan);

        let replies = d.handle_interrupt();
        let delivered: Vec<_> = replies.iter().collect();
        assert_eq!(
            delivered,
            vec![&(ep(1), ResponseCode::Transfer.to_reply_words())]
        );
        assert!(!d.channels.slot(chan).in_use);
    }

    #[test]
    fn large_memset_completes_via_continuation() {
        let mut d = new_driver();
        d.handshake(ep(1)).unwrap();

        let reply = d.dispatch(
            ep(1),
            Opcode::Memset,
            [Opcode::Memset as u32, 0, 1 << 20, 0xAB],
            Some(frame(0x5000_0000, 1 << 20)),
        );
        assert_eq!(reply, Some(ResponseCode::Ok.to_reply_words()));

        let mut completed = false;
        for _ in 0..64 {
            let chan = match Driver::find_session(&mut d.sessions, ep(1)).and_then(|s| s.channel) {
                Some(c) => c,
                None => break,
            };
            let mut csr = crate::regs::Csr(0);
            csr.set_block(true);
            d.regs.set_csr(chan, csr);
            d.regs.set_irq_line0(1 << chan);

            let replies = d.handle_interrupt();
            if let Some((_, words)) = replies.iter().next() {
                assert_eq!(*words, ResponseCode::Ok.to_reply_words());
                completed = true;
                break;
            }
        }
        assert!(completed, "memset continuation never produced a completion reply");
    }
}
