// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Channel programmer (C2): translate a logical `{op, src, dst, shape}` into
//! a concrete SDMA register configuration and start the transfer.
//!
//! Channel selection is a linear scan over a fixed slot array (§3, §4.2) --
//! no load balancing, no queueing beyond the hardware channel count. A slot
//! is marked `in_use` and linked to its owning session *before* the engine
//! is enabled, so the interrupt handler can always resolve which session a
//! completing channel belongs to.

use crate::regs::{
    self, Ccr, Cdei, Csdp, Csei, DeviceRegisters, ADDR_MODE_DOUBLE_IDX, ADDR_MODE_POST_INCR,
    BURST_EN_64BYTE, DATA_TYPE_32BIT, ELEMENT_SIZE_BYTES, ENDIAN_LITTLE, PACKED_ENABLE,
    PORT_PRIORITY_LOW, WRITE_MODE_LAST_NON_POSTED,
};
use drv_sdma_api::ResponseCode;
use ringbuf::ringbuf_entry;
use sdma_sys::Endpoint;

ringbuf::ringbuf!(
    Trace,
    64,
    Trace::None
);

#[derive(Copy, Clone, PartialEq)]
pub enum Trace {
    None,
    StartLinear { chan: u8, src: u32, dst: u32, len: u32 },
    StartRotate { chan: u8, src: u32, dst: u32, width: u32, height: u32 },
    NoAvailChannel,
    Release { chan: u8 },
}

/// One hardware channel's soft-state (§3 "Channel slot").
#[derive(Copy, Clone, Default)]
pub struct ChannelSlot {
    pub in_use: bool,
    /// Weak reference to the owning session -- the session, not the slot,
    /// is the owner; this field exists only so the interrupt handler can
    /// look the session back up by identity.
    pub owner: Option<Endpoint>,
}

/// The fixed channel-slot array plus the free-scan allocator and the two
/// transfer-programming operations of §4.2.
pub struct ChannelProgrammer<const N: usize> {
    slots: [ChannelSlot; N],
}

impl<const N: usize> ChannelProgrammer<N> {
    pub fn new() -> Self {
        ChannelProgrammer {
            slots: [ChannelSlot { in_use: false, owner: None }; N],
        }
    }

    pub fn slot(&self, chan: u8) -> &ChannelSlot {
        &self.slots[chan as usize]
    }

    /// Releases a channel back to the free pool. Called by the interrupt
    /// handler on block-complete (§4.4 step 3).
    pub fn release(&mut self, chan: u8) {
        self.slots[chan as usize] = ChannelSlot { in_use: false, owner: None };
        ringbuf_entry!(Trace::Release { chan });
    }

    fn allocate(&mut self, owner: Endpoint) -> Result<u8, ResponseCode> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if !slot.in_use {
                slot.in_use = true;
                slot.owner = Some(owner);
                return Ok(i as u8);
            }
        }
        ringbuf_entry!(Trace::NoAvailChannel);
        Err(ResponseCode::NoAvailChannel)
    }

    /// Programs a linear element transfer, used directly by `memcpy` and as
    /// the primitive each `memset` sub-transfer reduces to. Field-level
    /// programming order follows §4.2 exactly.
    pub fn start_linear<R: DeviceRegisters>(
        &mut self,
        regs: &R,
        owner: Endpoint,
        src_phys: u32,
        dst_phys: u32,
        len: u32,
    ) -> Result<u8, ResponseCode> {
        let chan = self.allocate(owner)?;

        let mut csdp = Csdp(0);
        csdp.set_data_type(DATA_TYPE_32BIT);
        csdp.set_src_burst_en(BURST_EN_64BYTE);
        csdp.set_dst_burst_en(BURST_EN_64BYTE);
        csdp.set_src_endian(ENDIAN_LITTLE != 0);
        csdp.set_dst_endian(ENDIAN_LITTLE != 0);
        csdp.set_write_mode(WRITE_MODE_LAST_NON_POSTED);
        csdp.set_src_packed(PACKED_ENABLE);
        csdp.set_dst_packed(PACKED_ENABLE);
        regs.write_csdp(chan, csdp);

        let en = regs::ELEMENTS_PER_FRAME;
        let fn_ = div_ceil(len, ELEMENT_SIZE_BYTES * en);
        regs.write_cen(chan, en);
        regs.write_cfn(chan, fn_);

        regs.write_cssa(chan, src_phys);
        regs.write_cdsa(chan, dst_phys);

        let mut csei = Csei(0);
        csei.set_channel_src_elmnt_index(1);
        regs.write_csei(chan, csei);
        regs.write_csfi(chan, 1);

        let mut cdei = Cdei(0);
        cdei.set_channel_dst_elmnt_index(1);
        regs.write_cdei(chan, cdei);
        regs.write_cdfi(chan, 1);

        regs.write_csr(chan, 0);

        let mut ccr = Ccr(0);
        ccr.set_src_amode(ADDR_MODE_POST_INCR);
        ccr.set_dst_amode(ADDR_MODE_POST_INCR);
        ccr.set_read_priority(PORT_PRIORITY_LOW);
        ccr.set_write_priority(PORT_PRIORITY_LOW);
        ccr.set_synchro_control(0);
        ccr.set_enable(true);
        regs.write_ccr(chan, ccr);

        ringbuf_entry!(Trace::StartLinear { chan, src: src_phys, dst: dst_phys, len });
        Ok(chan)
    }

    /// Programs a 2-D transposing (90°) transfer. Same field set as
    /// `start_linear` save for the addressing mode and the destination
    /// index/address arithmetic of §4.2.
    pub fn start_rotate<R: DeviceRegisters>(
        &mut self,
        regs: &R,
        owner: Endpoint,
        src_phys: u32,
        dst_phys: u32,
        width: u32,
        height: u32,
    ) -> Result<u8, ResponseCode> {
        let chan = self.allocate(owner)?;

        let mut csdp = Csdp(0);
        csdp.set_data_type(DATA_TYPE_32BIT);
        csdp.set_src_burst_en(BURST_EN_64BYTE);
        csdp.set_dst_burst_en(BURST_EN_64BYTE);
        csdp.set_src_endian(ENDIAN_LITTLE != 0);
        csdp.set_dst_endian(ENDIAN_LITTLE != 0);
        csdp.set_write_mode(WRITE_MODE_LAST_NON_POSTED);
        csdp.set_src_packed(PACKED_ENABLE);
        csdp.set_dst_packed(PACKED_ENABLE);
        regs.write_csdp(chan, csdp);

        regs.write_cen(chan, width);
        regs.write_cfn(chan, height);

        let es = ELEMENT_SIZE_BYTES;
        let dst_start = dst_phys.wrapping_add((height - 1) * es);
        regs.write_cssa(chan, src_phys);
        regs.write_cdsa(chan, dst_start);

        let mut csei = Csei(0);
        csei.set_channel_src_elmnt_index(1);
        regs.write_csei(chan, csei);
        regs.write_csfi(chan, 1);

        let dst_elmnt_index = (height - 1) * es + 1;
        let dst_frame_index = 1i32.wrapping_sub((es as i32).wrapping_mul(
            ((width as i32 - 1) * height as i32) + 2,
        ));
        let mut cdei = Cdei(0);
        cdei.set_channel_dst_elmnt_index(dst_elmnt_index);
        regs.write_cdei(chan, cdei);
        regs.write_cdfi(chan, dst_frame_index);

        regs.write_csr(chan, 0);

        let mut ccr = Ccr(0);
        ccr.set_src_amode(ADDR_MODE_DOUBLE_IDX);
        ccr.set_dst_amode(ADDR_MODE_DOUBLE_IDX);
        ccr.set_read_priority(PORT_PRIORITY_LOW);
        ccr.set_write_priority(PORT_PRIORITY_LOW);
        ccr.set_synchro_control(0);
        ccr.set_enable(true);
        regs.write_ccr(chan, ccr);

        ringbuf_entry!(Trace::StartRotate { chan, src: src_phys, dst: dst_start, width, height });
        Ok(chan)
    }
}

fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::mock::MockRegisters;

    fn ep(n: u32) -> Endpoint {
        Endpoint { listener: 1, epoffset: n }
    }

    #[test]
    fn start_linear_programs_expected_fields() {
        let regs = MockRegisters::default();
        let mut prog: ChannelProgrammer<4> = ChannelProgrammer::new();

        let chan = prog.start_linear(&regs, ep(0), 0x8000_0000, 0x9000_0000, 4096).unwrap();

        assert_eq!(chan, 0);
        assert!(prog.slot(chan).in_use);
        assert_eq!(regs.cssa(chan), 0x8000_0000);
        assert_eq!(regs.cdsa(chan), 0x9000_0000);
        assert_eq!(regs.cen(chan), regs::ELEMENTS_PER_FRAME);
        assert_eq!(regs.cfn(chan), div_ceil(4096, 4 * regs::ELEMENTS_PER_FRAME));
        assert!(regs.ccr(chan).enable());
        assert_eq!(regs.ccr(chan).src_amode(), ADDR_MODE_POST_INCR);
        assert_eq!(regs.ccr(chan).dst_amode(), ADDR_MODE_POST_INCR);
    }

    #[test]
    fn allocate_fails_when_all_channels_busy() {
        let regs = MockRegisters::default();
        let mut prog: ChannelProgrammer<2> = ChannelProgrammer::new();

        prog.start_linear(&regs, ep(0), 0, 0x1000, 64).unwrap();
        prog.start_linear(&regs, ep(1), 0, 0x1000, 64).unwrap();

        let err = prog.start_linear(&regs, ep(2), 0, 0x1000, 64).unwrap_err();
        assert_eq!(err, ResponseCode::NoAvailChannel);
    }

    #[test]
    fn release_frees_the_slot_for_reuse() {
        let regs = MockRegisters::default();
        let mut prog: ChannelProgrammer<1> = ChannelProgrammer::new();

        let chan = prog.start_linear(&regs, ep(0), 0, 0x1000, 64).unwrap();
        assert!(prog.start_linear(&regs, ep(1), 0, 0x1000, 64).is_err());

        prog.release(chan);
        assert!(prog.start_linear(&regs, ep(1), 0, 0x1000, 64).is_ok());
    }

    #[test]
    fn start_rotate_uses_double_index_addressing() {
        let regs = MockRegisters::default();
        let mut prog: ChannelProgrammer<4> = ChannelProgrammer::new();

        let chan = prog
            .start_rotate(&regs, ep(0), 0x8000_0000, 0x9000_0000, 4, 4)
            .unwrap();

        assert_eq!(regs.ccr(chan).src_amode(), ADDR_MODE_DOUBLE_IDX);
        assert_eq!(regs.ccr(chan).dst_amode(), ADDR_MODE_DOUBLE_IDX);
        assert_eq!(regs.cen(chan), 4);
        assert_eq!(regs.cfn(chan), 4);
        // dst start offset by (height-1)*ES = 3*4 = 12
        assert_eq!(regs.cdsa(chan), 0x9000_0000 + 12);
    }
}
