// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device register layer (C1).
//!
//! A thin typed wrapper over the SDMA's MMIO block: every register the
//! programmer (`channel_programmer.rs`) touches gets a field-level read, a
//! field-level insert (a pure function from an old word to a new word with
//! one field replaced), and a full-word write. Every read/write is volatile;
//! reserved bits are preserved by reading-modifying-writing through the
//! bitfield wrapper rather than constructing a word from scratch.
//!
//! [`DeviceRegisters`] is implemented twice: [`Mmio`] does real volatile
//! loads/stores against a mapped device window, and `MockRegisters` (in
//! `tests`) is a plain in-memory model used to unit test the channel
//! programmer without hardware. Field offsets below are representative of
//! the OMAP44xx SDMA4 block (TRM §16.5); this driver does not depend on
//! their exact bit positions being correct for any other purpose than
//! internal consistency between read/modify/write.

use bitfield::bitfield;

bitfield! {
    /// `DMA4_GCR`: engine-wide configuration, programmed once at bring-up.
    #[derive(Copy, Clone)]
    pub struct Gcr(u32);
    impl Debug;
    pub arbitration_rate, set_arbitration_rate: 9, 8;
    pub max_channel_fifo_depth, set_max_channel_fifo_depth: 7, 0;
}

bitfield! {
    /// `DMA4_CICR`: per-channel interrupt source enables.
    #[derive(Copy, Clone)]
    pub struct Cicr(u32);
    impl Debug;
    pub block_ie, set_block_ie: 5;
    pub trans_err_ie, set_trans_err_ie: 8;
    pub supervisor_err_ie, set_supervisor_err_ie: 10;
    pub misaligned_err_ie, set_misaligned_err_ie: 11;
}

bitfield! {
    /// `DMA4_CSDP`: per-channel source/destination data-path configuration.
    #[derive(Copy, Clone)]
    pub struct Csdp(u32);
    impl Debug;
    pub data_type, set_data_type: 1, 0;
    pub src_burst_en, set_src_burst_en: 8, 7;
    pub src_packed, set_src_packed: 6;
    pub dst_burst_en, set_dst_burst_en: 15, 14;
    pub dst_packed, set_dst_packed: 13;
    pub dst_endian, set_dst_endian: 19;
    pub src_endian, set_src_endian: 21;
    pub write_mode, set_write_mode: 17, 16;
}

bitfield! {
    /// `DMA4_CCR`: per-channel control register (addressing modes, priority,
    /// synchronization, and the channel enable bit).
    #[derive(Copy, Clone)]
    pub struct Ccr(u32);
    impl Debug;
    pub enable, set_enable: 7;
    pub read_priority, set_read_priority: 6;
    pub src_amode, set_src_amode: 13, 12;
    pub dst_amode, set_dst_amode: 15, 14;
    pub write_priority, set_write_priority: 23;
    pub synchro_control, set_synchro_control: 4, 0;
    pub synchro_control_upper, set_synchro_control_upper: 25, 24;
}

bitfield! {
    /// `DMA4_CSR`: per-channel status register; read-to-snapshot, cleared
    /// by writing `0` (`SDMA_REGISTER_CLEAN`), not by writing the read bits
    /// back.
    #[derive(Copy, Clone)]
    pub struct Csr(u32);
    impl Debug;
    pub block, set_block: 5;
    pub trans_err, set_trans_err: 8;
    pub supervisor_err, set_supervisor_err: 10;
    pub misaligned_adrs_err, set_misaligned_adrs_err: 4;
}

bitfield! {
    /// `DMA4_CSEI`: source element index (element-to-element stride).
    #[derive(Copy, Clone)]
    pub struct Csei(u32);
    impl Debug;
    pub channel_src_elmnt_index, set_channel_src_elmnt_index: 15, 0;
}

bitfield! {
    /// `DMA4_CDEI`: destination element index.
    #[derive(Copy, Clone)]
    pub struct Cdei(u32);
    impl Debug;
    pub channel_dst_elmnt_index, set_channel_dst_elmnt_index: 15, 0;
}

/// `CSDP.DATA_TYPE`: 32-bit element.
pub const DATA_TYPE_32BIT: u32 = 0b10;
/// `CSDP.{SRC,DST}_BURST_EN`: 64-byte burst.
pub const BURST_EN_64BYTE: u32 = 0b11;
/// `CSDP.{SRC,DST}_ENDIAN`: little-endian.
pub const ENDIAN_LITTLE: u32 = 0;
/// `CSDP.WRITE_MODE`: last non-posted write.
pub const WRITE_MODE_LAST_NON_POSTED: u32 = 0b01;
/// `CSDP.{SRC,DST}_PACKED`: packed.
pub const PACKED_ENABLE: bool = true;
/// `CCR.{SRC,DST}_AMODE`: post-increment addressing.
pub const ADDR_MODE_POST_INCR: u32 = 0b01;
/// `CCR.{SRC,DST}_AMODE`: double-index addressing (used by rotate).
pub const ADDR_MODE_DOUBLE_IDX: u32 = 0b11;
/// `CCR.{READ,WRITE}_PRIORITY`: low priority.
pub const PORT_PRIORITY_LOW: bool = false;

/// Elements per frame for a linear transfer (§4.2).
pub const ELEMENTS_PER_FRAME: u32 = 128;
/// Element size in bytes: one 32-bit element (§4.2).
pub const ELEMENT_SIZE_BYTES: u32 = 4;

/// The field-level device register layer (C1).
///
/// Every method here is either a pure field read, a pure field insert
/// (taking and returning a bitfield value, touching no hardware), or a
/// full-word volatile write/read against one channel's register file.
/// Concurrency: this layer assumes single-threaded, serialized access, per
/// §5 -- there is no locking here because the cooperative event loop is the
/// only caller.
pub trait DeviceRegisters {
    fn revision(&self) -> u32;

    fn write_gcr(&self, gcr: Gcr);

    fn write_cicr(&self, chan: u8, cicr: Cicr);

    fn enable_irq_line0(&self, mask: u32);
    fn clear_irq_line0(&self);
    fn read_irq_line0(&self) -> u32;

    fn read_csdp(&self, chan: u8) -> Csdp;
    fn write_csdp(&self, chan: u8, v: Csdp);

    fn write_cen(&self, chan: u8, v: u32);
    fn write_cfn(&self, chan: u8, v: u32);

    fn write_cssa(&self, chan: u8, v: u32);
    fn write_cdsa(&self, chan: u8, v: u32);

    fn read_ccr(&self, chan: u8) -> Ccr;
    fn write_ccr(&self, chan: u8, v: Ccr);

    fn read_csei(&self, chan: u8) -> Csei;
    fn write_csei(&self, chan: u8, v: Csei);
    fn write_csfi(&self, chan: u8, v: i32);

    fn read_cdei(&self, chan: u8) -> Cdei;
    fn write_cdei(&self, chan: u8, v: Cdei);
    fn write_cdfi(&self, chan: u8, v: i32);

    fn read_csr(&self, chan: u8) -> Csr;
    fn write_csr(&self, chan: u8, v: u32);
}

/// Byte offsets into the per-line and engine-wide register block.
mod offset {
    pub const REVISION: usize = 0x00;
    pub const IRQSTATUS_L0: usize = 0x08;
    pub const IRQENABLE_L0: usize = 0x18;
    pub const GCR: usize = 0x78;
    pub const CHANNEL_BASE: usize = 0x80;
    pub const CHANNEL_STRIDE: usize = 0x60;

    pub const CSDP: usize = 0xC;
    pub const CCR: usize = 0x10;
    pub const CICR: usize = 0x14;
    pub const CSR: usize = 0x18;
    pub const CEN: usize = 0x34;
    pub const CFN: usize = 0x38;
    pub const CSSA: usize = 0x3C;
    pub const CDSA: usize = 0x40;
    pub const CSEI: usize = 0x44;
    pub const CSFI: usize = 0x48;
    pub const CDEI: usize = 0x4C;
    pub const CDFI: usize = 0x50;

    pub const fn channel(reg: usize, chan: u8) -> usize {
        CHANNEL_BASE + chan as usize * CHANNEL_STRIDE + reg
    }
}

/// Real MMIO implementation of [`DeviceRegisters`], mapped once at bring-up
/// by `map_device_register` (out of scope; see `sdma_sys::env`).
pub struct Mmio {
    base: *mut u8,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must be a valid, exclusively-owned mapping of the SDMA MMIO
    /// window, large enough to cover every channel this driver addresses,
    /// and must remain mapped for the lifetime of this value.
    pub unsafe fn new(base: *mut u8) -> Self {
        Mmio { base }
    }

    #[inline]
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `offset` is always one of the `offset` module's constants
        // (or a channel-indexed variant of one), and `base` was established
        // by the caller of `Mmio::new` to cover the whole register file.
        unsafe { core::ptr::read_volatile(self.base.add(offset) as *const u32) }
    }

    #[inline]
    fn write(&self, offset: usize, value: u32) {
        // SAFETY: see `read`.
        unsafe {
            core::ptr::write_volatile(self.base.add(offset) as *mut u32, value)
        }
    }
}

impl DeviceRegisters for Mmio {
    fn revision(&self) -> u32 {
        self.read(offset::REVISION)
    }

    fn write_gcr(&self, gcr: Gcr) {
        self.write(offset::GCR, gcr.0)
    }

    fn write_cicr(&self, chan: u8, cicr: Cicr) {
        self.write(offset::channel(offset::CICR, chan), cicr.0)
    }

    fn enable_irq_line0(&self, mask: u32) {
        self.write(offset::IRQENABLE_L0, mask)
    }

    fn clear_irq_line0(&self) {
        self.write(offset::IRQSTATUS_L0, 0xFFFF_FFFF)
    }

    fn read_irq_line0(&self) -> u32 {
        self.read(offset::IRQSTATUS_L0)
    }

    fn read_csdp(&self, chan: u8) -> Csdp {
        Csdp(self.read(offset::channel(offset::CSDP, chan)))
    }

    fn write_csdp(&self, chan: u8, v: Csdp) {
        self.write(offset::channel(offset::CSDP, chan), v.0)
    }

    fn write_cen(&self, chan: u8, v: u32) {
        self.write(offset::channel(offset::CEN, chan), v)
    }

    fn write_cfn(&self, chan: u8, v: u32) {
        self.write(offset::channel(offset::CFN, chan), v)
    }

    fn write_cssa(&self, chan: u8, v: u32) {
        self.write(offset::channel(offset::CSSA, chan), v)
    }

    fn write_cdsa(&self, chan: u8, v: u32) {
        self.write(offset::channel(offset::CDSA, chan), v)
    }

    fn read_ccr(&self, chan: u8) -> Ccr {
        Ccr(self.read(offset::channel(offset::CCR, chan)))
    }

    fn write_ccr(&self, chan: u8, v: Ccr) {
        self.write(offset::channel(offset::CCR, chan), v.0)
    }

    fn read_csei(&self, chan: u8) -> Csei {
        Csei(self.read(offset::channel(offset::CSEI, chan)))
    }

    fn write_csei(&self, chan: u8, v: Csei) {
        self.write(offset::channel(offset::CSEI, chan), v.0)
    }

    fn write_csfi(&self, chan: u8, v: i32) {
        self.write(offset::channel(offset::CSFI, chan), v as u32)
    }

    fn read_cdei(&self, chan: u8) -> Cdei {
        Cdei(self.read(offset::channel(offset::CDEI, chan)))
    }

    fn write_cdei(&self, chan: u8, v: Cdei) {
        self.write(offset::channel(offset::CDEI, chan), v.0)
    }

    fn write_cdfi(&self, chan: u8, v: i32) {
        self.write(offset::channel(offset::CDFI, chan), v as u32)
    }

    fn read_csr(&self, chan: u8) -> Csr {
        Csr(self.read(offset::channel(offset::CSR, chan)))
    }

    fn write_csr(&self, chan: u8, v: u32) {
        self.write(offset::channel(offset::CSR, chan), v)
    }
}

#[cfg(test)]
pub mod mock {
    //! An in-memory model of the register file, for testing the channel
    //! programmer (C2) and the interrupt/completion path (C4) without real
    //! hardware.

    use super::*;
    use core::cell::RefCell;

    pub struct MockRegisters {
        words: RefCell<std::collections::HashMap<usize, u32>>,
    }

    impl Default for MockRegisters {
        fn default() -> Self {
            MockRegisters {
                words: RefCell::new(std::collections::HashMap::new()),
            }
        }
    }

    impl MockRegisters {
        fn read(&self, offset: usize) -> u32 {
            *self.words.borrow().get(&offset).unwrap_or(&0)
        }

        fn write(&self, offset: usize, v: u32) {
            self.words.borrow_mut().insert(offset, v);
        }

        /// Test helper: directly set a channel's `CSR`, as the engine would
        /// on real hardware when a transfer completes or faults.
        pub fn set_csr(&self, chan: u8, csr: Csr) {
            self.write(offset::channel(offset::CSR, chan), csr.0);
        }

        /// Test helper: directly set the line-status register, as the
        /// engine would on real hardware when one or more channels raise
        /// their interrupt.
        pub fn set_irq_line0(&self, mask: u32) {
            self.write(offset::IRQSTATUS_L0, mask);
        }

        /// Test helper: read back whatever `CCR` was last programmed for
        /// `chan`, to assert on the fields the programmer set.
        pub fn ccr(&self, chan: u8) -> Ccr {
            self.read_ccr(chan)
        }

        pub fn csdp(&self, chan: u8) -> Csdp {
            self.read_csdp(chan)
        }

        pub fn cen(&self, chan: u8) -> u32 {
            self.read(offset::channel(offset::CEN, chan))
        }

        pub fn cfn(&self, chan: u8) -> u32 {
            self.read(offset::channel(offset::CFN, chan))
        }

        pub fn cssa(&self, chan: u8) -> u32 {
            self.read(offset::channel(offset::CSSA, chan))
        }

        pub fn cdsa(&self, chan: u8) -> u32 {
            self.read(offset::channel(offset::CDSA, chan))
        }
    }

    impl DeviceRegisters for MockRegisters {
        fn revision(&self) -> u32 {
            0x4010_0000
        }

        fn write_gcr(&self, gcr: Gcr) {
            self.write(offset::GCR, gcr.0)
        }

        fn write_cicr(&self, chan: u8, cicr: Cicr) {
            self.write(offset::channel(offset::CICR, chan), cicr.0)
        }

        fn enable_irq_line0(&self, mask: u32) {
            self.write(offset::IRQENABLE_L0, mask)
        }

        fn clear_irq_line0(&self) {
            self.write(offset::IRQSTATUS_L0, 0)
        }

        fn read_irq_line0(&self) -> u32 {
            self.read(offset::IRQSTATUS_L0)
        }

        fn read_csdp(&self, chan: u8) -> Csdp {
            Csdp(self.read(offset::channel(offset::CSDP, chan)))
        }

        fn write_csdp(&self, chan: u8, v: Csdp) {
            self.write(offset::channel(offset::CSDP, chan), v.0)
        }

        fn write_cen(&self, chan: u8, v: u32) {
            self.write(offset::channel(offset::CEN, chan), v)
        }

        fn write_cfn(&self, chan: u8, v: u32) {
            self.write(offset::channel(offset::CFN, chan), v)
        }

        fn write_cssa(&self, chan: u8, v: u32) {
            self.write(offset::channel(offset::CSSA, chan), v)
        }

        fn write_cdsa(&self, chan: u8, v: u32) {
            self.write(offset::channel(offset::CDSA, chan), v)
        }

        fn read_ccr(&self, chan: u8) -> Ccr {
            Ccr(self.read(offset::channel(offset::CCR, chan)))
        }

        fn write_ccr(&self, chan: u8, v: Ccr) {
            self.write(offset::channel(offset::CCR, chan), v.0)
        }

        fn read_csei(&self, chan: u8) -> Csei {
            Csei(self.read(offset::channel(offset::CSEI, chan)))
        }

        fn write_csei(&self, chan: u8, v: Csei) {
            self.write(offset::channel(offset::CSEI, chan), v.0)
        }

        fn write_csfi(&self, chan: u8, v: i32) {
            self.write(offset::channel(offset::CSFI, chan), v as u32)
        }

        fn read_cdei(&self, chan: u8) -> Cdei {
            Cdei(self.read(offset::channel(offset::CDEI, chan)))
        }

        fn write_cdei(&self, chan: u8, v: Cdei) {
            self.write(offset::channel(offset::CDEI, chan), v.0)
        }

        fn write_cdfi(&self, chan: u8, v: i32) {
            self.write(offset::channel(offset::CDFI, chan), v as u32)
        }

        fn read_csr(&self, chan: u8) -> Csr {
            Csr(self.read(offset::channel(offset::CSR, chan)))
        }

        fn write_csr(&self, chan: u8, v: u32) {
            self.write(offset::channel(offset::CSR, chan), v)
        }
    }
}
