// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SDMA driver task: device registers (C1), the channel programmer
//! (C2), the per-client session assembler (C3), and RPC dispatch plus
//! interrupt-driven completion (C4).
//!
//! `no_std` on target, plain `std` under `cargo test` on the host -- see
//! `SPEC_FULL.md`'s "Test tooling" section. Every module except `main`'s
//! cooperative loop is pure logic and is exercised directly by unit tests
//! against [`regs::mock::MockRegisters`].

#![cfg_attr(target_os = "none", no_std)]

pub mod channel_programmer;
pub mod driver;
pub mod regs;
pub mod session;

pub use driver::Driver;
