// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task entry point: bring-up (`SPEC_FULL.md` "Bring-up sequence"), then the
//! single-threaded cooperative dispatch loop (§5) over `sdma_sys::env`'s
//! wait-set primitives.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

use drv_sdma_server::driver::{self, Driver};
use drv_sdma_server::regs::Mmio;
use sdma_sys::env::{self, Event};
use sdma_sys::{Cap, CapError, Endpoint, FrameId};

/// Physical base address of the SDMA4 register block. Representative of the
/// OMAP44xx memory map (TRM §16.5), not load-bearing for anything this
/// driver checks.
const SDMA_PHYS_BASE: u32 = 0x4805_6000;
const SDMA_MMIO_SIZE: u32 = 0x1000;

/// The well-known pre-handshake listening endpoint clients send their first
/// `HANDSHAKE` message to.
const LISTEN_EP: Endpoint = Endpoint { listener: 0, epoffset: 0 };

fn main() {
    let mut driver = driver::bring_up_or_abort(SDMA_PHYS_BASE, SDMA_MMIO_SIZE, |virt_base| {
        // SAFETY: `virt_base` was just established by `map_device_register`
        // to be a valid, exclusively-owned mapping of the whole SDMA4
        // register window, which stays mapped for the task's lifetime.
        unsafe { Mmio::new(virt_base as *mut u8) }
    });

    env::recv_slot_alloc().unwrap_or_else(|e| panic!("sdma bring-up: {}", e.0));
    env::register_recv(LISTEN_EP);

    loop {
        match env::event_dispatch() {
            Event::Recv(remote) => handle_recv(&mut driver, remote),
            Event::Interrupt => handle_interrupt(&mut driver),
            Event::SendComplete(_) => {}
        }
    }
}

/// One iteration of the dispatcher state machine (§4.4): fetch the message
/// the wait-set woke us for, reallocate the receive slot, re-register the
/// receive handler, decode, dispatch, and (if a reply was produced)
/// register the send handler.
fn handle_recv<R: drv_sdma_server::regs::DeviceRegisters>(driver: &mut Driver<R>, remote: Endpoint) {
    let Some(msg) = env::try_recv(remote) else {
        return;
    };

    // Re-arm before doing any of the (possibly slow) dispatch work, so a
    // burst of messages from other clients isn't starved by this one (§4.4).
    env::recv_slot_alloc().ok();
    env::register_recv(LISTEN_EP);

    let Some(opcode) = driver.decode(&msg) else {
        return;
    };

    // `Handshake`'s capability names the client's own reply endpoint, not a
    // frame; everything else carries an optional frame capability.
    let frame: Option<FrameId> = match (opcode, msg.cap) {
        (drv_sdma_api::Opcode::Handshake, _) => None,
        (_, Some(cap)) => match driver.resolve_frame(cap) {
            Ok(f) => Some(f),
            Err(CapError) => return,
        },
        (_, None) => None,
    };

    let reply = driver.dispatch(remote, opcode, msg.words, frame);

    if let Some(words) = reply {
        env::register_send(remote, [words[0], words[1], 0, 0], None::<Cap>);
    }
}

fn handle_interrupt<R: drv_sdma_server::regs::DeviceRegisters>(driver: &mut Driver<R>) {
    let replies = driver.handle_interrupt();
    for (remote, words) in replies.iter() {
        let payload = [words[0], words[1], 0, 0];
        env::register_send(*remote, payload, None::<Cap>);
    }
}
