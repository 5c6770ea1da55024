// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The cooperative message channel.
//!
//! The concurrency model (§5) is a single-threaded cooperative event loop
//! over a wait-set: every suspension point is an explicit, non-blocking poll
//! of a registered source, never a thread switch. [`Transport`] is the seam
//! at which that polling meets the environment's `register_recv` /
//! `register_send` / `recv_slot_alloc` primitives (out of scope per §1/§6);
//! [`Channel`] is the typed, owned wrapper a client session holds onto.

use crate::{Cap, Endpoint};

/// One inbound message: the four payload words of the wire format (§4.4)
/// plus at most one capability.
#[derive(Copy, Clone, Debug)]
pub struct RecvMessage {
    pub words: [u32; 4],
    pub cap: Option<Cap>,
}

/// The non-blocking send/receive primitive a [`Channel`] is built on.
///
/// A real implementation registers a receive/send handler with the
/// environment's wait-set and is driven by the cooperative loop's
/// `event_dispatch_non_block` poll; see `drv/sdma-server`'s dispatch loop.
pub trait Transport {
    /// Returns the next pending message, if the environment has one ready.
    /// Never blocks -- that is the cooperative loop's job, one layer up.
    fn try_recv(&mut self) -> Option<RecvMessage>;

    /// Queues `words` (and optionally `cap`) for delivery to the remote end.
    /// Per §5, nothing in this driver sends more than one reply per inbound
    /// message except the memset continuation, which defers its reply; see
    /// `drv/sdma-server`'s completion path.
    fn send(&mut self, words: &[u32], cap: Option<Cap>);
}

/// An established, bidirectional message channel to one client.
///
/// Owns its [`Transport`] plus the endpoint identities of both ends, mirroring
/// the "owned bidirectional message channel" field of the client-session data
/// model (§3).
pub struct Channel<T> {
    transport: T,
    pub local: Endpoint,
    pub remote: Endpoint,
}

impl<T: Transport> Channel<T> {
    pub fn new(transport: T, local: Endpoint, remote: Endpoint) -> Self {
        Channel {
            transport,
            local,
            remote,
        }
    }

    pub fn try_recv(&mut self) -> Option<RecvMessage> {
        self.transport.try_recv()
    }

    pub fn send(&mut self, words: &[u32], cap: Option<Cap>) {
        self.transport.send(words, cap)
    }
}

#[cfg(test)]
pub mod test_support {
    //! An in-memory [`Transport`] double, used only by host-side unit tests
    //! in this crate and in `drv/sdma-server`.

    use super::{RecvMessage, Transport};
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct MemTransport {
        inbound: VecDeque<RecvMessage>,
        pub outbound: Vec<(Vec<u32>, Option<crate::Cap>)>,
    }

    impl MemTransport {
        pub fn push(&mut self, msg: RecvMessage) {
            self.inbound.push_back(msg);
        }
    }

    impl Transport for MemTransport {
        fn try_recv(&mut self) -> Option<RecvMessage> {
            self.inbound.pop_front()
        }

        fn send(&mut self, words: &[u32], cap: Option<crate::Cap>) {
            self.outbound.push((words.to_vec(), cap));
        }
    }
}
