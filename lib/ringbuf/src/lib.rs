// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring buffer for debugging tasks and drivers.
//!
//! A static, fixed-size ring buffer designed for instrumenting arbitrary
//! contexts without a heap. Entries can be inspected post-hoc with a
//! debugger; they're the `no_std`, no-allocator replacement for sprinkling
//! `debug_printf` through a driver.
//!
//! This is a trimmed adaptation: it drops the upstream crate's derive-macro
//! entry counting and de-duplication-on-repeat features, keeping only the
//! fixed-capacity ring and the two entry-point macros (`ringbuf!`,
//! `ringbuf_entry!`) actually used by this driver. See `DESIGN.md`.
//!
//! ```ignore
//! ringbuf!(Option<ResponseCode>, 16, None);
//! ringbuf_entry!(Some(code));
//! ```

#![cfg_attr(target_os = "none", no_std)]

/// One recorded event: the source line it was recorded at and the payload.
#[derive(Copy, Clone, Debug)]
pub struct RingbufEntry<T> {
    pub line: u32,
    pub payload: T,
}

/// A fixed-capacity ring of the last `N` entries recorded.
pub struct Ringbuf<T: Copy, const N: usize> {
    pub next: usize,
    pub entries: [Option<RingbufEntry<T>>; N],
}

impl<T: Copy, const N: usize> Ringbuf<T, N> {
    pub const fn new() -> Self {
        Ringbuf {
            next: 0,
            entries: [None; N],
        }
    }

    pub fn insert(&mut self, line: u32, payload: T) {
        self.entries[self.next] = Some(RingbufEntry { line, payload });
        self.next = (self.next + 1) % N;
    }
}

/// Declares a named (or, if the name is omitted, module-local) ring buffer
/// of `$n` entries of type `$t`.
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr) => {
        static $name: ::critical_section::Mutex<
            ::core::cell::RefCell<$crate::Ringbuf<$t, $n>>,
        > = ::critical_section::Mutex::new(::core::cell::RefCell::new(
            $crate::Ringbuf::new(),
        ));
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n);
    };
    ($t:ty, $n:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n);
    };
}

/// Records `$payload` into the named (or module-local) ring buffer declared
/// with [`ringbuf!`], tagged with the call site's source line.
#[macro_export]
macro_rules! ringbuf_entry {
    ($name:expr, $payload:expr) => {
        ::critical_section::with(|cs| {
            $name.borrow_ref_mut(cs).insert(line!(), $payload);
        })
    };
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_after_capacity() {
        let mut r: Ringbuf<u32, 3> = Ringbuf::new();
        for i in 0..5 {
            r.insert(0, i);
        }
        // Only the last 3 inserted values should survive.
        let payloads: Vec<u32> = r
            .entries
            .iter()
            .filter_map(|e| e.map(|e| e.payload))
            .collect();
        assert_eq!(payloads.len(), 3);
        assert!(payloads.contains(&2));
        assert!(payloads.contains(&3));
        assert!(payloads.contains(&4));
        assert!(!payloads.contains(&0));
        assert!(!payloads.contains(&1));
    }
}
