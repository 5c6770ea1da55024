// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event counters: store how many times each variant of an event enum has
//! ever been recorded, in a handful of bytes, surviving past whatever a
//! bounded [`ringbuf`](../ringbuf/index.html) entry scrolled off of.
//!
//! This is a trimmed adaptation of the upstream crate: it drops the
//! `#[derive(Count)]` proc-macro convenience (and the arch-specific atomic
//! workaround it pairs with) in favor of a small number of hand-written
//! `impl Count` blocks, since this repository only ever counts two or three
//! event enums. See `DESIGN.md`.

#![cfg_attr(target_os = "none", no_std)]

/// A countable event.
pub trait Count {
    /// A type that counts occurrences of this event, one counter per
    /// variant.
    type Counters;

    /// Initializer for a new set of counters, all zero.
    const NEW_COUNTERS: Self::Counters;

    /// Increments the counter for this event.
    fn count(&self, counters: &Self::Counters);
}

/// Declares a set of event counters for `$Type`, which must implement
/// [`Count`].
#[macro_export]
macro_rules! counters {
    ($name:ident, $Type:ident) => {
        #[used]
        static $name: <$Type as $crate::Count>::Counters =
            <$Type as $crate::Count>::NEW_COUNTERS;
    };
    ($Type:ident) => {
        $crate::counters!(__COUNTERS, $Type);
    };
}

/// Counts an event into a set of counters declared with [`counters!`].
#[macro_export]
macro_rules! count {
    ($counters:expr, $event:expr) => {
        let (e, ctrs) = ($event, &$counters);
        $crate::Count::count(&e, ctrs);
    };
    ($event:expr) => {
        $crate::count!(__COUNTERS, $event);
    };
}
