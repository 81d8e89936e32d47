// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), no_std)]

//! Extends a 16-bit hardware timer/counter to a 32-bit signed count.
//!
//! The hardware register keeps counting on its own. Software only tracks the
//! high half-word, which the firmware bumps from the counter's wrap
//! interrupt(s). See [`WideCounter`].

#[cfg(feature = "log")]
macro_rules! trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:tt)*) => {{
        let _ = ($($arg)*);
    }};
}

mod counter;

pub use counter::{WideCounter, MIDPOINT};
