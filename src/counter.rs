// SPDX-License-Identifier: Apache-2.0

use core::sync::atomic::{AtomicU16, Ordering};

#[cfg(debug_assertions)]
use core::sync::atomic::AtomicU8;

/// Low counter value separating the two wrap directions in
/// [`WideCounter::on_over_underflow`]. A wrap seen at exactly this value is
/// treated as an underflow.
pub const MIDPOINT: u16 = 0x7FFF;

// Bounds of the high half, compared against its unsigned 16-bit pattern.
const HIGH_FLOOR: u16 = 0;
const HIGH_CEILING: u16 = 0xFFFF;

// Which handler set has delivered events since the last init.
#[cfg_attr(not(debug_assertions), allow(dead_code))]
const WIRING_NONE: u8 = 0;
const WIRING_COMBINED: u8 = 1;
const WIRING_SPLIT: u8 = 2;

/// A 32-bit signed counter on top of a 16-bit hardware counter.
///
/// The low half is read live from hardware through `read_low`. The high half
/// is a software count of net wraps, moved by the wrap interrupt handlers.
///
/// Wire either [`on_over_underflow`](Self::on_over_underflow) or the pair
/// [`on_overflow`](Self::on_overflow) / [`on_underflow`](Self::on_underflow)
/// into the interrupt vector(s). Mixing both on one counter double counts;
/// debug builds assert on it.
pub struct WideCounter<F> {
    read_low: F,
    high: AtomicU16, // Net wraps, upper half of the value
    #[cfg(debug_assertions)]
    wiring: AtomicU8,
    #[cfg(test)]
    after_high_hook: Option<fn(&WideCounter<F>)>, // injected between high and low reads
}

impl<F: Fn() -> u16> WideCounter<F> {
    /// Creates a counter reading its low half through `read_low`.
    ///
    /// `read_low` must return the live hardware count and have no side
    /// effects. The high half starts at zero.
    ///
    /// # Examples
    ///
    /// ```
    /// # use wide_counter::WideCounter;
    /// fn read_cnt() -> u16 {
    ///     // e.g. TIM3->CNT
    ///     0x1234
    /// }
    ///
    /// static ENCODER: WideCounter<fn() -> u16> = WideCounter::new(read_cnt as fn() -> u16);
    ///
    /// ENCODER.init();
    /// assert_eq!(ENCODER.value(), 0x1234);
    /// ```
    pub const fn new(read_low: F) -> Self {
        WideCounter {
            read_low,
            high: AtomicU16::new(0),
            #[cfg(debug_assertions)]
            wiring: AtomicU8::new(WIRING_NONE),
            #[cfg(test)]
            after_high_hook: None,
        }
    }

    /// Resets the high half to zero.
    ///
    /// Call this after enabling the hardware counter and its interrupt(s),
    /// before any reads or wrap events.
    pub fn init(&self) {
        self.high.store(0, Ordering::SeqCst);
        #[cfg(debug_assertions)]
        self.wiring.store(WIRING_NONE, Ordering::Relaxed);
    }

    /// Returns the combined count as a signed 32-bit value.
    ///
    /// Lock-free and safe to call from any context. The high and low halves
    /// are read separately, so a wrap handler running between the two reads
    /// can tear the result by one full 16-bit span. Use
    /// [`value_consistent`](Self::value_consistent) or `value_critical` when
    /// that matters.
    ///
    /// For the unsigned interpretation see [`value_u32`](Self::value_u32).
    pub fn value(&self) -> i32 {
        let high = self.high.load(Ordering::SeqCst);
        self.run_after_high_hook();
        let low = (self.read_low)();
        combine(high, low)
    }

    /// Same bit pattern as [`value`](Self::value), read as unsigned.
    pub fn value_u32(&self) -> u32 {
        self.value() as u32
    }

    /// Lock-free read that retries until no wrap handler ran in between.
    ///
    /// Reads the high half, then the low half, then the high half again, and
    /// loops if the two high samples differ. A hardware wrap whose interrupt
    /// is still pending is not visible here.
    pub fn value_consistent(&self) -> i32 {
        loop {
            let high = self.high.load(Ordering::SeqCst);
            self.run_after_high_hook();
            let low = (self.read_low)();
            if self.high.load(Ordering::SeqCst) == high {
                return combine(high, low);
            }
        }
    }

    /// Reads the value with interrupts disabled.
    ///
    /// No wrap handler can run during the read. Not for use from the wrap
    /// handlers themselves.
    #[cfg(feature = "cortex-m")]
    pub fn value_critical(&self) -> i32 {
        cortex_m::interrupt::free(|_| self.value())
    }

    /// Combined overflow/underflow handler.
    ///
    /// Call this from the interrupt handler of peripherals that raise one
    /// interrupt for both wrap directions. The direction is inferred from
    /// where the low counter sits when this runs: at or above [`MIDPOINT`] the
    /// counter just underflowed, below it the counter just overflowed. This
    /// only holds if the handler runs before the counter drifts half a span
    /// away from the wrap point.
    #[allow(clippy::absurd_extreme_comparisons)]
    pub fn on_over_underflow(&self) {
        self.note_wiring(WIRING_COMBINED);
        let low = (self.read_low)();
        let high = self.high.load(Ordering::Relaxed);
        if low >= MIDPOINT && high >= HIGH_FLOOR {
            self.set_high(high, high.wrapping_sub(1));
        } else if low <= MIDPOINT && high <= HIGH_CEILING {
            self.set_high(high, high.wrapping_add(1));
        }
    }

    /// Overflow handler, for peripherals with a dedicated overflow interrupt.
    ///
    /// Use together with [`on_underflow`](Self::on_underflow).
    #[allow(clippy::absurd_extreme_comparisons)]
    pub fn on_overflow(&self) {
        self.note_wiring(WIRING_SPLIT);
        let high = self.high.load(Ordering::Relaxed);
        // Always true for 16-bit storage: 0xFFFF wraps to 0 like a 32-bit counter.
        if high <= HIGH_CEILING {
            self.set_high(high, high.wrapping_add(1));
        }
    }

    /// Underflow handler, for peripherals with a dedicated underflow interrupt.
    ///
    /// Use together with [`on_overflow`](Self::on_overflow).
    #[allow(clippy::absurd_extreme_comparisons)]
    pub fn on_underflow(&self) {
        self.note_wiring(WIRING_SPLIT);
        let high = self.high.load(Ordering::Relaxed);
        // Always true as well: 0 wraps to 0xFFFF, i.e. negative counts.
        if high >= HIGH_FLOOR {
            self.set_high(high, high.wrapping_sub(1));
        }
    }

    /// Returns the raw high half.
    #[cfg(feature = "diagnostics")]
    pub fn high(&self) -> u16 {
        self.high.load(Ordering::SeqCst)
    }

    // Plain store, no read-modify-write: thumbv6m has no atomic RMW.
    #[inline(always)]
    fn set_high(&self, from: u16, to: u16) {
        self.high.store(to, Ordering::SeqCst);
        trace!("high {:#06x} -> {:#06x}", from, to);
    }

    #[inline(always)]
    fn note_wiring(&self, _wiring: u8) {
        #[cfg(debug_assertions)]
        {
            let seen = self.wiring.load(Ordering::Relaxed);
            if seen == WIRING_NONE {
                self.wiring.store(_wiring, Ordering::Relaxed);
            } else {
                debug_assert_eq!(
                    seen, _wiring,
                    "combined and split wrap handlers wired to the same counter"
                );
            }
        }
    }

    #[inline(always)]
    fn run_after_high_hook(&self) {
        #[cfg(test)]
        {
            if let Some(hook) = self.after_high_hook {
                hook(self);
            }
        }
    }
}

#[inline(always)]
const fn combine(high: u16, low: u16) -> i32 {
    (((high as u32) << 16) | low as u32) as i32
}

impl<F> WideCounter<F> {
    // -------- test-only helpers ----------
    #[cfg(test)]
    pub fn force_high(&self, value: u16) {
        self.high.store(value, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn raw_high(&self) -> u16 {
        self.high.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn set_after_high_hook(&mut self, hook: Option<fn(&WideCounter<F>)>) {
        self.after_high_hook = hook;
    }
}


#[cfg(test)]
mod stress_test;
