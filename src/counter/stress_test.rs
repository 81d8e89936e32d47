use super::*;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Large strides so the 16-bit counter wraps often, but well under half a
// span so the combined handler can still tell the direction.
const MAX_STRIDE: u16 = 4096;
const TEST_DURATION_MS: u64 = 1000;

const NO_WRAP: u8 = 0;
const OVERFLOW: u8 = 1;
const UNDERFLOW: u8 = 2;

#[derive(Clone, Copy)]
enum Wiring {
    Combined,
    Split,
}

fn run_stress(wiring: Wiring) {
    // Emulated hardware register, read by the counter through its accessor
    let low = Arc::new(AtomicU16::new(0));
    let hw_low = low.clone();

    // A Mutex stands in for interrupt masking: the "ISR" can't preempt the
    // "application" in the middle of a read.
    let counter = Arc::new(Mutex::new(WideCounter::new(move || {
        hw_low.load(Ordering::SeqCst)
    })));
    counter.lock().unwrap().init();

    // Ground truth and the single pending wrap interrupt
    let position = Arc::new(AtomicI32::new(0));
    let pending = Arc::new(AtomicU8::new(NO_WRAP));
    let stop_signal = Arc::new(AtomicBool::new(false));

    // --- Thread 1: the quadrature counter ---
    let counter_hw = counter.clone();
    let low_hw = low.clone();
    let position_hw = position.clone();
    let pending_hw = pending.clone();
    let stop_hw = stop_signal.clone();
    let hw_thread = thread::spawn(move || {
        let mut rng: u32 = 0x2545_F491;
        while !stop_hw.load(Ordering::Relaxed) {
            let guard = counter_hw.lock().unwrap();
            // Hardware only moves on once the previous wrap was serviced
            if pending_hw.load(Ordering::SeqCst) == NO_WRAP {
                rng ^= rng << 13;
                rng ^= rng >> 17;
                rng ^= rng << 5;
                let stride = (rng % MAX_STRIDE as u32) as u16 + 1;
                let old = low_hw.load(Ordering::SeqCst);
                // Drift forward a bit more often than backward
                if rng & 0x300 != 0 {
                    let new = old.wrapping_add(stride);
                    low_hw.store(new, Ordering::SeqCst);
                    position_hw.fetch_add(stride as i32, Ordering::SeqCst);
                    if new < old {
                        pending_hw.store(OVERFLOW, Ordering::SeqCst);
                    }
                } else {
                    let new = old.wrapping_sub(stride);
                    low_hw.store(new, Ordering::SeqCst);
                    position_hw.fetch_sub(stride as i32, Ordering::SeqCst);
                    if new > old {
                        pending_hw.store(UNDERFLOW, Ordering::SeqCst);
                    }
                }
            }
            drop(guard);
            thread::yield_now();
        }
    });

    // --- Thread 2: the wrap ISR ---
    let counter_isr = counter.clone();
    let pending_isr = pending.clone();
    let stop_isr = stop_signal.clone();
    let isr_thread = thread::spawn(move || {
        let mut serviced = 0u64;
        while !stop_isr.load(Ordering::Relaxed) {
            let guard = counter_isr.lock().unwrap();
            let event = pending_isr.swap(NO_WRAP, Ordering::SeqCst);
            if event != NO_WRAP {
                match (wiring, event) {
                    (Wiring::Combined, _) => guard.on_over_underflow(),
                    (Wiring::Split, OVERFLOW) => guard.on_overflow(),
                    (Wiring::Split, _) => guard.on_underflow(),
                }
                serviced += 1;
            }
            drop(guard);
            thread::sleep(Duration::from_micros(1));
        }
        serviced
    });

    // --- Thread 3: the application ---
    let counter_app = counter.clone();
    let position_app = position.clone();
    let pending_app = pending.clone();
    let stop_app = stop_signal.clone();
    let app_thread = thread::spawn(move || {
        let mut checked = 0u64;
        while !stop_app.load(Ordering::Relaxed) {
            let guard = counter_app.lock().unwrap();
            // With a wrap still pending the value is a full span off; only
            // settled states are comparable.
            if pending_app.load(Ordering::SeqCst) == NO_WRAP {
                let expected = position_app.load(Ordering::SeqCst);
                assert_eq!(guard.value(), expected, "value drifted from position");
                assert_eq!(guard.value_consistent(), expected);
                checked += 1;
            }
            drop(guard);
        }
        checked
    });

    println!("Running stress test for {}ms...", TEST_DURATION_MS);
    thread::sleep(Duration::from_millis(TEST_DURATION_MS));

    stop_signal.store(true, Ordering::Relaxed);
    hw_thread.join().unwrap();
    let serviced = isr_thread.join().unwrap();
    let checked = app_thread.join().unwrap();

    println!("Serviced {} wraps, checked {} reads.", serviced, checked);
    assert!(serviced > 0, "no wrap was ever raised");
}

#[test]
fn split_handlers_stress_test() {
    run_stress(Wiring::Split);
}

#[test]
fn combined_handler_stress_test() {
    run_stress(Wiring::Combined);
}
