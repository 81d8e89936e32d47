#![no_std]

use rtt_target::rprintln;
use wide_counter::WideCounter;

/// One full span of the 16-bit hardware counter
pub const SPAN: u32 = 0x1_0000;

/// Read path under test
#[derive(Clone, Copy)]
pub enum ReadPath {
    Default,
    Consistent,
    Critical,
}

impl From<ReadPath> for &'static str {
    fn from(val: ReadPath) -> Self {
        match val {
            ReadPath::Default => "value",
            ReadPath::Consistent => "value_consistent",
            ReadPath::Critical => "value_critical",
        }
    }
}

/// Read path selected through features
pub const fn selected_read_path() -> ReadPath {
    if cfg!(feature = "read-critical") {
        ReadPath::Critical
    } else if cfg!(feature = "read-consistent") {
        ReadPath::Consistent
    } else {
        ReadPath::Default
    }
}

pub fn read<F: Fn() -> u16>(counter: &WideCounter<F>, path: ReadPath) -> i32 {
    match path {
        ReadPath::Default => counter.value(),
        ReadPath::Consistent => counter.value_consistent(),
        ReadPath::Critical => counter.value_critical(),
    }
}

/// Check that the count never jumps between two reads, and panic if it does.
///
/// `max_step` is the most the hardware can move between two calls. A jump of
/// about one span is a torn read or a misread wrap direction.
pub fn check_counter_continuity<F: Fn() -> u16>(
    counter: &WideCounter<F>,
    path: ReadPath,
    reader: &'static str,
    last: &mut i32,
    max_step: u32,
) {
    let now = read(counter, path);
    let jump = now.wrapping_sub(*last).unsigned_abs();
    if jump > max_step {
        let path_name: &'static str = path.into();
        if jump.abs_diff(SPAN) <= max_step {
            rprintln!(
                "{} SPAN JUMP via {}: {} -> {} (high = {:#06x})",
                reader,
                path_name,
                *last,
                now,
                counter.high()
            );
            rprintln!(
                "CAUSE: high and low halves read across a wrap, or wrap direction misread"
            );
            panic!("span jump of {} ticks via {}", jump, path_name);
        } else {
            rprintln!(
                "{} discontinuity via {}: {} -> {} (unknown cause)",
                reader,
                path_name,
                *last,
                now
            );
            panic!("discontinuity of {} ticks (unknown cause)", jump);
        }
    }
    *last = now;
}

/// Report active configuration features
pub fn report_configuration() {
    let path: &'static str = selected_read_path().into();
    rprintln!("Read path: {}", path);

    if cfg!(feature = "duration-full") {
        rprintln!("Duration config: Full test");
    } else {
        rprintln!("Duration config: Short test");
    }

    if cfg!(feature = "priority-wrap-high") {
        rprintln!("Priority config: Wrap high (wrap=0, reader=1)");
    } else if cfg!(feature = "priority-reader-high") {
        rprintln!("Priority config: Reader high (wrap=1, reader=0)");
    } else {
        rprintln!("Priority config: All equal (wrap=1, reader=1)");
    }
}

/// Calculate test duration based on features (returns seconds)
pub const fn get_test_duration_seconds(full_duration: u64) -> u64 {
    if cfg!(feature = "duration-full") {
        full_duration
    } else {
        5 // Short duration for all platforms
    }
}
