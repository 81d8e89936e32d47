#![no_main]
#![no_std]

use stm32f412_nucleo as lib;

use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use counter_stress::{
    check_counter_continuity, get_test_duration_seconds, read, report_configuration,
    selected_read_path,
};
use cortex_m::peripheral::NVIC;
use hal::rcc::Config;
use lib::hal::{self, interrupt, prelude::*, timer::Timer as HalTimer};
use rtt_target::{rprintln, rtt_init_log};
use wide_counter::WideCounter;

const FULL_TEST_DURATION_SECS: u64 = 60;

// TIM3 counts at 100 MHz / (99 + 1) = 1 MHz, one 16-bit span every ~65 ms
const TIM3_PRESCALER: u32 = 99;
// TIM2 is the clock for the test and an interrupt-context reader
const TICK_HZ: u32 = 10_000;
// Direction flips every 250 ms
const FLIP_TICKS: u32 = TICK_HZ / 4;
// Far more than TIM3 moves between two reads, far less than a span
const MAX_STEP: u32 = 0x4000;

fn read_tim3() -> u16 {
    unsafe { (*hal::pac::TIM3::ptr()).cnt().read().bits() as u16 }
}

// Wide count over TIM3, fed by its single update interrupt
static ENCODER: WideCounter<fn() -> u16> = WideCounter::new(read_tim3 as fn() -> u16);
static TICKS: AtomicU32 = AtomicU32::new(0);
// Net wraps as seen from the DIR bit, to cross-check the inferred direction
static NET_WRAPS: AtomicI32 = AtomicI32::new(0);
static WRAP_EVENTS: AtomicU32 = AtomicU32::new(0);

/// Encode priority level for ARM Cortex-M NVIC
/// ARM Cortex-M uses only the upper 4 bits for priority (on STM32F4)
/// So priority 0 = 0x00, priority 1 = 0x10, priority 2 = 0x20, etc.
const fn encode_priority(priority: u8) -> u8 {
    priority << 4
}

/// Set raw interrupt priority using direct register access
unsafe fn set_irq_prio_raw(irq: hal::pac::Interrupt, priority: u8) {
    let irqn = irq as usize;
    unsafe {
        let nvic = &(*NVIC::PTR);
        nvic.ipr[irqn].write(encode_priority(priority));
    }
}

/// Configure wrap (TIM3) and reader (TIM2) priorities based on features
pub fn configure_interrupt_priorities() {
    let (wrap, reader) = if cfg!(feature = "priority-wrap-high") {
        (0, 1)
    } else if cfg!(feature = "priority-reader-high") {
        (1, 0)
    } else {
        (1, 1)
    };
    unsafe {
        set_irq_prio_raw(hal::pac::Interrupt::TIM3, wrap);
        set_irq_prio_raw(hal::pac::Interrupt::TIM2, reader);
    }
}

/// Turn TIM3 into a free-running 16-bit counter that raises one update
/// interrupt on both overflow and underflow.
fn configure_tim3_counter() {
    unsafe {
        let tim3 = &*hal::pac::TIM3::ptr();
        tim3.cr1().modify(|_, w| w.cen().clear_bit());
        tim3.psc().write(|w| w.bits(TIM3_PRESCALER));
        tim3.arr().write(|w| w.bits(0xFFFF));
        // Latch the prescaler, then drop the update flag this produced
        tim3.egr().write(|w| w.ug().set_bit());
        tim3.sr().write(|w| w.uif().clear());
        tim3.cnt().write(|w| w.bits(0));
        tim3.dier().modify(|_, w| w.uie().set_bit());
        tim3.cr1().modify(|_, w| w.dir().clear_bit().cen().set_bit());
    }
}

fn set_tim3_down(down: bool) {
    unsafe {
        let tim3 = &*hal::pac::TIM3::ptr();
        tim3.cr1().modify(|_, w| w.dir().bit(down));
    }
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let dp = hal::pac::Peripherals::take().expect("Failed to take device peripherals");
    let mut rcc = dp.RCC.freeze(Config::hse(8.MHz()).sysclk(100.MHz()));

    rtt_init_log!(
        log::LevelFilter::Debug,
        rtt_target::ChannelMode::NoBlockTrim,
        1024
    );

    rprintln!("Hello from STM32F412 with a 16-bit TIM3 widened to 32 bits !");

    report_configuration();

    // Clocks and resets TIM3, then we take over its registers
    let _tim3 = HalTimer::new(dp.TIM3, &mut rcc).counter_hz();
    configure_tim3_counter();
    ENCODER.init();

    let mut tim2 = HalTimer::new(dp.TIM2, &mut rcc).counter_hz();
    tim2.start(TICK_HZ.Hz()).unwrap();
    tim2.listen(hal::timer::Event::Update);

    rprintln!("TIM3 counting at 1MHz, TIM2 ticking at {}Hz", TICK_HZ);

    configure_interrupt_priorities();

    unsafe {
        NVIC::unmask(hal::pac::Interrupt::TIM3);
        NVIC::unmask(hal::pac::Interrupt::TIM2);
    }

    let path = selected_read_path();
    let duration_secs = get_test_duration_seconds(FULL_TEST_DURATION_SECS);
    let test_ticks = duration_secs as u32 * TICK_HZ;

    let mut last_value = read(&ENCODER, path);
    let mut last_log_tick = 0;
    let mut next_flip_tick = FLIP_TICKS;
    let mut down = false;
    let mut flips = 0u32;
    let mut iteration_count = 0u64;

    rprintln!("Test will run for {} seconds", duration_secs);

    loop {
        check_counter_continuity(&ENCODER, path, "main", &mut last_value, MAX_STEP);

        let tick = TICKS.load(Ordering::Relaxed);

        if tick >= next_flip_tick {
            down = !down;
            set_tim3_down(down);
            flips += 1;
            next_flip_tick += FLIP_TICKS;
        }

        if tick - last_log_tick >= TICK_HZ {
            rprintln!(
                "Elapsed: {}s, value: {}, wraps: {}, flips: {}, iterations: {}",
                tick / TICK_HZ,
                last_value,
                WRAP_EVENTS.load(Ordering::Relaxed),
                flips,
                iteration_count
            );
            last_log_tick = tick;
        }

        if tick >= test_ticks {
            break;
        }

        iteration_count += 1;
    }

    let net = NET_WRAPS.load(Ordering::Relaxed);
    let high = ENCODER.high();
    rprintln!(
        "Test completed, wraps: {}, net by DIR: {}, high: {:#06x}",
        WRAP_EVENTS.load(Ordering::Relaxed),
        net,
        high
    );
    let agrees = net as u16 == high;
    if !agrees {
        rprintln!("Inferred wrap directions disagree with the DIR bit");
    }

    stm32f412_nucleo::exit(agrees)
}

// TIM3 update: overflow or underflow, direction not reported
#[interrupt]
fn TIM3() {
    let tim3 = unsafe { &*hal::pac::TIM3::ptr() };
    if tim3.sr().read().uif().bit_is_set() {
        tim3.sr().write(|w| w.uif().clear());
        ENCODER.on_over_underflow();

        WRAP_EVENTS.fetch_add(1, Ordering::Relaxed);
        if tim3.cr1().read().dir().bit_is_set() {
            NET_WRAPS.fetch_sub(1, Ordering::Relaxed);
        } else {
            NET_WRAPS.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// TIM2 update: test clock, and a reader in interrupt context
#[interrupt]
fn TIM2() {
    static mut TIM2_LAST_VALUE: i32 = 0;
    static mut PRIMED: bool = false;

    TICKS.fetch_add(1, Ordering::Relaxed);

    let path = selected_read_path();
    if *PRIMED {
        check_counter_continuity(&ENCODER, path, "TIM2", TIM2_LAST_VALUE, MAX_STEP);
    } else {
        *TIM2_LAST_VALUE = read(&ENCODER, path);
        *PRIMED = true;
    }

    unsafe {
        let tim2 = &*hal::pac::TIM2::ptr();
        if tim2.sr().read().uif().bit_is_set() {
            tim2.sr().write(|w| w.uif().clear());
        }
    }
}
