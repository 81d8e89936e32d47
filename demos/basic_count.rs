// SPDX-License-Identifier: Apache-2.0
#![no_std]
#![no_main]

use cortex_m::peripheral::{syst::SystClkSource, SYST};
use cortex_m_semihosting::hprintln;
use wide_counter::WideCounter;

fn read_syst() -> u16 {
    SYST::get_current() as u16
}

// SysTick reloading at 0xFFFF is a 16-bit down-counter that underflows on
// every exception.
static COUNTER: WideCounter<fn() -> u16> = WideCounter::new(read_syst as fn() -> u16);

#[cortex_m_rt::entry]
fn main() -> ! {
    hprintln!("Initializing ..");
    let mut syst = cortex_m::Peripherals::take().unwrap().SYST;
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(0xFFFF);
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();
    COUNTER.init();

    let start = COUNTER.value_critical();
    let stop = start - 4 * 0x10000;

    loop {
        // Small no-op busy loop
        for _ in 0..1_000 {
            cortex_m::asm::delay(100)
        }
        let now = COUNTER.value_critical();
        hprintln!("Count: {}", now - start);
        if now <= stop {
            break;
        }
    }
    hprintln!("Counted down past four 16-bit spans");
    cortex_m_semihosting::debug::exit(cortex_m_semihosting::debug::EXIT_SUCCESS);
    loop {}
}

#[cortex_m_rt::exception]
fn SysTick() {
    COUNTER.on_underflow();
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
