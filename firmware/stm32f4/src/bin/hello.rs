#![no_main]
#![no_std]

use core::fmt::Write;

use bootshim_stm32f4 as shim; // global logger + panicking-behavior + memory layout
use stm32f4::stm32f407;

#[cortex_m_rt::entry]
fn main() -> ! {
    shim::reset_handler(app)
}

fn app() {
    if let Some(board) = stm32f407::Peripherals::take() {
        shim::init_usart1(&board.RCC, &board.GPIOA, &board.USART1);
    }

    let mut out = shim::stdout();
    if writeln!(out, "OK\r").is_err() {
        defmt::warn!("hello: USART1 never became ready");
    }

    // Delay a little time so we don't reboot TOO fast
    cortex_m::asm::delay(16_000_000);
}
