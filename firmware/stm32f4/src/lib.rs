#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_reset as _;

use core::ffi::c_int;

use bootshim::{CharSink, SinkConfig, SystemReset, Trampoline, TxRegister, TxStatus};
use cortex_m::peripheral::SCB;
use stm32f4::stm32f407::{GPIOA, RCC, USART1};

/// Reset-default HSI clock, which is what USART1 runs from until someone
/// configures the PLL.
pub const HSI_HZ: u32 = 16_000_000;
pub const BAUD: u32 = 115_200;

/// Sink settings for formatted output. `putchar` ignores these.
pub const STDOUT_CONFIG: SinkConfig = SinkConfig::wait_for_ready(10_000);

/// Handle to the USART1 transmit-data register
pub struct Usart1Tx;

impl TxRegister for Usart1Tx {
    fn write_data(&mut self, byte: u8) {
        let usart = unsafe { &*USART1::ptr() };
        usart.dr.write(|w| unsafe { w.bits(byte as u32) });
    }

    fn tx_status(&mut self) -> TxStatus {
        let usart = unsafe { &*USART1::ptr() };
        let cr1 = usart.cr1.read();
        if cr1.ue().bit_is_clear() || cr1.te().bit_is_clear() {
            return TxStatus::Fault;
        }
        if usart.sr.read().txe().bit_is_set() {
            TxStatus::Ready
        } else {
            TxStatus::Busy
        }
    }
}

pub struct CortexReset;

impl SystemReset for CortexReset {
    fn system_reset(&mut self) -> ! {
        SCB::sys_reset()
    }
}

/// C-ABI character output, for C code linked into the image.
#[no_mangle]
pub extern "C" fn putchar(ch: c_int) -> c_int {
    CharSink::new(Usart1Tx).putchar(ch)
}

/// A `core::fmt::Write` sink over USART1 that waits for the transmitter.
pub fn stdout() -> CharSink<Usart1Tx> {
    CharSink::with_config(Usart1Tx, STDOUT_CONFIG)
}

/// Run `app`, then reset the chip. Call this from the `#[entry]` function.
pub fn reset_handler(app: fn()) -> ! {
    defmt::info!("bootshim: entering application");
    Trampoline::new(CortexReset).launch(app)
}

/// Bring up USART1 TX on PA9 (AF7), 8N1 at [`BAUD`] from the HSI clock.
///
/// The shim never calls this; it belongs to whoever owns the board bring-up.
pub fn init_usart1(rcc: &RCC, gpioa: &GPIOA, usart: &USART1) {
    rcc.ahb1enr.modify(|_, w| w.gpioaen().set_bit());
    rcc.apb2enr.modify(|_, w| w.usart1en().set_bit());

    gpioa.moder.modify(|_, w| w.moder9().alternate());
    gpioa.afrh.modify(|_, w| w.afrh9().af7());

    // OVER8 = 0, so BRR is just the rounded clock / baud ratio
    usart
        .brr
        .write(|w| unsafe { w.bits((HSI_HZ + BAUD / 2) / BAUD) });
    usart.cr2.reset();
    usart.cr3.reset();
    usart.cr1.write(|w| w.ue().set_bit().te().set_bit());
}
