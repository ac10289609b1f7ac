#![cfg_attr(not(any(test, feature = "use-std")), no_std)]

// Compiles away unless the `defmt` feature is on.
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg)*);
    };
}

pub mod sink;
pub mod trampoline;

pub use sink::{CharSink, SinkConfig, TransmitError, TxPolicy, TxRegister, TxStatus};
pub use trampoline::{Stage, SystemReset, Trampoline};
