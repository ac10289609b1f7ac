//! Character sink
//!
//! A byte-at-a-time output path onto a serial transmit-data register.
//! The register is reached through a [`TxRegister`] handle so the same
//! sink drives real hardware on target and an in-memory mock in tests.

use core::ffi::c_int;
use core::fmt;

/// What the transmitter reports when asked whether it can take a byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxStatus {
    Ready,
    Busy,
    /// The transmitter can't make progress at all, e.g. it is disabled
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError {
    TransmitterBusy,
    TransmitterFault,
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmitError::TransmitterBusy => f.write_str("transmitter busy"),
            TransmitError::TransmitterFault => f.write_str("transmitter fault"),
        }
    }
}

#[cfg(any(test, feature = "use-std"))]
impl std::error::Error for TransmitError {}

pub trait TxRegister {
    /// Hand one byte to the transmit-data register.
    ///
    /// Must perform exactly one register write, and nothing else.
    fn write_data(&mut self, byte: u8);

    /// Sample the transmitter state
    fn tx_status(&mut self) -> TxStatus;
}

/// How [`CharSink::transmit`] treats the transmitter state.
///
/// [`CharSink::putchar`] ignores this and always writes unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxPolicy {
    /// Write without looking at the status register.
    Unchecked,
    /// Sample the status once and refuse to write unless it is ready.
    Checked,
    /// Sample the status up to `max_polls` times (at least once) waiting
    /// for ready. A fault ends the wait early.
    WaitForReady { max_polls: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SinkConfig {
    pub policy: TxPolicy,
}

impl SinkConfig {
    pub const fn unchecked() -> Self {
        Self {
            policy: TxPolicy::Unchecked,
        }
    }

    pub const fn checked() -> Self {
        Self {
            policy: TxPolicy::Checked,
        }
    }

    pub const fn wait_for_ready(max_polls: u32) -> Self {
        Self {
            policy: TxPolicy::WaitForReady { max_polls },
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::unchecked()
    }
}

pub struct CharSink<R: TxRegister> {
    reg: R,
    config: SinkConfig,
}

impl<R: TxRegister> CharSink<R> {
    pub const fn new(reg: R) -> Self {
        Self::with_config(reg, SinkConfig::unchecked())
    }

    pub const fn with_config(reg: R, config: SinkConfig) -> Self {
        Self { reg, config }
    }

    /// C `putchar` contract.
    ///
    /// Writes the low 8 bits of `ch` to the data register and returns 0.
    /// The transmitter is never consulted, so a byte written while the
    /// previous one is still shifting out may be lost, silently.
    pub fn putchar(&mut self, ch: c_int) -> c_int {
        self.reg.write_data(ch as u8);
        0
    }

    /// Write one byte, honoring the configured [`TxPolicy`].
    ///
    /// On error nothing was written.
    pub fn transmit(&mut self, byte: u8) -> Result<(), TransmitError> {
        match self.config.policy {
            TxPolicy::Unchecked => {}
            TxPolicy::Checked => self.ready_within(1)?,
            TxPolicy::WaitForReady { max_polls } => self.ready_within(max_polls.max(1))?,
        }
        self.reg.write_data(byte);
        Ok(())
    }

    /// Write `bytes` in order, stopping at the first failed byte
    pub fn transmit_all(&mut self, bytes: &[u8]) -> Result<(), TransmitError> {
        bytes.iter().try_for_each(|b| self.transmit(*b))
    }

    fn ready_within(&mut self, polls: u32) -> Result<(), TransmitError> {
        for _ in 0..polls {
            match self.reg.tx_status() {
                TxStatus::Ready => return Ok(()),
                TxStatus::Busy => {}
                TxStatus::Fault => {
                    trace!("sink: transmitter fault");
                    return Err(TransmitError::TransmitterFault);
                }
            }
        }
        trace!("sink: transmitter still busy after {=u32} polls", polls);
        Err(TransmitError::TransmitterBusy)
    }
}

impl<R: TxRegister> fmt::Write for CharSink<R> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.transmit_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}
