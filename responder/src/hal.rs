/*++

Licensed under the Apache-2.0 license.

File Name:

    hal.rs

Abstract:

    File contains the traits the responder uses to reach the SPI device,
    the header-ready interrupt and the cycle counter.

--*/

use crate::command::CommandHeader;
use crate::config::{InterfaceConfig, TpmIdentity};
use crate::error::PullError;
use spi_tpm_emu_types::BusError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The TPM portion of the SPI device.
pub trait TpmTransport {
    /// Enable the TPM interface in FIFO mode.
    fn configure(&mut self, config: &InterfaceConfig) -> Result<(), BusError>;

    /// Program the registers the peripheral answers on its own.
    fn seed_hw_registers(&mut self, identity: &TpmIdentity) -> Result<(), BusError>;

    /// Pop the latest command header. Ok(None) if none is held.
    fn get_header(&mut self) -> Result<Option<CommandHeader>, BusError>;

    /// Queue read data for the host.
    fn write_response(&mut self, data: &[u8]) -> Result<(), BusError>;

    /// Fill `buf` with write payload. All-or-nothing: if fewer than
    /// `buf.len()` bytes have arrived nothing is consumed.
    fn read_request(&mut self, buf: &mut [u8]) -> Result<(), PullError>;
}

/// Header-ready notification.
pub trait Notification {
    /// The interrupt handler has flagged a header since the last re-arm.
    fn signal_pending(&self) -> bool;

    /// Hold off interrupt delivery.
    fn mask(&mut self);

    /// Allow interrupt delivery; anything pending is delivered now.
    fn unmask(&mut self);

    /// Park until an interrupt is pending, even while masked.
    fn wait_for_interrupt(&mut self);

    /// Clear the flag, acknowledge the peripheral and re-enable its
    /// interrupt.
    fn clear_and_rearm(&mut self) -> Result<(), BusError>;

    /// Block until a header has been signaled. Returns false if `shutdown`
    /// was requested first.
    fn block_until_signaled(&mut self, shutdown: &Shutdown) -> bool {
        while !self.signal_pending() {
            if shutdown.is_requested() {
                return false;
            }
            // A signal landing between the check and the park would be lost
            // without the mask.
            self.mask();
            if !self.signal_pending() {
                self.wait_for_interrupt();
            }
            self.unmask();
        }
        true
    }
}

/// Free-running cycle counter.
pub trait TimeSource {
    fn now(&self) -> u64;

    /// Spin for `cycles` cycles.
    fn busy_wait(&mut self, cycles: u64);
}

/// Cooperative stop request for the event loop. Clones share the flag.
#[derive(Debug, Default, Clone)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeNotifier;
    use spi_tpm_emu_bus::testing::Log;

    #[test]
    fn test_block_until_signaled_parks_inside_mask() {
        let log = Log::new();
        let shutdown = Shutdown::new();
        let mut notifier = FakeNotifier::new(log.clone(), shutdown.clone(), 1);

        assert!(notifier.block_until_signaled(&shutdown));
        assert_eq!(
            log.take(),
            "mask()\nwait_for_interrupt()\nunmask()\n"
        );
    }

    #[test]
    fn test_block_until_signaled_skips_park_when_pending() {
        let log = Log::new();
        let shutdown = Shutdown::new();
        let mut notifier = FakeNotifier::new(log.clone(), shutdown.clone(), 1);
        notifier.raise();

        assert!(notifier.block_until_signaled(&shutdown));
        assert_eq!(log.take(), "");
    }

    #[test]
    fn test_block_until_signaled_honors_shutdown() {
        let log = Log::new();
        let shutdown = Shutdown::new();
        let mut notifier = FakeNotifier::new(log.clone(), shutdown.clone(), 0);

        assert!(!notifier.block_until_signaled(&shutdown));
        assert!(shutdown.is_requested());
        assert_eq!(
            log.take(),
            "mask()\nwait_for_interrupt()\nunmask()\n"
        );
        assert!(!notifier.block_until_signaled(&shutdown));
        assert_eq!(log.take(), "");
    }

    #[test]
    fn test_shutdown_clones_share_flag() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();
        assert!(!shutdown.is_requested());
        remote.request();
        assert!(shutdown.is_requested());
    }
}
