// Licensed under the Apache-2.0 license

//! An emulated platform for the SPI TPM responder: SPI device, interrupt
//! line, hart interrupt logic, cycle counter and a scripted SPI host.

use spi_tpm_emu_bus::Bus;
use spi_tpm_emu_periph::{SpiDeviceConfig, SpiHost};

mod bus_logger;
mod model_emulated;
mod script;

pub use bus_logger::BusLogger;
pub use model_emulated::{EmulatedHart, EmulatedResponder, EmulatedTime, ModelEmulated, Report};
pub use script::{HostScript, IdentityOverrides, ScriptError, ScriptedTransaction};

#[derive(Clone, Debug, Default)]
pub struct InitParams {
    // Timing of the SPI link
    pub spi: SpiDeviceConfig,
}

// Represents an emulation of the SPI TPM platform, to be called from tests
// and the command line runner.
pub trait HwModel {
    type TBus: Bus;

    fn new(params: InitParams) -> Self
    where
        Self: Sized;

    /// Step execution ahead to the next scheduled hardware event.
    fn step(&mut self);

    /// The SPI host issuing TPM transactions.
    fn host(&self) -> SpiHost;

    /// The SPI device register block, as firmware sees it.
    fn spi_bus(&mut self) -> Self::TBus;

    /// Execute until the result of `predicate` becomes true.
    fn step_until(&mut self, mut predicate: impl FnMut(&mut Self) -> bool) {
        while !predicate(self) {
            self.step();
        }
    }

    /// Execute until the host has nothing queued or in flight. Only returns
    /// if every remaining transaction is served without firmware.
    fn step_until_host_idle(&mut self) {
        self.step_until(|m| m.host().is_idle());
    }
}

/// Run `script` on a fresh emulated platform.
pub fn run_script(
    params: InitParams,
    script: &HostScript,
    config: &spi_tpm_responder::ResponderConfig,
) -> Result<Report, ScriptError> {
    ModelEmulated::new(params).run_script(script, config)
}
