/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the SPI TPM Emulator Peripheral library.

--*/
mod irq;
mod spi_device;

pub use irq::Irq;
pub use spi_device::{
    CompletedTransaction, HostError, SpiDevice, SpiDeviceConfig, SpiHost, TpmTransaction,
};
