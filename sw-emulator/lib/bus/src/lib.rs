/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the SPI TPM Emulator Bus library.

--*/
mod clock;
pub mod testing;

pub use crate::clock::{ActionHandle, Clock, Timer};
pub use spi_tpm_emu_types::{Bus, BusError};
