/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the SPI TPM Emulator Types library.

--*/

mod bus;
mod macros;

pub use crate::bus::{Bus, BusError};

/// MMIO data width
pub type RvData = u32;

/// MMIO address width
pub type RvAddr = u32;

emu_enum!(
    /// MMIO operation size
    #[derive(Debug, Eq, PartialEq, Copy, Clone)]
    pub RvSize;
    usize;
    {
        Byte = 1,
        HalfWord = 2,
        Word = 4,
    };
    Invalid
);
