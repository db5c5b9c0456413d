/*++

Licensed under the Apache-2.0 license.

File Name:

    bus.rs

Abstract:

    File contains definition of the Bus trait.

--*/

use crate::{RvAddr, RvData, RvSize};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusError {
    /// Load access fault
    LoadAccessFault,

    /// Store access fault
    StoreAccessFault,
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            BusError::LoadAccessFault => "load access fault",
            BusError::StoreAccessFault => "store access fault",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for BusError {}

/// Represents an abstract register bus. Used to read and write peripheral
/// registers from the responder firmware and from tests.
pub trait Bus {
    /// Read data of specified size from given address
    ///
    /// # Arguments
    ///
    /// * `size` - Size of the read
    /// * `addr` - Address to read from
    ///
    /// # Error
    ///
    /// * `BusError` - `BusError::LoadAccessFault`
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError>;

    /// Write data of specified size to given address
    ///
    /// # Arguments
    ///
    /// * `size` - Size of the write
    /// * `addr` - Address to write
    /// * `val` - Data to write
    ///
    /// # Error
    ///
    /// * `BusError` - `BusError::StoreAccessFault`
    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError>;

    /// This method is used to notify peripherals of the passage of time. The
    /// owner of this bus MAY call this function periodically, or in response to
    /// a previously scheduled timer event.
    fn poll(&mut self) {
        // By default, do nothing
    }
}
