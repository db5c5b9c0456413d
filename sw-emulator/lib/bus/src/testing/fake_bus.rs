/*++

Licensed under the Apache-2.0 license.

File Name:

    fake_bus.rs

Abstract:

    File contains code for a fake implementation of the Bus trait.

--*/
use spi_tpm_emu_types::{RvAddr, RvData, RvSize};

use crate::{testing::Log, Bus, BusError};
use std::collections::VecDeque;
use std::fmt::Write;

/// A Bus implementation that logs all calls, and allows the user to override
/// the return value of the methods. Values queued in `read_queue` are
/// returned (oldest first) before falling back to `read_result`.
///
/// # Example
///
/// ```
/// use spi_tpm_emu_bus::{Bus, testing::FakeBus};
/// use spi_tpm_emu_types::RvSize;
///
/// let mut fake_bus = FakeBus::new();
/// fake_bus.read_result = Ok(35);
/// assert_eq!(fake_bus.read(RvSize::HalfWord, 0xdeadcafe), Ok(35));
/// assert_eq!("read(RvSize::HalfWord, 0xdeadcafe)\n", fake_bus.log.take());
/// ```
pub struct FakeBus {
    pub log: Log,
    pub read_queue: VecDeque<Result<RvData, BusError>>,
    pub read_result: Result<RvData, BusError>,
    pub write_result: Result<(), BusError>,
}
impl FakeBus {
    pub fn new() -> Self {
        Self {
            log: Log::new(),
            read_queue: VecDeque::new(),
            read_result: Ok(0),
            write_result: Ok(()),
        }
    }
}
impl Default for FakeBus {
    fn default() -> Self {
        Self::new()
    }
}
impl Bus for FakeBus {
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        writeln!(self.log.w(), "read(RvSize::{size:?}, {addr:#x})").unwrap();
        self.read_queue.pop_front().unwrap_or(self.read_result)
    }

    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        writeln!(self.log.w(), "write(RvSize::{size:?}, {addr:#x}, {val:#x})").unwrap();
        self.write_result
    }

    fn poll(&mut self) {
        writeln!(self.log.w(), "poll()").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_bus() {
        let mut fake_bus = FakeBus::new();

        assert_eq!(fake_bus.read(RvSize::HalfWord, 0xdeadcafe), Ok(0));
        assert_eq!("read(RvSize::HalfWord, 0xdeadcafe)\n", fake_bus.log.take());

        assert_eq!(fake_bus.write(RvSize::Word, 0xf00dcafe, 0x537), Ok(()));
        assert_eq!(
            "write(RvSize::Word, 0xf00dcafe, 0x537)\n",
            fake_bus.log.take()
        );

        fake_bus.write_result = Err(BusError::StoreAccessFault);
        assert_eq!(
            fake_bus.write(RvSize::Word, 0x131, 0x1),
            Err(BusError::StoreAccessFault)
        );
        assert_eq!("write(RvSize::Word, 0x131, 0x1)\n", fake_bus.log.take());
    }

    #[test]
    fn test_read_queue_drains_before_default() {
        let mut fake_bus = FakeBus::new();
        fake_bus.read_queue.push_back(Ok(0x1));
        fake_bus.read_queue.push_back(Err(BusError::LoadAccessFault));
        fake_bus.read_result = Ok(0x7);

        assert_eq!(fake_bus.read(RvSize::Word, 0x830), Ok(0x1));
        assert_eq!(
            fake_bus.read(RvSize::Word, 0x830),
            Err(BusError::LoadAccessFault)
        );
        assert_eq!(fake_bus.read(RvSize::Word, 0x830), Ok(0x7));
        fake_bus.poll();
        assert_eq!(
            "read(RvSize::Word, 0x830)\nread(RvSize::Word, 0x830)\nread(RvSize::Word, 0x830)\npoll()\n",
            fake_bus.log.take()
        );
    }
}
