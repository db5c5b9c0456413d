// Licensed under the Apache-2.0 license

use log::trace;
use spi_tpm_emu_bus::{Bus, BusError};
use spi_tpm_emu_types::{RvAddr, RvData, RvSize};

/// Wraps a bus and traces every access made through it.
pub struct BusLogger<TBus: Bus> {
    pub bus: TBus,
    name: &'static str,
}
impl<TBus: Bus> BusLogger<TBus> {
    pub fn new(name: &'static str, bus: TBus) -> Self {
        Self { bus, name }
    }

    fn log_read(&self, size: RvSize, addr: RvAddr, result: Result<RvData, BusError>) {
        let bus_name = self.name;
        let size = usize::from(size);
        match result {
            Ok(val) => trace!("{bus_name}  read{size} *0x{addr:03x} -> 0x{val:x}"),
            Err(e) => trace!("{bus_name}  read{size}  *0x{addr:03x} ***FAULT {e:?}"),
        }
    }

    fn log_write(&self, size: RvSize, addr: RvAddr, val: RvData, result: Result<(), BusError>) {
        let bus_name = self.name;
        let size = usize::from(size);
        match result {
            Ok(()) => trace!("{bus_name} write{size} *0x{addr:03x} <- 0x{val:x}"),
            Err(e) => trace!("{bus_name} write{size} *0x{addr:03x} <- 0x{val:x} ***FAULT {e:?}"),
        }
    }
}
impl<TBus: Bus> Bus for BusLogger<TBus> {
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        let result = self.bus.read(size, addr);
        self.log_read(size, addr, result);
        result
    }

    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        let result = self.bus.write(size, addr, val);
        self.log_write(size, addr, val, result);
        result
    }

    fn poll(&mut self) {
        self.bus.poll();
    }
}
