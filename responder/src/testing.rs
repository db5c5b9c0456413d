/*++

Licensed under the Apache-2.0 license.

File Name:

    testing.rs

Abstract:

    File contains fakes for the transport, notification and time seams.
    Each logs its calls into a shared `Log`.

--*/

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt::Write;
use std::rc::Rc;

use spi_tpm_emu_bus::testing::Log;
use spi_tpm_emu_types::BusError;

use crate::command::CommandHeader;
use crate::config::{InterfaceConfig, TpmIdentity};
use crate::error::PullError;
use crate::hal::{Notification, Shutdown, TimeSource, TpmTransport};

/// A transport fed from queues.
pub struct FakeTransport {
    pub log: Log,

    /// Headers returned by `get_header`, oldest first.
    pub headers: VecDeque<CommandHeader>,

    /// Write payload bytes waiting to be pulled.
    pub request_bytes: VecDeque<u8>,

    /// Report `NotYetAvailable` this many times before serving a pull.
    pub not_ready_polls: u32,

    /// Every response pushed, in order.
    pub responses: Vec<Vec<u8>>,

    /// Fail every data movement with this error.
    pub fault: Option<BusError>,

    pub interface: Option<InterfaceConfig>,
    pub identity: Option<TpmIdentity>,
}

impl FakeTransport {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            headers: VecDeque::new(),
            request_bytes: VecDeque::new(),
            not_ready_polls: 0,
            responses: Vec::new(),
            fault: None,
            interface: None,
            identity: None,
        }
    }
}

impl TpmTransport for FakeTransport {
    fn configure(&mut self, config: &InterfaceConfig) -> Result<(), BusError> {
        writeln!(self.log.w(), "configure()").unwrap();
        self.interface = Some(*config);
        Ok(())
    }

    fn seed_hw_registers(&mut self, identity: &TpmIdentity) -> Result<(), BusError> {
        writeln!(self.log.w(), "seed_hw_registers()").unwrap();
        self.identity = Some(*identity);
        Ok(())
    }

    fn get_header(&mut self) -> Result<Option<CommandHeader>, BusError> {
        let header = self.headers.pop_front();
        if let Some(h) = header {
            writeln!(
                self.log.w(),
                "get_header() -> {:#04x} {:#010x}",
                u8::from(h.command),
                h.address
            )
            .unwrap();
        } else {
            writeln!(self.log.w(), "get_header() -> None").unwrap();
        }
        Ok(header)
    }

    fn write_response(&mut self, data: &[u8]) -> Result<(), BusError> {
        writeln!(self.log.w(), "write_response({data:02x?})").unwrap();
        if let Some(err) = self.fault {
            return Err(err);
        }
        self.responses.push(data.to_vec());
        Ok(())
    }

    fn read_request(&mut self, buf: &mut [u8]) -> Result<(), PullError> {
        if let Some(err) = self.fault {
            writeln!(self.log.w(), "read_request({}) -> {err}", buf.len()).unwrap();
            return Err(PullError::Bus(err));
        }
        if self.not_ready_polls > 0 || self.request_bytes.len() < buf.len() {
            self.not_ready_polls = self.not_ready_polls.saturating_sub(1);
            writeln!(self.log.w(), "read_request({}) -> NotYetAvailable", buf.len()).unwrap();
            return Err(PullError::NotYetAvailable);
        }
        let len = buf.len();
        writeln!(self.log.w(), "read_request({len})").unwrap();
        for (dst, src) in buf.iter_mut().zip(self.request_bytes.drain(..len)) {
            *dst = src;
        }
        Ok(())
    }
}

/// A notifier that raises a fixed number of signals, one per park, and
/// requests shutdown once they run out.
pub struct FakeNotifier {
    pub log: Log,
    shutdown: Shutdown,
    signals_left: u32,
    pending: bool,
}

impl FakeNotifier {
    pub fn new(log: Log, shutdown: Shutdown, signals: u32) -> Self {
        Self {
            log,
            shutdown,
            signals_left: signals,
            pending: false,
        }
    }

    /// Flag a header as if the interrupt handler had run.
    pub fn raise(&mut self) {
        self.pending = true;
    }
}

impl Notification for FakeNotifier {
    fn signal_pending(&self) -> bool {
        self.pending
    }

    fn mask(&mut self) {
        writeln!(self.log.w(), "mask()").unwrap();
    }

    fn unmask(&mut self) {
        writeln!(self.log.w(), "unmask()").unwrap();
    }

    fn wait_for_interrupt(&mut self) {
        writeln!(self.log.w(), "wait_for_interrupt()").unwrap();
        if self.signals_left > 0 {
            self.signals_left -= 1;
            self.pending = true;
        } else {
            self.shutdown.request();
        }
    }

    fn clear_and_rearm(&mut self) -> Result<(), BusError> {
        writeln!(self.log.w(), "clear_and_rearm()").unwrap();
        self.pending = false;
        Ok(())
    }
}

/// A cycle counter that only moves when busy-waited on. Clones share it.
#[derive(Clone)]
pub struct FakeTime {
    pub log: Log,
    now: Rc<Cell<u64>>,
}

impl FakeTime {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            now: Rc::new(Cell::new(0)),
        }
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }
}

impl TimeSource for FakeTime {
    fn now(&self) -> u64 {
        self.now.get()
    }

    fn busy_wait(&mut self, cycles: u64) {
        writeln!(self.log.w(), "busy_wait({cycles})").unwrap();
        self.now.set(self.now.get().wrapping_add(cycles));
    }
}
